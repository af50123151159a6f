//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    ///
    /// A path the caller asked for explicitly must exist; `required` selects that behavior.
    pub fn load_or_default(path: &Path, required: bool) -> Result<Config, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) if !required => Ok(Config::default()),
            other => other,
        }
    }

    /// Expand `~` and anchor relative paths at `base`.
    pub fn resolve_paths(config: &mut Config, base: &Path) {
        config.database.path = Self::resolve(&config.database.path, base);
        config.outputs.dir = Self::resolve(&config.outputs.dir, base);
        config.logging.dir = Self::resolve(&config.logging.dir, base);
    }

    fn resolve(path: &Path, base: &Path) -> PathBuf {
        let expanded = PathBuf::from(Self::expand_path(&path.to_string_lossy()));
        if expanded.is_absolute() {
            expanded
        } else {
            base.join(expanded)
        }
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();

        for cap in ENV_VAR.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.jobq`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

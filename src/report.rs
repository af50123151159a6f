//! Default job handler: writes a markdown report per job.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;

use jobq_workqueue::{Job, JobFailure, JobHandler, format_timestamp};

/// Writes `<outputs>/<job id>/report.md` and a `run.log` beside it.
pub(crate) struct ReportHandler {
    outputs_dir: PathBuf,
}

impl ReportHandler {
    pub(crate) fn new(outputs_dir: impl Into<PathBuf>) -> Self {
        Self {
            outputs_dir: outputs_dir.into(),
        }
    }
}

#[async_trait]
impl JobHandler for ReportHandler {
    async fn handle(&self, job: &Job) -> Result<String, JobFailure> {
        let job_dir = self.outputs_dir.join(job.id.to_string());
        tokio::fs::create_dir_all(&job_dir).await?;

        let log_file = job_dir.join("run.log");
        let report_file = job_dir.join("report.md");

        append_log(&log_file, "Job started").await?;
        append_log(
            &log_file,
            &format!("Payload: {}", serde_json::Value::Object(job.payload.clone())),
        )
        .await?;
        append_log(&log_file, "Processing input...").await?;

        tokio::fs::write(&report_file, render_report(job)).await?;

        append_log(&log_file, &format!("Report written to {}", report_file.display())).await?;
        append_log(&log_file, "Job completed successfully").await?;

        Ok(report_file.display().to_string())
    }
}

fn payload_str<'a>(job: &'a Job, key: &str) -> Option<&'a str> {
    job.payload
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

fn render_report(job: &Job) -> String {
    let text = payload_str(job, "text");

    let mut lines = vec![
        format!("# Job Report: {}", job.id),
        String::new(),
        format!("**Created:** {}", format_timestamp(&job.created_at)),
        format!("**Processed:** {}", format_timestamp(&Utc::now())),
        String::new(),
        "## Input".to_string(),
        String::new(),
    ];

    if let Some(text) = text {
        lines.push(format!("**Text:** {}", text));
    }
    if let Some(image) = payload_str(job, "image") {
        lines.push(format!("**Image:** {}", image));
    }
    if let Some(context_dir) = payload_str(job, "context_dir") {
        lines.push(format!("**Context Directory:** {}", context_dir));
    }

    lines.extend([
        String::new(),
        "## Result".to_string(),
        String::new(),
        "Processing completed successfully.".to_string(),
        String::new(),
        match text {
            Some(text) => format!("*Input text echoed:* {}", text),
            None => "*No text input provided.*".to_string(),
        },
    ]);

    lines.join("\n")
}

async fn append_log(log_file: &Path, message: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .await?;
    let line = format!("[{}] {}\n", format_timestamp(&Utc::now()), message);
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

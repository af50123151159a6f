//! Producer-side subcommands: submit and status.

use std::path::Path;

use serde_json::Value;
use uuid::Uuid;

use jobq_workqueue::{JobQueue, Payload, QueueError, StatusReport};

/// Build a payload from whichever inputs were supplied. Empty values count as absent.
///
/// Returns `None` when neither text nor image is given.
pub(crate) fn build_payload(
    text: Option<String>,
    image: Option<String>,
    context_dir: Option<String>,
) -> Option<Payload> {
    let non_empty = |value: Option<String>| value.filter(|s| !s.is_empty());
    let (text, image, context_dir) = (non_empty(text), non_empty(image), non_empty(context_dir));

    if text.is_none() && image.is_none() {
        return None;
    }

    let mut payload = Payload::new();
    for (key, value) in [("text", text), ("image", image), ("context_dir", context_dir)] {
        if let Some(value) = value {
            payload.insert(key.to_string(), Value::String(value));
        }
    }
    Some(payload)
}

/// Lines printed for a status query; empty result and error values are omitted.
pub(crate) fn status_lines(report: StatusReport) -> Vec<String> {
    let mut lines = vec![format!("Status: {}", report.status)];
    if let Some(result) = report.result_location.filter(|s| !s.is_empty()) {
        lines.push(format!("Result: {}", result));
    }
    if let Some(error) = report.error.filter(|s| !s.is_empty()) {
        lines.push(format!("Error: {}", error));
    }
    lines
}

/// Enqueue a job and print its ID.
pub(crate) async fn submit(
    queue: &JobQueue,
    db_path: &Path,
    text: Option<String>,
    image: Option<String>,
    context_dir: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(payload) = build_payload(text, image, context_dir) else {
        eprintln!("Error: at least one of --text or --image is required");
        std::process::exit(1);
    };

    let id = queue.enqueue(payload).await?;
    println!("Using DB: {}", db_path.display());
    println!("{}", id);
    Ok(())
}

/// Print a job's status, result and error.
pub(crate) async fn status(
    queue: &JobQueue,
    db_path: &Path,
    job_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Using DB: {}", db_path.display());

    // An unparseable ID cannot name a stored job.
    let report = match Uuid::parse_str(job_id) {
        Ok(id) => queue.status(&id).await,
        Err(_) => Err(QueueError::JobNotFound(job_id.to_string())),
    };

    match report {
        Ok(report) => {
            for line in status_lines(report) {
                println!("{}", line);
            }
            Ok(())
        }
        Err(QueueError::JobNotFound(_)) => {
            eprintln!("Job not found");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

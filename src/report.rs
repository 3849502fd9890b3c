use crate::{metadata::MetadataTable, workspace::Job};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Degraded,
    Failed,
}

/// Running, operator-facing log shared by every step of a job.
#[derive(Debug, Clone, Default)]
pub struct JobLog {
    text: String,
    warnings: usize,
}

impl JobLog {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            text: initial.into(),
            warnings: 0,
        }
    }

    pub fn info(&mut self, msg: impl AsRef<str>) {
        info!("{}", msg.as_ref());
        self.push_line(msg.as_ref());
    }

    pub fn warn(&mut self, msg: impl AsRef<str>) {
        warn!("{}", msg.as_ref());
        self.warnings += 1;
        self.push_line(&format!("Warning: {}", msg.as_ref()));
    }

    fn push_line(&mut self, line: &str) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        self.text.push_str(line);
    }

    pub fn warnings(&self) -> usize {
        self.warnings
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// The four values handed back to the operator, plus job bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutput {
    pub status: JobStatus,
    pub log: String,
    pub text: String,
    pub html: Option<String>,
    pub metadata: Option<MetadataTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
}

impl JobOutput {
    pub fn failed(log: impl Into<String>, job: Option<Job>) -> Self {
        Self {
            status: JobStatus::Failed,
            log: log.into(),
            text: String::new(),
            html: None,
            metadata: None,
            job,
        }
    }

    /// Log, text, HTML (empty when absent), metadata (None when absent).
    pub fn into_parts(self) -> (String, String, Option<String>, Option<MetadataTable>) {
        (self.log, self.text, self.html, self.metadata)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobIndex {
    pub job_id: String,
    pub source: String,
    pub input_sha256: String,
    pub started: String,
    pub finished: String,
    pub status: JobStatus,
    pub final_text: Option<String>,
    pub final_html: Option<String>,
    pub final_metadata: Option<String>,
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocDiag {
    pub python_exe: String,
    pub python_version: Option<String>,
    pub pipeline_module: String,
    pub pipeline_available: bool,
    pub previewer_module: String,
    pub previewer_available: bool,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// How an external tool run ended. Spawn and I/O failures are reported as
/// `Err` by the engine, not as an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Succeeded {
        stdout: String,
        stderr: String,
    },
    TimedOut {
        after: Duration,
        stdout: String,
        stderr: String,
    },
    Failed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Succeeded { .. })
    }

    pub fn stdout(&self) -> &str {
        match self {
            ToolOutcome::Succeeded { stdout, .. }
            | ToolOutcome::TimedOut { stdout, .. }
            | ToolOutcome::Failed { stdout, .. } => stdout,
        }
    }

    pub fn stderr(&self) -> &str {
        match self {
            ToolOutcome::Succeeded { stderr, .. }
            | ToolOutcome::TimedOut { stderr, .. }
            | ToolOutcome::Failed { stderr, .. } => stderr,
        }
    }

    /// One-line description used for log notes on non-success outcomes.
    pub fn describe_failure(&self) -> Option<String> {
        match self {
            ToolOutcome::Succeeded { .. } => None,
            ToolOutcome::TimedOut { after, stderr, .. } => Some(format!(
                "command timed out after {}s: {}",
                after.as_secs(),
                stderr.trim_end()
            )),
            ToolOutcome::Failed { stderr, .. } => {
                Some(format!("command failed: {}", stderr.trim_end()))
            }
        }
    }
}

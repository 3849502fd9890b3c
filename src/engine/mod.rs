pub mod python;
pub mod types;

use crate::workspace::Job;
use anyhow::Result;
use std::path::Path;

pub use types::{DocDiag, ToolOutcome};

/// The two external collaborators of a job: the OCR pipeline and the
/// side-by-side previewer.
pub trait Engine {
    fn doctor(&self) -> Result<DocDiag>;
    fn run_pipeline(&self, job: &Job) -> Result<ToolOutcome>;
    /// `out_dir` is `None` when the previewer writes to its own fixed location.
    fn render_preview(&self, output_file: &Path, out_dir: Option<&Path>) -> Result<ToolOutcome>;
}

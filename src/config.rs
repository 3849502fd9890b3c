use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub pipeline: PipelineTool,
    #[serde(default)]
    pub previewer: PreviewerTool,
    #[serde(default)]
    pub results: Results,
    #[serde(default)]
    pub postprocess: Postprocess,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Root under which every `job_<ts>` workspace is created.
    pub workspace_dir: String,
    /// Process-wide preview directory, only used when `previewer.job_scoped = false`.
    pub preview_dir: String,
    /// Preview directory name inside a job workspace.
    pub preview_subdir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            workspace_dir: "olmocr_workspace".into(),
            preview_dir: "dolma_previews".into(),
            preview_subdir: "previews".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineTool {
    pub python_exe: String,
    pub module: String,
    /// Flag preceding the document path; empty passes it positionally.
    pub document_flag: String,
    pub extra_args: Vec<String>,
    /// 0 disables the timeout.
    pub timeout_seconds: u64,
    pub env: BTreeMap<String, String>,
}
impl Default for PipelineTool {
    fn default() -> Self {
        Self {
            python_exe: "auto".into(),
            module: "olmocr.pipeline".into(),
            document_flag: "--pdfs".into(),
            extra_args: Vec::new(),
            timeout_seconds: 3600,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewerTool {
    pub python_exe: String,
    pub module: String,
    /// Write previews under the job workspace instead of `paths.preview_dir`.
    pub job_scoped: bool,
    pub output_dir_flag: String,
    pub timeout_seconds: u64,
    pub env: BTreeMap<String, String>,
}
impl Default for PreviewerTool {
    fn default() -> Self {
        Self {
            python_exe: "auto".into(),
            module: "olmocr.viewer.dolmaviewer".into(),
            job_scoped: true,
            output_dir_flag: "--output_dir".into(),
            timeout_seconds: 300,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Results {
    pub dir_name: String,
    pub file_prefix: String,
    pub file_suffix: String,
    /// Substituted when the record carries no `text` field.
    pub missing_text: String,
}
impl Default for Results {
    fn default() -> Self {
        Self {
            dir_name: "results".into(),
            file_prefix: "output_".into(),
            file_suffix: ".jsonl".into(),
            missing_text: "no text found".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Postprocess {
    pub font_size_px: u32,
    pub line_height: f32,
    pub zoom_step: f32,
    pub zoom_in_label: String,
    pub zoom_out_label: String,
}
impl Default for Postprocess {
    fn default() -> Self {
        Self {
            font_size_px: 16,
            line_height: 1.5,
            zoom_step: 0.1,
            zoom_in_label: "Zoom in".into(),
            zoom_out_label: "Zoom out".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub write_text: bool,
    pub write_html: bool,
    pub write_metadata: bool,
    pub write_index_json: bool,
    pub text_filename: String,
    pub html_filename: String,
    pub metadata_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            write_text: true,
            write_html: true,
            write_metadata: true,
            write_index_json: true,
            text_filename: "extracted.txt".into(),
            html_filename: "preview.html".into(),
            metadata_filename: "metadata.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Security {
    pub reject_url_inputs: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
        }
    }
}

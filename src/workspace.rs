use crate::{
    config::Config,
    util::{ensure_dir, hash_file, unix_seconds},
};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One submitted document and the directory that holds its artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub dir: PathBuf,
    pub input: PathBuf,
    pub source: PathBuf,
    pub input_sha256: String,
}

impl Job {
    pub fn results_dir(&self, cfg: &Config) -> PathBuf {
        self.dir.join(&cfg.results.dir_name)
    }

    pub fn preview_dir(&self, cfg: &Config) -> PathBuf {
        if cfg.previewer.job_scoped {
            self.dir.join(&cfg.paths.preview_subdir)
        } else {
            PathBuf::from(&cfg.paths.preview_dir)
        }
    }

    pub fn final_dir(&self) -> PathBuf {
        self.dir.join("final")
    }
}

/// Allocates `job_<unix-seconds>` under the workspace root and copies the
/// document in as `input.<ext>`.
///
/// Two jobs started within the same second share a directory; the later copy
/// overwrites the earlier input.
pub fn create_job(cfg: &Config, source: &Path) -> Result<Job> {
    let id = format!("job_{}", unix_seconds());
    let dir = PathBuf::from(&cfg.paths.workspace_dir).join(&id);
    if dir.exists() {
        warn!("workspace already exists, reusing: {}", dir.display());
    }
    ensure_dir(&dir)?;
    let dir = dir
        .canonicalize()
        .with_context(|| format!("canonicalize workspace: {}", dir.display()))?;

    let input = dir.join(format!("input.{}", input_extension(source)));
    std::fs::copy(source, &input).with_context(|| {
        format!("copying {} -> {}", source.display(), input.display())
    })?;
    let input_sha256 =
        hash_file(&input).with_context(|| format!("hashing input: {}", input.display()))?;

    info!("job_id={id} workspace={}", dir.display());

    Ok(Job {
        id,
        dir,
        input,
        source: source.to_path_buf(),
        input_sha256,
    })
}

fn input_extension(source: &Path) -> String {
    source
        .extension()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_else(|| "pdf".to_string())
}

pub fn validate_input(cfg: &Config, input: &Path) -> Result<()> {
    let input_str = input.display().to_string();

    if cfg.security.reject_url_inputs && looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are disabled: {input_str}"));
    }

    if !input.is_file() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    if let Some(ext) = input.extension().and_then(|s| s.to_str()) {
        if !ext.eq_ignore_ascii_case("pdf") {
            return Err(anyhow!("input is not a PDF: {}", input.display()));
        }
    } else {
        warn!("input has no extension; assuming PDF: {}", input.display());
    }

    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}

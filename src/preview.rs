use crate::{
    config::Config,
    engine::Engine,
    postprocess::enhance_preview_html_with_stats,
    report::JobLog,
    util::{ensure_dir, sorted_files},
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Renders the side-by-side preview for `output_file` into `preview_dir` and
/// returns the post-processed HTML of the first `*.html` found there.
///
/// Every failure here is a warning on `log`; the job carries on without a
/// preview.
pub fn generate_preview<E: Engine + ?Sized>(
    cfg: &Config,
    engine: &E,
    output_file: &Path,
    preview_dir: &Path,
    log: &mut JobLog,
) -> Option<String> {
    let out_dir = if cfg.previewer.job_scoped {
        if let Err(err) = ensure_dir(preview_dir) {
            log.warn(format!("preview rendering failed: {err:#}"));
            return None;
        }
        Some(preview_dir)
    } else {
        None
    };

    match engine.render_preview(output_file, out_dir) {
        Ok(outcome) => {
            if let Some(reason) = outcome.describe_failure() {
                log.warn(format!("preview rendering failed: {reason}"));
            }
        }
        Err(err) => log.warn(format!("preview rendering failed: {err:#}")),
    }

    let html_path = match locate_preview(preview_dir) {
        Ok(Some(p)) => p,
        Ok(None) => {
            log.warn(format!("no preview HTML found in {}", preview_dir.display()));
            return None;
        }
        Err(err) => {
            log.warn(format!("no preview HTML found: {err:#}"));
            return None;
        }
    };

    let raw = match std::fs::read_to_string(&html_path)
        .with_context(|| format!("reading {}", html_path.display()))
    {
        Ok(raw) => raw,
        Err(err) => {
            log.warn(format!("failed to read preview HTML: {err:#}"));
            return None;
        }
    };

    let (html, stats) = enhance_preview_html_with_stats(cfg, &raw);
    debug!(?stats, "preview rewrite");
    if !raw.is_empty() && stats.is_noop() {
        warn!(
            "preview {} matched none of the known layout markers",
            html_path.display()
        );
    }
    Some(html)
}

/// Lexicographically first `*.html` in `dir`; `None` when the directory is
/// missing or holds no HTML.
pub fn locate_preview(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let files = sorted_files(dir, |name| {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("html"))
    })?;
    if files.len() > 1 {
        warn!(
            "{} preview files in {}; using the first by name",
            files.len(),
            dir.display()
        );
    }
    Ok(files.into_iter().next())
}

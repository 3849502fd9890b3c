use anyhow::{anyhow, Result};
use olmocr_runner::{
    cli::write_artifacts,
    config::Config,
    engine::{DocDiag, Engine, ToolOutcome},
    metadata::MetadataRow,
    pipeline::Pipeline,
    report::JobStatus,
    workspace::Job,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// What the fake pipeline does when invoked.
enum PipelineScript {
    /// Exit 0; write `results/<file>` with `content` unless `None`.
    Succeed {
        stdout: &'static str,
        results: Option<(&'static str, String)>,
    },
    /// Exit 0 without creating the results directory.
    SucceedNoResults { stdout: &'static str },
    Fail { stderr: &'static str },
    TimeOut,
    SpawnError,
}

enum PreviewScript {
    Render(&'static str),
    /// Previewer with no output-dir flag, writing into a process-wide directory.
    RenderShared { dir: PathBuf, html: &'static str },
    Fail { stderr: &'static str },
    Silent,
}

struct FakeEngine {
    pipeline: PipelineScript,
    preview: PreviewScript,
}

impl Engine for FakeEngine {
    fn doctor(&self) -> Result<DocDiag> {
        Err(anyhow!("not used"))
    }

    fn run_pipeline(&self, job: &Job) -> Result<ToolOutcome> {
        assert!(job.input.is_file(), "input copied before the pipeline runs");
        match &self.pipeline {
            PipelineScript::Succeed { stdout, results } => {
                let dir = job.dir.join("results");
                std::fs::create_dir_all(&dir)?;
                if let Some((name, content)) = results {
                    std::fs::write(dir.join(name), content)?;
                }
                Ok(ToolOutcome::Succeeded {
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                })
            }
            PipelineScript::SucceedNoResults { stdout } => Ok(ToolOutcome::Succeeded {
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
            PipelineScript::Fail { stderr } => Ok(ToolOutcome::Failed {
                code: Some(1),
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
            PipelineScript::TimeOut => Ok(ToolOutcome::TimedOut {
                after: Duration::from_secs(5),
                stdout: String::new(),
                stderr: "still loading".into(),
            }),
            PipelineScript::SpawnError => Err(anyhow!("spawning python3: not found")),
        }
    }

    fn render_preview(&self, output_file: &Path, out_dir: Option<&Path>) -> Result<ToolOutcome> {
        assert!(output_file.is_file());
        if let PreviewScript::RenderShared { dir, html } = &self.preview {
            assert!(out_dir.is_none(), "shared preview dir is not passed to the previewer");
            std::fs::write(dir.join("output_abc.html"), html)?;
            return Ok(ToolOutcome::Succeeded {
                stdout: String::new(),
                stderr: String::new(),
            });
        }
        let dir = out_dir.ok_or_else(|| anyhow!("expected a job-scoped preview dir"))?;
        match &self.preview {
            PreviewScript::Render(html) => {
                std::fs::write(dir.join("output_abc.html"), html)?;
                Ok(ToolOutcome::Succeeded {
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
            PreviewScript::Fail { stderr } => Ok(ToolOutcome::Failed {
                code: Some(2),
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
            PreviewScript::Silent | PreviewScript::RenderShared { .. } => {
                Ok(ToolOutcome::Succeeded {
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
        }
    }
}

fn setup() -> (TempDir, Config, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.paths.workspace_dir = tmp.path().join("ws").display().to_string();
    let pdf = tmp.path().join("upload.pdf");
    std::fs::write(&pdf, b"%PDF-1.4\n%fake\n").unwrap();
    (tmp, cfg, pdf)
}

fn hello_world_line() -> String {
    format!(
        "{}\n",
        json!({"text": "Hello world", "metadata": {"pages": 1}})
    )
}

const PREVIEW_HTML: &str =
    "<html><head><style></style></head><body><div class=\"container\">x</div></body></html>";

#[test]
fn successful_job_returns_all_four_parts() {
    let (_tmp, cfg, pdf) = setup();
    let engine = FakeEngine {
        pipeline: PipelineScript::Succeed {
            stdout: "Processed 1 document\n",
            results: Some(("output_abc.jsonl", hello_world_line())),
        },
        preview: PreviewScript::Render(PREVIEW_HTML),
    };
    let out = Pipeline::new(&cfg, engine).process(Some(&pdf));

    assert_eq!(out.status, JobStatus::Completed);
    assert!(out.log.starts_with("Processed 1 document\n"));
    assert!(out.log.contains("pipeline finished in"));
    assert!(out.log.contains("output_abc.jsonl"));
    assert_eq!(out.text, "Hello world");
    let html = out.html.as_deref().expect("preview");
    assert_eq!(
        html.matches(r#"<div class="container" style="max-width: 100%; width: 100%;">"#)
            .count(),
        1
    );
    assert_eq!(
        out.metadata.as_ref().unwrap().rows,
        vec![MetadataRow("pages".into(), json!(1))]
    );

    let job = out.job.as_ref().unwrap();
    assert_eq!(job.input, job.dir.join("input.pdf"));
    assert!(job.dir.join("previews").join("output_abc.html").is_file());
}

#[test]
fn pipeline_failure_reports_stderr() {
    let (_tmp, cfg, pdf) = setup();
    let engine = FakeEngine {
        pipeline: PipelineScript::Fail {
            stderr: "model load failed",
        },
        preview: PreviewScript::Silent,
    };
    let (log, text, html, metadata) = Pipeline::new(&cfg, engine).process(Some(&pdf)).into_parts();

    assert_eq!(log, "command failed: model load failed");
    assert!(text.is_empty());
    assert!(html.is_none());
    assert!(metadata.is_none());
}

#[test]
fn pipeline_timeout_is_fatal() {
    let (_tmp, cfg, pdf) = setup();
    let engine = FakeEngine {
        pipeline: PipelineScript::TimeOut,
        preview: PreviewScript::Silent,
    };
    let out = Pipeline::new(&cfg, engine).process(Some(&pdf));
    assert_eq!(out.status, JobStatus::Failed);
    assert_eq!(out.log, "command timed out after 5s: still loading");
}

#[test]
fn spawn_error_falls_back_to_generic_message() {
    let (_tmp, cfg, pdf) = setup();
    let engine = FakeEngine {
        pipeline: PipelineScript::SpawnError,
        preview: PreviewScript::Silent,
    };
    let out = Pipeline::new(&cfg, engine).process(Some(&pdf));
    assert_eq!(out.status, JobStatus::Failed);
    assert!(out.log.starts_with("error during processing: "));
    assert!(out.log.contains("not found"));
}

#[test]
fn missing_document_is_rejected() {
    let (_tmp, cfg, _pdf) = setup();
    let engine = FakeEngine {
        pipeline: PipelineScript::SpawnError,
        preview: PreviewScript::Silent,
    };
    let out = Pipeline::new(&cfg, engine).process(None);
    assert_eq!(out.status, JobStatus::Failed);
    assert!(out.log.contains("no document supplied"));
    assert!(out.job.is_none());
}

#[test]
fn unreadable_source_surfaces_as_error() {
    let (tmp, cfg, _pdf) = setup();
    let engine = FakeEngine {
        pipeline: PipelineScript::SpawnError,
        preview: PreviewScript::Silent,
    };
    let pipeline = Pipeline::new(&cfg, engine);
    let missing = tmp.path().join("gone.pdf");

    assert!(pipeline.run_job(&missing).is_err());
    let out = pipeline.process(Some(&missing));
    assert_eq!(out.status, JobStatus::Failed);
    assert!(out.log.starts_with("error during processing: "));
}

#[test]
fn missing_results_dir_degrades() {
    let (_tmp, cfg, pdf) = setup();
    let engine = FakeEngine {
        pipeline: PipelineScript::SucceedNoResults { stdout: "done\n" },
        preview: PreviewScript::Silent,
    };
    let out = Pipeline::new(&cfg, engine).process(Some(&pdf));
    assert_eq!(out.status, JobStatus::Degraded);
    assert!(out.log.contains("no results directory"));
    assert!(out.log.ends_with("Pipeline log:\ndone\n"));
    assert!(out.text.is_empty());
    assert!(out.html.is_none());
    assert!(out.metadata.is_none());
}

#[test]
fn missing_output_file_degrades() {
    let (_tmp, cfg, pdf) = setup();
    let engine = FakeEngine {
        pipeline: PipelineScript::Succeed {
            stdout: "done\n",
            results: None,
        },
        preview: PreviewScript::Silent,
    };
    let out = Pipeline::new(&cfg, engine).process(Some(&pdf));
    assert_eq!(out.status, JobStatus::Degraded);
    assert!(out.log.contains("no output file"));
    assert!(out.text.is_empty());
    assert!(out.html.is_none());
    assert!(out.metadata.is_none());
}

#[test]
fn invalid_json_degrades() {
    let (_tmp, cfg, pdf) = setup();
    let engine = FakeEngine {
        pipeline: PipelineScript::Succeed {
            stdout: "done\n",
            results: Some(("output_1.jsonl", "not json at all".into())),
        },
        preview: PreviewScript::Silent,
    };
    let out = Pipeline::new(&cfg, engine).process(Some(&pdf));
    assert_eq!(out.status, JobStatus::Degraded);
    assert!(out.log.contains("failed to parse output file"));
    assert!(out.text.is_empty());
    assert!(out.metadata.is_none());
}

#[test]
fn preview_failure_keeps_text_and_metadata() {
    let (_tmp, cfg, pdf) = setup();
    let engine = FakeEngine {
        pipeline: PipelineScript::Succeed {
            stdout: "done\n",
            results: Some(("output_abc.jsonl", hello_world_line())),
        },
        preview: PreviewScript::Fail {
            stderr: "viewer crashed",
        },
    };
    let out = Pipeline::new(&cfg, engine).process(Some(&pdf));

    assert_eq!(out.status, JobStatus::Degraded);
    assert!(out.log.starts_with("done\n"));
    assert!(out.log.contains("Warning: preview rendering failed: command failed: viewer crashed"));
    assert!(out.log.contains("no preview HTML found"));
    assert_eq!(out.text, "Hello world");
    assert!(out.html.is_none());
    assert_eq!(out.metadata.unwrap().rows.len(), 1);
}

#[test]
fn artifacts_and_index_are_written() {
    let (_tmp, cfg, pdf) = setup();
    let engine = FakeEngine {
        pipeline: PipelineScript::Succeed {
            stdout: "done\n",
            results: Some(("output_abc.jsonl", hello_world_line())),
        },
        preview: PreviewScript::Render(PREVIEW_HTML),
    };
    let out = Pipeline::new(&cfg, engine).process(Some(&pdf));
    let index = write_artifacts(&cfg, &out, "2026-01-01T00:00:00Z")
        .unwrap()
        .expect("index written");

    let job = out.job.as_ref().unwrap();
    assert_eq!(index.status, JobStatus::Completed);
    assert_eq!(
        std::fs::read_to_string(job.dir.join("final/extracted.txt")).unwrap(),
        "Hello world"
    );
    assert!(job.dir.join("final/preview.html").is_file());
    let meta: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(job.dir.join("final/metadata.json")).unwrap())
            .unwrap();
    assert_eq!(meta["rows"], json!([["pages", 1]]));
    assert!(job.dir.join("index.json").is_file());
}

#[test]
fn results_dir_name_comes_from_config() {
    let (_tmp, mut cfg, pdf) = setup();
    cfg.results.dir_name = "ocr_out".into();
    let engine = FakeEngine {
        // The fake always writes `results/`, which is no longer where we look.
        pipeline: PipelineScript::Succeed {
            stdout: "done\n",
            results: Some(("output_abc.jsonl", hello_world_line())),
        },
        preview: PreviewScript::Silent,
    };
    let out = Pipeline::new(&cfg, engine).process(Some(&pdf));
    assert_eq!(out.status, JobStatus::Degraded);
    assert!(out.log.contains("no results directory"));
    assert!(out.log.contains("ocr_out"));
}

#[test]
fn shared_preview_dir_when_not_job_scoped() {
    let (tmp, mut cfg, pdf) = setup();
    let shared = tmp.path().join("dolma_previews");
    std::fs::create_dir_all(&shared).unwrap();
    cfg.paths.preview_dir = shared.display().to_string();
    cfg.previewer.job_scoped = false;
    let engine = FakeEngine {
        pipeline: PipelineScript::Succeed {
            stdout: "done\n",
            results: Some(("output_abc.jsonl", hello_world_line())),
        },
        preview: PreviewScript::RenderShared {
            dir: shared.clone(),
            html: PREVIEW_HTML,
        },
    };
    let out = Pipeline::new(&cfg, engine).process(Some(&pdf));

    assert_eq!(out.status, JobStatus::Completed);
    assert!(out.html.as_deref().unwrap().contains("max-width: 100%"));
    assert!(shared.join("output_abc.html").is_file());
    assert!(!out.job.as_ref().unwrap().dir.join("previews").exists());
}

#[test]
fn artifact_write_error_names_the_file() {
    let (_tmp, cfg, pdf) = setup();
    let engine = FakeEngine {
        pipeline: PipelineScript::Succeed {
            stdout: "done\n",
            results: Some(("output_abc.jsonl", hello_world_line())),
        },
        preview: PreviewScript::Silent,
    };
    let out = Pipeline::new(&cfg, engine).process(Some(&pdf));
    let job = out.job.as_ref().unwrap();
    // A directory where the text file should go makes the write fail.
    std::fs::create_dir_all(job.dir.join("final/extracted.txt")).unwrap();

    let err = write_artifacts(&cfg, &out, "2026-01-01T00:00:00Z").unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("writing "), "{msg}");
    assert!(msg.contains("extracted.txt"), "{msg}");
}

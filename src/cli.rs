use crate::{
    config::Config,
    engine::{python::PythonEngine, Engine},
    pipeline::Pipeline,
    postprocess::enhance_preview_html,
    preview::generate_preview,
    report::{JobIndex, JobLog, JobOutput, JobStatus},
    util::{ensure_dir, now_rfc3339},
    workspace::validate_input,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "olmocr-runner")]
#[command(about = "olmOCR job orchestrator (pipeline + preview + metadata)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./olmocr-runner.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check the Python interpreter and olmOCR modules.
    Doctor {},
    /// Run one document through the pipeline and previewer.
    Run {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Print the extracted text and metadata table after the summary.
        #[arg(long)]
        print_text: bool,
    },
    /// Render and post-process a preview from an existing output file.
    Preview {
        #[arg(long)]
        output_file: PathBuf,
        /// Directory the previewer writes into (defaults to paths.preview_dir).
        #[arg(long)]
        preview_dir: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Apply the HTML post-processor to a preview file.
    Postprocess {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    let with_file = matches!(args.cmd, Command::Run { .. });
    let log_path = resolve_log_path(&cfg, with_file);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Run { input, print_text } => run(&cfg, input.as_deref(), *print_text),
        Command::Preview {
            output_file,
            preview_dir,
            out,
        } => preview(&cfg, output_file, preview_dir.as_deref(), out.as_deref()),
        Command::Postprocess { input, out } => postprocess(&cfg, input, out.as_deref()),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["olmocr-runner.toml", "olmocr-runner.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command results (JSON summaries, HTML); logs go to stderr.
    let console_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config, with_file: bool) -> Option<PathBuf> {
    if !with_file || !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(
        PathBuf::from(&cfg.paths.workspace_dir)
            .join("logs")
            .join("olmocr-runner.log"),
    )
}

fn doctor(cfg: &Config) -> Result<()> {
    let engine = PythonEngine::new(cfg)?;
    let diag = engine.doctor()?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(())
}

fn run(cfg: &Config, input: Option<&Path>, print_text: bool) -> Result<()> {
    if let Some(input) = input {
        validate_input(cfg, input)?;
    }

    let engine = PythonEngine::new(cfg)?;
    let pipeline = Pipeline::new(cfg, engine);

    let started = now_rfc3339();
    let output = pipeline.process(input);
    let index = write_artifacts(cfg, &output, &started)?;

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "job_id": output.job.as_ref().map(|j| &j.id),
                "job_dir": output.job.as_ref().map(|j| &j.dir),
                "status": output.status,
                "text_chars": output.text.chars().count(),
                "metadata_rows": output.metadata.as_ref().map_or(0, |m| m.rows.len()),
                "preview": output.html.is_some(),
                "index": index.is_some(),
                "log": output.log,
            }))?
        );
    }

    if print_text {
        if !output.text.is_empty() {
            println!("{}", output.text);
        }
        if let Some(table) = output.metadata.as_ref().filter(|t| !t.is_empty()) {
            print!("\n{}", table.render_text());
        }
    }

    if output.status == JobStatus::Failed {
        let first = output.log.lines().next().unwrap_or("job failed");
        return Err(anyhow!("job failed: {first}"));
    }
    Ok(())
}

/// Writes the operator-facing artifacts into `<job>/final` and the job index.
pub fn write_artifacts(cfg: &Config, output: &JobOutput, started: &str) -> Result<Option<JobIndex>> {
    let Some(job) = output.job.as_ref() else {
        return Ok(None);
    };
    let final_dir = job.final_dir();
    ensure_dir(&final_dir)?;

    let write = |path: PathBuf, content: &str| -> Result<()> {
        std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))
    };

    let mut final_text = None;
    if cfg.output.write_text && !output.text.is_empty() {
        write(final_dir.join(&cfg.output.text_filename), &output.text)?;
        final_text = Some(format!("final/{}", cfg.output.text_filename));
    }

    let mut final_html = None;
    if let (true, Some(html)) = (cfg.output.write_html, output.html.as_ref()) {
        write(final_dir.join(&cfg.output.html_filename), html)?;
        final_html = Some(format!("final/{}", cfg.output.html_filename));
    }

    let mut final_metadata = None;
    if let (true, Some(table)) = (cfg.output.write_metadata, output.metadata.as_ref()) {
        write(
            final_dir.join(&cfg.output.metadata_filename),
            &serde_json::to_string_pretty(table)?,
        )?;
        final_metadata = Some(format!("final/{}", cfg.output.metadata_filename));
    }

    write(final_dir.join("log.txt"), &output.log)?;

    if !cfg.output.write_index_json {
        return Ok(None);
    }
    let index = JobIndex {
        job_id: job.id.clone(),
        source: job.source.display().to_string(),
        input_sha256: job.input_sha256.clone(),
        started: started.to_string(),
        finished: now_rfc3339(),
        status: output.status,
        final_text,
        final_html,
        final_metadata,
    };
    write(job.dir.join("index.json"), &serde_json::to_string_pretty(&index)?)?;
    info!("wrote {}", job.dir.join("index.json").display());
    Ok(Some(index))
}

fn preview(
    cfg: &Config,
    output_file: &Path,
    preview_dir: Option<&Path>,
    out: Option<&Path>,
) -> Result<()> {
    if !output_file.is_file() {
        return Err(anyhow!("output file does not exist: {}", output_file.display()));
    }
    let mut cfg = cfg.clone();
    cfg.previewer.job_scoped = preview_dir.is_some();
    let dir = preview_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.preview_dir));

    let engine = PythonEngine::new(&cfg)?;
    let mut log = JobLog::default();
    let html = generate_preview(&cfg, &engine, output_file, &dir, &mut log)
        .ok_or_else(|| anyhow!("no preview produced:\n{}", log.as_str()))?;

    emit(out, &html)
}

fn postprocess(cfg: &Config, input: &Path, out: Option<&Path>) -> Result<()> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    emit(out, &enhance_preview_html(cfg, &raw))
}

fn emit(out: Option<&Path>, content: &str) -> Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                ensure_dir(parent)?;
            }
            std::fs::write(path, content)
                .with_context(|| format!("writing {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => print!("{content}"),
    }
    Ok(())
}

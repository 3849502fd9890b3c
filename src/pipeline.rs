use crate::{
    config::Config,
    engine::Engine,
    metadata::tabulate,
    preview::generate_preview,
    report::{JobLog, JobOutput, JobStatus},
    results::{locate_and_parse, ParseOutcome},
    workspace::{create_job, Job},
};
use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

pub struct Pipeline<E: Engine> {
    cfg: Config,
    engine: E,
}

impl<E: Engine> Pipeline<E> {
    pub fn new(cfg: &Config, engine: E) -> Self {
        Self {
            cfg: cfg.clone(),
            engine,
        }
    }

    /// Caller-facing entry point: never fails, every error ends up in the log.
    pub fn process(&self, input: Option<&Path>) -> JobOutput {
        let Some(input) = input else {
            warn!("no document supplied");
            return JobOutput::failed("no document supplied; provide a PDF to process", None);
        };
        match self.run_job(input) {
            Ok(out) => out,
            Err(err) => {
                error!("job setup failed: {err:#}");
                JobOutput::failed(format!("error during processing: {err:#}"), None)
            }
        }
    }

    /// Creates the workspace and runs the job in it. Only workspace failures
    /// surface as `Err`.
    pub fn run_job(&self, input: &Path) -> Result<JobOutput> {
        let job = create_job(&self.cfg, input)?;
        Ok(self.run_in(job))
    }

    pub fn run_in(&self, job: Job) -> JobOutput {
        let started = Instant::now();

        let outcome = match self.engine.run_pipeline(&job) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("pipeline could not run: {err:#}");
                return JobOutput::failed(format!("error during processing: {err:#}"), Some(job));
            }
        };
        if let Some(reason) = outcome.describe_failure() {
            error!("pipeline failed for {}: {reason}", job.id);
            return JobOutput::failed(reason, Some(job));
        }
        let elapsed = started.elapsed().as_secs_f64();

        let stdout = outcome.stdout().to_string();
        let (output_file, candidates, text, record) =
            match locate_and_parse(&self.cfg, &job.results_dir(&self.cfg)) {
                ParseOutcome::Parsed {
                    path,
                    candidates,
                    text,
                    record,
                } => (path, candidates, text, record),
                other => {
                    warn!("{other}");
                    return JobOutput {
                        status: JobStatus::Degraded,
                        log: format!("{other}\n\nPipeline log:\n{stdout}"),
                        text: String::new(),
                        html: None,
                        metadata: None,
                        job: Some(job),
                    };
                }
            };

        let mut log = JobLog::new(stdout);
        log.info(format!(
            "pipeline finished in {elapsed:.1}s; using {}",
            output_file.display()
        ));
        if candidates > 1 {
            log.warn(format!(
                "{candidates} output files found; using {}",
                output_file.display()
            ));
        }

        let preview_dir = job.preview_dir(&self.cfg);
        let html = generate_preview(&self.cfg, &self.engine, &output_file, &preview_dir, &mut log);
        let metadata = tabulate(&record.metadata);

        let status = if html.is_some() && log.warnings() == 0 {
            JobStatus::Completed
        } else {
            JobStatus::Degraded
        };
        info!(
            "job {} {:?}: {} chars of text, {} metadata rows, preview={}",
            job.id,
            status,
            text.chars().count(),
            metadata.rows.len(),
            html.is_some()
        );

        JobOutput {
            status,
            log: log.into_string(),
            text,
            html,
            metadata: Some(metadata),
            job: Some(job),
        }
    }
}

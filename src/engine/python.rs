use super::{types::*, Engine};
use crate::{config::Config, workspace::Job};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs olmOCR's Python modules (`python -m <module> ...`).
pub struct PythonEngine {
    cfg: Config,
    pipeline_python: PathBuf,
    previewer_python: PathBuf,
}

impl PythonEngine {
    pub fn new(cfg: &Config) -> Result<Self> {
        if cfg.pipeline.module.trim().is_empty() {
            return Err(anyhow!("pipeline.module is empty"));
        }
        if cfg.previewer.module.trim().is_empty() {
            return Err(anyhow!("previewer.module is empty"));
        }
        Ok(Self {
            cfg: cfg.clone(),
            pipeline_python: resolve_python_exe(&cfg.pipeline.python_exe),
            previewer_python: resolve_python_exe(&cfg.previewer.python_exe),
        })
    }

    fn module_command(
        &self,
        python: &Path,
        module: &str,
        env: &BTreeMap<String, String>,
    ) -> Command {
        let mut cmd = Command::new(python);
        cmd.arg("-m").arg(module);
        for (k, v) in env {
            cmd.env(k, v);
        }
        cmd
    }

    fn module_available(&self, python: &Path, module: &str) -> bool {
        let mut cmd = Command::new(python);
        cmd.arg("-c")
            .arg("import importlib.util, sys; sys.exit(0 if importlib.util.find_spec(sys.argv[1]) else 1)")
            .arg(module);
        match run_captured(&mut cmd, Some(Duration::from_secs(60))) {
            Ok(out) => out.is_success(),
            Err(err) => {
                debug!("import check for {module} failed: {err:#}");
                false
            }
        }
    }
}

fn resolve_python_exe(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var("OLMOCR_PYTHON") {
            let p = expand_tilde(&env_val);
            if p.exists() {
                return p;
            }
        }
        return PathBuf::from("python3");
    }
    expand_tilde(raw)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

fn timeout_from(seconds: u64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds))
}

impl Engine for PythonEngine {
    fn doctor(&self) -> Result<DocDiag> {
        let mut version_cmd = Command::new(&self.pipeline_python);
        version_cmd.arg("--version");
        let (python_version, error) =
            match run_captured(&mut version_cmd, Some(Duration::from_secs(30))) {
                Ok(out) if out.is_success() => {
                    // Python 2 printed the version on stderr.
                    let v = if out.stdout().trim().is_empty() {
                        out.stderr().trim().to_string()
                    } else {
                        out.stdout().trim().to_string()
                    };
                    (Some(v), None)
                }
                Ok(out) => (None, out.describe_failure()),
                Err(err) => (None, Some(format!("{err:#}"))),
            };

        let pipeline_available = python_version.is_some()
            && self.module_available(&self.pipeline_python, &self.cfg.pipeline.module);
        let previewer_available = python_version.is_some()
            && self.module_available(&self.previewer_python, &self.cfg.previewer.module);

        Ok(DocDiag {
            python_exe: self.pipeline_python.display().to_string(),
            python_version,
            pipeline_module: self.cfg.pipeline.module.clone(),
            pipeline_available,
            previewer_module: self.cfg.previewer.module.clone(),
            previewer_available,
            ok: pipeline_available && previewer_available,
            error,
        })
    }

    fn run_pipeline(&self, job: &Job) -> Result<ToolOutcome> {
        let tool = &self.cfg.pipeline;
        let mut cmd = self.module_command(&self.pipeline_python, &tool.module, &tool.env);
        cmd.arg(&job.dir);
        if !tool.document_flag.is_empty() {
            cmd.arg(&tool.document_flag);
        }
        cmd.arg(&job.input);
        cmd.args(&tool.extra_args);

        info!("running pipeline {} for {}", tool.module, job.id);
        run_captured(&mut cmd, timeout_from(tool.timeout_seconds))
            .with_context(|| format!("running {}", tool.module))
    }

    fn render_preview(&self, output_file: &Path, out_dir: Option<&Path>) -> Result<ToolOutcome> {
        let tool = &self.cfg.previewer;
        let mut cmd = self.module_command(&self.previewer_python, &tool.module, &tool.env);
        cmd.arg(output_file);
        if let Some(dir) = out_dir {
            if !tool.output_dir_flag.is_empty() {
                cmd.arg(&tool.output_dir_flag);
            }
            cmd.arg(dir);
        }

        info!("rendering preview for {}", output_file.display());
        run_captured(&mut cmd, timeout_from(tool.timeout_seconds))
            .with_context(|| format!("running {}", tool.module))
    }
}

/// Spawns `cmd`, captures stdout/stderr as text and classifies the exit.
pub fn run_captured(cmd: &mut Command, timeout: Option<Duration>) -> Result<ToolOutcome> {
    debug!("spawn {:?} timeout={:?}", cmd, timeout);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning {:?}", cmd.get_program()))?;

    let (status, stdout, stderr, timed_out) = wait_with_timeout(&mut child, timeout)?;
    let stdout = String::from_utf8_lossy(&stdout).into_owned();
    let stderr = String::from_utf8_lossy(&stderr).into_owned();

    if let Some(after) = timed_out {
        return Ok(ToolOutcome::TimedOut {
            after,
            stdout,
            stderr,
        });
    }
    if status.success() {
        Ok(ToolOutcome::Succeeded { stdout, stderr })
    } else {
        Ok(ToolOutcome::Failed {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

type Captured = (ExitStatus, Vec<u8>, Vec<u8>, Option<Duration>);

/// How long to keep draining pipes once the child itself has been reaped.
/// Grandchildren that inherited the pipes can hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> Result<Captured> {
    // Drain pipes while waiting so a chatty child can't block on a full buffer.
    let (done_tx, done_rx) = mpsc::channel::<Result<()>>();
    let stdout = spawn_drain("stdout", child.stdout.take(), done_tx.clone());
    let stderr = spawn_drain("stderr", child.stderr.take(), done_tx);

    let start = Instant::now();
    let mut timed_out = None;
    let status = loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            break status;
        }

        if let Some(limit) = timeout {
            if start.elapsed() > limit {
                warn!("process timed out after {:?}", limit);
                let _ = child.kill();
                timed_out = Some(limit);
                break child.wait().with_context(|| "wait after kill")?;
            }
        }

        std::thread::sleep(Duration::from_millis(50));
    };

    let deadline = Instant::now() + DRAIN_GRACE;
    for _ in 0..2 {
        let left = deadline.saturating_duration_since(Instant::now());
        match done_rx.recv_timeout(left) {
            Ok(res) => res?,
            Err(_) => {
                warn!(
                    "output pipes still open {:?} after exit; keeping partial output",
                    DRAIN_GRACE
                );
                break;
            }
        }
    }

    Ok((status, take_buf(&stdout), take_buf(&stderr), timed_out))
}

type SharedBuf = Arc<Mutex<Vec<u8>>>;

fn spawn_drain<R: Read + Send + 'static>(
    name: &'static str,
    reader: Option<R>,
    done: mpsc::Sender<Result<()>>,
) -> SharedBuf {
    let buf: SharedBuf = Arc::default();
    let sink = Arc::clone(&buf);
    std::thread::spawn(move || {
        let res = (|| -> Result<()> {
            let Some(mut reader) = reader else {
                return Ok(());
            };
            let mut chunk = [0u8; 8192];
            loop {
                let n = reader
                    .read(&mut chunk)
                    .with_context(|| format!("read {name}"))?;
                if n == 0 {
                    return Ok(());
                }
                sink.lock()
                    .map_err(|_| anyhow!("{name} buffer poisoned"))?
                    .extend_from_slice(&chunk[..n]);
            }
        })();
        let _ = done.send(res);
    });
    buf
}

fn take_buf(buf: &SharedBuf) -> Vec<u8> {
    match buf.lock() {
        Ok(mut guard) => std::mem::take(&mut *guard),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    }
}

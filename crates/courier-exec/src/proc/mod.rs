//! [`Forwarder`] backed by an external forwarding tool.
//!
//! The tool's stdout and stderr are scanned for progress markers; the child
//! is terminated when the batch is cancelled.

use std::{io, path::PathBuf, process::Stdio, time::Duration};

use async_trait::async_trait;
use courier_core::ForwardMode;
use courier_model::Target;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    error::ExecError,
    forward::Forwarder,
    progress::{ProgressSink, ProgressWriter, pump},
    util::{cmd_program, kill_graceful},
};

/// Placeholder replaced by the task descriptor.
pub const DESCRIPTOR_PLACEHOLDER: &str = "{descriptor}";
/// Placeholder replaced by the forward target.
pub const TARGET_PLACEHOLDER: &str = "{target}";
/// Placeholder replaced by the forward mode (`clone` or `direct`).
pub const MODE_PLACEHOLDER: &str = "{mode}";

#[derive(Clone, Debug)]
pub struct ProcConfig {
    pub program: String,
    /// Arguments; `{descriptor}` and `{mode}` are substituted.
    pub args: Vec<String>,
    /// Appended only when a target is known; `{target}` is substituted.
    pub target_args: Vec<String>,
    /// Used when the batch carries no target override.
    pub default_target: Option<Target>,
    pub mode: ForwardMode,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Echo the tool's output to our stderr.
    pub echo: bool,
    /// Return an error if exit code != 0
    pub fail_on_non_zero: bool,
    /// Time between SIGTERM and SIGKILL on cancellation.
    pub kill_grace: Duration,
}

impl Default for ProcConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: vec![
                "forward".to_string(),
                "--from".to_string(),
                DESCRIPTOR_PLACEHOLDER.to_string(),
                "--mode".to_string(),
                MODE_PLACEHOLDER.to_string(),
            ],
            target_args: vec!["--to".to_string(), TARGET_PLACEHOLDER.to_string()],
            default_target: None,
            mode: ForwardMode::default(),
            env: Vec::new(),
            cwd: None,
            echo: false,
            fail_on_non_zero: true,
            kill_grace: Duration::from_secs(3),
        }
    }
}

impl ProcConfig {
    /// Command line for one item.
    pub fn render_args(&self, descriptor: &str, target: Option<Target>) -> Vec<String> {
        let mut out: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                a.replace(DESCRIPTOR_PLACEHOLDER, descriptor)
                    .replace(MODE_PLACEHOLDER, self.mode.as_str())
            })
            .collect();
        if let Some(target) = target.or(self.default_target) {
            let target = target.to_string();
            out.extend(
                self.target_args
                    .iter()
                    .map(|a| a.replace(TARGET_PLACEHOLDER, &target)),
            );
        }
        out
    }
}

pub struct ProcForwarder {
    cfg: ProcConfig,
}

impl ProcForwarder {
    pub fn new(cfg: ProcConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ProcConfig {
        &self.cfg
    }
}

#[async_trait]
impl Forwarder for ProcForwarder {
    async fn forward(
        &self,
        cancel: &CancellationToken,
        descriptor: &str,
        target: Option<Target>,
        progress: &dyn ProgressSink,
    ) -> Result<(), ExecError> {
        let cfg = &self.cfg;
        if cfg.program.is_empty() {
            return Err(ExecError::MissingProgram);
        }

        let args = cfg.render_args(descriptor, target);
        trace!(target: "courier.exec.proc", program = %cfg.program, args = ?args, "spawn");

        let mut cmd = cmd_program(&cfg.program, &args);
        if let Some(cwd) = &cfg.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &cfg.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| ExecError::Spawn(e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::Io("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecError::Io("stderr not captured".into()))?;

        let mut out = ProgressWriter::new(echo_target(cfg.echo), progress);
        let mut err = ProgressWriter::new(echo_target(cfg.echo), progress);

        tokio::select! {
            (out_res, err_res, status) = async {
                tokio::join!(pump(stdout, &mut out), pump(stderr, &mut err), child.wait())
            } => {
                for res in [out_res, err_res] {
                    if let Err(e) = res {
                        warn!(target: "courier.exec.proc", error = %e, "output stream failed");
                    }
                }
                let status = status?;
                if !status.success() && cfg.fail_on_non_zero {
                    return match status.code() {
                        Some(code) => Err(ExecError::NonZeroExit { code }),
                        None => Err(ExecError::KilledBySignal),
                    };
                }
                debug!(target: "courier.exec.proc", descriptor, "exit success");
                Ok(())
            }
            _ = cancel.cancelled() => {
                debug!(target: "courier.exec.proc", descriptor, "cancelled; killing child");
                if let Err(e) = kill_graceful(&mut child, cfg.kill_grace).await {
                    warn!(target: "courier.exec.proc", error = %e, "failed to kill child");
                }
                Err(ExecError::Cancelled)
            }
        }
    }
}

fn echo_target(echo: bool) -> Box<dyn io::Write + Send> {
    if echo {
        Box::new(io::stderr())
    } else {
        Box::new(io::sink())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<u32>>);

    impl ProgressSink for Collect {
        fn report(&self, percent: u32, _line: &str) {
            self.0.lock().push(percent);
        }
    }

    fn sh(script: &str) -> ProcForwarder {
        ProcForwarder::new(ProcConfig {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            target_args: Vec::new(),
            ..ProcConfig::default()
        })
    }

    #[test]
    fn args_substitute_placeholders() {
        let cfg = ProcConfig {
            program: "tdl".into(),
            default_target: Some(-5),
            ..ProcConfig::default()
        };
        assert_eq!(
            cfg.render_args("https://t.me/c/1/2", None),
            vec!["forward", "--from", "https://t.me/c/1/2", "--mode", "clone", "--to", "-5"]
        );
        assert_eq!(
            cfg.render_args("x", Some(9)),
            vec!["forward", "--from", "x", "--mode", "clone", "--to", "9"]
        );

        let no_target = ProcConfig::default();
        assert_eq!(
            no_target.render_args("x", None),
            vec!["forward", "--from", "x", "--mode", "clone"]
        );
    }

    #[test]
    fn direct_mode_reaches_command_line() {
        let cfg = ProcConfig {
            mode: ForwardMode::Direct,
            ..ProcConfig::default()
        };
        assert_eq!(
            cfg.render_args("x", Some(9)),
            vec!["forward", "--from", "x", "--mode", "direct", "--to", "9"]
        );
    }

    #[tokio::test]
    async fn reports_progress_from_both_streams() {
        let fwd = sh("printf '(a) 12.5%%\\n'; printf '(b) 99.6%%\\n' 1>&2");
        let sink = Collect::default();
        let token = CancellationToken::new();

        fwd.forward(&token, "x", None, &sink).await.unwrap();

        let mut seen = sink.0.lock().clone();
        seen.sort();
        assert_eq!(seen, vec![13, 100]);
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let fwd = sh("exit 3");
        let sink = Collect::default();
        let err = fwd
            .forward(&CancellationToken::new(), "x", None, &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::NonZeroExit { code: 3 }));
    }

    #[tokio::test]
    async fn cancellation_kills_child() {
        let fwd = sh("sleep 30");
        let sink = Collect::default();
        let token = CancellationToken::new();

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = fwd.forward(&token, "x", None, &sink).await.unwrap_err();
        assert!(matches!(err, ExecError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_program_is_rejected() {
        let fwd = ProcForwarder::new(ProcConfig::default());
        let sink = Collect::default();
        let err = fwd
            .forward(&CancellationToken::new(), "x", None, &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::MissingProgram));
    }
}

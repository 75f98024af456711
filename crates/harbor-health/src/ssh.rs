//! OpenSSH transport for the load-balancer probes.
//!
//! A session is one multiplexed control master (`ssh -M`). Opening the
//! session authenticates once; each command then rides the master's socket,
//! and closing the session asks the master to exit. The master is started
//! with a `ControlPersist` idle limit so a session that is never closed
//! (for instance, a cancelled run) still goes away on its own.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use harbor_core::config::SshConfig;
use harbor_core::NodeAddress;

use crate::command::{CommandConnector, CommandSession};
use crate::database::BoxFuture;
use crate::error::{ProbeError, ProbeResult};

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct SshConnector {
    program: String,
    config: SshConfig,
}

impl SshConnector {
    pub fn new(config: SshConfig) -> Self {
        Self {
            program: "ssh".to_string(),
            config,
        }
    }

    /// Use a different ssh binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn destination(&self, address: &NodeAddress) -> String {
        format!("{}@{}", self.config.user, address)
    }

    /// Options shared by the master and every client invocation.
    fn common_args(&self, control_path: &Path, timeout: Duration) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            control_path.display().to_string(),
            "-p".to_string(),
            self.config.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", timeout.as_secs().max(1)),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];
        if let Some(identity) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        for option in &self.config.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args
    }

    fn master_args(&self, control_path: &Path, log_path: &Path, timeout: Duration) -> Vec<String> {
        let persist = (timeout.as_secs().max(1) * 6).to_string();
        let mut args = vec![
            "-M".to_string(),
            "-N".to_string(),
            "-E".to_string(),
            log_path.display().to_string(),
            "-o".to_string(),
            format!("ControlPersist={persist}"),
        ];
        args.extend(self.common_args(control_path, timeout));
        args
    }
}

impl CommandConnector for SshConnector {
    fn open<'a>(
        &'a self,
        address: &'a NodeAddress,
        timeout: Duration,
    ) -> BoxFuture<'a, ProbeResult<Box<dyn CommandSession>>> {
        Box::pin(async move {
            let (control_path, log_path) = session_paths();
            let destination = self.destination(address);

            debug!(%address, control = %control_path.display(), "opening ssh control master");
            let status = Command::new(&self.program)
                .args(self.master_args(&control_path, &log_path, timeout))
                .arg(&destination)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status()
                .await
                .map_err(|e| ProbeError::Connect(format!("failed to run {}: {e}", self.program)))?;

            let log = tokio::fs::read_to_string(&log_path).await.unwrap_or_default();
            let _ = tokio::fs::remove_file(&log_path).await;

            if !status.success() {
                return Err(classify_failure(&log, &status.to_string()));
            }

            Ok(Box::new(SshSession {
                program: self.program.clone(),
                destination,
                common_args: self.common_args(&control_path, timeout),
                control_path,
                closed: false,
            }) as Box<dyn CommandSession>)
        })
    }
}

pub struct SshSession {
    program: String,
    destination: String,
    common_args: Vec<String>,
    control_path: PathBuf,
    closed: bool,
}

impl SshSession {
    fn exit_args(&self) -> Vec<String> {
        vec![
            "-S".to_string(),
            self.control_path.display().to_string(),
            "-O".to_string(),
            "exit".to_string(),
            self.destination.clone(),
        ]
    }
}

impl CommandSession for SshSession {
    fn exec<'a>(&'a mut self, command: &'a str) -> BoxFuture<'a, ProbeResult<String>> {
        Box::pin(async move {
            let output = Command::new(&self.program)
                .args(&self.common_args)
                .arg(&self.destination)
                .arg("--")
                .arg(command)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| ProbeError::Command {
                    command: command.to_string(),
                    reason: e.to_string(),
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let reason = if stderr.is_empty() {
                    output.status.to_string()
                } else {
                    stderr
                };
                return Err(ProbeError::Command {
                    command: command.to_string(),
                    reason,
                });
            }
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        })
    }

    fn close(mut self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let result = Command::new(&self.program)
                .args(self.exit_args())
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if let Err(e) = result {
                debug!(error = %e, destination = %self.destination, "ssh control master exit failed");
            }
            let _ = tokio::fs::remove_file(&self.control_path).await;
            self.closed = true;
        })
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Not closed through `close` (cancelled run or abandoned release).
        if request_exit(self.program.clone(), self.exit_args()).is_none() {
            debug!(destination = %self.destination, "no runtime to stop ssh control master, leaving it to ControlPersist");
        }
    }
}

/// Ask a control master to exit from a background task that also reaps
/// the `ssh -O exit` child. Returns `None` outside a Tokio runtime.
fn request_exit(program: String, args: Vec<String>) -> Option<tokio::task::JoinHandle<()>> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    Some(handle.spawn(async move {
        let result = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = result {
            debug!(error = %e, "ssh control master exit failed");
        }
    }))
}

fn session_paths() -> (PathBuf, PathBuf) {
    let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
    let stem = format!("harbor-ssh-{}-{seq}", std::process::id());
    let dir = std::env::temp_dir();
    (dir.join(format!("{stem}.sock")), dir.join(format!("{stem}.log")))
}

fn classify_failure(log: &str, status: &str) -> ProbeError {
    let message = log
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map_or_else(|| format!("ssh exited with {status}"), str::to_string);

    if log.contains("Permission denied") || log.contains("Host key verification failed") {
        ProbeError::Auth(message)
    } else {
        ProbeError::Connect(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector() -> SshConnector {
        SshConnector::new(SshConfig {
            user: "ops".to_string(),
            identity_file: Some(PathBuf::from("/keys/id_lvs")),
            port: 2222,
            options: vec!["UserKnownHostsFile=/dev/null".to_string()],
        })
    }

    #[test]
    fn destination_includes_user() {
        assert_eq!(connector().destination(&"10.0.0.11".into()), "ops@10.0.0.11");
    }

    #[test]
    fn common_args_carry_config() {
        let args = connector().common_args(Path::new("/tmp/x.sock"), Duration::from_secs(5));
        let joined = args.join(" ");
        assert!(joined.contains("-S /tmp/x.sock"));
        assert!(joined.contains("-p 2222"));
        assert!(joined.contains("BatchMode=yes"));
        assert!(joined.contains("ConnectTimeout=5"));
        assert!(joined.contains("-i /keys/id_lvs"));
        assert!(joined.contains("-o UserKnownHostsFile=/dev/null"));
    }

    #[test]
    fn sub_second_timeout_rounds_up() {
        let args = connector().common_args(Path::new("/tmp/x.sock"), Duration::from_millis(200));
        assert!(args.contains(&"ConnectTimeout=1".to_string()));
    }

    #[test]
    fn master_args_start_a_persisting_master() {
        let args = connector().master_args(
            Path::new("/tmp/x.sock"),
            Path::new("/tmp/x.log"),
            Duration::from_secs(5),
        );
        assert_eq!(&args[..2], &["-M".to_string(), "-N".to_string()]);
        assert!(args.contains(&"ControlPersist=30".to_string()));
        assert!(args.contains(&"/tmp/x.log".to_string()));
    }

    #[test]
    fn session_paths_are_unique() {
        let (a, _) = session_paths();
        let (b, _) = session_paths();
        assert_ne!(a, b);
        assert!(a.to_string_lossy().ends_with(".sock"));
    }

    #[test]
    fn classify_auth_failure() {
        let log = "ops@10.0.0.11: Permission denied (publickey).\n";
        let err = classify_failure(log, "exit status: 255");
        assert!(matches!(err, ProbeError::Auth(ref m) if m.contains("publickey")));
    }

    #[test]
    fn classify_network_failure() {
        let log = "ssh: connect to host 10.0.0.11 port 22: Connection timed out\n";
        assert!(matches!(classify_failure(log, "exit status: 255"), ProbeError::Connect(_)));
    }

    #[test]
    fn classify_empty_log_uses_status() {
        let err = classify_failure("", "exit status: 255");
        assert_eq!(err.to_string(), "connection failed: ssh exited with exit status: 255");
    }

    fn unclosed_session(program: &str) -> SshSession {
        SshSession {
            program: program.to_string(),
            destination: "ops@10.0.0.11".to_string(),
            common_args: Vec::new(),
            control_path: PathBuf::from("/tmp/harbor-ssh-test.sock"),
            closed: false,
        }
    }

    #[tokio::test]
    async fn exit_request_is_awaited_in_background() {
        let task = request_exit("true".to_string(), vec!["-O".to_string(), "exit".to_string()])
            .expect("inside a runtime");
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("exit request finishes")
            .unwrap();

        let task = request_exit("/nonexistent/harbor-ssh".to_string(), Vec::new()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn dropping_unclosed_session_inside_runtime() {
        drop(unclosed_session("/nonexistent/harbor-ssh"));
        tokio::task::yield_now().await;
    }

    #[test]
    fn dropping_unclosed_session_outside_runtime() {
        assert!(request_exit("true".to_string(), Vec::new()).is_none());
        drop(unclosed_session("/nonexistent/harbor-ssh"));
    }

    #[tokio::test]
    async fn missing_ssh_binary_is_connect_error() {
        let connector = connector().with_program("/nonexistent/harbor-ssh");
        let err = match connector
            .open(&"10.0.0.11".into(), Duration::from_secs(1))
            .await
        {
            Ok(_) => panic!("expected failure"),
            Err(e) => e,
        };
        assert!(matches!(err, ProbeError::Connect(_)));
    }
}

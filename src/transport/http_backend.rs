//! The production [`Transport`]: one `git http-backend` process per request.
//!
//! The child inherits the gateway's environment and receives the CGI
//! meta-variables (`GIT_PROJECT_ROOT`, `PATH_INFO`, `REQUEST_METHOD`, ...)
//! as an overlay.  stdin feeding and stdout/stderr draining run concurrently
//! so that payloads larger than the OS pipe buffer cannot deadlock.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::{BackendInvocation, BackendOutput, Transport, TransportError};

pub struct GitHttpBackend {
    /// Argv of the backend, e.g. `["git", "http-backend"]`.  Never empty;
    /// config validation enforces that.
    command: Vec<String>,
    /// Resolved absolute repository root, exported as `GIT_PROJECT_ROOT`.
    repository_root: PathBuf,
    /// Optional deadline for the whole invocation.
    timeout: Option<Duration>,
}

impl GitHttpBackend {
    pub fn new(command: Vec<String>, repository_root: PathBuf, timeout: Option<Duration>) -> Self {
        Self {
            command,
            repository_root,
            timeout,
        }
    }

    fn build_command(&self, invocation: &BackendInvocation) -> Command {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]);

        // The child inherits the gateway environment; the CGI overlay takes
        // precedence over same-named inherited variables.
        cmd.env("GIT_HTTP_EXPORT_ALL", "");
        cmd.env("GIT_PROJECT_ROOT", &self.repository_root);
        cmd.env("PATH_INFO", &invocation.path_info);
        cmd.env("REQUEST_METHOD", &invocation.method);
        cmd.env("QUERY_STRING", &invocation.query_string);
        match &invocation.content_type {
            Some(content_type) => {
                cmd.env("CONTENT_TYPE", content_type);
            }
            None => {
                cmd.env_remove("CONTENT_TYPE");
            }
        }
        if invocation.method == "POST" {
            cmd.env("CONTENT_LENGTH", invocation.body.len().to_string());
        }
        if let Some(user) = &invocation.remote_user {
            cmd.env("REMOTE_USER", user);
        }
        if let Some(addr) = &invocation.remote_addr {
            cmd.env("REMOTE_ADDR", addr);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // If the client aborts the connection the handler future is dropped;
        // this reaps the child instead of leaking it.
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait::async_trait]
impl Transport for GitHttpBackend {
    #[instrument(
        skip(self, invocation),
        fields(method = %invocation.method, path = %invocation.path_info)
    )]
    async fn invoke(
        &self,
        invocation: BackendInvocation,
    ) -> Result<BackendOutput, TransportError> {
        let mut command = self.build_command(&invocation);

        debug!(program = %self.command[0], "spawning backend");
        let mut child = command.spawn().map_err(TransportError::Spawn)?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Io(io::Error::other("stdout pipe was not captured")))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransportError::Io(io::Error::other("stderr pipe was not captured")))?;

        let write_body = invocation.method == "POST";
        let body = invocation.body;

        let exchange = async {
            // Feed stdin and drain stdout/stderr concurrently: the backend may
            // block writing its stdout while we are still writing its stdin.
            let feed = async {
                if let Some(mut stdin) = stdin {
                    if write_body {
                        if let Err(e) = stdin.write_all(&body).await {
                            // The backend exited before reading the whole body;
                            // its exit status carries the real diagnosis.
                            debug!(error = %e, "backend closed stdin early");
                        }
                    }
                    // Dropping the handle closes the pipe; the backend sees EOF.
                }
            };
            let drain_stdout = async {
                let mut buf = Vec::new();
                stdout.read_to_end(&mut buf).await.map(|_| buf)
            };
            let drain_stderr = async {
                let mut buf = Vec::new();
                stderr.read_to_end(&mut buf).await.map(|_| buf)
            };

            let ((), out, err) = tokio::join!(feed, drain_stdout, drain_stderr);
            let out = out.map_err(TransportError::Io)?;
            let err = err.map_err(TransportError::Io)?;

            let status = child.wait().await.map_err(TransportError::Io)?;
            if !status.success() {
                debug!(%status, "backend exited non-zero");
            }

            Ok(BackendOutput {
                success: status.success(),
                stdout: Bytes::from(out),
                stderr: String::from_utf8_lossy(&err).into_owned(),
            })
        };

        if let Some(limit) = self.timeout {
            // Bind first so the borrow of `child` held by the exchange future
            // ends before the kill below.
            let result = tokio::time::timeout(limit, exchange).await;
            match result {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs_f64(), "backend exceeded deadline, killing");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill timed-out backend");
                    }
                    Err(TransportError::Timeout)
                }
            }
        } else {
            exchange.await
        }
    }
}

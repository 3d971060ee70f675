//! `ssh`-spawn transport: wraps a child `ssh` process's stdio.
//! Address lookup is skipped -- the child resolves the hostname itself.

use std::process::Stdio;

use rexec_core::EngineError;
use tokio::process::Command;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use crate::request::{OpenRequest, OpenedConnection};
use crate::Transport;

#[derive(Debug, Clone)]
pub struct SshTransport {
    /// Path to the `ssh` binary, overridable for tests.
    pub ssh_path: String,
}

impl Default for SshTransport {
    fn default() -> Self {
        Self {
            ssh_path: "ssh".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Transport for SshTransport {
    async fn open(
        &self,
        req: OpenRequest,
        cancel: &CancellationToken,
    ) -> Result<OpenedConnection, EngineError> {
        let spawn = async {
            let mut cmd = Command::new(&self.ssh_path);
            cmd.arg("-l")
                .arg(&req.remote_user)
                .arg("-o")
                .arg("BatchMode=yes")
                .arg(&req.host)
                .arg(&req.command)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            cmd.spawn()
        };

        let mut child = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(EngineError::ConnectFailed {
                    host: req.host.clone(),
                    reason: "interrupted".to_string(),
                });
            }
            spawned = spawn => spawned.map_err(|e| EngineError::ConnectFailed {
                host: req.host.clone(),
                reason: e.to_string(),
            })?,
        };

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        // Keep the child alive for the life of the streams by leaking
        // its handle into a background reaper; the worker only cares
        // about the byte streams, matching the fd-oriented contract
        // the other transports present.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        if req.want_stderr {
            Ok(OpenedConnection {
                reader: Box::new(stdout),
                writer: Box::new(tokio::io::sink()),
                stderr: Some(Box::new(stderr)),
                signal_fd: None,
            })
        } else {
            // No separate-stderr requested: merge stdout and stderr
            // into one logical stream, the way rcmd(3) merges them at
            // the remote end when `fd2p` is NULL.
            use tokio_stream::StreamExt as _;
            let out_stream = tokio_util::io::ReaderStream::new(stdout);
            let err_stream = tokio_util::io::ReaderStream::new(stderr);
            let merged = out_stream.merge(err_stream);
            let reader = StreamReader::new(merged);
            Ok(OpenedConnection {
                reader: Box::new(reader),
                writer: Box::new(tokio::io::sink()),
                stderr: None,
                signal_fd: None,
            })
        }
    }

    fn signal(&self, _conn: &OpenedConnection, _signum: i32) {
        // ssh has no side control channel to forward a signal over.
    }

    fn skips_resolution(&self) -> bool {
        true
    }
}

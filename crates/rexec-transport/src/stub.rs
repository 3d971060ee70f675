//! In-memory transport used only by tests: drives a worker through
//! connect and streaming without touching the network, so scheduler
//! and watchdog behavior can be exercised deterministically.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use rexec_core::EngineError;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::request::{OpenRequest, OpenedConnection};
use crate::Transport;

/// What a stubbed host does once `open` is called.
#[derive(Debug, Clone)]
pub enum Scenario {
    /// Wait `connect_delay`, then succeed and stream `lines` (each
    /// pushed as one write, newline-terminated if not already) before
    /// closing the stream.
    ConnectThenEmit {
        connect_delay: Duration,
        lines: Vec<String>,
    },
    /// Wait `delay`, then fail to connect with `reason`.
    FailToConnect { delay: Duration, reason: String },
    /// Connect immediately, emit `lines`, then leave the stream open
    /// forever without closing it -- exercises the command-timeout
    /// path since end-of-stream never arrives.
    EmitThenHang { lines: Vec<String> },
}

/// Transport driven entirely by a per-host table of [`Scenario`]s,
/// keyed by the host name in [`OpenRequest::host`].
#[derive(Debug, Default)]
pub struct StubTransport {
    scenarios: Mutex<HashMap<String, Scenario>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, host: impl Into<String>, scenario: Scenario) {
        self.scenarios.lock().unwrap().insert(host.into(), scenario);
    }
}

#[async_trait::async_trait]
impl Transport for StubTransport {
    async fn open(
        &self,
        req: OpenRequest,
        cancel: &CancellationToken,
    ) -> Result<OpenedConnection, EngineError> {
        let scenario = self
            .scenarios
            .lock()
            .unwrap()
            .get(&req.host)
            .cloned()
            .unwrap_or(Scenario::ConnectThenEmit {
                connect_delay: Duration::ZERO,
                lines: Vec::new(),
            });

        match scenario {
            Scenario::FailToConnect { delay, reason } => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(EngineError::ConnectFailed {
                        host: req.host.clone(),
                        reason: "interrupted".to_string(),
                    }),
                    _ = tokio::time::sleep(delay) => Err(EngineError::ConnectFailed {
                        host: req.host,
                        reason,
                    }),
                }
            }
            Scenario::ConnectThenEmit { connect_delay, lines } => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(EngineError::ConnectFailed {
                            host: req.host.clone(),
                            reason: "interrupted".to_string(),
                        });
                    }
                    _ = tokio::time::sleep(connect_delay) => {}
                }
                Ok(spawn_emitter(lines, true))
            }
            Scenario::EmitThenHang { lines } => Ok(spawn_emitter(lines, false)),
        }
    }

    fn signal(&self, _conn: &OpenedConnection, _signum: i32) {}
}

fn spawn_emitter(lines: Vec<String>, close_when_done: bool) -> OpenedConnection {
    let (reader, mut writer) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        for line in lines {
            let mut bytes = line.into_bytes();
            if bytes.last() != Some(&b'\n') {
                bytes.push(b'\n');
            }
            if writer.write_all(&bytes).await.is_err() {
                return;
            }
        }
        if close_when_done {
            let _ = writer.shutdown().await;
        } else {
            // Leak the writer half so the stream never reaches EOF.
            std::mem::forget(writer);
        }
    });
    OpenedConnection {
        reader: Box::new(reader),
        writer: Box::new(tokio::io::sink()),
        stderr: None,
        signal_fd: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn connect_then_emit_streams_lines_then_closes() {
        let transport = StubTransport::new();
        transport.set(
            "h1",
            Scenario::ConnectThenEmit {
                connect_delay: Duration::ZERO,
                lines: vec!["hi".to_string()],
            },
        );
        let req = OpenRequest {
            host: "h1".to_string(),
            addr: None,
            local_user: "me".to_string(),
            remote_user: "me".to_string(),
            command: "echo hi".to_string(),
            node_id: 0,
            want_stderr: false,
        };
        let mut conn = transport.open(req, &CancellationToken::new()).await.unwrap();
        let mut out = String::new();
        conn.reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hi\n");
    }

    #[tokio::test]
    async fn fail_to_connect_surfaces_reason() {
        let transport = StubTransport::new();
        transport.set(
            "h1",
            Scenario::FailToConnect {
                delay: Duration::ZERO,
                reason: "refused".to_string(),
            },
        );
        let req = OpenRequest {
            host: "h1".to_string(),
            addr: None,
            local_user: "me".to_string(),
            remote_user: "me".to_string(),
            command: "echo hi".to_string(),
            node_id: 0,
            want_stderr: false,
        };
        let err = transport.open(req, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::ConnectFailed { reason, .. } if reason == "refused"));
    }

    #[tokio::test]
    async fn cancellation_during_connect_delay_is_observed() {
        let transport = StubTransport::new();
        transport.set(
            "h1",
            Scenario::ConnectThenEmit {
                connect_delay: Duration::from_secs(60),
                lines: vec![],
            },
        );
        let req = OpenRequest {
            host: "h1".to_string(),
            addr: None,
            local_user: "me".to_string(),
            remote_user: "me".to_string(),
            command: "sleep 60".to_string(),
            node_id: 0,
            want_stderr: false,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = transport.open(req, &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::ConnectFailed { reason, .. } if reason == "interrupted"));
    }
}

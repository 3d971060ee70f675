//! Multiplexes a worker's stdout (and, in separate-stderr mode,
//! stderr) until both channels close, tagging and forwarding each line
//! to the shared output sink and extracting the trailing status
//! sentinel from stdout.

use rexec_core::{sentinel, Phase, WorkerSlot};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::output::{label, OutputSink};

pub async fn run<O, E>(
    mut out_reader: O,
    mut err_reader: Option<E>,
    host: &str,
    labels: bool,
    sink: &OutputSink,
    token: &CancellationToken,
    abort_token: &CancellationToken,
    slot: &WorkerSlot,
) where
    O: AsyncBufRead + Unpin,
    E: AsyncBufRead + Unpin,
{
    let mut out_done = false;
    let mut err_done = err_reader.is_none();
    let mut out_buf = String::new();
    let mut err_buf = String::new();

    loop {
        if out_done && err_done {
            return;
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let message = if abort_token.is_cancelled() {
                    "interrupted"
                } else {
                    "command timeout"
                };
                tracing::warn!(host, message, "worker cancelled mid-stream");
                sink.emit_stderr(&format!("{host}: {message}\n"));
                slot.advance(Phase::Failed);
                return;
            }
            res = out_reader.read_line(&mut out_buf), if !out_done => {
                match res {
                    Ok(0) => out_done = true,
                    Ok(_) => {
                        let (text, rc) = sentinel::extract_rc(&out_buf);
                        if let Some(rc) = rc {
                            slot.set_remote_rc(rc);
                        }
                        sink.emit_stdout(&label(host, &text, labels));
                        out_buf.clear();
                    }
                    Err(e) => {
                        tracing::warn!(host, error = %e, "stdout read error");
                        sink.emit_stderr(&format!("{host}: read error: {e}\n"));
                        out_done = true;
                    }
                }
            }
            res = read_line_or_pending(err_reader.as_mut(), &mut err_buf), if !err_done => {
                match res {
                    Ok(0) => err_done = true,
                    Ok(_) => {
                        sink.emit_stderr(&label(host, &err_buf, labels));
                        err_buf.clear();
                    }
                    Err(e) => {
                        tracing::warn!(host, error = %e, "stderr read error");
                        sink.emit_stderr(&format!("{host}: read error: {e}\n"));
                        err_done = true;
                    }
                }
            }
        }
    }
}

async fn read_line_or_pending<E: AsyncBufRead + Unpin>(
    reader: Option<&mut E>,
    buf: &mut String,
) -> std::io::Result<usize> {
    match reader {
        Some(r) => r.read_line(buf).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexec_core::{RcmdKind, WorkerSlot};
    use std::sync::Arc;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn reads_until_eof_and_extracts_sentinel() {
        let data = format!("hi\n{}{}\n", sentinel::MAGIC, 7);
        let reader = BufReader::new(std::io::Cursor::new(data));
        let sink = OutputSink::new();
        let token = CancellationToken::new();
        let abort = CancellationToken::new();
        let slot = WorkerSlot::new("h1", 0, RcmdKind::Bsd);
        slot.advance(Phase::Connecting);
        slot.advance(Phase::Streaming);

        run::<_, BufReader<std::io::Cursor<Vec<u8>>>>(reader, None, "h1", true, &sink, &token, &abort, &slot).await;

        assert_eq!(slot.remote_rc(), 7);
        assert_ne!(slot.phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn cancellation_marks_failed_with_timeout_reason() {
        let (reader, _writer) = tokio::io::duplex(16);
        let reader = BufReader::new(reader);
        let sink = OutputSink::new();
        let token = CancellationToken::new();
        let abort = CancellationToken::new();
        let slot = Arc::new(WorkerSlot::new("h1", 0, RcmdKind::Bsd));
        slot.advance(Phase::Connecting);
        slot.advance(Phase::Streaming);

        token.cancel();
        run::<_, BufReader<tokio::io::DuplexStream>>(reader, None, "h1", true, &sink, &token, &abort, &slot).await;

        assert_eq!(slot.phase(), Phase::Failed);
    }
}

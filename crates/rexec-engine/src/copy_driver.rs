//! Bridges a worker's opened connection into the copy sub-protocol
//! driver, translating a protocol failure into the worker's FAILED
//! outcome and a diagnostic line.

use rexec_copy::CopyOptions;
use rexec_core::{Phase, WorkerSlot};
use rexec_fileset::ExpandedEntry;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::output::OutputSink;

pub async fn run<R, W>(
    reader: &mut R,
    writer: &mut W,
    host: &str,
    entries: &[ExpandedEntry],
    opts: CopyOptions,
    sink: &OutputSink,
    slot: &WorkerSlot,
    token: &CancellationToken,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(e) = rexec_copy::run(reader, writer, host, entries, opts, token).await {
        tracing::warn!(host, error = %e, "copy protocol failure");
        sink.emit_stderr(&format!("{host}: {e}\n"));
        slot.advance(Phase::Failed);
    }
}

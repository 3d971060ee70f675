//! Serializes the operator's interrupt into "enumerate-once,
//! abort-on-second": only this task ever observes `SIGINT`/`SIGTERM`;
//! workers never register their own signal handlers, they only watch
//! the [`Fleet`]'s abort token.

use std::time::{Duration, Instant};

use crate::fleet::Fleet;
use crate::output::OutputSink;
use rexec_core::Phase;

const TERM_SIGNAL: i32 = libc::SIGTERM;

pub async fn run(
    fleet: Fleet,
    sink: std::sync::Arc<OutputSink>,
    batch: bool,
    window: Duration,
    connect_timeout: Duration,
    command_timeout: Duration,
    shutdown: tokio_util::sync::CancellationToken,
) {
    let mut first_interrupt_at: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = wait_for_interrupt() => {
                if batch {
                    abort(&fleet, &sink);
                    return;
                }
                match first_interrupt_at {
                    Some(t) if t.elapsed() <= window => {
                        abort(&fleet, &sink);
                        return;
                    }
                    _ => {
                        enumerate(&fleet, &sink, window, connect_timeout, command_timeout);
                        first_interrupt_at = Some(Instant::now());
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_interrupt() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() {
    let _ = tokio::signal::ctrl_c().await;
}

fn enumerate(fleet: &Fleet, sink: &OutputSink, window: Duration, connect_timeout: Duration, command_timeout: Duration) {
    sink.emit_stderr(&format!(
        "interrupt (one more within {} sec to abort)\n",
        window.as_secs()
    ));
    for status in fleet.table.enumerate(connect_timeout, command_timeout) {
        let deadline = status
            .deadline_in
            .map(|s| format!(", {s}s remaining"))
            .unwrap_or_default();
        sink.emit_stderr(&format!("  {}: {}{}\n", status.host, status.phase, deadline));
    }
}

fn abort(fleet: &Fleet, sink: &OutputSink) {
    sink.emit_stderr("interrupt: aborting\n");
    for slot in fleet.table.iter() {
        if slot.phase() == Phase::Streaming {
            if let Some(fd) = fleet.signal_fd(slot.node_id) {
                rexec_transport::forward_oob_signal(fd, TERM_SIGNAL);
            }
        }
    }
    fleet.abort_all();
}

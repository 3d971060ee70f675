//! Per-worker lifecycle: connect, stream (command mode) or speak the
//! copy protocol (copy mode), then settle into a terminal phase.

use std::sync::Arc;

use rexec_copy::CopyOptions;
use rexec_core::Phase;
use rexec_fileset::ExpandedEntry;
use rexec_transport::{OpenRequest, Transport};
use tokio::io::BufReader;

use crate::fleet::Fleet;
use crate::output::OutputSink;
use crate::{command_driver, copy_driver};

/// What a worker actually does once connected, fully resolved by the
/// scheduler (copy mode's remote command and pre-expanded file list
/// are the same for every host, computed once).
#[derive(Clone)]
pub enum ResolvedWorkload {
    Command {
        command: String,
        labels: bool,
        separate_stderr: bool,
    },
    Copy {
        command: String,
        entries: Arc<Vec<ExpandedEntry>>,
        opts: CopyOptions,
    },
}

/// Drive one worker end to end. Returns `true` when this worker's
/// failure should abort the whole job (a gang transport coupling every
/// peer together).
pub async fn run(
    transport: Arc<dyn Transport>,
    fleet: Fleet,
    node_id: usize,
    local_user: String,
    remote_user: String,
    workload: ResolvedWorkload,
    sink: Arc<OutputSink>,
) -> bool {
    let slot = fleet.table.get(node_id).expect("node_id in range").clone();
    let base = fleet.table.base();
    let token = fleet.token(node_id).clone();
    let host = slot.host.clone();

    slot.mark_start(base);
    slot.advance(Phase::Connecting);

    let addr = if slot.rcmd_kind.skips_resolution() {
        None
    } else {
        match rexec_transport::resolve::resolve_ipv4(&host).await {
            Ok(addr) => Some(addr),
            Err(e) => return fail(&slot, &sink, &host, base, &e.to_string()),
        }
    };

    let (command, want_stderr) = match &workload {
        ResolvedWorkload::Command {
            command,
            separate_stderr,
            ..
        } => (command.clone(), *separate_stderr),
        ResolvedWorkload::Copy { command, .. } => (command.clone(), false),
    };

    let req = OpenRequest {
        host: host.clone(),
        addr,
        local_user,
        remote_user,
        command,
        node_id,
        want_stderr,
    };

    let opened = match transport.open(req, &token).await {
        Ok(c) => c,
        Err(e) => return fail(&slot, &sink, &host, base, &e.to_string()),
    };

    if let Some(fd) = opened.signal_fd {
        fleet.set_signal_fd(node_id, fd);
    }

    slot.mark_connect(base);
    slot.advance(Phase::Streaming);

    let out_reader = BufReader::new(opened.reader);
    let err_reader = opened.stderr.map(BufReader::new);
    let mut writer = opened.writer;

    match workload {
        ResolvedWorkload::Command { labels, .. } => {
            command_driver::run(
                out_reader,
                err_reader,
                &host,
                labels,
                &sink,
                &token,
                fleet.abort_token(),
                &slot,
            )
            .await;
        }
        ResolvedWorkload::Copy { entries, opts, .. } => {
            let mut reader = out_reader;
            copy_driver::run(
                &mut reader,
                &mut writer,
                &host,
                &entries,
                opts,
                &sink,
                &slot,
                &token,
            )
            .await;
        }
    }

    if slot.phase() != Phase::Failed {
        slot.advance(Phase::Done);
    }
    slot.mark_finish(base);

    slot.rcmd_kind.is_gang() && slot.phase() == Phase::Failed
}

fn fail(
    slot: &rexec_core::WorkerSlot,
    sink: &OutputSink,
    host: &str,
    base: std::time::Instant,
    reason: &str,
) -> bool {
    tracing::warn!(host, reason, "worker failed before streaming");
    sink.emit_stderr(&format!("{host}: {reason}\n"));
    slot.advance(Phase::Failed);
    slot.mark_finish(base);
    slot.rcmd_kind.is_gang()
}

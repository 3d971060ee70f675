//! Fan-out scheduler: builds the worker table, launches the watchdog
//! and signal mediator, then launches workers under a concurrency
//! ceiling and drains them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rexec_core::{aggregate, EngineError, Phase, RcmdKind, WorkerSlot, WorkerTable, Workload};
use rexec_transport::bsd::BsdTransport;
use rexec_transport::ssh::SshTransport;
use rexec_transport::Transport;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::fleet::Fleet;
use crate::options::{DispatchOptions, DispatchReport, TimingSummary};
use crate::output::OutputSink;
use crate::worker_task::{self, ResolvedWorkload};
use crate::{signal_mediator, watchdog};

/// Run one job end to end: pick the transport named by
/// [`DispatchOptions::rcmd_kind`], then fan out. Pre-dispatch fatal
/// errors (transport init, bad input paths) are logged and surfaced as
/// a failed report with no timing summary, exactly as a CLI tool
/// prints a diagnostic and exits nonzero before anything was launched
/// -- there is no partial worker state to report in that case.
pub async fn dispatch(opts: DispatchOptions) -> DispatchReport {
    let transport = match select_transport(opts.rcmd_kind) {
        Ok(t) => t,
        Err(e) => return fail_report(e),
    };
    match run(opts, transport).await {
        Ok(report) => report,
        Err(e) => fail_report(e),
    }
}

fn fail_report(e: EngineError) -> DispatchReport {
    tracing::error!(error = %e, "dispatch aborted before launching any worker");
    eprintln!("{e}");
    DispatchReport {
        exit_status: rexec_core::FAILED_EXIT_CODE,
        timing: None,
    }
}

fn select_transport(kind: RcmdKind) -> Result<Arc<dyn Transport>, EngineError> {
    match kind {
        RcmdKind::Bsd => Ok(Arc::new(BsdTransport)),
        RcmdKind::Ssh => Ok(Arc::new(SshTransport::default())),
        RcmdKind::Kerberos => kerberos_transport(),
        RcmdKind::Interconnect => interconnect_transport(),
    }
}

#[cfg(feature = "krb")]
fn kerberos_transport() -> Result<Arc<dyn Transport>, EngineError> {
    Ok(Arc::new(rexec_transport::kerberos::KerberosTransport::default()))
}

#[cfg(not(feature = "krb"))]
fn kerberos_transport() -> Result<Arc<dyn Transport>, EngineError> {
    Err(EngineError::TransportInit(
        "kerberos support not compiled in (enable the \"krb\" feature)".to_string(),
    ))
}

#[cfg(feature = "qshell")]
fn interconnect_transport() -> Result<Arc<dyn Transport>, EngineError> {
    Ok(Arc::new(rexec_transport::interconnect::InterconnectTransport))
}

#[cfg(not(feature = "qshell"))]
fn interconnect_transport() -> Result<Arc<dyn Transport>, EngineError> {
    Err(EngineError::TransportInit(
        "interconnect gang-launch support not compiled in (enable the \"qshell\" feature)".to_string(),
    ))
}

async fn run(opts: DispatchOptions, transport: Arc<dyn Transport>) -> Result<DispatchReport, EngineError> {
    transport.init().await?;

    let entries_and_command = match &opts.workload {
        Workload::Copy {
            infiles,
            target,
            preserve,
            recursive,
        } => {
            let expanded = rexec_fileset::expand(infiles)?;
            let command = rexec_copy::remote_command(target, *recursive, *preserve, infiles.len());
            Some((Arc::new(expanded), command, *preserve))
        }
        Workload::Command { .. } => None,
    };

    let base = Instant::now();
    let slots: Vec<Arc<WorkerSlot>> = opts
        .hosts
        .iter()
        .enumerate()
        .map(|(i, host)| Arc::new(WorkerSlot::new(host.clone(), i, opts.rcmd_kind)))
        .collect();
    let table = WorkerTable::new(slots, base);
    let fleet = Fleet::new(table);

    let sink = Arc::new(OutputSink::new());
    let mediator_shutdown = CancellationToken::new();
    let mediator = tokio::spawn(signal_mediator::run(
        fleet.clone(),
        sink.clone(),
        opts.batch,
        opts.interrupt_window,
        opts.connect_timeout,
        opts.command_timeout,
        mediator_shutdown.clone(),
    ));
    let watchdog_task = tokio::spawn(watchdog::run(
        fleet.clone(),
        opts.connect_timeout,
        opts.command_timeout,
        mediator_shutdown.clone(),
    ));

    let semaphore = Arc::new(Semaphore::new(opts.fanout.max(1)));
    let gang_abort = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(opts.hosts.len());

    for node_id in 0..opts.hosts.len() {
        if gang_abort.load(Ordering::Acquire) {
            fleet.abort_all();
        }
        if fleet.is_aborted() {
            break;
        }
        let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
        let transport = transport.clone();
        let fleet = fleet.clone();
        let sink = sink.clone();
        let local_user = opts.local_user.clone();
        let remote_user = opts.remote_user.clone();
        let gang_abort = gang_abort.clone();

        let workload = match &opts.workload {
            Workload::Command {
                cmd,
                labels,
                separate_stderr,
            } => ResolvedWorkload::Command {
                command: compose_command(&opts, cmd),
                labels: *labels,
                separate_stderr: *separate_stderr,
            },
            Workload::Copy { .. } => {
                let (entries, command, preserve) = entries_and_command.clone().expect("copy entries computed");
                ResolvedWorkload::Copy {
                    command,
                    entries,
                    opts: rexec_copy::CopyOptions { preserve },
                }
            }
        };

        handles.push(tokio::spawn(async move {
            let is_gang_failure = worker_task::run(transport, fleet, node_id, local_user, remote_user, workload, sink).await;
            if is_gang_failure {
                gang_abort.store(true, Ordering::Release);
            }
            drop(permit);
        }));
    }

    for handle in handles {
        let _ = handle.await;
        if gang_abort.load(Ordering::Acquire) {
            fleet.abort_all();
        }
    }

    mediator_shutdown.cancel();
    let _ = mediator.await;
    let _ = watchdog_task.await;

    let outcomes: Vec<(Phase, i32)> = fleet.table.iter().map(|s| (s.phase(), s.remote_rc())).collect();
    let exit_status = aggregate(&outcomes);

    let timing = if opts.debug {
        Some(timing_summary(&fleet.table))
    } else {
        None
    };

    Ok(DispatchReport { exit_status, timing })
}

fn compose_command(opts: &DispatchOptions, cmd: &str) -> String {
    let mut full = String::new();
    if let Some(prefix) = &opts.path_prefix {
        full.push_str(prefix);
        full.push_str("; ");
    }
    full.push_str(cmd);
    if let Some(suffix) = &opts.status_suffix {
        full.push_str(suffix);
    }
    full
}

fn timing_summary(table: &WorkerTable) -> TimingSummary {
    let base = table.base();
    let mut connect_times = Vec::new();
    let mut command_times = Vec::new();
    let mut failed_count = 0;

    for slot in table.iter() {
        if slot.phase() == Phase::Failed {
            failed_count += 1;
            continue;
        }
        if let (Some(start), Some(connect)) = (slot.start_time(base), slot.connect_time(base)) {
            connect_times.push(connect.saturating_duration_since(start).as_millis() as u64);
        }
        if let (Some(connect), Some(finish)) = (slot.connect_time(base), slot.finish_time(base)) {
            command_times.push(finish.saturating_duration_since(connect).as_millis() as u64);
        }
    }

    TimingSummary {
        connect_min_ms: connect_times.iter().copied().min().unwrap_or(0),
        connect_avg_ms: average(&connect_times),
        connect_max_ms: connect_times.iter().copied().max().unwrap_or(0),
        command_min_ms: command_times.iter().copied().min().unwrap_or(0),
        command_avg_ms: average(&command_times),
        command_max_ms: command_times.iter().copied().max().unwrap_or(0),
        failed_count,
    }
}

fn average(values: &[u64]) -> u64 {
    if values.is_empty() {
        0
    } else {
        values.iter().sum::<u64>() / values.len() as u64
    }
}

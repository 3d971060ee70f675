use std::path::PathBuf;
use std::time::Duration;

use rexec_core::Workload;
use rexec_transport::RcmdKind;

/// Everything `dispatch` needs to run one job: the target hosts, the
/// chosen transport mechanism, concurrency and timeout parameters, and
/// the per-host workload.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub hosts: Vec<String>,
    pub rcmd_kind: RcmdKind,
    pub local_user: String,
    pub remote_user: String,
    pub fanout: usize,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub interrupt_window: Duration,
    pub workload: Workload,
    /// Optional `path-setting statement` prefixed onto the user's
    /// command before dispatch.
    pub path_prefix: Option<String>,
    /// Optional `echo $?`-equivalent suffix appended to the user's
    /// command so the remote exit status travels back over stdout.
    pub status_suffix: Option<String>,
    /// Dump min/avg/max connect and command timing after all workers
    /// finish.
    pub debug: bool,
    /// Batch mode: any operator interrupt aborts immediately instead
    /// of enumerating first.
    pub batch: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            rcmd_kind: RcmdKind::Ssh,
            local_user: whoami_local_user(),
            remote_user: whoami_local_user(),
            fanout: 32,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::ZERO,
            interrupt_window: Duration::from_secs(1),
            workload: Workload::Command {
                cmd: String::new(),
                labels: true,
                separate_stderr: false,
            },
            path_prefix: None,
            status_suffix: None,
            debug: false,
            batch: false,
        }
    }
}

fn whoami_local_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

/// Per-host timing summary, populated when [`DispatchOptions::debug`]
/// is set.
#[derive(Debug, Clone, Default)]
pub struct TimingSummary {
    pub connect_min_ms: u64,
    pub connect_avg_ms: u64,
    pub connect_max_ms: u64,
    pub command_min_ms: u64,
    pub command_avg_ms: u64,
    pub command_max_ms: u64,
    pub failed_count: usize,
}

/// Outcome of a full `dispatch` call.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub exit_status: i32,
    pub timing: Option<TimingSummary>,
}

/// Input files for copy mode, resolved to an absolute `PathBuf` list
/// before pre-expansion.
pub fn copy_infiles(workload: &Workload) -> Option<&[PathBuf]> {
    match workload {
        Workload::Copy { infiles, .. } => Some(infiles),
        Workload::Command { .. } => None,
    }
}

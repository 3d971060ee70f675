use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use rexec_core::Workload;
use rexec_engine::{DispatchOptions, RcmdKind};

/// Parallel remote execution: run a command, or push files, across a
/// set of hosts concurrently.
#[derive(Parser)]
#[command(name = "rexec", version)]
pub struct Cli {
    /// Flat file of hostnames, one per line (blank lines and `#`
    /// comments ignored). Host-list construction from anything richer
    /// than this — directory services, resource managers — is out of
    /// scope for this binary.
    #[arg(short = 'w', long = "wcoll")]
    pub host_file: Option<PathBuf>,

    /// Target hosts, comma-separated; combines with `--wcoll` if both given.
    #[arg(short = 'W', long = "hosts", value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Remote-shell mechanism to use for every host.
    #[arg(short = 'R', long = "rcmd", value_enum, default_value_t = RcmdKindArg::Ssh)]
    pub rcmd: RcmdKindArg,

    /// Maximum number of concurrently active workers.
    #[arg(short = 'f', long = "fanout", default_value_t = 32)]
    pub fanout: usize,

    /// Local username passed to the transport.
    #[arg(short = 'l', long = "luser")]
    pub local_user: Option<String>,

    /// Remote username passed to the transport (defaults to the local user).
    #[arg(short = 'u', long = "ruser")]
    pub remote_user: Option<String>,

    /// Seconds to wait for a connection before failing a worker (0 disables).
    #[arg(short = 't', long = "connect-timeout", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Seconds to wait for command completion before failing a worker (0 disables).
    #[arg(short = 'T', long = "command-timeout", default_value_t = 0)]
    pub command_timeout_secs: u64,

    /// Seconds within which a second interrupt aborts the whole job.
    #[arg(long = "interrupt-window", default_value_t = 1)]
    pub interrupt_window_secs: u64,

    /// Abort immediately on the first interrupt instead of enumerating
    /// slow workers first.
    #[arg(short = 'b', long = "batch")]
    pub batch: bool,

    /// Suppress the `host: ` label prefix on output lines.
    #[arg(short = 'N', long = "no-labels")]
    pub no_labels: bool,

    /// Keep each worker's stderr on a separate channel instead of
    /// merging it into stdout.
    #[arg(short = 's', long = "separate-stderr")]
    pub separate_stderr: bool,

    /// Log min/avg/max connect and command timing after the job finishes.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Append an `echo $?`-style sentinel to the command so the remote
    /// exit status travels back over stdout.
    #[arg(short = 'S', long = "getstat")]
    pub getstat: bool,

    /// Copy mode: push files instead of running a command.
    #[arg(short = 'r', long = "recursive", requires = "copy_target")]
    pub recursive: bool,

    /// Copy mode: preserve file modification and access times.
    #[arg(short = 'p', long = "preserve")]
    pub preserve: bool,

    /// Copy mode: destination path on the remote host. Presence of
    /// this flag selects copy mode.
    #[arg(long = "target", id = "copy_target")]
    pub copy_target: Option<String>,

    /// Copy mode: local files/directories to push (ignored in command mode).
    #[arg(long = "infile")]
    pub infiles: Vec<PathBuf>,

    /// Shell command to run on every host (command mode; ignored if `--target` is set).
    pub command: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum RcmdKindArg {
    Bsd,
    Kerberos,
    Ssh,
    Interconnect,
}

impl From<RcmdKindArg> for RcmdKind {
    fn from(arg: RcmdKindArg) -> Self {
        match arg {
            RcmdKindArg::Bsd => RcmdKind::Bsd,
            RcmdKindArg::Kerberos => RcmdKind::Kerberos,
            RcmdKindArg::Ssh => RcmdKind::Ssh,
            RcmdKindArg::Interconnect => RcmdKind::Interconnect,
        }
    }
}

impl Cli {
    /// Merge `--wcoll`'s flat-file hosts with any `--hosts` given directly.
    pub fn resolve_hosts(&self) -> anyhow::Result<Vec<String>> {
        let mut hosts = self.hosts.clone();
        if let Some(path) = &self.host_file {
            let text = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("reading host file {}: {e}", path.display()))?;
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                hosts.push(line.to_string());
            }
        }
        if hosts.is_empty() {
            anyhow::bail!("no target hosts given (use -w/--wcoll or -W/--hosts)");
        }
        Ok(hosts)
    }

    pub fn into_dispatch_options(self) -> anyhow::Result<DispatchOptions> {
        let hosts = self.resolve_hosts()?;
        let local_user = self
            .local_user
            .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()));
        let remote_user = self.remote_user.unwrap_or_else(|| local_user.clone());

        let workload = if let Some(target) = self.copy_target {
            if self.infiles.is_empty() {
                anyhow::bail!("copy mode (--target) requires at least one --infile");
            }
            Workload::Copy {
                infiles: self.infiles,
                target,
                preserve: self.preserve,
                recursive: self.recursive,
            }
        } else {
            if self.command.is_empty() {
                anyhow::bail!("no command given (and no --target, so not copy mode either)");
            }
            Workload::Command {
                cmd: self.command.join(" "),
                labels: !self.no_labels,
                separate_stderr: self.separate_stderr,
            }
        };

        let status_suffix = self
            .getstat
            .then(|| format!("; echo {}$?", rexec_core::sentinel::MAGIC));

        Ok(DispatchOptions {
            hosts,
            rcmd_kind: self.rcmd.into(),
            local_user,
            remote_user,
            fanout: self.fanout.max(1),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            interrupt_window: Duration::from_secs(self.interrupt_window_secs),
            workload,
            path_prefix: None,
            status_suffix,
            debug: self.debug,
            batch: self.batch,
        })
    }
}

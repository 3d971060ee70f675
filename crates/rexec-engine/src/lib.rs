//! Dispatch engine: turns a host list and a workload into a fan-out
//! job, racing connect/command watchdogs and the operator's interrupt
//! against every worker, and aggregates the per-host outcomes into one
//! process exit status.

mod command_driver;
mod copy_driver;
mod fleet;
mod options;
mod output;
mod scheduler;
mod signal_mediator;
mod watchdog;
mod worker_task;

pub use options::{copy_infiles, DispatchOptions, DispatchReport, TimingSummary};
pub use scheduler::dispatch;

pub use rexec_transport::RcmdKind;

//! Transport adapter: a uniform façade over several remote-shell
//! mechanisms, returning a paired stdout/stderr byte stream to the
//! worker state machine in `rexec-engine`.

pub mod bsd;
#[cfg(feature = "qshell")]
pub mod interconnect;
#[cfg(feature = "krb")]
pub mod kerberos;
pub mod request;
pub mod resolve;
pub mod ssh;
pub mod stub;

use async_trait::async_trait;
use rexec_core::EngineError;
use tokio_util::sync::CancellationToken;

pub use request::{OpenRequest, OpenedConnection};
pub use rexec_core::RcmdKind;

/// Send a single byte as TCP out-of-band (urgent) data on a raw
/// socket fd -- the mechanism `rcmd(3)`'s secondary connection uses to
/// forward a signal number to the remote peer. Exposed standalone so
/// the engine's signal mediator can forward to a worker's connection
/// without holding the full [`OpenedConnection`].
pub fn forward_oob_signal(fd: std::os::fd::RawFd, signum: i32) {
    // SAFETY: `fd` is a live socket fd owned by an open connection;
    // `send` with a single-byte buffer and MSG_OOB is the standard way
    // to deliver rcmd's urgent signal byte.
    unsafe {
        let buf = [signum as u8];
        libc::send(fd, buf.as_ptr() as *const libc::c_void, 1, libc::MSG_OOB);
    }
}

/// Uniform operation implemented by each remote-shell mechanism.
///
/// `open` is the one blocking point every transport shares. An
/// in-flight connect must be unblockable by an asynchronous interrupt;
/// here that is `cancel`, raced against the connect attempt with
/// `tokio::select!` inside each implementation so a watchdog-triggered
/// cancellation surfaces promptly as [`EngineError::ConnectFailed`]
/// rather than hanging.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(
        &self,
        req: OpenRequest,
        cancel: &CancellationToken,
    ) -> Result<OpenedConnection, EngineError>;

    /// Forward an operator signal to the remote peer's control
    /// channel. BSD/Kerberos rcmd use the out-of-band byte on the
    /// secondary stream; ssh and the interconnect transport have no
    /// such channel and no-op.
    fn signal(&self, conn: &OpenedConnection, signum: i32);

    /// Whether this transport's child process resolves addresses
    /// itself, so the scheduler should skip pre-resolution (the ssh
    /// variant).
    fn skips_resolution(&self) -> bool {
        false
    }

    /// One-time setup (loading credentials, probing the network) the
    /// scheduler performs before building the worker table.
    async fn init(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

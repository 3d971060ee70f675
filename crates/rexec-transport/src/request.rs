use std::net::Ipv4Addr;

use tokio::io::{AsyncRead, AsyncWrite};

/// Parameters passed to [`crate::Transport::open`]: the uniform
/// `open(host, addr, local-user, remote-user, command, node-id,
/// want-stderr)` operation every remote-shell mechanism implements.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub host: String,
    pub addr: Option<Ipv4Addr>,
    pub local_user: String,
    pub remote_user: String,
    pub command: String,
    pub node_id: usize,
    pub want_stderr: bool,
}

/// What a successful `open` hands back to the worker: a readable
/// stdout stream, a writable stream for anything the transport can
/// accept back (used only by the copy driver), and, when requested,
/// a separate stderr stream.
///
/// Handle to forward an operator signal to the remote peer. BSD rcmd
/// uses the secondary connection's out-of-band byte; ssh and the
/// interconnect transport have no such channel and no-op.
pub struct OpenedConnection {
    pub reader: Box<dyn AsyncRead + Unpin + Send>,
    pub writer: Box<dyn AsyncWrite + Unpin + Send>,
    pub stderr: Option<Box<dyn AsyncRead + Unpin + Send>>,
    pub signal_fd: Option<std::os::fd::RawFd>,
}

impl std::fmt::Debug for OpenedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedConnection")
            .field("has_stderr", &self.stderr.is_some())
            .field("signal_fd", &self.signal_fd)
            .finish()
    }
}

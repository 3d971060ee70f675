//! BSD `rcmd(3)`-style transport: privileged reserved-port rendezvous
//! with an `rshd`/`rcmd` remote peer.
//!
//! Wire shape, straight from `rcmd(3)`: the client binds a local
//! source port in the reserved range (512-1023), optionally opens a
//! second reserved-port listener for stderr and sends its port number
//! (or `"0"` if stderr isn't wanted) as a NUL-terminated ASCII string,
//! then sends local-user, remote-user, and command, each NUL-terminated.
//! The remote replies with a single status byte before streaming
//! output.
//!
//! The connect-and-handshake sequence is synchronous blocking I/O, run
//! on a blocking-pool thread via [`tokio::task::spawn_blocking`] --
//! the direct analogue of the original's blocking `connect()` inside
//! the `DSH_RCMD` phase that only `SIGALRM` could interrupt. Cancelling
//! here means abandoning that thread's result rather than truly
//! killing it (Rust has no portable "interrupt this blocking thread"
//! primitive), which converges to the same outcome: a timed-out
//! connect never reaches `STREAMING`.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};
use std::os::fd::AsRawFd;

use rexec_core::EngineError;
use tokio_util::sync::CancellationToken;

use crate::request::{OpenRequest, OpenedConnection};
use crate::Transport;

const FIRST_RESERVED_PORT: u16 = 1023;
const LAST_RESERVED_PORT: u16 = 512;
const REMOTE_SHELL_PORT: u16 = 514;

/// Bind a TCP listener to an available port in the reserved range,
/// descending from 1023 the way `rresvport(3)` does.
fn bind_reserved() -> io::Result<TcpListener> {
    let mut last_err = None;
    let mut port = FIRST_RESERVED_PORT;
    while port >= LAST_RESERVED_PORT {
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        match TcpListener::bind(addr) {
            Ok(listener) => return Ok(listener),
            Err(e) => last_err = Some(e),
        }
        port -= 1;
    }
    Err(last_err.unwrap_or_else(|| io::Error::other("no reserved port available")))
}

fn send_nul_terminated(stream: &mut TcpStream, s: &str) -> io::Result<()> {
    stream.write_all(s.as_bytes())?;
    stream.write_all(&[0])
}

fn read_status_byte(stream: &mut TcpStream) -> io::Result<()> {
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte)?;
    if byte[0] != 0 {
        let mut msg = Vec::new();
        let mut b = [0u8; 1];
        loop {
            match stream.read(&mut b) {
                Ok(0) => break,
                Ok(_) if b[0] == b'\n' => break,
                Ok(_) => msg.push(b[0]),
                Err(e) => return Err(e),
            }
        }
        return Err(io::Error::other(String::from_utf8_lossy(&msg).into_owned()));
    }
    Ok(())
}

struct BlockingConnectResult {
    main: TcpStream,
    stderr: Option<TcpStream>,
}

fn connect_blocking(req: &OpenRequest, target: Ipv4Addr) -> io::Result<BlockingConnectResult> {
    let stderr_listener = if req.want_stderr {
        Some(bind_reserved()?)
    } else {
        None
    };
    let stderr_port = stderr_listener
        .as_ref()
        .map(|l| l.local_addr().map(|a| a.port()).unwrap_or(0))
        .unwrap_or(0);

    // Bind our own reserved port, then connect from it.
    let local = bind_reserved()?;
    let local_addr = local.local_addr()?;
    drop(local);
    let socket = socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&local_addr.into())?;
    socket.connect(&SocketAddrV4::new(target, REMOTE_SHELL_PORT).into())?;
    let mut main: TcpStream = socket.into();

    send_nul_terminated(&mut main, &stderr_port.to_string())?;
    send_nul_terminated(&mut main, &req.local_user)?;
    send_nul_terminated(&mut main, &req.remote_user)?;
    send_nul_terminated(&mut main, &req.command)?;
    read_status_byte(&mut main)?;

    let stderr = match stderr_listener {
        Some(listener) => Some(listener.accept()?.0),
        None => None,
    };

    Ok(BlockingConnectResult { main, stderr })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BsdTransport;

#[async_trait::async_trait]
impl Transport for BsdTransport {
    async fn open(
        &self,
        req: OpenRequest,
        cancel: &CancellationToken,
    ) -> Result<OpenedConnection, EngineError> {
        let addr = req
            .addr
            .ok_or_else(|| EngineError::HostResolution(req.host.clone()))?;
        let host = req.host.clone();
        let req_for_blocking = req.clone();
        let join = tokio::task::spawn_blocking(move || connect_blocking(&req_for_blocking, addr));

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(EngineError::ConnectFailed {
                    host,
                    reason: "interrupted".to_string(),
                });
            }
            joined = join => joined,
        };

        let connected = result
            .map_err(|e| EngineError::ConnectFailed {
                host: host.clone(),
                reason: format!("connect thread panicked: {e}"),
            })?
            .map_err(|e| EngineError::ConnectFailed {
                host: host.clone(),
                reason: e.to_string(),
            })?;

        let signal_fd = connected.stderr.as_ref().map(|s| s.as_raw_fd());
        let stderr_async = match connected.stderr {
            Some(s) => Some(tokio::net::TcpStream::from_std(s).map_err(|e| EngineError::ConnectFailed {
                host: host.clone(),
                reason: e.to_string(),
            })?),
            None => None,
        };
        let main_async =
            tokio::net::TcpStream::from_std(connected.main).map_err(|e| EngineError::ConnectFailed {
                host: host.clone(),
                reason: e.to_string(),
            })?;

        let (read_half, write_half) = main_async.into_split();
        Ok(OpenedConnection {
            reader: Box::new(read_half),
            writer: Box::new(write_half),
            stderr: stderr_async.map(|s| Box::new(s) as Box<dyn tokio::io::AsyncRead + Unpin + Send>),
            signal_fd,
        })
    }

    fn signal(&self, conn: &OpenedConnection, signum: i32) {
        // rcmd forwards signals over the secondary (stderr) connection
        // as a single out-of-band byte.
        if let Some(fd) = conn.signal_fd {
            crate::forward_oob_signal(fd, signum);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_reserved_picks_a_port_in_range() {
        // Binding to 512-1023 requires root on most systems; skip if
        // unprivileged (the container this runs in is typically not root).
        if let Ok(listener) = bind_reserved() {
            let port = listener.local_addr().unwrap().port();
            assert!((LAST_RESERVED_PORT..=FIRST_RESERVED_PORT).contains(&port));
        }
    }
}

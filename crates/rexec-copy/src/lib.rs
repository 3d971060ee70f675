//! The rcp-style copy sub-protocol: a line-oriented, client-push wire
//! format spoken over a single stream, byte-compatible with a stock
//! BSD `rcp` receiver.

use std::path::Path;

use rexec_core::EngineError;
use rexec_fileset::ExpandedEntry;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Flags controlling the remote receive-side invocation and the
/// metadata this driver emits.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    pub preserve: bool,
}

/// Build the fixed rcp receive-side invocation for the given flags and
/// file count: always `-t <target>`, `-r` if recursive, `-p` if
/// preserving times, `-d` if more than one input (forcing the target
/// to be interpreted as a directory).
pub fn remote_command(target: &str, recursive: bool, preserve: bool, input_count: usize) -> String {
    let mut cmd = String::from("rcp");
    if recursive {
        cmd.push_str(" -r");
    }
    if preserve {
        cmd.push_str(" -p");
    }
    if input_count > 1 {
        cmd.push_str(" -d");
    }
    cmd.push_str(" -t ");
    cmd.push_str(target);
    cmd
}

enum ResponseOutcome {
    Ok,
    NonFatal(String),
}

async fn read_response<R: AsyncRead + Unpin>(
    reader: &mut R,
    host: &str,
) -> Result<ResponseOutcome, EngineError> {
    let mut byte = [0u8; 1];
    reader
        .read_exact(&mut byte)
        .await
        .map_err(|e| EngineError::StreamError {
            host: host.to_string(),
            reason: e.to_string(),
        })?;
    match byte[0] {
        0 => Ok(ResponseOutcome::Ok),
        1 => Ok(ResponseOutcome::NonFatal(read_until_newline(reader, host).await?)),
        _ => Err(EngineError::CopyProtocolFatal {
            host: host.to_string(),
            message: read_until_newline(reader, host).await?,
        }),
    }
}

async fn read_until_newline<R: AsyncRead + Unpin>(reader: &mut R, host: &str) -> Result<String, EngineError> {
    let mut msg = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte).await {
            Ok(0) => break,
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) => msg.push(byte[0]),
            Err(e) => {
                return Err(EngineError::StreamError {
                    host: host.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
    Ok(String::from_utf8_lossy(&msg).into_owned())
}

async fn send_line<W: AsyncWrite + Unpin>(writer: &mut W, host: &str, line: &str) -> Result<(), EngineError> {
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|_| EngineError::ShortWrite { host: host.to_string() })
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(_meta: &std::fs::Metadata) -> u32 {
    0o644
}

#[cfg(unix)]
fn times_of(meta: &std::fs::Metadata) -> (i64, i64) {
    use std::os::unix::fs::MetadataExt;
    (meta.atime(), meta.mtime())
}

#[cfg(not(unix))]
fn times_of(_meta: &std::fs::Metadata) -> (i64, i64) {
    (0, 0)
}

/// Stream exactly `size` bytes of `path`'s contents followed by one
/// NUL byte. A file that shrinks out from under us (`read` returning
/// `0` before `size` bytes are sent) is treated as end-of-file rather
/// than a hard failure -- the NUL terminator still closes the frame.
async fn stream_file<W: AsyncWrite + Unpin>(
    writer: &mut W,
    host: &str,
    path: &Path,
    size: u64,
) -> Result<(), EngineError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| EngineError::InputAccess {
            path: path.display().to_string(),
            source: e,
        })?;
    let mut remaining = size;
    let mut buf = vec![0u8; 64 * 1024];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = file
            .read(&mut buf[..want])
            .await
            .map_err(|e| EngineError::StreamError {
                host: host.to_string(),
                reason: e.to_string(),
            })?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|_| EngineError::ShortWrite { host: host.to_string() })?;
        remaining -= n as u64;
    }
    writer
        .write_all(&[0u8])
        .await
        .map_err(|_| EngineError::ShortWrite { host: host.to_string() })
}

/// Drive the copy sub-protocol for one worker over `reader`/`writer`,
/// pushing every entry in `entries` (already pre-expanded by
/// `rexec_fileset::expand`).
///
/// The remote sends one response byte before the first metadata line;
/// that is consumed first. Directories close with an `E\n` marker once
/// every contained entry has been sent, matching a stock `rcp`
/// receiver's expectation for recursive transfers.
///
/// Races the whole exchange against `token`: a worker stuck waiting on
/// a response or mid-transfer is interrupted the same way a transport
/// still connecting is, rather than hanging the job past a watchdog
/// timeout or an operator's double interrupt.
pub async fn run<R, W>(
    reader: &mut R,
    writer: &mut W,
    host: &str,
    entries: &[ExpandedEntry],
    opts: CopyOptions,
    token: &CancellationToken,
) -> Result<(), EngineError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(EngineError::StreamError {
            host: host.to_string(),
            reason: "interrupted".to_string(),
        }),
        result = run_inner(reader, writer, host, entries, opts) => result,
    }
}

async fn run_inner<R, W>(
    reader: &mut R,
    writer: &mut W,
    host: &str,
    entries: &[ExpandedEntry],
    opts: CopyOptions,
) -> Result<(), EngineError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    read_response(reader, host).await?;

    let mut open_dirs: Vec<std::path::PathBuf> = Vec::new();

    'entries: for entry in entries {
        while let Some(top) = open_dirs.last() {
            if entry.path.parent() == Some(top.as_path()) {
                break;
            }
            send_line(writer, host, "E\n").await?;
            open_dirs.pop();
        }

        let meta = std::fs::metadata(&entry.path).map_err(|e| EngineError::InputAccess {
            path: entry.path.display().to_string(),
            source: e,
        })?;

        if opts.preserve {
            let (atime, mtime) = times_of(&meta);
            send_line(writer, host, &format!("T{atime} 0 {mtime} 0\n")).await?;
            match read_response(reader, host).await? {
                ResponseOutcome::Ok => {}
                ResponseOutcome::NonFatal(msg) => {
                    tracing::warn!(host, message = %msg, "copy: non-fatal response to time metadata");
                    continue 'entries;
                }
            }
        }

        let basename = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mode = mode_of(&meta);

        if entry.is_dir {
            send_line(writer, host, &format!("D{mode:04o} 0 {basename}\n")).await?;
            match read_response(reader, host).await? {
                ResponseOutcome::Ok => {}
                ResponseOutcome::NonFatal(msg) => {
                    tracing::warn!(host, message = %msg, "copy: non-fatal response to directory entry");
                    continue 'entries;
                }
            }
            open_dirs.push(entry.path.clone());
        } else {
            let size = meta.len();
            send_line(writer, host, &format!("C{mode:04o} {size} {basename}\n")).await?;
            match read_response(reader, host).await? {
                ResponseOutcome::Ok => {}
                ResponseOutcome::NonFatal(msg) => {
                    tracing::warn!(host, message = %msg, "copy: non-fatal response to file entry");
                    continue 'entries;
                }
            }
            stream_file(writer, host, &entry.path, size).await?;
            match read_response(reader, host).await? {
                ResponseOutcome::Ok => {}
                ResponseOutcome::NonFatal(msg) => {
                    tracing::warn!(host, message = %msg, "copy: non-fatal response to file data");
                }
            }
        }
    }

    while !open_dirs.is_empty() {
        send_line(writer, host, "E\n").await?;
        open_dirs.pop();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexec_fileset::expand;

    #[test]
    fn remote_command_composes_flags() {
        assert_eq!(remote_command("/tmp", false, false, 1), "rcp -t /tmp");
        assert_eq!(remote_command("/tmp", true, true, 1), "rcp -r -p -t /tmp");
        assert_eq!(remote_command("/tmp", false, false, 2), "rcp -d -t /tmp");
    }

    #[tokio::test]
    async fn single_file_transfer_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a");
        std::fs::write(&file, b"hello").unwrap();
        let entries = expand(&[file]).unwrap();

        let (mut client_r, mut server_w) = tokio::io::duplex(4096);
        let (mut server_r, mut client_w) = tokio::io::duplex(4096);

        let server = tokio::spawn(async move {
            server_w.write_all(&[0]).await.unwrap(); // initial ack
            let mut buf = vec![0u8; 4096];
            let n = server_r.read(&mut buf).await.unwrap();
            let line = String::from_utf8_lossy(&buf[..n]).into_owned();
            server_w.write_all(&[0]).await.unwrap(); // ack the C line
            let mut data = vec![0u8; 6];
            server_r.read_exact(&mut data).await.unwrap();
            server_w.write_all(&[0]).await.unwrap(); // ack the data
            (line, data)
        });

        run(
            &mut client_r,
            &mut client_w,
            "h1",
            &entries,
            CopyOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let (line, data) = server.await.unwrap();
        assert!(line.starts_with("C0"));
        assert!(line.ends_with(" a\n"));
        assert_eq!(&data[..5], b"hello");
        assert_eq!(data[5], 0);
    }

    #[tokio::test]
    async fn fatal_response_to_first_line_aborts_before_data() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a");
        std::fs::write(&file, b"hello").unwrap();
        let entries = expand(&[file]).unwrap();

        let (mut client_r, mut server_w) = tokio::io::duplex(4096);
        let (mut server_r, mut client_w) = tokio::io::duplex(4096);

        let server = tokio::spawn(async move {
            server_w.write_all(&[0]).await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = server_r.read(&mut buf).await.unwrap();
            server_w.write_all(b"\x02bad\n").await.unwrap();
        });

        let result = run(
            &mut client_r,
            &mut client_w,
            "h1",
            &entries,
            CopyOptions::default(),
            &CancellationToken::new(),
        )
        .await;
        server.await.unwrap();
        assert!(matches!(result, Err(EngineError::CopyProtocolFatal { .. })));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_stuck_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a");
        std::fs::write(&file, b"hello").unwrap();
        let entries = expand(&[file]).unwrap();

        let (mut client_r, _server_w) = tokio::io::duplex(4096);
        let (_server_r, mut client_w) = tokio::io::duplex(4096);

        let token = CancellationToken::new();
        token.cancel();

        let result = run(
            &mut client_r,
            &mut client_w,
            "h1",
            &entries,
            CopyOptions::default(),
            &token,
        )
        .await;
        assert!(matches!(result, Err(EngineError::StreamError { .. })));
    }

    #[tokio::test]
    async fn directory_recursion_emits_close_marker() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("dir");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("x"), b"x").unwrap();
        let entries = expand(&[sub]).unwrap();

        let (mut client_r, mut server_w) = tokio::io::duplex(8192);
        let (mut server_r, mut client_w) = tokio::io::duplex(8192);

        let server = tokio::spawn(async move {
            server_w.write_all(&[0]).await.unwrap();
            let mut lines = Vec::new();
            let mut buf = vec![0u8; 1];
            let mut acc = Vec::new();
            // Read D line, ack, read C line, ack, read 1 byte + NUL, ack, read E line, ack.
            loop {
                let n = server_r.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                acc.push(buf[0]);
                if buf[0] == b'\n' {
                    lines.push(String::from_utf8_lossy(&acc).into_owned());
                    acc.clear();
                    server_w.write_all(&[0]).await.unwrap();
                    if lines.last().unwrap().starts_with('C') {
                        let mut data = [0u8; 2];
                        server_r.read_exact(&mut data).await.unwrap();
                        server_w.write_all(&[0]).await.unwrap();
                    }
                    if lines.len() == 3 {
                        break;
                    }
                }
            }
            lines
        });

        run(
            &mut client_r,
            &mut client_w,
            "h1",
            &entries,
            CopyOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let lines = server.await.unwrap();
        assert!(lines[0].starts_with('D'));
        assert!(lines[1].starts_with('C'));
        assert_eq!(lines[2], "E\n");
    }
}

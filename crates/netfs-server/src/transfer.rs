// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Streaming a file range onto a socket
//!
//! On Linux the bytes move from the page cache to the socket with
//! `sendfile(2)`, driven by tokio write readiness. Other unix systems read
//! the range on the blocking pool and write it out.

use crate::handler::FileRange;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "file transfer timed out")
}

#[cfg(target_os = "linux")]
pub(crate) async fn send_file_range(
    stream: &mut TcpStream,
    range: FileRange,
    io_timeout: Duration,
) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    use tokio::io::Interest;

    let mut offset = libc::off_t::try_from(range.offset)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
    let mut remaining = usize::try_from(range.len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length out of range"))?;
    let socket_fd = stream.as_raw_fd();
    let file_fd = range.file.as_raw_fd();

    while remaining > 0 {
        tokio::time::timeout(io_timeout, stream.writable())
            .await
            .map_err(|_| timed_out())??;

        let sent = stream.try_io(Interest::WRITABLE, || {
            // SAFETY: `stream` and `range.file` keep both descriptors open
            // for the call and `offset` is an exclusively borrowed off_t.
            let n = unsafe { libc::sendfile(socket_fd, file_fd, &mut offset, remaining) };
            if n < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(n as usize)
            }
        });

        match sent {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "file shrank during transfer",
                ));
            }
            Ok(n) => remaining -= n,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub(crate) async fn send_file_range(
    stream: &mut TcpStream,
    range: FileRange,
    io_timeout: Duration,
) -> io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let data = tokio::task::spawn_blocking(move || range.read_to_vec())
        .await
        .map_err(io::Error::other)??;
    tokio::time::timeout(io_timeout, stream.write_all(&data))
        .await
        .map_err(|_| timed_out())?
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SCM_RIGHTS fd passing over the RPC socket.
//!
//! After a `SendFds` reply the client transmits exactly one data byte
//! carrying the fds as ancillary data; the daemon dups them onto the
//! container's standard streams.

use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};
use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tokio::io::Interest;
use tokio::net::UnixStream;

/// Send `fds` with a single marker byte.
pub async fn send_fds(stream: &UnixStream, fds: &[RawFd]) -> io::Result<()> {
    loop {
        stream.writable().await?;
        let result = stream.try_io(Interest::WRITABLE, || {
            let iov = [IoSlice::new(&[0u8])];
            let cmsgs = [ControlMessage::ScmRights(fds)];
            sendmsg::<nix::sys::socket::UnixAddr>(
                stream.as_raw_fd(),
                &iov,
                &cmsgs,
                MsgFlags::empty(),
                None,
            )
            .map_err(|e| io::Error::from_raw_os_error(e as i32))
        });
        match result {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Receive up to `expected` fds sent via [`send_fds`].
pub async fn recv_fds(stream: &UnixStream, expected: usize) -> io::Result<Vec<OwnedFd>> {
    loop {
        stream.readable().await?;
        let result = stream.try_io(Interest::READABLE, || {
            let mut marker = [0u8; 1];
            let mut iov = [IoSliceMut::new(&mut marker)];
            let mut cmsg_buffer = nix::cmsg_space!([RawFd; 3]);
            let msg = recvmsg::<nix::sys::socket::UnixAddr>(
                stream.as_raw_fd(),
                &mut iov,
                Some(&mut cmsg_buffer),
                MsgFlags::empty(),
            )
            .map_err(|e| io::Error::from_raw_os_error(e as i32))?;

            let mut fds = Vec::with_capacity(expected);
            let cmsgs = msg
                .cmsgs()
                .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
            for cmsg in cmsgs {
                if let ControlMessageOwned::ScmRights(raw_fds) = cmsg {
                    for raw in raw_fds {
                        // just received, so uniquely owned here
                        fds.push(unsafe { OwnedFd::from_raw_fd(raw) });
                    }
                }
            }
            Ok(fds)
        });
        match result {
            Ok(fds) => {
                if fds.len() != expected {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("expected {} fds, got {}", expected, fds.len()),
                    ));
                }
                return Ok(fds);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[path = "fdpass_tests.rs"]
mod tests;

use crate::net::sys::{sys_accept, sys_close, sys_local_addr, sys_recv, sys_send};
use crate::sched::TaskId;

use std::cell::Cell;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;

/// A thin wrapper around one non-blocking OS socket descriptor.
///
/// A `SocketHandle` owns its descriptor and closes it on drop. It exposes
/// the uniform operations the suspension primitives are built on: `send`,
/// `recv`, `accept`, and `descriptor`. The readiness multiplexer only ever
/// inspects the descriptor; it never takes ownership.
///
/// Exactly one task chain may operate on a handle at a time. The handle
/// records the root task of the first chain that uses it and the
/// primitives assert that claim on every resume — concurrent use from two
/// chains is a composition bug, caught defensively rather than tolerated.
pub struct SocketHandle {
    fd: RawFd,
    owner: Cell<Option<TaskId>>,
}

impl SocketHandle {
    /// Wraps an already non-blocking descriptor, taking ownership of it.
    pub(crate) fn from_raw(fd: RawFd) -> Self {
        Self {
            fd,
            owner: Cell::new(None),
        }
    }

    /// The raw descriptor, for readiness registration.
    pub fn descriptor(&self) -> RawFd {
        self.fd
    }

    /// Writes as much of `buffer` as the socket will take right now.
    ///
    /// May write fewer bytes than given; the caller retries the remainder.
    pub fn send(&self, buffer: &[u8]) -> io::Result<usize> {
        sys_send(self.fd, buffer)
    }

    /// Reads up to `buffer.len()` bytes.
    ///
    /// A zero-length result signals an orderly close by the peer.
    pub fn recv(&self, buffer: &mut [u8]) -> io::Result<usize> {
        sys_recv(self.fd, buffer)
    }

    /// Accepts one pending connection on a listening socket.
    pub fn accept(&self) -> io::Result<(SocketHandle, SocketAddr)> {
        let (fd, addr) = sys_accept(self.fd)?;
        Ok((SocketHandle::from_raw(fd), addr))
    }

    /// The local address this socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        sys_local_addr(self.fd)
    }

    /// Records `root` as the owning task chain on first use and verifies
    /// it on every later one. Returns `false` when a second chain shows up.
    pub(crate) fn claim(&self, root: TaskId) -> bool {
        match self.owner.get() {
            None => {
                self.owner.set(Some(root));
                true
            }
            Some(owner) => owner == root,
        }
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        sys_close(self.fd);
    }
}

impl fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHandle").field("fd", &self.fd).finish()
    }
}

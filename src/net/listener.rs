use crate::net::SocketHandle;
use crate::net::sys::{sys_bind, sys_listen, sys_set_reuseaddr, sys_set_v6only, sys_socket};

use libc::{AF_INET, AF_INET6};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

/// Pending-connection queue length, matching the reference server.
const BACKLOG: libc::c_int = 5;

/// A bound, listening TCP socket.
///
/// `Listener::bind` performs the whole startup sequence: it resolves the
/// host, creates a non-blocking socket, enables `SO_REUSEADDR`, disables
/// `IPV6_V6ONLY` on IPv6 sockets (dual-stack), binds, and listens. Any
/// failure here is fatal to the caller; there is no retry.
///
/// The listener is consumed by [`Acceptor`](crate::echo::Acceptor), which
/// drives it from inside the trampoline.
pub struct Listener {
    sock: SocketHandle,
}

impl Listener {
    /// Binds a listening socket to `host`:`port`.
    ///
    /// When the host resolves to both address families, the IPv6 address
    /// is preferred and the socket is made dual-stack. Port `0` asks the
    /// OS for an ephemeral port; read it back with
    /// [`local_addr`](Self::local_addr).
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let listener = Listener::bind("localhost", 8869)?;
    /// println!("listening on {}", listener.local_addr()?);
    /// ```
    pub fn bind(host: &str, port: u16) -> io::Result<Listener> {
        let addr = resolve(host, port)?;

        let family = match addr {
            SocketAddr::V4(_) => AF_INET,
            SocketAddr::V6(_) => AF_INET6,
        };

        // Wrapping the descriptor first means any failure below closes it.
        let sock = SocketHandle::from_raw(sys_socket(family)?);

        sys_set_reuseaddr(sock.descriptor())?;
        if family == AF_INET6 {
            sys_set_v6only(sock.descriptor(), false)?;
        }

        sys_bind(sock.descriptor(), &addr)?;
        sys_listen(sock.descriptor(), BACKLOG)?;

        Ok(Listener { sock })
    }

    /// The local address of the listening socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.sock.local_addr()
    }

    /// Consumes the listener, handing the underlying socket to whatever
    /// coroutine will drive `accept` on it.
    pub fn into_handle(self) -> SocketHandle {
        self.sock
    }
}

fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    let candidates: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();

    candidates
        .iter()
        .find(|addr| addr.is_ipv6())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("host {host:?} did not resolve to any address"),
            )
        })
}

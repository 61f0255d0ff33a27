//! Restartable suspension primitives.
//!
//! Each primitive is a coroutine bound to one descriptor and one
//! readiness interest. On every resume it consults the current tick's
//! readiness snapshot; if the descriptor is ready it performs its one
//! syscall and terminates with the result, otherwise it registers a watch
//! and yields the suspend marker. The enclosing coroutine keeps the retry
//! alive by delegating a fresh primitive on the next tick — primitives
//! are cheap to construct and carry no state worth preserving across a
//! suspension, with the partial-write offset living in [`WriteAll`].
//!
//! An empty read and any OS-level socket failure become
//! [`Fault`] values; they abort only the delegation chain that owns the
//! descriptor.

use crate::fault::Fault;
use crate::net::SocketHandle;
use crate::poll::Interest;
use crate::sched::{Context, Coroutine, Resume, Step, Value};

use std::io;
use std::rc::Rc;

/// Checks the socket's chain-ownership token, returning a protocol fault
/// when a second task chain touches a handle that is already in use.
fn claim(sock: &SocketHandle, cx: &Context<'_>) -> Result<(), Step> {
    if sock.claim(cx.chain_root()) {
        return Ok(());
    }

    log::error!(
        "socket fd {} used by two task chains (owner check failed in task {:?})",
        sock.descriptor(),
        cx.task(),
    );
    debug_assert!(false, "socket used by two task chains");

    Err(Step::Fail(Fault::Protocol(
        "socket used by two task chains",
    )))
}

/// Whether the error means "not ready yet, retry later".
fn transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// A single restartable receive.
///
/// Terminates with [`Value::Bytes`] holding up to `max` bytes. An empty
/// read means the peer closed and becomes [`Fault::PeerClosed`].
pub struct RecvOp {
    sock: Rc<SocketHandle>,
    max: usize,
}

impl RecvOp {
    /// Creates a receive operation reading at most `max` bytes.
    pub fn new(sock: Rc<SocketHandle>, max: usize) -> Self {
        Self { sock, max }
    }
}

impl Coroutine for RecvOp {
    fn resume(&mut self, cx: &mut Context<'_>, _input: Resume) -> Step {
        if let Err(fail) = claim(&self.sock, cx) {
            return fail;
        }

        let fd = self.sock.descriptor();

        if !cx.ready(fd, Interest::READ) {
            cx.watch(fd, Interest::READ);
            return Step::NotReady;
        }

        let mut buffer = vec![0u8; self.max];
        match self.sock.recv(&mut buffer) {
            Ok(0) => Step::Fail(Fault::PeerClosed),
            Ok(n) => {
                buffer.truncate(n);
                Step::Done(Value::Bytes(buffer))
            }
            Err(err) if transient(&err) => {
                cx.watch(fd, Interest::READ);
                Step::NotReady
            }
            Err(err) => Step::Fail(Fault::Io(err)),
        }
    }
}

/// A single restartable send of the unsent tail of a shared buffer.
///
/// Terminates with [`Value::Written`] carrying the (possibly partial)
/// byte count of one `send`. Retrying the remainder is the caller's job;
/// see [`WriteAll`].
pub struct SendOp {
    sock: Rc<SocketHandle>,
    data: Rc<Vec<u8>>,
    from: usize,
}

impl SendOp {
    /// Creates a send operation for `data[from..]`.
    pub fn new(sock: Rc<SocketHandle>, data: Rc<Vec<u8>>, from: usize) -> Self {
        Self { sock, data, from }
    }
}

impl Coroutine for SendOp {
    fn resume(&mut self, cx: &mut Context<'_>, _input: Resume) -> Step {
        if let Err(fail) = claim(&self.sock, cx) {
            return fail;
        }

        let fd = self.sock.descriptor();

        if !cx.ready(fd, Interest::WRITE) {
            cx.watch(fd, Interest::WRITE);
            return Step::NotReady;
        }

        match self.sock.send(&self.data[self.from..]) {
            Ok(0) => Step::Fail(Fault::PeerClosed),
            Ok(n) => Step::Done(Value::Written(n)),
            Err(err) if transient(&err) => {
                cx.watch(fd, Interest::WRITE);
                Step::NotReady
            }
            Err(err) => Step::Fail(Fault::Io(err)),
        }
    }
}

/// A single restartable accept.
///
/// Terminates with [`Value::Conn`] holding the accepted socket (already
/// non-blocking) and the peer address.
pub struct AcceptOp {
    sock: Rc<SocketHandle>,
}

impl AcceptOp {
    /// Creates an accept operation on a listening socket.
    pub fn new(sock: Rc<SocketHandle>) -> Self {
        Self { sock }
    }
}

impl Coroutine for AcceptOp {
    fn resume(&mut self, cx: &mut Context<'_>, _input: Resume) -> Step {
        if let Err(fail) = claim(&self.sock, cx) {
            return fail;
        }

        let fd = self.sock.descriptor();

        if !cx.ready(fd, Interest::READ) {
            cx.watch(fd, Interest::READ);
            return Step::NotReady;
        }

        match self.sock.accept() {
            Ok((client, addr)) => Step::Done(Value::Conn(client, addr)),
            Err(err) if transient(&err) => {
                cx.watch(fd, Interest::READ);
                Step::NotReady
            }
            Err(err) => Step::Fail(Fault::Io(err)),
        }
    }
}

/// Writes a whole buffer, re-delegating [`SendOp`] on the unsent
/// remainder until everything is flushed or the connection is lost.
///
/// A partial send is not an error; it just advances the offset. This is
/// the enclosing loop that keeps a suspended send retrying once per tick.
pub struct WriteAll {
    sock: Rc<SocketHandle>,
    data: Rc<Vec<u8>>,
    written: usize,
}

impl WriteAll {
    /// Creates a write of the full `data` buffer.
    pub fn new(sock: Rc<SocketHandle>, data: Vec<u8>) -> Self {
        Self {
            sock,
            data: Rc::new(data),
            written: 0,
        }
    }

    fn send_remainder(&self) -> Step {
        Step::Call(Box::new(SendOp::new(
            self.sock.clone(),
            self.data.clone(),
            self.written,
        )))
    }
}

impl Coroutine for WriteAll {
    fn resume(&mut self, _cx: &mut Context<'_>, input: Resume) -> Step {
        match input {
            Resume::Start => {
                if self.data.is_empty() {
                    return Step::Done(Value::Unit);
                }
                self.send_remainder()
            }

            // The send suspended; re-issue it at the same offset.
            Resume::NotReady => self.send_remainder(),

            Resume::Value(Value::Written(n)) => {
                self.written += n;
                if self.written >= self.data.len() {
                    Step::Done(Value::Unit)
                } else {
                    self.send_remainder()
                }
            }

            Resume::Fault(fault) => Step::Fail(fault),

            _ => {
                log::error!("write loop resumed with an unexpected value");
                Step::Fail(Fault::Protocol("write loop resumed with unexpected value"))
            }
        }
    }
}

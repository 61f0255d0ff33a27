//! Connection listener and echo handler coroutines.
//!
//! [`Acceptor`] waits for connections and spawns one handler task per
//! client; [`EchoHandler`] reads chunks and writes them straight back
//! until the peer goes away. Spawning is independent scheduling, never
//! delegation — a handler's fate cannot block or crash the acceptor.

use crate::fault::Fault;
use crate::net::{Listener, SocketHandle};
use crate::ops::{AcceptOp, RecvOp, WriteAll};
use crate::sched::{Context, Coroutine, Resume, Step, Value};

use std::net::SocketAddr;
use std::rc::Rc;

/// Read-chunk size used by the echo handler, matching the reference
/// server's receive buffer.
pub const RECV_CHUNK: usize = 8192;

/// Builds a handler coroutine for one accepted connection.
pub type HandlerFactory = Box<dyn FnMut(SocketHandle, SocketAddr) -> Box<dyn Coroutine>>;

/// The listening coroutine.
///
/// Loops forever: delegate an accept, spawn a handler for the new
/// connection as its own top-level task, delegate the next accept. A
/// failed accept is logged and the loop keeps going; only the bind/listen
/// phase (done earlier, in [`Listener::bind`]) is fatal.
pub struct Acceptor {
    sock: Rc<SocketHandle>,
    factory: HandlerFactory,
}

impl Acceptor {
    /// Creates an acceptor that hands each connection to `factory`.
    pub fn new<F>(listener: Listener, factory: F) -> Self
    where
        F: FnMut(SocketHandle, SocketAddr) -> Box<dyn Coroutine> + 'static,
    {
        Self {
            sock: Rc::new(listener.into_handle()),
            factory: Box::new(factory),
        }
    }

    /// Creates an acceptor that spawns an [`EchoHandler`] per connection.
    pub fn echo(listener: Listener) -> Self {
        Self::new(listener, |sock, _addr| -> Box<dyn Coroutine> {
            Box::new(EchoHandler::new(sock))
        })
    }

    fn next_accept(&self) -> Step {
        Step::Call(Box::new(AcceptOp::new(self.sock.clone())))
    }
}

impl Coroutine for Acceptor {
    fn resume(&mut self, cx: &mut Context<'_>, input: Resume) -> Step {
        match input {
            Resume::Start | Resume::NotReady => self.next_accept(),

            Resume::Value(Value::Conn(sock, addr)) => {
                log::debug!("accepted connection from {addr}");
                cx.spawn((self.factory)(sock, addr));
                self.next_accept()
            }

            // The listening socket stays usable after a failed accept
            // (e.g. the client reset before we got to it); keep serving.
            Resume::Fault(fault) => {
                log::warn!("accept failed: {fault}");
                self.next_accept()
            }

            _ => {
                log::error!("acceptor resumed with an unexpected value");
                Step::Fail(Fault::Protocol("acceptor resumed with unexpected value"))
            }
        }
    }
}

enum HandlerState {
    Reading,
    Writing,
}

/// The per-connection echo coroutine.
///
/// Alternates between reading one chunk and writing it back, delegating
/// the restartable primitives for both. A lost connection — an empty read
/// or any socket fault — is the normal way a connection ends; the handler
/// finishes silently and the socket closes when the task is destroyed.
pub struct EchoHandler {
    sock: Rc<SocketHandle>,
    chunk: usize,
    state: HandlerState,
}

impl EchoHandler {
    /// Creates a handler that echoes in [`RECV_CHUNK`]-byte chunks.
    pub fn new(sock: SocketHandle) -> Self {
        Self::with_chunk(sock, RECV_CHUNK)
    }

    /// Creates a handler with a custom read-chunk size.
    pub fn with_chunk(sock: SocketHandle, chunk: usize) -> Self {
        Self {
            sock: Rc::new(sock),
            chunk,
            state: HandlerState::Reading,
        }
    }

    fn next_read(&mut self) -> Step {
        self.state = HandlerState::Reading;
        Step::Call(Box::new(RecvOp::new(self.sock.clone(), self.chunk)))
    }
}

impl Coroutine for EchoHandler {
    fn resume(&mut self, _cx: &mut Context<'_>, input: Resume) -> Step {
        match input {
            Resume::Start => self.next_read(),

            // The pending read or write suspended; re-issue it.
            Resume::NotReady => match self.state {
                HandlerState::Reading => self.next_read(),
                HandlerState::Writing => {
                    log::error!("echo handler write suspended past its loop");
                    Step::Fail(Fault::Protocol("write suspended past its loop"))
                }
            },

            Resume::Value(Value::Bytes(data)) => {
                self.state = HandlerState::Writing;
                Step::Call(Box::new(WriteAll::new(self.sock.clone(), data)))
            }

            Resume::Value(Value::Unit) => self.next_read(),

            Resume::Fault(fault) if fault.is_connection_lost() => {
                log::debug!("connection closed ({fault})");
                Step::Done(Value::Unit)
            }

            Resume::Fault(fault) => Step::Fail(fault),

            _ => {
                log::error!("echo handler resumed with an unexpected value");
                Step::Fail(Fault::Protocol("echo handler resumed with unexpected value"))
            }
        }
    }
}

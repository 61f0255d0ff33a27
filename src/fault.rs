//! Fault taxonomy for the trampoline and its I/O primitives.
//!
//! Faults are ordinary values threaded through resume calls, not unwinding
//! exceptions. A primitive that hits a transport failure returns
//! [`Step::Fail`](crate::Step::Fail) with a [`Fault`], and the scheduler
//! re-injects that fault into the parent frame of the delegation chain.

use std::io;

use thiserror::Error;

/// A fault propagated along a delegation chain.
///
/// The transport variants both mean "the peer is gone": the chain that owns
/// the affected socket terminates, and nothing else is disturbed. Protocol
/// violations indicate a bug in coroutine composition and are escalated to
/// the top of the chain so the run loop can log them.
#[derive(Debug, Error)]
pub enum Fault {
    /// The peer closed the connection in an orderly fashion while an
    /// operation was outstanding.
    #[error("connection lost: peer closed")]
    PeerClosed,

    /// An OS-level socket failure during read, write, or accept.
    #[error("connection lost: {0}")]
    Io(#[source] io::Error),

    /// A coroutine was resumed with a value it cannot accept.
    ///
    /// This is a logic error in coroutine composition, never a runtime
    /// condition of a healthy server.
    #[error("coroutine protocol violation: {0}")]
    Protocol(&'static str),
}

impl Fault {
    /// Whether this fault means the connection is gone.
    ///
    /// Handlers treat a lost connection as a normal terminal outcome and
    /// end silently; any other fault is escalated.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Fault::PeerClosed | Fault::Io(_))
    }
}

impl From<io::Error> for Fault {
    fn from(err: io::Error) -> Self {
        Fault::Io(err)
    }
}

/// Returned by [`Trampoline::spawn`](crate::Trampoline::spawn) when the
/// configured limit on concurrent top-level tasks has been reached.
#[derive(Debug, Error)]
#[error("concurrent task limit reached ({0})")]
pub struct AtCapacity(pub usize);

use crate::fault::Fault;
use crate::net::SocketHandle;
use crate::sched::Context;

use std::net::SocketAddr;

/// Identifies a live task record inside the scheduler arena.
///
/// Ids are reused after a task is destroyed, so they are only meaningful
/// while the task they name is alive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TaskId(pub(crate) usize);

/// A value passed between coroutines on completion.
///
/// This is the tagged union that replaces a dynamic language's "whatever
/// the generator returned": each suspension primitive terminates with one
/// of these, and the scheduler injects it into the parent frame.
#[derive(Debug)]
pub enum Value {
    /// Completion with nothing to report.
    Unit,

    /// Bytes received from a socket. Never empty; an empty read is a
    /// [`Fault::PeerClosed`] instead.
    Bytes(Vec<u8>),

    /// Byte count accepted by a single send.
    Written(usize),

    /// An accepted connection and its peer address.
    Conn(SocketHandle, SocketAddr),
}

/// What a coroutine is resumed with.
#[derive(Debug)]
pub enum Resume {
    /// First resume after the coroutine was scheduled.
    Start,

    /// A delegated child completed with this value.
    Value(Value),

    /// A delegated child suspended on I/O; the enclosing coroutine decides
    /// how to keep the retry alive (normally by re-delegating a fresh
    /// restartable operation).
    NotReady,

    /// A delegated child failed; the fault is re-injected here instead of
    /// unwinding.
    Fault(Fault),
}

/// What a coroutine yields back to the trampoline.
pub enum Step {
    /// The computation is exhausted; the value goes to the parent frame,
    /// if any.
    Done(Value),

    /// Delegate to a child coroutine. The current task is pushed onto the
    /// child's parent chain and resumed with the child's final value or
    /// fault.
    Call(Box<dyn Coroutine>),

    /// Not ready; retry on a later tick. The marker is propagated
    /// synchronously into the parent frame.
    NotReady,

    /// Abort with a fault, to be re-injected into the parent frame.
    Fail(Fault),
}

/// A resumable unit of sequential computation.
///
/// A coroutine is advanced by the trampoline one [`Step`] at a time. It
/// never runs concurrently with another coroutine and never yields
/// implicitly; all scheduling is explicit through the returned step.
///
/// Implementations are state machines: each `resume` consumes the injected
/// [`Resume`] value, advances internal state, and yields the next step.
pub trait Coroutine {
    /// Advances the coroutine by one step.
    fn resume(&mut self, cx: &mut Context<'_>, input: Resume) -> Step;
}

/// A task record in the scheduler arena: the coroutine plus its parent
/// delegation link. Following `parent` links from any record yields the
/// proper call/return chain back to the top-level task.
pub(crate) struct TaskRecord {
    pub(crate) coro: Box<dyn Coroutine>,
    pub(crate) parent: Option<TaskId>,
}

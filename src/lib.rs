//! # Bounce
//!
//! **Bounce** is a single-threaded cooperative scheduler — a *trampoline* —
//! that drives non-blocking socket I/O for a concurrent TCP echo service.
//!
//! Unlike general-purpose runtimes, Bounce keeps the whole machinery in
//! plain sight: there are no worker threads, no wakers, and no preemption.
//! Concurrency is an illusion produced by resuming many suspended
//! coroutines in turn on one thread. Each coroutine advances in explicit
//! steps, delegates sub-work by yielding a child coroutine, and receives
//! results and faults as tagged values injected on its next resume.
//!
//! Bounce is built from the ground up with simplicity in mind, offering:
//!
//! - A **trampoline scheduler** with a FIFO run queue and explicit
//!   delegation chains (coroutine call/return without native stacks)
//! - **Restartable suspension primitives** for `recv`, `send`, and
//!   `accept` on non-blocking sockets
//! - A **readiness multiplexer** over `poll(2)` that blocks with a bounded
//!   timeout instead of spinning when no descriptor is ready
//! - A ready-made **echo listener and handler** for raw byte echo over
//!   dual-stack IPv6/IPv4 TCP
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bounce::{Acceptor, Builder, Listener};
//!
//! fn main() -> std::io::Result<()> {
//!     let listener = Listener::bind("localhost", 8869)?;
//!     let mut tramp = Builder::new().max_tasks(256).build();
//!
//!     tramp.spawn(Acceptor::echo(listener)).expect("task limit");
//!     tramp.run()
//! }
//! ```
//!
//! ## Modules
//!
//! - [`net`] — non-blocking socket handles and the listening-socket factory
//! - [`poll`] — readiness multiplexing over `poll(2)`
//! - [`sched`] — the trampoline scheduler, coroutine trait, and builder
//! - [`ops`] — restartable read/write/accept suspension primitives
//! - [`echo`] — the connection listener and echo handler coroutines
//!
//! ## A note on blocking
//!
//! The only suspension points are the I/O primitives. A coroutine never
//! yields implicitly, so CPU-bound work inside a handler starves every
//! other connection until it voluntarily suspends. This is inherent to the
//! execution model, not a bug to be patched with preemption.

mod utils;

pub mod echo;
pub mod fault;
pub mod net;
pub mod ops;
pub mod poll;
pub mod sched;

pub use echo::{Acceptor, EchoHandler};
pub use fault::{AtCapacity, Fault};
pub use net::{Listener, SocketHandle};
pub use poll::{Interest, Multiplexer, ReadySet, WatchSet};
pub use sched::{
    Builder, Context, Coroutine, Resume, Step, StopHandle, TaskId, Trampoline, Value,
};

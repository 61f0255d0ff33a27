use crate::poll::{Interest, ReadySet, WatchSet};
use crate::sched::{Coroutine, TaskId};

use std::os::fd::RawFd;

/// Per-resume view of the scheduler handed to a coroutine.
///
/// The context carries exactly what a coroutine may touch while it runs:
/// this tick's readiness snapshot, the watch set for the next poll, and a
/// spawn buffer for independent top-level tasks. Nothing here allows a
/// coroutine to mutate the run queue directly.
pub struct Context<'a> {
    ready: &'a ReadySet,
    watches: &'a mut WatchSet,
    spawns: &'a mut Vec<Box<dyn Coroutine>>,
    task: TaskId,
    root: TaskId,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        ready: &'a ReadySet,
        watches: &'a mut WatchSet,
        spawns: &'a mut Vec<Box<dyn Coroutine>>,
        task: TaskId,
        root: TaskId,
    ) -> Self {
        Self {
            ready,
            watches,
            spawns,
            task,
            root,
        }
    }

    /// Whether `fd` was reported ready for `interest` by this tick's poll.
    pub fn ready(&self, fd: RawFd, interest: Interest) -> bool {
        self.ready.contains(fd, interest)
    }

    /// Registers `fd`/`interest` for the next multiplexer poll.
    ///
    /// Watches last one tick; an operation that is still pending registers
    /// again on its next resume.
    pub fn watch(&mut self, fd: RawFd, interest: Interest) {
        self.watches.add(fd, interest);
    }

    /// Schedules a coroutine as an independent top-level task.
    ///
    /// This is spawning, not delegation: the new task has its own chain,
    /// and its completion or fault never reaches the spawning coroutine.
    /// Admission control applies when the scheduler drains the spawn
    /// buffer at the end of the tick; a rejected task is dropped.
    pub fn spawn(&mut self, coro: Box<dyn Coroutine>) {
        self.spawns.push(coro);
    }

    /// The task currently being resumed.
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// The top-level task of the current delegation chain.
    ///
    /// Stable for the chain's whole lifetime; socket handles use it as
    /// their ownership token.
    pub fn chain_root(&self) -> TaskId {
        self.root
    }
}

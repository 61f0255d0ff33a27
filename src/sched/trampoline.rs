use crate::fault::AtCapacity;
use crate::poll::{Multiplexer, ReadySet, WatchSet};
use crate::sched::builder::Builder;
use crate::sched::task::{Coroutine, Resume, Step, TaskId, TaskRecord};
use crate::sched::Context;
use crate::utils::Slab;

use std::collections::VecDeque;
use std::io;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// One queued resume: the task to run and the value or fault to inject.
struct ResumeStep {
    task: TaskId,
    input: Resume,
}

/// The trampoline scheduler.
///
/// A `Trampoline` owns every task record, the FIFO queue of ready resume
/// steps, and the readiness multiplexer. [`run`](Self::run) repeatedly
/// pops one step, resumes the coroutine it names, and routes the outcome:
/// completion values pop the delegation chain, delegation pushes it, and
/// faults are re-injected into the parent frame instead of unwinding.
///
/// All state is mutated only inside the single-threaded run loop; the one
/// cross-thread surface is the cooperative stop flag.
///
/// Insertion order into the queue is the sole fairness guarantee. Two
/// tasks whose descriptors become ready within the same multiplexer tick
/// are serviced in queue order, not in event-arrival order.
pub struct Trampoline {
    tasks: Slab<TaskRecord>,
    queue: VecDeque<ResumeStep>,
    spawns: Vec<Box<dyn Coroutine>>,

    mux: Multiplexer,
    watches: WatchSet,
    ready: ReadySet,

    stopped: Arc<AtomicBool>,
    poll_timeout: Duration,
    max_tasks: usize,

    /// Live top-level chains, bounded by `max_tasks`.
    roots: usize,
}

/// Requests a running trampoline to stop from another thread.
///
/// Cloneable and `Send`; obtained from
/// [`Trampoline::stop_handle`]. Stopping is cooperative: `run` returns
/// after finishing the step it is currently executing.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Requests the trampoline to stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Trampoline {
    /// Creates a trampoline with default configuration. Use
    /// [`Builder`] to tune the poll timeout or the task limit.
    pub fn new() -> Self {
        Builder::new().build()
    }

    pub(crate) fn from_builder(poll_timeout: Duration, max_tasks: usize) -> Self {
        Self {
            tasks: Slab::with_capacity(64),
            queue: VecDeque::with_capacity(64),
            spawns: Vec::new(),
            mux: Multiplexer::new(),
            watches: WatchSet::new(),
            ready: ReadySet::default(),
            stopped: Arc::new(AtomicBool::new(false)),
            poll_timeout,
            max_tasks,
            roots: 0,
        }
    }

    /// Schedules a coroutine as an independent top-level task.
    ///
    /// # Errors
    ///
    /// Returns [`AtCapacity`] when the configured limit on concurrent
    /// top-level tasks has been reached.
    pub fn spawn<C>(&mut self, coro: C) -> Result<TaskId, AtCapacity>
    where
        C: Coroutine + 'static,
    {
        if self.roots >= self.max_tasks {
            return Err(AtCapacity(self.max_tasks));
        }

        let id = TaskId(self.tasks.insert(TaskRecord {
            coro: Box::new(coro),
            parent: None,
        }));

        self.roots += 1;
        self.queue.push_back(ResumeStep {
            task: id,
            input: Resume::Start,
        });

        Ok(id)
    }

    /// Number of live top-level task chains.
    pub fn active_tasks(&self) -> usize {
        self.roots
    }

    /// Sets the cooperative stop flag; [`run`](Self::run) returns after
    /// finishing the current step. A stopped trampoline stays stopped.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// A cloneable, `Send` handle for stopping the trampoline from
    /// another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stopped.clone())
    }

    /// Runs the scheduler until stopped or until no live task remains.
    ///
    /// The loop processes ticks. A tick executes the resume steps that
    /// were queued when it began (steps queued during the tick run in the
    /// next one), admits deferred spawns, then polls the multiplexer over
    /// the watches registered by still-pending operations. A tick that
    /// completed no operation polls with the full bounded timeout, so an
    /// idle scheduler blocks in the multiplexer instead of spinning; a
    /// tick that made progress polls with a zero timeout and keeps going.
    ///
    /// A fault that reaches the top of a task chain is logged and the
    /// chain discarded; it never aborts the shared queue-processing loop.
    ///
    /// # Errors
    ///
    /// Returns an error only if the readiness multiplexer itself fails,
    /// which leaves the scheduler unable to make further progress.
    pub fn run(&mut self) -> io::Result<()> {
        while !self.stopped.load(Ordering::Acquire) {
            if self.queue.is_empty() && self.spawns.is_empty() && self.tasks.is_empty() {
                break;
            }

            let budget = self.queue.len();
            let mut progressed = false;

            for _ in 0..budget {
                let Some(step) = self.queue.pop_front() else {
                    break;
                };

                progressed |= self.execute(step.task, step.input);

                if self.stopped.load(Ordering::Acquire) {
                    return Ok(());
                }
            }

            progressed |= self.admit_spawns();

            let timeout = if progressed {
                Duration::ZERO
            } else {
                self.poll_timeout
            };

            let watches = mem::take(&mut self.watches);
            self.ready = self.mux.poll(&watches, timeout)?;
        }

        Ok(())
    }

    /// Executes one resume step, returning whether it made progress
    /// (completed or failed an operation, or issued a fresh delegation —
    /// as opposed to re-issuing a retry).
    ///
    /// A suspend marker from a delegated child is injected into the
    /// immediate parent frame synchronously, within this same step.
    fn execute(&mut self, mut task: TaskId, mut input: Resume) -> bool {
        loop {
            if self.tasks.get(task.0).is_none() {
                log::debug!("resume step for dead task {task:?}; dropping");
                return false;
            }

            let retry = matches!(input, Resume::NotReady);
            let root = self.chain_root(task);

            let step = {
                let Self {
                    tasks,
                    ready,
                    watches,
                    spawns,
                    ..
                } = self;

                match tasks.get_mut(task.0) {
                    Some(record) => {
                        let mut cx = Context::new(&*ready, watches, spawns, task, root);
                        record.coro.resume(&mut cx, input)
                    }
                    None => return false,
                }
            };

            match step {
                Step::Call(child) => {
                    let child_id = TaskId(self.tasks.insert(TaskRecord {
                        coro: child,
                        parent: Some(task),
                    }));

                    self.queue.push_back(ResumeStep {
                        task: child_id,
                        input: Resume::Start,
                    });

                    return !retry;
                }

                Step::Done(value) => {
                    let record = self.tasks.remove(task.0);

                    match record.parent {
                        Some(parent) => self.queue.push_back(ResumeStep {
                            task: parent,
                            input: Resume::Value(value),
                        }),
                        None => {
                            self.roots -= 1;
                            log::debug!("task {task:?} finished");
                        }
                    }

                    return true;
                }

                Step::Fail(fault) => {
                    let record = self.tasks.remove(task.0);

                    match record.parent {
                        Some(parent) => self.queue.push_back(ResumeStep {
                            task: parent,
                            input: Resume::Fault(fault),
                        }),
                        None => {
                            self.roots -= 1;
                            log::error!("task {task:?} terminated by unhandled fault: {fault}");
                        }
                    }

                    return true;
                }

                Step::NotReady => {
                    let record = self.tasks.remove(task.0);

                    match record.parent {
                        Some(parent) => {
                            task = parent;
                            input = Resume::NotReady;
                        }
                        None => {
                            self.roots -= 1;
                            log::error!(
                                "task {task:?} yielded a suspend marker with no parent chain; \
                                 dropping task"
                            );
                            return false;
                        }
                    }
                }
            }
        }
    }

    /// Admits deferred spawns from the tick that just ran, applying the
    /// task limit. Rejected tasks are dropped, which closes any socket
    /// they own.
    fn admit_spawns(&mut self) -> bool {
        let pending = mem::take(&mut self.spawns);
        let mut admitted = false;

        for coro in pending {
            if self.roots >= self.max_tasks {
                log::warn!(
                    "task limit reached ({}); dropping spawned task",
                    self.max_tasks
                );
                continue;
            }

            let id = TaskId(self.tasks.insert(TaskRecord { coro, parent: None }));
            self.roots += 1;
            self.queue.push_back(ResumeStep {
                task: id,
                input: Resume::Start,
            });
            admitted = true;
        }

        admitted
    }

    /// Walks parent links to the top-level task of `id`'s chain.
    fn chain_root(&self, mut id: TaskId) -> TaskId {
        while let Some(record) = self.tasks.get(id.0) {
            match record.parent {
                Some(parent) => id = parent,
                None => break,
            }
        }

        id
    }
}

impl Default for Trampoline {
    fn default() -> Self {
        Self::new()
    }
}

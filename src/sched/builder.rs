use super::Trampoline;

use std::time::Duration;

/// Builder for configuring and creating a [`Trampoline`].
///
/// # Examples
///
/// ```rust,ignore
/// let tramp = Builder::new()
///     .poll_timeout(Duration::from_millis(100))
///     .max_tasks(256)
///     .build();
/// ```
pub struct Builder {
    /// Upper bound on how long an idle tick blocks in the multiplexer.
    poll_timeout: Duration,

    /// Maximum concurrent top-level tasks.
    max_tasks: usize,
}

impl Builder {
    /// Creates a builder with default configuration: a 50 ms poll timeout
    /// and room for 1024 concurrent top-level tasks.
    pub fn new() -> Self {
        Self {
            poll_timeout: Duration::from_millis(50),
            max_tasks: 1024,
        }
    }

    /// Sets the bounded timeout for idle multiplexer polls.
    ///
    /// This caps how long the scheduler can sleep when nothing is ready,
    /// and therefore how quickly it notices an external stop request.
    /// Tens to low hundreds of milliseconds is the useful range.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Caps the number of concurrent top-level tasks (the listener plus
    /// one per connection). Spawns past the limit are refused, which
    /// keeps a connection flood from growing the task arena without
    /// bound.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn max_tasks(mut self, n: usize) -> Self {
        assert!(n > 0, "max_tasks must be > 0");

        self.max_tasks = n;
        self
    }

    /// Builds the trampoline with the configured options.
    pub fn build(self) -> Trampoline {
        Trampoline::from_builder(self.poll_timeout, self.max_tasks)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

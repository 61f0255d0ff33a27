use super::{Event, ReadySet, WatchSet};

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, nfds_t, pollfd};
use std::io;
use std::time::Duration;

/// A `poll(2)`-backed readiness multiplexer.
///
/// Each call to [`poll`](Self::poll) takes the full descriptor set for
/// this tick, so there is no registration state to keep in sync with the
/// scheduler; the only thing reused between calls is the `pollfd` buffer.
///
/// With an empty watch set the call degrades to a plain bounded sleep,
/// which is exactly what an idle scheduler wants.
pub struct Multiplexer {
    pollfds: Vec<pollfd>,
}

impl Multiplexer {
    /// Creates a multiplexer.
    pub fn new() -> Self {
        Self {
            pollfds: Vec::with_capacity(64),
        }
    }

    /// Polls `watches` for readiness, blocking up to `timeout`.
    ///
    /// Timeout expiry yields an empty [`ReadySet`], not an error; so does
    /// an interrupting signal. Error and hangup conditions are folded into
    /// both readiness directions so the owning operation runs its syscall
    /// and surfaces the failure itself.
    pub fn poll(&mut self, watches: &WatchSet, timeout: Duration) -> io::Result<ReadySet> {
        self.pollfds.clear();
        for watch in watches.entries() {
            let mut events = 0i16;
            if watch.interest.read {
                events |= POLLIN;
            }
            if watch.interest.write {
                events |= POLLOUT;
            }

            self.pollfds.push(pollfd {
                fd: watch.fd,
                events,
                revents: 0,
            });
        }

        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

        let n = unsafe {
            libc::poll(
                self.pollfds.as_mut_ptr(),
                self.pollfds.len() as nfds_t,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(ReadySet::default());
            }
            return Err(err);
        }

        let mut events = Vec::with_capacity(n as usize);
        for pfd in &self.pollfds {
            if pfd.revents == 0 {
                continue;
            }

            let fault = pfd.revents & (POLLERR | POLLHUP | POLLNVAL) != 0;

            events.push(Event {
                fd: pfd.fd,
                readable: pfd.revents & POLLIN != 0 || fault,
                writable: pfd.revents & POLLOUT != 0 || fault,
            });
        }

        Ok(ReadySet::from_events(events))
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}

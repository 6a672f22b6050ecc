// SDB - Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The seam between the runtime thread and whoever drives the debugger while it is
//! suspended.

use std::{
    fmt,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::Debugger;

/// Blocks and releases the runtime thread.
///
/// [`Debugger`] calls `suspend` on the runtime thread when it breaks, without holding any
/// of its own locks, and calls `resume` from `resume`/`step_*` on whichever thread the
/// driver uses.
pub trait DebuggerBackend: Send + Sync {
    /// Blocks until [`DebuggerBackend::resume`] is called.
    fn suspend(&self, debugger: &Debugger);

    /// Releases the thread blocked in [`DebuggerBackend::suspend`].
    ///
    /// A resume that arrives before the runtime thread actually blocks must not be lost:
    /// the next `suspend` returns immediately instead.
    fn resume(&self);
}

#[derive(Debug, Default)]
struct HandOff {
    suspended: bool,
    resume_requested: bool,
    suspensions: u64,
}

/// Parks the runtime thread on a condition variable while a driver on another thread
/// inspects the cache and issues commands.
#[derive(Debug, Default)]
pub struct ThreadedBackend {
    state: Mutex<HandOff>,
    signal: Condvar,
}

impl ThreadedBackend {
    /// Creates a backend with no thread suspended.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the runtime thread is parked and no resume is pending.
    pub fn is_suspended(&self) -> bool {
        let state = self.state.lock();
        state.suspended && !state.resume_requested
    }

    /// Number of times the runtime thread was parked.
    pub fn suspensions(&self) -> u64 {
        self.state.lock().suspensions
    }

    /// Waits until the runtime thread is parked with no resume pending.
    ///
    /// Returns `false` on timeout.
    pub fn wait_until_suspended(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !(state.suspended && !state.resume_requested) {
            if self.signal.wait_until(&mut state, deadline).timed_out() {
                return state.suspended && !state.resume_requested;
            }
        }
        true
    }
}

impl DebuggerBackend for ThreadedBackend {
    fn suspend(&self, _debugger: &Debugger) {
        let mut state = self.state.lock();
        state.suspended = true;
        state.suspensions += 1;
        debug!(suspension = state.suspensions, "runtime thread parked");
        self.signal.notify_all();

        while !state.resume_requested {
            self.signal.wait(&mut state);
        }

        state.suspended = false;
        state.resume_requested = false;
        self.signal.notify_all();
        debug!("runtime thread released");
    }

    fn resume(&self) {
        let mut state = self.state.lock();
        state.resume_requested = true;
        self.signal.notify_all();
    }
}

/// Runs a driver closure on the runtime thread itself until it resumes.
///
/// This is the single-threaded model of a host that keeps rendering its debugger UI from
/// inside the break: the closure is one frame of that loop and is called repeatedly until
/// it calls [`Debugger::resume`] or one of the step commands.
pub struct InlineBackend<F> {
    driver: Mutex<F>,
    resumed: AtomicBool,
    frames: AtomicU64,
}

impl<F> fmt::Debug for InlineBackend<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineBackend")
            .field("resumed", &self.resumed.load(Ordering::Relaxed))
            .field("frames", &self.frames.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<F> InlineBackend<F>
where
    F: FnMut(&Debugger) + Send,
{
    /// Wraps a driver frame.
    pub fn new(driver: F) -> Self {
        Self {
            driver: Mutex::new(driver),
            resumed: AtomicBool::new(false),
            frames: AtomicU64::new(0),
        }
    }

    /// Total number of driver frames run.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl<F> DebuggerBackend for InlineBackend<F>
where
    F: FnMut(&Debugger) + Send,
{
    fn suspend(&self, debugger: &Debugger) {
        let mut driver = self.driver.lock();
        while !self.resumed.swap(false, Ordering::SeqCst) {
            self.frames.fetch_add(1, Ordering::Relaxed);
            trace!("running inline driver frame");
            (*driver)(debugger);
        }
    }

    fn resume(&self) {
        self.resumed.store(true, Ordering::SeqCst);
    }
}

//! Cancellation gate
//!
//! A four-state cell shared between the extraction worker and its caller.
//! The caller flips Unpacking to Interrupt; the worker observes this at
//! well-defined checkpoints (before each copied chunk, after each file) and
//! acknowledges by moving to Interrupted, waking the caller blocked in
//! `interrupt`. The gate is the only mutable state shared across threads.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No run in progress.
    Ready,
    /// Worker is extracting.
    Unpacking,
    /// Interruption requested, not yet observed.
    Interrupt,
    /// Interruption observed; terminal for this run.
    Interrupted,
}

#[derive(Debug)]
struct Inner {
    state: GateState,
    interrupt_disabled: bool,
}

#[derive(Debug)]
pub struct CancellationGate {
    inner: Mutex<Inner>,
    acked: Condvar,
}

impl Default for CancellationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationGate {
    pub fn new() -> Self {
        CancellationGate {
            inner: Mutex::new(Inner {
                state: GateState::Ready,
                interrupt_disabled: false,
            }),
            acked: Condvar::new(),
        }
    }

    pub fn state(&self) -> GateState {
        self.inner.lock().unwrap().state
    }

    /// Start a fresh run: any previous terminal state is reset.
    pub fn begin(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = GateState::Unpacking;
        inner.interrupt_disabled = false;
    }

    /// End the run normally. A run that was interrupted keeps its terminal
    /// state until the next `begin`.
    pub fn finish(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == GateState::Unpacking {
            inner.state = GateState::Ready;
        }
    }

    /// Request interruption and block until the worker acknowledges it or
    /// the timeout elapses. Returns whether the interruption takes effect.
    pub fn interrupt(&self, timeout: Duration) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            GateState::Interrupted => return true,
            GateState::Interrupt => {}
            GateState::Unpacking if !inner.interrupt_disabled => {
                inner.state = GateState::Interrupt;
            }
            // Ready, or interruption disabled for a critical section.
            _ => return false,
        }

        let deadline = Instant::now() + timeout;
        while inner.state == GateState::Interrupt {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let (guard, _timeout) = self.acked.wait_timeout(inner, remaining).unwrap();
            inner = guard;
        }
        inner.state == GateState::Interrupted
    }

    /// Disable (or re-enable) interruption around a critical section.
    /// Rejected once interruption has already begun.
    pub fn set_interrupt_disabled(&self, disabled: bool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.state, GateState::Interrupt | GateState::Interrupted) {
            return false;
        }
        inner.interrupt_disabled = disabled;
        true
    }

    /// Worker checkpoint. Observes a pending interrupt, acknowledges it and
    /// returns true; also true once already interrupted.
    pub fn check(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            GateState::Interrupt => {
                inner.state = GateState::Interrupted;
                self.acked.notify_all();
                true
            }
            GateState::Interrupted => true,
            _ => false,
        }
    }
}

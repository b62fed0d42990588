//! Wall-clock access and interruptible sleeping.
//!
//! All scheduling compares local wall-clock instants, since the active
//! window is defined by the time of day at the trap's location.

use chrono::{Local, NaiveDateTime};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::cell::Cell;
use std::rc::Rc;

/// An operator interrupt was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operator interrupt")
    }
}

impl std::error::Error for Interrupted {}

/// Source of time for the scheduler and session loop.
pub trait Clock {
    /// Current local wall-clock time.
    fn now(&self) -> NaiveDateTime;

    /// Block until `deadline`. Returns early with `Interrupted` if an
    /// operator interrupt arrives while waiting.
    fn sleep_until(&self, deadline: NaiveDateTime) -> Result<(), Interrupted>;

    /// Non-blocking check for a pending interrupt.
    fn poll_interrupt(&self) -> Result<(), Interrupted> {
        Ok(())
    }
}

/// The real clock. Interrupts arrive on a channel fed by the Ctrl-C handler.
pub struct SystemClock {
    interrupts: Receiver<()>,
}

impl SystemClock {
    pub fn new(interrupts: Receiver<()>) -> Self {
        Self { interrupts }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn sleep_until(&self, deadline: NaiveDateTime) -> Result<(), Interrupted> {
        let remaining = match (deadline - self.now()).to_std() {
            Ok(d) if !d.is_zero() => d,
            // Deadline already passed
            _ => return self.poll_interrupt(),
        };

        match self.interrupts.recv_timeout(remaining) {
            Ok(()) => Err(Interrupted),
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                // No handler installed; fall back to a plain sleep.
                std::thread::sleep(remaining);
                Ok(())
            }
        }
    }

    fn poll_interrupt(&self) -> Result<(), Interrupted> {
        match self.interrupts.try_recv() {
            Ok(()) => Err(Interrupted),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(()),
        }
    }
}

/// A simulated clock. Sleeping jumps straight to the deadline.
///
/// Clones share the same time, so a fake camera can advance the clock the
/// session loop is reading.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<NaiveDateTime>>,
    interrupt_at: Rc<Cell<Option<NaiveDateTime>>>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
            interrupt_at: Rc::new(Cell::new(None)),
        }
    }

    /// Move time forward by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        self.now.set(self.now.get() + delta);
    }

    pub fn set(&self, instant: NaiveDateTime) {
        self.now.set(instant);
    }

    /// Deliver an interrupt to the first sleep that reaches `at`.
    pub fn interrupt_at(&self, at: NaiveDateTime) {
        self.interrupt_at.set(Some(at));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.now.get()
    }

    fn sleep_until(&self, deadline: NaiveDateTime) -> Result<(), Interrupted> {
        if let Some(at) = self.interrupt_at.get() {
            if deadline >= at {
                self.interrupt_at.set(None);
                self.now.set(self.now.get().max(at));
                return Err(Interrupted);
            }
        }
        self.now.set(self.now.get().max(deadline));
        Ok(())
    }

    fn poll_interrupt(&self) -> Result<(), Interrupted> {
        match self.interrupt_at.get() {
            Some(at) if self.now.get() >= at => {
                self.interrupt_at.set(None);
                Err(Interrupted)
            }
            _ => Ok(()),
        }
    }
}

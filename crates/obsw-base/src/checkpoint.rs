//! Cooperative suspend point for worker threads.
//!
//! A thread calls [`Checkpoint::pass`] once per loop iteration; a
//! controller thread flips the state with [`Checkpoint::suspend`] /
//! [`Checkpoint::resume`]. Suspension therefore only happens at the
//! well-defined point between iterations, never mid-operation.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    Running,
    Suspending,
}

#[derive(Debug)]
pub struct Checkpoint {
    state: Mutex<CheckpointState>,
    changed: Condvar,
}

impl Checkpoint {
    pub fn new(initial: CheckpointState) -> Self {
        Self {
            state: Mutex::new(initial),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> CheckpointState {
        *self.state.lock().unwrap()
    }

    /// Blocks while the checkpoint is suspended; returns immediately when
    /// running.
    pub fn pass(&self) {
        let mut state = self.state.lock().unwrap();
        while *state == CheckpointState::Suspending {
            state = self.changed.wait(state).unwrap();
        }
    }

    /// Like [`pass`](Self::pass) with an upper wait bound. Returns `true`
    /// when the checkpoint was passed, `false` on timeout.
    pub fn pass_timeout(&self, timeout: Duration) -> bool {
        let state = self.state.lock().unwrap();
        let (state, result) = self
            .changed
            .wait_timeout_while(state, timeout, |s| *s == CheckpointState::Suspending)
            .unwrap();
        drop(state);
        !result.timed_out()
    }

    pub fn resume(&self) {
        *self.state.lock().unwrap() = CheckpointState::Running;
        self.changed.notify_all();
    }

    pub fn suspend(&self) {
        *self.state.lock().unwrap() = CheckpointState::Suspending;
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new(CheckpointState::Suspending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn running_checkpoint_does_not_block() {
        let cp = Checkpoint::new(CheckpointState::Running);
        cp.pass();
        assert_eq!(cp.state(), CheckpointState::Running);
    }

    #[test]
    fn suspended_checkpoint_times_out() {
        let cp = Checkpoint::default();
        assert!(!cp.pass_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn resume_releases_waiter() {
        let cp = Arc::new(Checkpoint::default());
        let passed = Arc::new(AtomicBool::new(false));

        let worker = {
            let cp = Arc::clone(&cp);
            let passed = Arc::clone(&passed);
            std::thread::spawn(move || {
                cp.pass();
                passed.store(true, Ordering::Release);
            })
        };

        assert!(!passed.load(Ordering::Acquire));
        cp.resume();
        worker.join().unwrap();
        assert!(passed.load(Ordering::Acquire));
    }
}

//! Reentrant lock serializing access to a ZRTP engine
//!
//! The engine asks its host to enter and leave a critical section through
//! the `synch_enter`/`synch_leave` callbacks, possibly while the host is
//! already inside one on the same thread (an inbound message that triggers
//! a send, a timeout that installs secrets). [`EngineLock`] therefore counts
//! the nesting depth of its owning thread instead of deadlocking.

use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Owner {
    thread: Option<ThreadId>,
    depth: usize,
}

/// Recursive enter/leave lock keyed by thread
#[derive(Debug, Default)]
pub struct EngineLock {
    owner: Mutex<Owner>,
    released: Condvar,
}

impl EngineLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the critical section, blocking while another thread holds it
    pub fn enter(&self) {
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        loop {
            match owner.thread {
                None => {
                    owner.thread = Some(me);
                    owner.depth = 1;
                    return;
                }
                Some(holder) if holder == me => {
                    owner.depth += 1;
                    return;
                }
                Some(_) => self.released.wait(&mut owner),
            }
        }
    }

    /// Leave one level; returns `false` if the caller did not hold the lock
    pub fn leave(&self) -> bool {
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        if owner.thread != Some(me) {
            return false;
        }
        owner.depth -= 1;
        if owner.depth == 0 {
            owner.thread = None;
            drop(owner);
            self.released.notify_one();
        }
        true
    }

    /// Enter and return a guard that leaves on drop
    pub fn lock(&self) -> EngineLockGuard<'_> {
        self.enter();
        EngineLockGuard { lock: self }
    }

    /// Whether the current thread is inside the critical section
    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner.lock().thread == Some(thread::current().id())
    }

    /// Nesting depth of the current holder
    pub fn depth(&self) -> usize {
        self.owner.lock().depth
    }
}

/// Scope of one [`EngineLock::lock`]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct EngineLockGuard<'a> {
    lock: &'a EngineLock,
}

impl Drop for EngineLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.leave();
    }
}

//! Timer service for ZRTP retransmission timeouts
//!
//! A ZRTP engine needs exactly one single-shot, cancellable timeout per
//! transport for its retransmission schedule (T1/T2 in RFC 6189). All
//! transports of one endpoint share a single [`TimerService`]:
//!
//! - Each transport holds a [`TimerRegistration`]. The registration count
//!   is the service's reference count: the first registration starts the
//!   polling thread and dropping the last one stops and joins it.
//! - [`TimerRegistration::activate`] arms (or re-arms) the owner's single
//!   entry and returns its generation. [`TimerRegistration::cancel`]
//!   disarms it.
//! - The polling thread sleeps on a condition variable while nothing is
//!   scheduled and otherwise wakes at the next deadline or after one tick,
//!   whichever comes first. Expired entries are dispatched synchronously on
//!   the timer thread, outside the service lock, to
//!   [`TimeoutHandler::on_timeout`].
//!
//! An entry that was collected for dispatch can race with a `cancel` on
//! another thread. Handlers receive the generation of the entry that
//! fired and must ignore it if it is not the generation they armed last.
//!
//! In manual mode no thread is started and [`TimerService::poll`] fires
//! expired entries against an injected [`Clock`], which makes timeout
//! behaviour deterministic in tests.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::config::TimerConfig;
use crate::error::Error;
use crate::Result;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Receiver of expired timeouts
pub trait TimeoutHandler: Send + Sync {
    /// Called on the timer thread (or inside [`TimerService::poll`])
    fn on_timeout(&self, generation: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerMode {
    Threaded,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    deadline: Instant,
    generation: u64,
    owner: u64,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    deadline: Instant,
    generation: u64,
}

struct TimerState {
    /// Deadlines; stale entries are skipped when popped
    heap: BinaryHeap<Reverse<HeapEntry>>,
    pending: HashMap<u64, Pending>,
    handlers: HashMap<u64, Weak<dyn TimeoutHandler>>,
    next_owner: u64,
    next_generation: u64,
    /// Live registrations
    instances: usize,
    /// Bumped on every start and stop; a thread exits once it changes
    epoch: u64,
    thread: Option<JoinHandle<()>>,
}

/// Shared deadline scheduler
pub struct TimerService {
    clock: Arc<dyn Clock>,
    tick: Duration,
    mode: TimerMode,
    state: Mutex<TimerState>,
    wakeup: Condvar,
}

impl TimerService {
    /// Threaded service on the system clock
    pub fn new(config: TimerConfig) -> Arc<Self> {
        Self::build(Arc::new(SystemClock), config.tick(), TimerMode::Threaded)
    }

    /// Threaded service on a custom clock
    pub fn with_clock(config: TimerConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        Self::build(clock, config.tick(), TimerMode::Threaded)
    }

    /// Service without a thread, driven by [`TimerService::poll`]
    pub fn manual(clock: Arc<dyn Clock>) -> Arc<Self> {
        Self::build(clock, TimerConfig::default().tick(), TimerMode::Manual)
    }

    fn build(clock: Arc<dyn Clock>, tick: Duration, mode: TimerMode) -> Arc<Self> {
        Arc::new(Self {
            clock,
            tick,
            mode,
            state: Mutex::new(TimerState {
                heap: BinaryHeap::new(),
                pending: HashMap::new(),
                handlers: HashMap::new(),
                next_owner: 1,
                next_generation: 1,
                instances: 0,
                epoch: 0,
                thread: None,
            }),
            wakeup: Condvar::new(),
        })
    }

    /// Register a timeout owner, starting the polling thread if needed
    pub fn register(self: &Arc<Self>, handler: Weak<dyn TimeoutHandler>) -> Result<TimerRegistration> {
        let mut state = self.state.lock();

        if self.mode == TimerMode::Threaded && state.thread.is_none() {
            state.epoch += 1;
            let epoch = state.epoch;
            let service = Arc::clone(self);
            let handle = thread::Builder::new()
                .name("zrtp-timer".to_string())
                .spawn(move || service.run(epoch))
                .map_err(|e| Error::Timer(format!("Failed to start timer thread: {}", e)))?;
            state.thread = Some(handle);
            debug!("ZRTP timer thread started");
        }

        let owner = state.next_owner;
        state.next_owner += 1;
        state.handlers.insert(owner, handler);
        state.instances += 1;
        trace!("Timer owner {} registered, {} instances", owner, state.instances);

        Ok(TimerRegistration {
            service: Arc::clone(self),
            owner,
        })
    }

    /// Fire every expired entry; returns how many handlers were called
    pub fn poll(&self) -> usize {
        let now = self.clock.now();
        let mut due = Vec::new();
        {
            let mut state = self.state.lock();
            while let Some(Reverse(entry)) = state.heap.peek().copied() {
                if entry.deadline > now {
                    break;
                }
                state.heap.pop();
                let current = state
                    .pending
                    .get(&entry.owner)
                    .map_or(false, |p| p.generation == entry.generation);
                if !current {
                    continue;
                }
                state.pending.remove(&entry.owner);
                if let Some(handler) = state.handlers.get(&entry.owner) {
                    due.push((handler.clone(), entry.generation));
                }
            }
        }

        let mut fired = 0;
        for (handler, generation) in due {
            if let Some(handler) = handler.upgrade() {
                handler.on_timeout(generation);
                fired += 1;
            }
        }
        fired
    }

    /// Number of live registrations
    pub fn instance_count(&self) -> usize {
        self.state.lock().instances
    }

    /// Number of armed entries
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether the polling thread is running
    pub fn is_running(&self) -> bool {
        self.state.lock().thread.is_some()
    }

    /// Earliest armed deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.lock().pending.values().map(|p| p.deadline).min()
    }

    fn activate(&self, owner: u64, delay: Duration) -> u64 {
        let mut state = self.state.lock();
        let generation = state.next_generation;
        state.next_generation += 1;

        let deadline = self.clock.now() + delay;
        state.pending.insert(owner, Pending { deadline, generation });
        state.heap.push(Reverse(HeapEntry {
            deadline,
            generation,
            owner,
        }));
        self.wakeup.notify_all();
        generation
    }

    fn cancel(&self, owner: u64) -> bool {
        // the heap entry goes stale and is skipped when popped
        self.state.lock().pending.remove(&owner).is_some()
    }

    fn is_pending(&self, owner: u64) -> bool {
        self.state.lock().pending.contains_key(&owner)
    }

    fn unregister(&self, owner: u64) {
        let handle = {
            let mut state = self.state.lock();
            state.pending.remove(&owner);
            if state.handlers.remove(&owner).is_none() {
                return;
            }
            state.instances -= 1;
            trace!("Timer owner {} unregistered, {} instances", owner, state.instances);

            if state.instances > 0 || state.thread.is_none() {
                return;
            }

            // last registration gone: stop the thread
            state.epoch += 1;
            state.heap.clear();
            self.wakeup.notify_all();
            state.thread.take()
        };

        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // dropped from inside a timeout callback; the loop exits on its own
                debug!("ZRTP timer thread stopping (detached)");
                return;
            }
            if handle.join().is_err() {
                warn!("ZRTP timer thread panicked");
            }
            debug!("ZRTP timer thread stopped");
        }
    }

    fn run(self: Arc<Self>, epoch: u64) {
        loop {
            {
                let mut state = self.state.lock();
                if state.epoch != epoch {
                    break;
                }
                if state.pending.is_empty() {
                    self.wakeup.wait(&mut state);
                    continue;
                }

                let now = self.clock.now();
                let next = state.pending.values().map(|p| p.deadline).min();
                if let Some(next) = next {
                    if next > now {
                        let wait = (next - now).min(self.tick);
                        self.wakeup.wait_for(&mut state, wait);
                    }
                }
                if state.epoch != epoch {
                    break;
                }
            }
            self.poll();
        }
    }
}

/// A timeout owner's handle on the [`TimerService`]
///
/// Dropping the registration cancels its entry and releases its reference
/// on the service.
pub struct TimerRegistration {
    service: Arc<TimerService>,
    owner: u64,
}

impl TimerRegistration {
    /// Arm the single timer, replacing a pending one; returns its generation
    pub fn activate(&self, delay: Duration) -> u64 {
        self.service.activate(self.owner, delay)
    }

    /// Disarm the timer; returns whether one was pending
    pub fn cancel(&self) -> bool {
        self.service.cancel(self.owner)
    }

    pub fn is_pending(&self) -> bool {
        self.service.is_pending(self.owner)
    }

    pub fn service(&self) -> &Arc<TimerService> {
        &self.service
    }
}

impl Drop for TimerRegistration {
    fn drop(&mut self) {
        self.service.unregister(self.owner);
    }
}

impl std::fmt::Debug for TimerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerRegistration")
            .field("owner", &self.owner)
            .finish()
    }
}

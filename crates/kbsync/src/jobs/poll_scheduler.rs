//! Poll scheduler: re-fetch the snapshot while work is in flight.
//!
//! Active exactly while the store holds an optimistic or non-terminal
//! record. Driven by a predicate over the store, not by UI lifecycle.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::reconciler::Reconciler;

struct RunningLoop {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    running: Option<RunningLoop>,
    next_generation: u64,
}

pub struct PollScheduler {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl PollScheduler {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        match self.slot.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Poll scheduler lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn is_active(&self) -> bool {
        let slot = self.lock_slot();
        slot.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Starts the polling loop. A no-op while one is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut slot = self.lock_slot();
        self.start_locked(&mut slot)
    }

    /// Stops the polling loop. Safe to call repeatedly; no tick fires after
    /// this returns.
    pub fn stop(&self) {
        let mut slot = self.lock_slot();
        Self::stop_locked(&mut slot);
    }

    /// Starts or stops according to the store. Returns whether polling
    /// should be active.
    pub fn evaluate(&self) -> bool {
        let mut slot = self.lock_slot();
        let active = self.reconciler.store().has_active_work();
        if active {
            self.start_locked(&mut slot);
        } else {
            Self::stop_locked(&mut slot);
        }
        active
    }

    fn start_locked(&self, slot: &mut Slot) -> bool {
        if slot
            .running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            return false;
        }

        let generation = slot.next_generation;
        slot.next_generation += 1;

        let reconciler = Arc::clone(&self.reconciler);
        let slot_ref = Arc::clone(&self.slot);
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            run_poll_loop(reconciler, interval, slot_ref, generation).await;
        });

        info!("Polling started (every {:?})", self.interval);
        slot.running = Some(RunningLoop { generation, handle });
        true
    }

    fn stop_locked(slot: &mut Slot) {
        if let Some(running) = slot.running.take() {
            if !running.handle.is_finished() {
                info!("Polling stopped");
            }
            running.handle.abort();
        }
    }

    /// Watches the store and re-evaluates on every published snapshot.
    ///
    /// The observer holds only a weak reference and ends once the scheduler
    /// is dropped (at the next store change) or when aborted.
    pub fn spawn_observer(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut changes = self.reconciler.store().subscribe();
        tokio::spawn(async move {
            if let Some(scheduler) = weak.upgrade() {
                scheduler.evaluate();
            }
            while changes.changed().await.is_ok() {
                changes.borrow_and_update();
                match weak.upgrade() {
                    Some(scheduler) => {
                        scheduler.evaluate();
                    }
                    None => break,
                }
            }
            debug!("Poll scheduler observer finished");
        })
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        let mut slot = self.lock_slot();
        Self::stop_locked(&mut slot);
    }
}

async fn run_poll_loop(
    reconciler: Arc<Reconciler>,
    interval: Duration,
    slot: Arc<Mutex<Slot>>,
    generation: u64,
) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer.tick().await; // skip immediate first tick

    loop {
        timer.tick().await;

        if let Err(e) = reconciler.refresh().await {
            debug!("Poll tick failed: {}", e);
        }

        if retire_if_idle(&reconciler, &slot, generation) {
            info!("No active jobs, polling idle");
            break;
        }
    }
}

/// Decides under the slot lock so a concurrent `start()` either sees this
/// loop still registered or finds the slot empty.
fn retire_if_idle(reconciler: &Reconciler, slot: &Mutex<Slot>, generation: u64) -> bool {
    let mut guard = match slot.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    if reconciler.store().has_active_work() {
        return false;
    }
    if guard
        .running
        .as_ref()
        .is_some_and(|running| running.generation == generation)
    {
        guard.running = None;
    }
    true
}

//! Renewal timing wheel
//!
//! A fixed-size circular bucket array driven by a single background
//! worker that advances one tick per `tick_duration`, sleeping the
//! deficit between the next tick's scheduled time and elapsed time so
//! the schedule self-corrects against drift. The worker is the only
//! writer of bucket contents; producers hand tasks off through a
//! channel and never touch wheel state. Tasks live in a slab arena and
//! buckets hold slab indices.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::bail;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use cassava_common::error::CassavaError;
use cassava_common::now_millis;
use cassava_store::StoreError;

use super::task::{RenewHandle, RenewOp, RenewTask};
use crate::cas::ScriptEngine;
use crate::config::RenewalConfig;

/// Bucket index and extra full revolutions for a task placed
/// `ticks_ahead` ticks in the future while the wheel is at
/// `current_tick`
pub(crate) fn compute_slot(ticks_ahead: u64, current_tick: u64, wheel_size: usize) -> (usize, u64) {
    let size = wheel_size as u64;
    let rounds = (ticks_ahead - 1) / size;
    let index = ((ticks_ahead + current_tick - 1) % size) as usize;
    (index, rounds)
}

struct SlabEntry {
    task: RenewTask,
    rounds: u64,
}

/// Growable arena of scheduled tasks; free slots are recycled
#[derive(Default)]
struct TaskSlab {
    entries: Vec<Option<SlabEntry>>,
    free: Vec<usize>,
    live: usize,
}

impl TaskSlab {
    fn insert(&mut self, task: RenewTask, rounds: u64) -> usize {
        self.live += 1;
        let entry = SlabEntry { task, rounds };
        match self.free.pop() {
            Some(slot) => {
                self.entries[slot] = Some(entry);
                slot
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        }
    }

    fn get_mut(&mut self, slot: usize) -> Option<&mut SlabEntry> {
        self.entries.get_mut(slot).and_then(|e| e.as_mut())
    }

    fn remove(&mut self, slot: usize) -> Option<SlabEntry> {
        let entry = self.entries.get_mut(slot).and_then(|e| e.take());
        if entry.is_some() {
            self.live -= 1;
            self.free.push(slot);
        }
        entry
    }

    fn len(&self) -> usize {
        self.live
    }
}

/// Schedules recurring lease renewals on a timing wheel.
///
/// Explicit lifecycle: construct, `start`, `schedule` from any task,
/// `stop`. Scheduling fails fast when renewal is disabled or the wheel
/// is not running.
pub struct RenewalScheduler {
    config: RenewalConfig,
    engine: Arc<ScriptEngine>,
    tx: mpsc::UnboundedSender<RenewTask>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<RenewTask>>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RenewalScheduler {
    pub fn new(config: RenewalConfig, engine: Arc<ScriptEngine>) -> Result<Self, CassavaError> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            engine,
            tx,
            rx: Mutex::new(Some(rx)),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RenewalConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the background worker
    pub fn start(&self) {
        if !self.config.enabled {
            info!("lease renewal disabled, wheel not started");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            info!("renewal wheel already running");
            return;
        }
        let Some(rx) = self.rx.lock().take() else {
            self.running.store(false, Ordering::SeqCst);
            warn!("renewal wheel cannot be restarted after stop");
            return;
        };

        let worker = Worker {
            config: self.config.clone(),
            engine: self.engine.clone(),
            rx,
            running: self.running.clone(),
            buckets: vec![Vec::new(); self.config.wheel_size],
            slab: TaskSlab::default(),
        };

        info!(
            "renewal wheel started: {} buckets x {}ms",
            self.config.wheel_size, self.config.tick_duration_ms
        );
        *self.worker.lock() = Some(tokio::spawn(worker.run()));
    }

    /// Stop the background worker
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
        info!("renewal wheel stopped");
    }

    /// Hand a task to the wheel. Never blocks and never touches bucket
    /// state; fails fast when renewal is disabled or the wheel is not
    /// running.
    pub fn schedule(&self, task: RenewTask) -> anyhow::Result<RenewHandle> {
        if !self.config.enabled {
            bail!(CassavaError::RenewalDisabled);
        }
        if !self.is_running() {
            bail!(CassavaError::RenewalStopped);
        }
        let handle = task.handle();
        debug!(
            "scheduling renewal of '{}' in {}ms",
            task.lease.name, task.renew_threshold_ms
        );
        if self.tx.send(task).is_err() {
            bail!(CassavaError::RenewalStopped);
        }
        Ok(handle)
    }
}

struct Worker {
    config: RenewalConfig,
    engine: Arc<ScriptEngine>,
    rx: mpsc::UnboundedReceiver<RenewTask>,
    running: Arc<AtomicBool>,
    buckets: Vec<Vec<usize>>,
    slab: TaskSlab,
}

impl Worker {
    async fn run(mut self) {
        let tick_duration = Duration::from_millis(self.config.tick_duration_ms);
        let start = tokio::time::Instant::now();
        let mut tick: u64 = 0;

        while self.running.load(Ordering::SeqCst) {
            // sleep the deficit to the next tick's scheduled time
            let next = start + Duration::from_millis(self.config.tick_duration_ms * (tick + 1));
            let now = tokio::time::Instant::now();
            if next > now {
                tokio::time::sleep_until(next).await;
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let began = tokio::time::Instant::now();
            self.drain_pending(tick);
            self.process_bucket(tick).await;
            let elapsed = began.elapsed();
            if elapsed > tick_duration {
                warn!(
                    "renewal wheel lagging: tick {} took {:?}, tick duration is {:?}; \
                     consider a larger tick duration or auto-init base",
                    tick, elapsed, tick_duration
                );
            }
            tick += 1;
        }
        debug!("renewal wheel worker exited at tick {}", tick);
    }

    fn ticks_ahead(&self, renew_threshold_ms: u64) -> u64 {
        (renew_threshold_ms / self.config.tick_duration_ms).max(1)
    }

    fn place(&mut self, task: RenewTask, placement_tick: u64) {
        let ticks_ahead = self.ticks_ahead(task.renew_threshold_ms);
        let (index, rounds) = compute_slot(ticks_ahead, placement_tick, self.config.wheel_size);
        let slot = self.slab.insert(task, rounds);
        self.buckets[index].push(slot);
    }

    fn drain_pending(&mut self, tick: u64) {
        while let Ok(task) = self.rx.try_recv() {
            if task.is_removed() {
                continue;
            }
            self.place(task, tick);
        }
        gauge!("cassava_renewal_tasks_alive").set(self.slab.len() as f64);
    }

    async fn process_bucket(&mut self, tick: u64) {
        let index = (tick % self.config.wheel_size as u64) as usize;
        let slots = std::mem::take(&mut self.buckets[index]);
        let mut waiting = Vec::new();

        for slot in slots {
            let Some(entry) = self.slab.get_mut(slot) else {
                continue;
            };
            if entry.task.is_removed() {
                self.slab.remove(slot);
                counter!("cassava_renewal_drops_total").increment(1);
                continue;
            }
            if entry.rounds > 0 {
                entry.rounds -= 1;
                waiting.push(slot);
                continue;
            }

            let Some(entry) = self.slab.remove(slot) else {
                continue;
            };
            let mut task = entry.task;
            match renew_task(&self.engine, &mut task).await {
                Ok(true) => {
                    counter!("cassava_renewals_total").increment(1);
                    // recurring lease: re-enqueue relative to the next tick
                    self.place(task, tick + 1);
                }
                Ok(false) => {
                    counter!("cassava_renewal_drops_total").increment(1);
                    debug!(
                        "lease '{}' renewal rejected, presumed lost to another owner",
                        task.lease.name
                    );
                }
                Err(error) => {
                    counter!("cassava_renewal_drops_total").increment(1);
                    warn!("lease '{}' renewal error: {}", task.lease.name, error);
                }
            }
        }

        self.buckets[index].extend(waiting);
        gauge!("cassava_renewal_tasks_alive").set(self.slab.len() as f64);
    }
}

/// Execute one renewal and, on success, advance the task's deadline
async fn renew_task(engine: &ScriptEngine, task: &mut RenewTask) -> Result<bool, StoreError> {
    let now = now_millis();
    let new_deadline = now + task.lease_ms as i64;
    let renewed = match &task.op {
        RenewOp::ValueLease { holder_token } => {
            engine
                .renew_value_lease(
                    &task.lease.store_key,
                    holder_token,
                    task.lease_ms,
                    &task.trace_token,
                )
                .await?
        }
        RenewOp::FieldDeadline { field } => {
            engine
                .renew_field_deadline(
                    &task.lease.store_key,
                    field,
                    task.deadline_ms,
                    new_deadline,
                    &task.trace_token,
                )
                .await?
        }
    };
    if renewed {
        task.deadline_ms = new_deadline;
        task.issued_at_ms = now;
    }
    Ok(renewed)
}

//! Periodic task runner for the telemetry loop.
//!
//! Every recurring activity on the device (three sampling tasks, the
//! display refresh, the telemetry dispatch) runs as an independent
//! periodic task with its own cadence. A tick whose previous invocation
//! is still in flight is skipped, never queued: overlapping hardware
//! transactions on one channel corrupt the reading, and overlapping sends
//! would break the at-most-one-in-flight dispatch policy. A fault or
//! panic inside a task is caught at the task boundary and the task simply
//! runs again on its next tick.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::errors::{IntervalOutOfRange, TaskError};

/// Dispatch-cadence configuration shared between the remote command
/// handler (single writer) and the scheduler (reader, once per tick).
/// Atomic assignment is enough: writes are rare and a reader lagging by
/// one tick is tolerated.
#[derive(Debug)]
pub struct DispatchConfig {
    interval_ms: AtomicU64,
    min_ms: u64,
    max_ms: u64,
}

impl DispatchConfig {
    pub fn new(initial_ms: u64, min_ms: u64, max_ms: u64) -> Result<Self, IntervalOutOfRange> {
        if initial_ms < min_ms || initial_ms > max_ms {
            return Err(IntervalOutOfRange {
                requested: initial_ms as i64,
                min: min_ms,
                max: max_ms,
            });
        }
        Ok(DispatchConfig {
            interval_ms: AtomicU64::new(initial_ms),
            min_ms,
            max_ms,
        })
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms())
    }

    /// Atomically swap the dispatch interval. Out-of-bounds requests leave
    /// the current value untouched and report what was rejected.
    pub fn set_interval_ms(&self, requested: i64) -> Result<u64, IntervalOutOfRange> {
        if requested < self.min_ms as i64 || requested > self.max_ms as i64 {
            return Err(IntervalOutOfRange {
                requested,
                min: self.min_ms,
                max: self.max_ms,
            });
        }
        let ms = requested as u64;
        self.interval_ms.store(ms, Ordering::SeqCst);
        Ok(ms)
    }
}

/// How a periodic task derives its next period.
pub enum Cadence {
    /// Fixed for the process lifetime.
    Fixed(Duration),
    /// Re-read from the shared dispatch configuration on every tick.
    Shared(Arc<DispatchConfig>),
}

impl Cadence {
    fn current(&self) -> Duration {
        match self {
            Cadence::Fixed(period) => *period,
            Cadence::Shared(config) => config.interval(),
        }
    }
}

/// Coarse pause switch for the sampling tasks. The dispatcher raises it
/// around the aggregator snapshot so no sampling tick starts mid-readout.
#[derive(Clone, Default)]
pub struct SamplingGate {
    paused: Arc<AtomicBool>,
}

impl SamplingGate {
    pub fn new() -> Self {
        SamplingGate::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

const TASK_IDLE: u8 = 0;
const TASK_RUNNING: u8 = 1;

/// Per-task Idle/Running state machine. One invocation at a time; a tick
/// that finds the task Running is dropped.
#[derive(Clone, Default)]
pub struct TaskGuard {
    state: Arc<AtomicU8>,
}

impl TaskGuard {
    pub fn new() -> Self {
        TaskGuard::default()
    }

    /// Move Idle -> Running. Returns the permit that moves it back on
    /// drop, or None if an invocation is already in flight.
    pub fn try_begin(&self) -> Option<TaskPermit> {
        self.state
            .compare_exchange(TASK_IDLE, TASK_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| TaskPermit {
                state: self.state.clone(),
            })
    }
}

pub struct TaskPermit {
    state: Arc<AtomicU8>,
}

impl Drop for TaskPermit {
    fn drop(&mut self) {
        self.state.store(TASK_IDLE, Ordering::SeqCst);
    }
}

/// Owns the task table. Tasks run until `signal_shutdown`; `join` then
/// waits for the loops to stop and for in-flight invocations (an ongoing
/// publish, for instance) to finish on their own terms.
pub struct Scheduler {
    notify: Arc<Notify>,
    stopping: Arc<AtomicBool>,
    inflight: Arc<AtomicUsize>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            notify: Arc::new(Notify::new()),
            stopping: Arc::new(AtomicBool::new(false)),
            inflight: Arc::new(AtomicUsize::new(0)),
            handles: Vec::new(),
        }
    }

    /// Add a periodic task. The job closure is called on every accepted
    /// tick and must do its work inside the returned future (the future
    /// runs in its own spawned task, where faults and panics are caught).
    pub fn spawn_periodic<F, Fut>(
        &mut self,
        name: &'static str,
        cadence: Cadence,
        gate: Option<SamplingGate>,
        mut job: F,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let notify = self.notify.clone();
        let stopping = self.stopping.clone();
        let inflight = self.inflight.clone();
        let guard = TaskGuard::new();

        let handle = tokio::spawn(async move {
            debug!("Task '{}' started", name);
            let shutdown = notify.notified();
            tokio::pin!(shutdown);

            loop {
                if stopping.load(Ordering::SeqCst) {
                    break;
                }

                tokio::select! {
                    _ = sleep(cadence.current()) => {}
                    _ = &mut shutdown => break,
                }

                if gate.as_ref().map_or(false, SamplingGate::is_paused) {
                    debug!("Task '{}' paused, tick skipped", name);
                    continue;
                }

                let permit = match guard.try_begin() {
                    Some(permit) => permit,
                    None => {
                        debug!("Task '{}' still running, tick skipped", name);
                        continue;
                    }
                };

                let invocation = job();
                inflight.fetch_add(1, Ordering::SeqCst);
                let inflight = inflight.clone();
                tokio::spawn(async move {
                    match AssertUnwindSafe(invocation).catch_unwind().await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!("Task '{}' failed: {}", name, e),
                        Err(_) => error!("Task '{}' panicked, resuming on next tick", name),
                    }
                    drop(permit);
                    inflight.fetch_sub(1, Ordering::SeqCst);
                });
            }

            info!("Task '{}' stopped", name);
        });

        self.handles.push(handle);
    }

    /// Ask every task loop to stop after its current tick.
    pub fn signal_shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Wait for the task loops to stop, then for in-flight invocations to
    /// drain. Nothing is force-aborted.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Task loop failed during shutdown: {:?}", e);
            }
        }
        while self.inflight.load(Ordering::SeqCst) > 0 {
            sleep(Duration::from_millis(25)).await;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_config_enforces_bounds_at_creation() {
        assert!(DispatchConfig::new(10000, 5000, 60000).is_ok());
        assert!(DispatchConfig::new(4999, 5000, 60000).is_err());
        assert!(DispatchConfig::new(60001, 5000, 60000).is_err());
    }

    #[test]
    fn set_interval_accepts_inclusive_bounds() {
        let config = DispatchConfig::new(10000, 5000, 60000).unwrap();
        assert_eq!(config.set_interval_ms(5000).unwrap(), 5000);
        assert_eq!(config.set_interval_ms(60000).unwrap(), 60000);
        assert_eq!(config.interval_ms(), 60000);
    }

    #[test]
    fn rejected_interval_leaves_config_unchanged() {
        let config = DispatchConfig::new(10000, 5000, 60000).unwrap();
        for requested in [0, -1, -5000, 4999, 60001, i64::MAX] {
            let err = config.set_interval_ms(requested).unwrap_err();
            assert_eq!(err.requested, requested);
            assert_eq!(config.interval_ms(), 10000);
        }
    }

    #[test]
    fn task_guard_admits_one_invocation() {
        let guard = TaskGuard::new();
        let permit = guard.try_begin().expect("idle task accepts the tick");
        assert!(guard.try_begin().is_none());

        drop(permit);
        assert!(guard.try_begin().is_some());
    }

    #[tokio::test]
    async fn periodic_task_ticks_until_shutdown() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();

        let task_count = count.clone();
        scheduler.spawn_periodic(
            "counter",
            Cadence::Fixed(Duration::from_millis(10)),
            None,
            move || {
                let count = task_count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        );

        sleep(Duration::from_millis(120)).await;
        scheduler.signal_shutdown();
        scheduler.join().await;

        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn paused_gate_skips_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let gate = SamplingGate::new();
        gate.pause();

        let mut scheduler = Scheduler::new();
        let task_count = count.clone();
        scheduler.spawn_periodic(
            "gated",
            Cadence::Fixed(Duration::from_millis(10)),
            Some(gate.clone()),
            move || {
                let count = task_count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        );

        sleep(Duration::from_millis(80)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        gate.resume();
        sleep(Duration::from_millis(80)).await;
        scheduler.signal_shutdown();
        scheduler.join().await;

        assert!(count.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn slow_invocation_drops_overlapping_ticks() {
        let started = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();

        let task_started = started.clone();
        scheduler.spawn_periodic(
            "slow",
            Cadence::Fixed(Duration::from_millis(10)),
            None,
            move || {
                let started = task_started.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(500)).await;
                    Ok(())
                }
            },
        );

        sleep(Duration::from_millis(150)).await;
        // Every tick after the first found the task Running and was dropped.
        assert_eq!(started.load(Ordering::SeqCst), 1);

        scheduler.signal_shutdown();
        scheduler.join().await;
    }

    #[tokio::test]
    async fn failing_job_does_not_stop_the_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();

        let task_count = count.clone();
        scheduler.spawn_periodic(
            "flaky",
            Cadence::Fixed(Duration::from_millis(10)),
            None,
            move || {
                let count = task_count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err(TaskError("transient driver error".to_string()))
                }
            },
        );

        sleep(Duration::from_millis(120)).await;
        scheduler.signal_shutdown();
        scheduler.join().await;

        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    fn broken_driver() -> Result<(), TaskError> {
        panic!("sensor driver bug");
    }

    #[tokio::test]
    async fn panicking_job_does_not_stop_the_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();

        let task_count = count.clone();
        scheduler.spawn_periodic(
            "faulty",
            Cadence::Fixed(Duration::from_millis(10)),
            None,
            move || {
                let count = task_count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    broken_driver()
                }
            },
        );

        sleep(Duration::from_millis(120)).await;
        scheduler.signal_shutdown();
        scheduler.join().await;

        // The task kept ticking after the first panic.
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn shared_cadence_follows_config_updates() {
        let config = Arc::new(DispatchConfig::new(5000, 5000, 60000).unwrap());
        let cadence = Cadence::Shared(config.clone());
        assert_eq!(cadence.current(), Duration::from_millis(5000));

        config.set_interval_ms(30000).unwrap();
        assert_eq!(cadence.current(), Duration::from_millis(30000));
    }
}

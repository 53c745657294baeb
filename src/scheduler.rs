//! The live schedule of resources.
//!
//! The [`Scheduler`] maps each resource number to one recurring job.  A job
//! is a small async loop that runs its [`RetrievalTask`] on the blocking
//! pool, waits for it to return, then sleeps for the resource's frequency
//! before the next tick.  Because the sleep starts only after the tick has
//! completed, two ticks of the same resource can never overlap.
//!
//! Cancelling a job stops future ticks.  A tick that is already running is
//! left to finish so the storage sink never sees a half-written instance.
//!
//! All map mutations happen under one short lock that never does I/O;
//! logging happens after the lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::resource::{Resource, ResourceNumber};
use crate::retrieval::{RetrievalContext, RetrievalTask};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("resource {0} has a polling frequency of zero")]
    InvalidFrequency(ResourceNumber),

    #[error("resource {0} has a UTC offset of {1} minutes")]
    InvalidOffset(ResourceNumber, i32),
}

/// Result of [`Scheduler::start_or_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Newly scheduled.
    Started,
    /// An existing schedule was cancelled and replaced.
    Replaced,
    /// The resource is inactive; any existing schedule was removed.
    Inactive,
}

/// Cancellable handle to one resource's recurring job.
struct JobHandle {
    cancel: watch::Sender<bool>,
    busy: Arc<AtomicBool>,
}

impl JobHandle {
    /// Stop future ticks.  Returns `false` when a tick is in flight; that
    /// tick still runs to completion.
    fn cancel(&self) -> bool {
        self.cancel.send_replace(true);
        !self.busy.load(Ordering::SeqCst)
    }
}

struct ScheduledEntry {
    resource: Resource,
    handle: JobHandle,
}

pub struct Scheduler {
    entries: Mutex<HashMap<ResourceNumber, ScheduledEntry>>,
    ctx: RetrievalContext,
    runtime: Handle,
    live_jobs: Arc<AtomicUsize>,
}

impl Scheduler {
    /// Jobs are spawned on `runtime`; their ticks run on its blocking pool.
    pub fn new(ctx: RetrievalContext, runtime: Handle) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ctx,
            runtime,
            live_jobs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Schedule `resource`, replacing any schedule it already has.
    ///
    /// An inactive or invalid resource ends up unscheduled.  The first tick
    /// runs immediately.
    pub fn start_or_update(&self, resource: Resource) -> Result<StartOutcome, SchedulerError> {
        let number = resource.number;
        let period = resource.period();

        let (previous, result) = {
            let mut entries = self.entries.lock();
            let previous = entries.remove(&number).map(|old| old.handle.cancel());

            let result = if !resource.active {
                Ok(StartOutcome::Inactive)
            } else if period.is_zero() {
                Err(SchedulerError::InvalidFrequency(number))
            } else if !resource.location.has_valid_offset() {
                Err(SchedulerError::InvalidOffset(
                    number,
                    resource.location.utc_offset_minutes,
                ))
            } else {
                let handle = self.spawn_job(resource.clone(), period);
                entries.insert(number, ScheduledEntry { resource, handle });
                Ok(if previous.is_some() {
                    StartOutcome::Replaced
                } else {
                    StartOutcome::Started
                })
            };
            (previous, result)
        };

        if previous == Some(false) {
            warn!(resource = number, "previous schedule cancelled while a tick was running");
        }
        match &result {
            Ok(StartOutcome::Inactive) => info!(resource = number, "resource is not active; not scheduled"),
            Ok(outcome) => info!(resource = number, every = ?period, ?outcome, "retrieval scheduled"),
            Err(e) => warn!(resource = number, "not scheduled: {e}"),
        }
        result
    }

    /// Unschedule a resource.  Returns `false` if it was not scheduled.
    pub fn stop(&self, number: ResourceNumber) -> bool {
        let cancelled = self
            .entries
            .lock()
            .remove(&number)
            .map(|entry| entry.handle.cancel());

        match cancelled {
            None => {
                debug!(resource = number, "stop requested for unscheduled resource");
                false
            }
            Some(clean) => {
                if !clean {
                    warn!(resource = number, "could not cancel the running tick; it will finish first");
                }
                info!(resource = number, "retrieval stopped");
                true
            }
        }
    }

    pub fn is_scheduled(&self, number: ResourceNumber) -> bool {
        self.entries.lock().contains_key(&number)
    }

    /// Scheduled resource numbers, ascending.
    pub fn scheduled(&self) -> Vec<ResourceNumber> {
        let mut numbers: Vec<_> = self.entries.lock().keys().copied().collect();
        numbers.sort_unstable();
        numbers
    }

    /// The resource record a schedule was created from.
    pub fn snapshot(&self, number: ResourceNumber) -> Option<Resource> {
        self.entries.lock().get(&number).map(|e| e.resource.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Job loops still running, including cancelled ones finishing a tick.
    pub fn live_jobs(&self) -> usize {
        self.live_jobs.load(Ordering::SeqCst)
    }

    /// Cancel every schedule.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        let count = drained.len();
        for (_, entry) in drained {
            entry.handle.cancel();
        }
        info!(count, "all retrievals cancelled");
    }

    fn spawn_job(&self, resource: Resource, period: Duration) -> JobHandle {
        let (cancel, cancelled) = watch::channel(false);
        let busy = Arc::new(AtomicBool::new(false));
        let job = Job {
            task: RetrievalTask::new(resource.clone(), self.ctx.clone()),
            resource,
            ctx: self.ctx.clone(),
            period,
            cancelled,
            busy: busy.clone(),
            _live: LiveGuard::new(self.live_jobs.clone()),
        };
        self.runtime.spawn(job.run());
        JobHandle { cancel, busy }
    }
}

/// Counts a job loop as live until dropped.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Job {
    task: RetrievalTask,
    resource: Resource,
    ctx: RetrievalContext,
    period: Duration,
    cancelled: watch::Receiver<bool>,
    busy: Arc<AtomicBool>,
    _live: LiveGuard,
}

impl Job {
    /// Fixed-delay loop: tick, wait for it, sleep, repeat.
    async fn run(mut self) {
        let number = self.resource.number;

        loop {
            if *self.cancelled.borrow_and_update() {
                break;
            }

            self.busy.store(true, Ordering::SeqCst);
            let failures = self.task.consecutive_failures();
            let mut task = self.task;
            let joined = tokio::task::spawn_blocking(move || {
                let outcome = task.tick();
                (task, outcome)
            })
            .await;
            self.busy.store(false, Ordering::SeqCst);

            self.task = match joined {
                Ok((task, outcome)) => {
                    debug!(resource = number, ?outcome, "tick finished");
                    task
                }
                Err(e) => {
                    error!(resource = number, failures, "tick panicked: {e}; continuing with a fresh task");
                    RetrievalTask::with_failures(self.resource.clone(), self.ctx.clone(), failures)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                _ = self.cancelled.changed() => break,
            }
        }

        debug!(resource = number, "retrieval job ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::fetch::{Fetch, FetchError, InstancePayload, ResourceInstance};
    use crate::resource::ResourceKind;
    use crate::retrieval::tests::{
        context, resource, MemoryStorage, RecordingNotifier, ScriptedFetcher, Step,
    };

    fn scheduler_with(fetcher: Arc<dyn Fetch>) -> Scheduler {
        let ctx = context(
            fetcher,
            Arc::new(MemoryStorage::default()),
            Arc::new(RecordingNotifier::default()),
            3,
        );
        Scheduler::new(ctx, Handle::current())
    }

    fn scheduler() -> Scheduler {
        scheduler_with(Arc::new(ScriptedFetcher::always(Step::Ok)))
    }

    async fn eventually(what: &str, cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn inactive_resource_is_not_scheduled() {
        let s = scheduler();
        let mut r = resource(1, ResourceKind::WeatherCamera);
        r.active = false;

        assert_eq!(s.start_or_update(r), Ok(StartOutcome::Inactive));
        assert!(!s.is_scheduled(1));
        assert_eq!(s.live_jobs(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deactivating_unschedules() {
        let s = scheduler();
        let mut r = resource(2, ResourceKind::WeatherCamera);
        assert_eq!(s.start_or_update(r.clone()), Ok(StartOutcome::Started));

        r.active = false;
        assert_eq!(s.start_or_update(r), Ok(StartOutcome::Inactive));

        assert!(!s.is_scheduled(2));
        eventually("old job to end", || s.live_jobs() == 0).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_replaces_the_schedule() {
        let s = scheduler();
        let mut r = resource(3, ResourceKind::WeatherCamera);
        s.start_or_update(r.clone()).unwrap();

        r.frequency_secs = 10;
        assert_eq!(s.start_or_update(r), Ok(StartOutcome::Replaced));

        assert_eq!(s.len(), 1);
        assert_eq!(s.snapshot(3).unwrap().frequency_secs, 10);
        eventually("one live job", || s.live_jobs() == 1).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_updates_keep_one_poller() {
        let s = scheduler();
        for freq in 1..=20 {
            let mut r = resource(4, ResourceKind::WeatherStation);
            r.frequency_secs = freq;
            s.start_or_update(r).unwrap();
            assert_eq!(s.len(), 1);
        }
        eventually("one live job", || s.live_jobs() == 1).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_unknown_is_a_noop() {
        let s = scheduler();
        assert!(!s.stop(42));
        assert!(s.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_removes_and_ends_job() {
        let s = scheduler();
        s.start_or_update(resource(5, ResourceKind::WeatherCamera)).unwrap();

        assert!(s.stop(5));
        assert!(!s.is_scheduled(5));
        eventually("job to end", || s.live_jobs() == 0).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn zero_frequency_is_rejected() {
        let s = scheduler();
        let mut r = resource(6, ResourceKind::WeatherCamera);
        s.start_or_update(r.clone()).unwrap();

        r.frequency_secs = 0;
        assert_eq!(
            s.start_or_update(r),
            Err(SchedulerError::InvalidFrequency(6))
        );
        assert!(!s.is_scheduled(6));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_tick_runs_immediately() {
        let fetcher = Arc::new(ScriptedFetcher::always(Step::Ok));
        let s = scheduler_with(fetcher.clone());
        let mut r = resource(7, ResourceKind::WeatherCamera);
        r.frequency_secs = 3600;

        s.start_or_update(r).unwrap();

        eventually("first fetch", || {
            fetcher.calls.load(Ordering::SeqCst) == 1
        })
        .await;
        s.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_tick_keeps_the_failure_count() {
        let fetcher = Arc::new(ScriptedFetcher::new([Step::Io, Step::Io, Step::Panic], Step::Io));
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = context(
            fetcher.clone(),
            Arc::new(MemoryStorage::default()),
            notifier.clone(),
            3,
        );
        let s = Scheduler::new(ctx, Handle::current());
        let mut r = resource(8, ResourceKind::WeatherCamera);
        r.frequency_secs = 1;

        s.start_or_update(r).unwrap();

        // Two failures, the panic, then the third failure alerts.
        eventually("alert after the panic", || notifier.alerts.lock().len() == 1).await;
        s.stop(8);
        assert!(fetcher.calls.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn out_of_range_offset_is_rejected() {
        let s = scheduler();
        let mut r = resource(12, ResourceKind::WeatherCamera);
        s.start_or_update(r.clone()).unwrap();

        r.location.utc_offset_minutes = 2_000_000_000;
        assert_eq!(
            s.start_or_update(r),
            Err(SchedulerError::InvalidOffset(12, 2_000_000_000))
        );
        assert!(!s.is_scheduled(12));
        eventually("old job to end", || s.live_jobs() == 0).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_starts_leave_exactly_one_schedule() {
        let s = Arc::new(scheduler());
        let mut joins = Vec::new();
        for freq in [5, 10] {
            let s = s.clone();
            joins.push(tokio::task::spawn_blocking(move || {
                let mut r = resource(9, ResourceKind::WeatherCamera);
                r.frequency_secs = freq;
                s.start_or_update(r)
            }));
        }
        for j in joins {
            j.await.unwrap().unwrap();
        }

        assert_eq!(s.scheduled(), vec![9]);
        let freq = s.snapshot(9).unwrap().frequency_secs;
        assert!(freq == 5 || freq == 10);
        eventually("one live job", || s.live_jobs() == 1).await;
    }

    /// Sleeps inside every fetch and records the peak overlap.
    struct SlowFetcher {
        running: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Fetch for SlowFetcher {
        fn fetch(&self, resource: &Resource) -> Result<Option<ResourceInstance>, FetchError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(300));
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(ResourceInstance::new(
                resource.number,
                InstancePayload::Text("slow".into()),
            )))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ticks_of_one_resource_never_overlap() {
        let fetcher = Arc::new(SlowFetcher {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });
        let s = scheduler_with(fetcher.clone());
        let mut r = resource(10, ResourceKind::WeatherCamera);
        r.frequency_secs = 1;

        s.start_or_update(r).unwrap();
        eventually("two ticks", || fetcher.calls.load(Ordering::SeqCst) >= 2).await;
        s.stop(10);

        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_during_tick_lets_it_finish() {
        let fetcher = Arc::new(SlowFetcher {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });
        let s = scheduler_with(fetcher.clone());
        s.start_or_update(resource(11, ResourceKind::WeatherCamera)).unwrap();

        eventually("tick to start", || fetcher.running.load(Ordering::SeqCst) == 1).await;
        assert!(s.stop(11));

        eventually("job to end", || s.live_jobs() == 0).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1, "in-flight tick completed");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_cancels_everything() {
        let s = scheduler();
        for n in [1, 2, 3] {
            s.start_or_update(resource(n, ResourceKind::WeatherCamera)).unwrap();
        }
        assert_eq!(s.scheduled(), vec![1, 2, 3]);

        s.shutdown();

        assert!(s.is_empty());
        eventually("jobs to end", || s.live_jobs() == 0).await;
    }
}

//! Repeating tasks bound to a plugin.
//!
//! A [`RepeatingTask`] is a handle that starts a timer loop when it is
//! activated and cancels it when its owner releases it. The loop runs on a
//! tokio runtime: either the one captured with [`RepeatingTask::on_runtime`]
//! or the runtime current at activation time.
//!
//! Live tasks are visible through
//! [`HandleRegistry::scheduled_handles`](crate::HandleRegistry::scheduled_handles).

use crate::error::HandleError;
use crate::handle::{ActivationSlot, Handle};
use crate::host::PluginId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// One scheduler tick. Schedules given in ticks are multiples of this.
pub const TICK: Duration = Duration::from_millis(50);

/// When and where a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSchedule {
    /// Wait before the first run.
    pub delay: Duration,
    /// Time between runs. Zero means every tick.
    pub period: Duration,
    /// Run on the timer task itself. When `false` every run is handed to
    /// the blocking pool.
    pub sync: bool,
}

impl TaskSchedule {
    /// Runs immediately and then every `period`, on the timer task.
    pub fn every(period: Duration) -> Self {
        Self {
            delay: Duration::ZERO,
            period,
            sync: true,
        }
    }

    /// Builds a schedule from tick counts.
    pub fn from_ticks(delay: u64, period: u64) -> Self {
        Self {
            delay: TICK * delay as u32,
            period: TICK * period as u32,
            sync: true,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Runs the action on the blocking pool instead of the timer task.
    pub fn off_thread(mut self) -> Self {
        self.sync = false;
        self
    }

    fn interval(&self) -> Duration {
        if self.period.is_zero() {
            TICK
        } else {
            self.period
        }
    }
}

impl Default for TaskSchedule {
    fn default() -> Self {
        Self::every(TICK)
    }
}

/// The work a [`RepeatingTask`] performs on every run.
pub trait TaskAction: Send + Sync + 'static {
    fn run(&self);
}

impl<F> TaskAction for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn run(&self) {
        self()
    }
}

struct Runner<A> {
    action: A,
    lock: Mutex<()>,
    runs: AtomicU64,
}

impl<A: TaskAction> Runner<A> {
    fn run(&self) {
        let _guard = self.lock.lock();
        self.action.run();
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
}

/// A handle that runs `A` on a [`TaskSchedule`] while it is active.
pub struct RepeatingTask<A> {
    slot: ActivationSlot,
    schedule: TaskSchedule,
    runner: Arc<Runner<A>>,
    task: Mutex<Option<JoinHandle<()>>>,
    runtime: Option<RuntimeHandle>,
}

impl<A: TaskAction> RepeatingTask<A> {
    pub fn new(schedule: TaskSchedule, action: A) -> Self {
        Self {
            slot: ActivationSlot::new(),
            schedule,
            runner: Arc::new(Runner {
                action,
                lock: Mutex::new(()),
                runs: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
            runtime: None,
        }
    }

    /// Schedules on `runtime` instead of the runtime current at activation.
    ///
    /// Needed when the owning module is enabled from a thread that is not
    /// inside a runtime.
    pub fn on_runtime(mut self, runtime: RuntimeHandle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Runs the action once on the caller's thread.
    ///
    /// Never overlaps with a scheduled run.
    pub fn run_now(&self) {
        self.runner.run();
    }

    /// Completed runs, scheduled or not.
    pub fn run_count(&self) -> u64 {
        self.runner.runs.load(Ordering::SeqCst)
    }

    /// Whether the timer loop is currently running.
    pub fn is_scheduled(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn owner(&self) -> Option<PluginId> {
        self.slot.owner()
    }
}

async fn run_schedule<A: TaskAction>(schedule: TaskSchedule, runner: Arc<Runner<A>>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + schedule.delay, schedule.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if schedule.sync {
            runner.run();
        } else {
            let runner = runner.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || runner.run()).await {
                warn!("⚠️ Repeating task run failed: {}", e);
            }
        }
    }
}

impl<A: TaskAction> Handle for RepeatingTask<A> {
    fn activation(&self) -> &ActivationSlot {
        &self.slot
    }

    fn on_activate(&self, owner: PluginId) -> Result<(), HandleError> {
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => RuntimeHandle::try_current()
                .map_err(|e| HandleError::Activation(format!("no tokio runtime to schedule on: {e}")))?,
        };

        let task = runtime.spawn(run_schedule(self.schedule, self.runner.clone()));
        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
        debug!(
            "⏱️ Scheduled task for {} every {:?} after {:?}",
            owner,
            self.schedule.interval(),
            self.schedule.delay
        );
        Ok(())
    }

    fn on_deactivate(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("⏱️ Cancelled scheduled task");
        }
    }

    fn schedule(&self) -> Option<&TaskSchedule> {
        Some(&self.schedule)
    }
}

impl<A> Drop for RepeatingTask<A> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl<A> fmt::Debug for RepeatingTask<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatingTask")
            .field("schedule", &self.schedule)
            .field("owner", &self.slot.owner())
            .field("runs", &self.runner.runs.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{activate, deactivate};
    use std::sync::atomic::AtomicUsize;

    fn counting(schedule: TaskSchedule) -> (RepeatingTask<impl TaskAction>, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let task = RepeatingTask::new(schedule, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (task, hits)
    }

    #[test]
    fn test_schedule_from_ticks() {
        let schedule = TaskSchedule::from_ticks(20, 2);
        assert_eq!(schedule.delay, Duration::from_secs(1));
        assert_eq!(schedule.period, Duration::from_millis(100));
        assert!(schedule.sync);
        assert!(!schedule.off_thread().sync);
        assert_eq!(TaskSchedule::from_ticks(0, 0).interval(), TICK);
    }

    #[test]
    fn test_activation_needs_a_runtime() {
        let (task, hits) = counting(TaskSchedule::default());
        let err = activate(&task, PluginId::new()).unwrap_err();
        assert!(matches!(err, HandleError::Activation(_)));
        assert!(!task.activation().is_active());
        assert!(!task.is_scheduled());

        task.run_now();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(task.run_count(), 1);
    }

    #[tokio::test]
    async fn test_runs_while_active() {
        let (task, hits) = counting(TaskSchedule::every(Duration::from_millis(10)));
        let owner = PluginId::new();

        assert!(activate(&task, owner).unwrap());
        assert!(task.is_scheduled());
        assert_eq!(task.owner(), Some(owner));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(hits.load(Ordering::SeqCst) >= 2);

        assert_eq!(deactivate(&task), Some(owner));
        assert!(!task.is_scheduled());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let stopped_at = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), stopped_at);
    }

    #[tokio::test]
    async fn test_delay_holds_first_run() {
        let (task, hits) = counting(TaskSchedule::every(Duration::from_millis(10)).after(Duration::from_secs(30)));
        activate(&task, PluginId::new()).unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        deactivate(&task);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_off_thread_runs() {
        let (task, hits) = counting(TaskSchedule::every(Duration::from_millis(10)).off_thread());
        activate(&task, PluginId::new()).unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(hits.load(Ordering::SeqCst) >= 1);
        assert!(task.run_count() >= 1);
        deactivate(&task);
    }

    #[test]
    fn test_explicit_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let (task, hits) = counting(TaskSchedule::every(Duration::from_millis(10)));
        let task = task.on_runtime(runtime.handle().clone());

        activate(&task, PluginId::new()).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        assert!(hits.load(Ordering::SeqCst) >= 1);
        deactivate(&task);
        assert!(!task.is_scheduled());
    }
}

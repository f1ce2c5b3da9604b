//! Deferred task execution for disposal timers.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use log::trace;

pub type Task = Box<dyn FnOnce()>;

/// Runs tasks after a delay on the current thread.
///
/// A scheduled task must never run inside the `schedule` call itself, even
/// for a zero delay.
pub trait Scheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Cancellation token for a scheduled task.
///
/// Cancelling takes effect immediately: a cancelled task is skipped when
/// its deadline arrives.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Rc<Cell<bool>>,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Wraps `task` so it becomes a no-op once this handle is cancelled.
    fn guard(&self, task: Task) -> Task {
        let handle = self.clone();
        Box::new(move || {
            if !handle.is_cancelled() {
                task();
            }
        })
    }
}

/// Scheduler driven by a virtual clock that only moves when told to.
///
/// Clones share the same clock and queue.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    seq: u64,
    // Keyed by (deadline, scheduling order).
    queue: BTreeMap<(Duration, u64), (TimerHandle, Task)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of scheduled tasks that are neither run nor cancelled.
    pub fn pending(&self) -> usize {
        self.state
            .borrow()
            .queue
            .values()
            .filter(|(handle, _)| !handle.is_cancelled())
            .count()
    }

    /// Moves the clock forward by `by`, running every task that comes due,
    /// in deadline order. Tasks scheduled by those tasks run too if they
    /// fall within the window.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        while let Some(task) = self.pop_due(target) {
            task();
        }
        self.state.borrow_mut().now = target;
    }

    /// Advances until no tasks remain.
    pub fn run_until_idle(&self) {
        loop {
            let next = self.state.borrow().queue.keys().next().map(|(at, _)| *at);
            let Some(at) = next else {
                break;
            };
            let now = self.now();
            self.advance(at.saturating_sub(now));
        }
    }

    fn pop_due(&self, target: Duration) -> Option<Task> {
        let mut state = self.state.borrow_mut();
        let entry = state.queue.first_entry()?;
        let (at, _) = *entry.key();
        if at > target {
            return None;
        }
        let (_, task) = entry.remove();
        state.now = at;
        Some(task)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = self.state.borrow_mut();
        let at = state.now + delay;
        let seq = state.seq;
        state.seq += 1;
        trace!("task {seq} scheduled at {at:?}");
        state.queue.insert((at, seq), (handle.clone(), handle.guard(task)));
        handle
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Scheduler backed by the tokio timer.
///
/// Tasks are spawned with [`tokio::task::spawn_local`], so `schedule` must
/// be called from within a [`tokio::task::LocalSet`].
#[cfg(feature = "tokio")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[cfg(feature = "tokio")]
impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let task = handle.guard(task);
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &'static str| -> Task {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn runs_in_deadline_then_scheduling_order() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();

        scheduler.schedule(Duration::from_millis(20), task("late"));
        scheduler.schedule(Duration::from_millis(10), task("first"));
        scheduler.schedule(Duration::from_millis(10), task("second"));

        scheduler.advance(Duration::from_millis(15));
        assert_eq!(*log.borrow(), vec!["first", "second"]);
        assert_eq!(scheduler.now(), Duration::from_millis(15));

        scheduler.advance(Duration::from_millis(5));
        assert_eq!(*log.borrow(), vec!["first", "second", "late"]);
    }

    #[test]
    fn zero_delay_waits_for_the_clock() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();

        scheduler.schedule(Duration::ZERO, task("now"));
        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.pending(), 1);

        scheduler.advance(Duration::ZERO);
        assert_eq!(*log.borrow(), vec!["now"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn cancelled_tasks_are_skipped() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();

        let handle = scheduler.schedule(Duration::from_millis(5), task("cancelled"));
        scheduler.schedule(Duration::from_millis(5), task("kept"));
        handle.cancel();

        assert_eq!(scheduler.pending(), 1);
        scheduler.run_until_idle();
        assert_eq!(*log.borrow(), vec!["kept"]);
    }

    #[test]
    fn tasks_may_schedule_more_tasks() {
        let scheduler = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_log = log.clone();
        let inner_scheduler = scheduler.clone();
        scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                inner_log.borrow_mut().push(inner_scheduler.now());
                let inner_log = inner_log.clone();
                let clock = inner_scheduler.clone();
                inner_scheduler.schedule(
                    Duration::from_millis(10),
                    Box::new(move || inner_log.borrow_mut().push(clock.now())),
                );
            }),
        );

        scheduler.run_until_idle();

        assert_eq!(
            *log.borrow(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[cfg(feature = "tokio")]
    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_honors_delay_and_cancel() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (log, task) = recorder();
                let scheduler = TokioScheduler;

                scheduler.schedule(Duration::from_millis(100), task("fired"));
                let cancelled = scheduler.schedule(Duration::from_millis(50), task("cancelled"));
                cancelled.cancel();

                tokio::time::sleep(Duration::from_millis(99)).await;
                assert!(log.borrow().is_empty());

                tokio::time::sleep(Duration::from_millis(2)).await;
                assert_eq!(*log.borrow(), vec!["fired"]);
            })
            .await;
    }
}

//! Scheduler adapter
//!
//! The filters consult an injected clock for the current time and register
//! their periodic decay sweep against it. The adapter is the seam that keeps
//! the core testable: production embedders implement [`Scheduler`] over their
//! event loop, while tests (and batch drivers) use [`ManualScheduler`] and
//! advance time explicitly.
//!
//! Callbacks receive the fire time as an argument, so a running callback
//! never has to call back into the scheduler to learn what time it is.

use std::cell::RefCell;

/// A periodic callback; the argument is the wall-clock time of the firing
pub type PeriodicCallback = Box<dyn FnMut(f64)>;

/// Opaque handle identifying a scheduled periodic task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

/// Clock and periodic-callback registry used by the filters
///
/// Implementations may be a real event loop binding, a manual tick driver,
/// or a test clock. Cooperative single-threaded discipline is assumed: the
/// scheduler dispatches callbacks on the same logical thread that calls the
/// filter operations.
pub trait Scheduler {
    /// Current time in seconds since the epoch
    fn now(&self) -> f64;

    /// Register `callback` to fire every `interval` seconds, starting one
    /// interval from now
    fn schedule_periodic(&self, interval: f64, callback: PeriodicCallback) -> TaskHandle;

    /// Deregister a periodic task; unknown handles are ignored
    fn cancel(&self, handle: TaskHandle);
}

struct Task {
    id: u64,
    interval: f64,
    next_fire: f64,
    // taken out of the slot while the callback runs, so a callback may
    // cancel or register tasks without aliasing the registry
    callback: Option<PeriodicCallback>,
}

struct ManualState {
    now: f64,
    next_id: u64,
    tasks: Vec<Task>,
}

/// Deterministic scheduler driven by explicit [`advance`](Self::advance) calls
///
/// Time only moves when the caller says so, which makes decay behavior
/// reproducible in tests and lets batch pipelines drive the sweep cadence
/// themselves.
///
/// # Examples
/// ```
/// use timebloom::ManualScheduler;
/// use timebloom::Scheduler;
///
/// let scheduler = ManualScheduler::new();
/// scheduler.advance(12.5);
/// assert_eq!(scheduler.now(), 12.5);
/// ```
pub struct ManualScheduler {
    state: RefCell<ManualState>,
}

impl ManualScheduler {
    /// Create a scheduler whose clock starts at time 0
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    /// Create a scheduler whose clock starts at `now` seconds
    pub fn starting_at(now: f64) -> Self {
        ManualScheduler {
            state: RefCell::new(ManualState {
                now,
                next_id: 0,
                tasks: Vec::new(),
            }),
        }
    }

    /// Advance the clock by `dt` seconds, firing due callbacks in time order
    ///
    /// Each periodic task fires once per elapsed interval; a large `dt`
    /// produces multiple firings with the clock positioned at each fire time
    /// while its callback runs.
    pub fn advance(&self, dt: f64) {
        let target = self.state.borrow().now + dt;
        loop {
            let due = {
                let state = self.state.borrow();
                state
                    .tasks
                    .iter()
                    .filter(|t| t.callback.is_some() && t.next_fire <= target)
                    .min_by(|a, b| a.next_fire.total_cmp(&b.next_fire))
                    .map(|t| (t.id, t.next_fire))
            };
            let Some((id, fire_at)) = due else { break };

            let callback = {
                let mut state = self.state.borrow_mut();
                state.now = fire_at.max(state.now);
                match state.tasks.iter_mut().find(|t| t.id == id) {
                    Some(task) => {
                        task.next_fire = fire_at + task.interval;
                        task.callback.take()
                    }
                    None => None,
                }
            };
            if let Some(mut callback) = callback {
                callback(fire_at);
                // put the callback back unless the task was cancelled while
                // it was running
                let mut state = self.state.borrow_mut();
                if let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) {
                    task.callback = Some(callback);
                }
            }
        }
        let mut state = self.state.borrow_mut();
        state.now = target.max(state.now);
    }

    /// Jump the clock to an absolute time without firing callbacks
    ///
    /// Pending fire times are left untouched; the next `advance` dispatches
    /// anything that became due.
    pub fn set_time(&self, now: f64) {
        self.state.borrow_mut().now = now;
    }

    /// Number of currently registered periodic tasks
    pub fn pending_tasks(&self) -> usize {
        self.state.borrow().tasks.len()
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> f64 {
        self.state.borrow().now
    }

    fn schedule_periodic(&self, interval: f64, callback: PeriodicCallback) -> TaskHandle {
        assert!(
            interval.is_finite() && interval > 0.0,
            "periodic interval must be positive and finite"
        );
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        let next_fire = state.now + interval;
        state.tasks.push(Task {
            id,
            interval,
            next_fire,
            callback: Some(callback),
        });
        TaskHandle(id)
    }

    fn cancel(&self, handle: TaskHandle) {
        self.state.borrow_mut().tasks.retain(|t| t.id != handle.0);
    }
}

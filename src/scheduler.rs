use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use futures::channel::oneshot;
use futures::future::{AbortHandle, Abortable};
use futures::task::{Spawn, SpawnExt};
use futures_timer::Delay;

use crate::error::MarkdownError;

type StepFn<U, E> = Arc<dyn Fn(U) -> Result<(), E> + Send + Sync>;

struct SchedulerState<U> {
    last_run: Option<Instant>,
    pending: Option<U>,
    timer: Option<AbortHandle>,
    running: bool,
    disposed: bool,
    runs: usize,
    waiters: Vec<oneshot::Sender<()>>,
}

impl<U> SchedulerState<U> {
    fn is_settled(&self) -> bool {
        self.disposed || (!self.running && self.pending.is_none())
    }

    fn notify_waiters(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

struct Shared<U, E> {
    interval: Duration,
    step: StepFn<U, E>,
    spawner: Arc<dyn Spawn + Send + Sync>,
    state: Mutex<SchedulerState<U>>,
}

/// Leading-edge throttle: later updates in the window coalesce, latest wins.
pub struct ThrottleScheduler<U, E = MarkdownError> {
    shared: Arc<Shared<U, E>>,
}

impl<U, E> Clone for ThrottleScheduler<U, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<U, E> ThrottleScheduler<U, E>
where
    U: Send + 'static,
    E: Display + 'static,
{
    pub fn new(
        interval: Duration,
        spawner: impl Spawn + Send + Sync + 'static,
        step: impl Fn(U) -> Result<(), E> + Send + Sync + 'static,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                interval,
                step: Arc::new(step),
                spawner: Arc::new(spawner),
                state: Mutex::new(SchedulerState {
                    last_run: None,
                    pending: None,
                    timer: None,
                    running: false,
                    disposed: false,
                    runs: 0,
                    waiters: Vec::new(),
                }),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Number of steps that have run, including failed ones.
    pub fn runs(&self) -> usize {
        self.shared.lock().runs
    }

    pub fn has_pending(&self) -> bool {
        self.shared.lock().pending.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    pub fn schedule(&self, update: U) {
        let mut state = self.shared.lock();
        if state.disposed {
            log::debug!(target: "calmchat::scheduler", "ignoring update after dispose");
            return;
        }
        state.pending = Some(update);

        let window_open = state
            .last_run
            .is_some_and(|last| last.elapsed() < self.shared.interval);
        if !window_open && !state.running && state.timer.is_none() {
            drop(state);
            self.shared.drain();
            return;
        }

        if !Shared::arm_timer(&self.shared, &mut state) {
            drop(state);
            self.shared.drain();
        }
    }

    /// Runs the pending update now instead of waiting for the window to close.
    pub fn flush(&self) {
        let mut state = self.shared.lock();
        if state.disposed || state.pending.is_none() {
            return;
        }
        if state.running {
            return;
        }
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        drop(state);
        self.shared.drain();
    }

    /// Resolves once nothing is pending or running, or the scheduler is disposed.
    pub async fn when_settled(&self) {
        let receiver = {
            let mut state = self.shared.lock();
            if state.is_settled() {
                None
            } else {
                let (sender, receiver) = oneshot::channel();
                state.waiters.push(sender);
                Some(receiver)
            }
        };

        if let Some(receiver) = receiver {
            let _ = receiver.await;
        }
    }

    /// Cancels the armed timer and drops pending work. Later updates are ignored.
    pub fn dispose(&self) {
        let mut state = self.shared.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.pending = None;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.notify_waiters();
        log::debug!(target: "calmchat::scheduler", "scheduler disposed after {} runs", state.runs);
    }
}

impl<U, E> Shared<U, E>
where
    U: Send + 'static,
    E: Display + 'static,
{
    fn lock(&self) -> MutexGuard<'_, SchedulerState<U>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` when the executor refused the timer task.
    fn arm_timer(this: &Arc<Self>, state: &mut SchedulerState<U>) -> bool {
        if state.timer.is_some() {
            return true;
        }

        let remaining = state
            .last_run
            .map(|last| this.interval.saturating_sub(last.elapsed()))
            .unwrap_or(this.interval);
        let (handle, registration) = AbortHandle::new_pair();
        let weak: Weak<Self> = Arc::downgrade(this);
        let task = Abortable::new(
            async move {
                Delay::new(remaining).await;
                if let Some(shared) = weak.upgrade() {
                    shared.on_timer();
                }
            },
            registration,
        );

        match this.spawner.spawn(async move {
            let _ = task.await;
        }) {
            Ok(()) => {
                state.timer = Some(handle);
                true
            }
            Err(error) => {
                log::warn!(target: "calmchat::scheduler", "timer spawn failed, running inline: {error}");
                false
            }
        }
    }

    fn on_timer(self: Arc<Self>) {
        self.lock().timer = None;
        self.drain();
    }

    fn drain(self: &Arc<Self>) {
        let update = {
            let mut state = self.lock();
            if state.disposed || state.running {
                return;
            }
            match state.pending.take() {
                Some(update) => {
                    state.running = true;
                    state.last_run = Some(Instant::now());
                    update
                }
                None => {
                    state.notify_waiters();
                    return;
                }
            }
        };

        let step = Arc::clone(&self.step);
        match catch_unwind(AssertUnwindSafe(|| step(update))) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                log::error!(target: "calmchat::scheduler", "render step failed: {error}");
            }
            Err(_) => {
                log::error!(target: "calmchat::scheduler", "render step panicked");
            }
        }

        let mut state = self.lock();
        state.running = false;
        state.runs += 1;
        if state.disposed {
            return;
        }
        if state.pending.is_some() {
            if !Self::arm_timer(self, &mut state) {
                drop(state);
                self.drain();
            }
            return;
        }
        state.notify_waiters();
    }
}

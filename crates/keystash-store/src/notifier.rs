//! Coalesced, payload-less change signal.
//!
//! Each [`Store`](crate::Store) owns one [`ChangeNotifier`]. Subscribers get a
//! [`watch::Receiver`] carrying a monotonically increasing version number and
//! are expected to re-read the store when it moves; no diff is delivered.
//!
//! Mutations call [`ChangeNotifier::touch`]. The first touch of a burst
//! spawns a single timer task; later touches only push its deadline back.
//! The task publishes one version bump once the deadline passes with no
//! further touch. Outside a tokio runtime the bump happens inline.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

/// Coalescing window used when none is configured.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(10);

/// Timer state shared between the notifier and its pending task.
#[derive(Debug, Default)]
struct Schedule {
    /// Set while a task is pending; moved forward by every touch.
    deadline: Option<Instant>,
    task: Option<JoinHandle<()>>,
}

/// Debounced version counter shared by all subscribers of one store.
#[derive(Debug)]
pub struct ChangeNotifier {
    tx: watch::Sender<u64>,
    delay: Duration,
    schedule: Arc<Mutex<Schedule>>,
}

impl ChangeNotifier {
    /// Create a notifier that coalesces touches arriving within `delay` of
    /// each other.
    ///
    /// With a zero delay the bump fires as soon as the timer task is polled,
    /// which on a current-thread runtime is after the touching task yields.
    pub fn new(delay: Duration) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            tx,
            delay,
            schedule: Arc::new(Mutex::new(Schedule::default())),
        }
    }

    /// Subscribe to version changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Current version. Starts at zero.
    pub fn version(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Schedule a version bump, or push back the one already pending.
    pub fn touch(&self) {
        let Ok(handle) = Handle::try_current() else {
            bump(&self.tx);
            return;
        };

        let mut schedule = lock(&self.schedule);
        let pending = schedule.deadline.is_some();
        schedule.deadline = Some(Instant::now() + self.delay);
        if pending {
            return;
        }

        let task = handle.spawn(fire(Arc::clone(&self.schedule), self.tx.clone()));
        schedule.task = Some(task);
    }

    /// Publish a bump immediately, cancelling any pending one.
    pub fn notify_now(&self) {
        let mut schedule = lock(&self.schedule);
        schedule.deadline = None;
        if let Some(task) = schedule.task.take() {
            task.abort();
        }
        drop(schedule);
        bump(&self.tx);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.schedule).task.take() {
            task.abort();
        }
    }
}

/// Wait until the deadline stops moving, then bump once.
async fn fire(schedule: Arc<Mutex<Schedule>>, tx: watch::Sender<u64>) {
    loop {
        let deadline = {
            let mut state = lock(&schedule);
            match state.deadline {
                None => return,
                Some(deadline) if Instant::now() >= deadline => {
                    // Clear under the lock so the next touch starts a new task.
                    state.deadline = None;
                    state.task = None;
                    break;
                }
                Some(deadline) => deadline,
            }
        };
        tokio::time::sleep_until(deadline).await;
    }
    bump(&tx);
}

// A poisoned schedule only means a touch panicked mid-update; the state
// inside is still coherent.
fn lock(schedule: &Mutex<Schedule>) -> MutexGuard<'_, Schedule> {
    schedule.lock().unwrap_or_else(|e| e.into_inner())
}

fn bump(tx: &watch::Sender<u64>) {
    tx.send_modify(|v| *v = v.wrapping_add(1));
    trace!(version = *tx.borrow(), "change notified");
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_of_touches_yields_one_bump() {
        let notifier = ChangeNotifier::default();
        let mut rx = notifier.subscribe();

        for _ in 0..10 {
            notifier.touch();
        }
        assert_eq!(notifier.version(), 0, "nothing fires before yielding");

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(notifier.version(), 1);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn separate_bursts_yield_separate_bumps() {
        let notifier = ChangeNotifier::new(Duration::from_millis(5));
        let mut rx = notifier.subscribe();

        notifier.touch();
        rx.changed().await.unwrap();
        notifier.touch();
        notifier.touch();
        rx.changed().await.unwrap();

        assert_eq!(*rx.borrow(), 2);
    }

    #[tokio::test]
    async fn notify_now_replaces_pending() {
        let notifier = ChangeNotifier::default();
        notifier.touch();
        notifier.notify_now();
        assert_eq!(notifier.version(), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(notifier.version(), 1);
    }

    #[tokio::test]
    async fn touches_within_window_extend_it() {
        let notifier = ChangeNotifier::new(Duration::from_millis(100));
        notifier.touch();
        tokio::time::sleep(Duration::from_millis(60)).await;
        notifier.touch();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(notifier.version(), 0, "second touch pushed the deadline back");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(notifier.version(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn burst_coalesces_on_multi_thread_runtime() {
        for _ in 0..50 {
            let notifier = ChangeNotifier::default();
            for _ in 0..10 {
                notifier.touch();
            }
            tokio::time::sleep(DEFAULT_DEBOUNCE * 3).await;
            assert_eq!(notifier.version(), 1);
        }
    }

    #[test]
    fn without_runtime_bumps_inline() {
        let notifier = ChangeNotifier::default();
        notifier.touch();
        notifier.touch();
        assert_eq!(notifier.version(), 2);
    }
}

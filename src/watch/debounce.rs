use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Coalesces bursts of triggers into a single run.
///
/// The first trigger schedules the action `window` later; triggers that
/// arrive while a run is pending are dropped. The pending flag clears just
/// before the action starts, so changes made during a run schedule another.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    pending: Arc<AtomicBool>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Returns `true` if this trigger scheduled a run.
    pub fn trigger<F, Fut>(&self, action: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.pending.swap(true, Ordering::SeqCst) {
            return false;
        }
        let pending = self.pending.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            pending.store(false, Ordering::SeqCst);
            action().await;
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_once_after_first_event() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let runs = Arc::new(AtomicUsize::new(0));

        assert!(debouncer.trigger(counting(&runs)));
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(!debouncer.trigger(counting(&runs)));
        }

        // 30ms in; the window is measured from the first trigger
        tokio::time::sleep(Duration::from_millis(19)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_after_run_schedules_again() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let runs = Arc::new(AtomicUsize::new(0));

        debouncer.trigger(counting(&runs));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(debouncer.trigger(counting(&runs)));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}

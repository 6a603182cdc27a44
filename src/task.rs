// src/task.rs
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// A recurring job with an explicit stop point. The first run fires
/// immediately; each run is spawned on its own so a slow run never delays
/// the next tick. Dropping the handle stops the schedule.
pub struct ScheduledTask {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
}

impl ScheduledTask {
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, job: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tokio::spawn(job());
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!(task = name, "Scheduled task stopping");
                            break;
                        }
                    }
                }
            }
        });

        info!(task = name, ?period, "Scheduled task started");
        Self {
            name,
            shutdown_tx,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop scheduling new runs. Runs already spawned finish on their own.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_runs_immediately_then_periodically() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = ScheduledTask::spawn("test", Duration::from_millis(100), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(runs.load(Ordering::SeqCst) >= 3);

        task.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_stop = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_slow_run_does_not_delay_ticks() {
        let starts = Arc::new(AtomicUsize::new(0));
        let counter = starts.clone();
        let _task = ScheduledTask::spawn("slow", Duration::from_millis(50), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                futures::future::pending::<()>().await;
            }
        });

        tokio::time::sleep(Duration::from_millis(230)).await;
        assert!(starts.load(Ordering::SeqCst) >= 4);
    }
}

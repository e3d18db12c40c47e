//! Cancellable repeating timer on the tokio runtime

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Runs a callback at a fixed period until cancelled or dropped
#[derive(Debug)]
pub struct RepeatingTimer {
    task: JoinHandle<()>,
}

impl RepeatingTimer {
    /// First firing happens one period after start
    pub fn start<F>(handle: &Handle, period: Duration, mut callback: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let task = handle.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Consume the immediate first tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                callback();
            }
        });

        Self { task }
    }

    /// Idempotent
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let timer = RepeatingTimer::start(&Handle::current(), Duration::from_millis(250), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        timer.cancel();
        timer.cancel();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(timer.is_cancelled());
    }
}

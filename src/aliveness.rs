//! Aliveness watchdog
//!
//! Every mempool notification calls `touch()`. If no touch arrives within
//! the window, `run()` returns `AlivenessTimeout` and the process exits 1:
//! a silently dead subscription looks exactly like a quiet mempool.
//! A window of 0 disables the watchdog.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::Notify;
use tracing::{error, warn};

use crate::error::{Result, WatcherError};

#[derive(Debug, Clone)]
pub struct AlivenessMonitor {
    notify: Arc<Notify>,
    timeout: Duration,
}

impl AlivenessMonitor {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.timeout.is_zero()
    }

    /// Reset the window. A touch with no waiter is remembered.
    pub fn touch(&self) {
        self.notify.notify_one();
    }

    /// Touch once per item of `activity`. Ends with `StreamEnded` when the
    /// activity source goes away.
    pub async fn watch<S: Stream>(&self, activity: S) -> Result<()> {
        futures::pin_mut!(activity);
        let mut seen = 0u64;
        while activity.next().await.is_some() {
            self.touch();
            seen += 1;
        }
        warn!("Activity stream ended | notifications={}", seen);
        Err(WatcherError::StreamEnded)
    }

    /// Resolves only on timeout; pends forever when disabled.
    pub async fn run(&self) -> Result<()> {
        if !self.is_enabled() {
            return std::future::pending().await;
        }

        loop {
            tokio::select! {
                _ = self.notify.notified() => continue,
                _ = tokio::time::sleep(self.timeout) => {
                    let ms = self.timeout.as_millis() as u64;
                    error!("Aliveness check failed | no mempool activity for {}ms", ms);
                    return Err(WatcherError::AlivenessTimeout(ms));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_times_out_without_activity() {
        let monitor = AlivenessMonitor::new(50);
        let started = Instant::now();
        let err = tokio_test::assert_err!(monitor.run().await);
        assert!(matches!(err, WatcherError::AlivenessTimeout(50)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_touches_keep_it_alive() {
        let monitor = AlivenessMonitor::new(100);
        let toucher = monitor.clone();
        let handle = tokio::spawn(async move {
            for _ in 0..15 {
                tokio::time::sleep(Duration::from_millis(20)).await;
                toucher.touch();
            }
        });

        let started = Instant::now();
        let result = monitor.run().await;
        // 15 touches 20ms apart hold the 100ms window open for ~300ms
        assert!(result.is_err());
        assert!(started.elapsed() >= Duration::from_millis(300));
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_keeps_alive_until_activity_stops() {
        let monitor = AlivenessMonitor::new(5_000);
        let (tx, rx) = tokio::sync::mpsc::channel::<u64>(4);
        let watcher = monitor.clone();
        let watch = tokio::spawn(async move {
            watcher.watch(tokio_stream::wrappers::ReceiverStream::new(rx)).await
        });
        let feeder = tokio::spawn(async move {
            for i in 0..40u64 {
                tokio::time::sleep(Duration::from_secs(1)).await;
                tx.send(i).await.unwrap();
            }
        });

        // 40 notifications a second apart keep a 5s window open
        tokio::select! {
            r = monitor.run() => panic!("timed out while activity was flowing: {:?}", r),
            _ = tokio::time::sleep(Duration::from_secs(30)) => {}
        }

        feeder.await.unwrap();
        let ended = tokio_test::assert_err!(watch.await.unwrap());
        assert!(matches!(ended, WatcherError::StreamEnded));
        let err = tokio_test::assert_err!(monitor.run().await);
        assert!(matches!(err, WatcherError::AlivenessTimeout(5_000)));
    }

    #[tokio::test]
    async fn test_zero_disables() {
        let monitor = AlivenessMonitor::new(0);
        assert!(!monitor.is_enabled());
        let raced = tokio::time::timeout(Duration::from_millis(50), monitor.run()).await;
        assert!(raced.is_err(), "disabled monitor must never resolve");
    }
}

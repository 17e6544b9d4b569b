use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::configuration::ReaperSettings;
use crate::error::DatabaseError;
use crate::store::RefreshTokenLedger;

/// Deletes expired and long-revoked refresh tokens from the ledger.
///
/// Cleanup only: usability checks already ignore these rows, so a failed
/// sweep is logged and otherwise has no effect.
#[derive(Clone)]
pub struct LedgerReaper {
    ledger: Arc<dyn RefreshTokenLedger>,
    interval: Duration,
    revoked_retention: ChronoDuration,
}

impl LedgerReaper {
    pub fn new(
        ledger: Arc<dyn RefreshTokenLedger>,
        interval: Duration,
        revoked_retention: ChronoDuration,
    ) -> Self {
        Self {
            ledger,
            interval,
            revoked_retention,
        }
    }

    pub fn from_settings(ledger: Arc<dyn RefreshTokenLedger>, settings: &ReaperSettings) -> Self {
        Self::new(
            ledger,
            Duration::from_secs(settings.interval_seconds.max(1)),
            ChronoDuration::seconds(settings.revoked_retention_seconds),
        )
    }

    /// One sweep as of `now`. Returns the number of rows deleted.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        self.ledger.sweep(now, now - self.revoked_retention).await
    }

    /// Sweeps immediately, then once per interval, until stopped.
    pub fn start(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Ledger reaper started");
            let mut interval_timer = tokio::time::interval(self.interval);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => self.run_sweep().await,
                    _ = &mut shutdown_rx => break,
                }
            }

            info!("Ledger reaper stopped");
        });

        ReaperHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    async fn run_sweep(&self) {
        match self.sweep_once(Utc::now()).await {
            Ok(count) if count > 0 => info!(tokens_deleted = count, "Refresh token ledger swept"),
            Ok(_) => debug!("Refresh token ledger sweep found nothing to delete"),
            Err(e) => error!(error = %e, "Refresh token ledger sweep failed"),
        }
    }
}

/// Handle to a running reaper task
pub struct ReaperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signals the task and waits for it to exit.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!(error = %e, "Ledger reaper task panicked");
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::FaultyLedger;
    use crate::store::InMemoryLedger;

    fn reaper(ledger: &InMemoryLedger, interval: Duration) -> LedgerReaper {
        LedgerReaper::new(Arc::new(ledger.clone()), interval, ChronoDuration::days(7))
    }

    #[tokio::test]
    async fn test_sweep_twice_is_idempotent() {
        let ledger = InMemoryLedger::new();
        let now = Utc::now();
        ledger
            .insert(1, "expired", now - ChronoDuration::days(31), now - ChronoDuration::days(1))
            .await
            .unwrap();
        ledger
            .insert(1, "live", now, now + ChronoDuration::days(30))
            .await
            .unwrap();

        let reaper = reaper(&ledger, Duration::from_secs(3600));

        assert_eq!(reaper.sweep_once(now).await.unwrap(), 1);
        assert_eq!(reaper.sweep_once(now).await.unwrap(), 0);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_revoked_rows_kept_through_retention_window() {
        let ledger = InMemoryLedger::new();
        let issued = Utc::now();
        let record = ledger
            .insert(1, "revoked", issued, issued + ChronoDuration::days(30))
            .await
            .unwrap();
        ledger.revoke(record.id).await.unwrap();

        let reaper = reaper(&ledger, Duration::from_secs(3600));

        assert_eq!(reaper.sweep_once(issued + ChronoDuration::days(6)).await.unwrap(), 0);
        assert_eq!(reaper.sweep_once(issued + ChronoDuration::days(8)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_started_reaper_sweeps_immediately_and_stops() {
        let ledger = InMemoryLedger::new();
        let now = Utc::now();
        ledger
            .insert(1, "expired", now - ChronoDuration::days(31), now - ChronoDuration::days(1))
            .await
            .unwrap();

        let handle = reaper(&ledger, Duration::from_secs(3600)).start();

        for _ in 0..50 {
            if ledger.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(ledger.is_empty());

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_failed_sweeps_do_not_stop_the_loop() {
        let ledger = FaultyLedger::new(InMemoryLedger::new());
        ledger.fail_sweeps(true);

        let handle = LedgerReaper::new(
            Arc::new(ledger.clone()),
            Duration::from_millis(10),
            ChronoDuration::days(7),
        )
        .start();

        for _ in 0..100 {
            if ledger.sweep_calls() >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(ledger.sweep_calls() >= 3);

        // the same task keeps sweeping once the store recovers
        ledger.fail_sweeps(false);
        let now = Utc::now();
        ledger
            .inner
            .insert(1, "expired", now - ChronoDuration::days(31), now - ChronoDuration::days(1))
            .await
            .unwrap();
        for _ in 0..100 {
            if ledger.inner.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(ledger.inner.is_empty());

        assert!(tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .is_ok());
    }
}

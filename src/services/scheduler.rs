use std::time::Duration;

use chrono::{Datelike, Timelike, Utc};
use tokio::time::sleep;

use crate::state::AppState;

/// Spawn the background scheduler that runs periodic jobs.
///
/// Each job runs in its own `tokio::spawn` so a failure in one job never
/// crashes the scheduler loop or other jobs. Jobs are idempotent, so a
/// duplicate run (e.g. two instances without an external lock) is safe,
/// just wasted work.
pub async fn run_background_scheduler(state: AppState) {
    tracing::info!("Background scheduler started");

    let pool = match state.db_pool.as_ref() {
        Some(p) => p.clone(),
        None => {
            tracing::warn!("Scheduler: no database pool configured, exiting");
            return;
        }
    };

    let sweep_interval =
        Duration::from_secs(state.config.overdue_sweep_interval_seconds.max(60));

    let mut last_sweep_run = tokio::time::Instant::now();
    let mut last_daily_run: Option<u32> = None;

    loop {
        sleep(Duration::from_secs(15)).await;

        let now_instant = tokio::time::Instant::now();
        let now_utc = Utc::now();
        let today = now_utc.date_naive();

        // --- Overdue sweep (every N seconds) ---
        if now_instant.duration_since(last_sweep_run) >= sweep_interval {
            last_sweep_run = now_instant;
            let pool = pool.clone();
            tokio::spawn(async move {
                let result = crate::services::overdue::run_overdue_sweep(&pool).await;
                if result.marked_overdue > 0 || result.errors > 0 {
                    tracing::info!(
                        marked_overdue = result.marked_overdue,
                        errors = result.errors,
                        "Scheduler: overdue sweep completed"
                    );
                }
            });
        }

        // --- Daily jobs (run once per calendar day, at or after 05:00 UTC) ---
        let today_ordinal = today.ordinal();
        if last_daily_run == Some(today_ordinal) {
            continue;
        }
        if now_utc.hour() < 5 {
            continue;
        }
        last_daily_run = Some(today_ordinal);

        {
            let pool = pool.clone();
            let retention_days = state.config.notification_retention_days;
            tokio::spawn(async move {
                let (notifications, events) =
                    crate::services::notifications::run_notification_retention(
                        &pool,
                        retention_days,
                    )
                    .await;
                if notifications > 0 || events > 0 {
                    tracing::info!(
                        notifications,
                        events,
                        "Scheduler: notification retention completed"
                    );
                }
            });
        }
    }
}

//! The poll loop: wakes on a fixed interval, drains due posts through the
//! dispatcher, and runs retention cleanup on a cycle cadence.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;
use crate::service::SchedulerService;

/// Start the background poll loop. Runs until the task is aborted.
pub fn spawn(service: Arc<SchedulerService>, dispatcher: Arc<Dispatcher>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let cfg = &service.config().scheduler;
        let mut interval = tokio::time::interval(Duration::from_secs(cfg.poll_interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🚀 poll loop started (every {}s)", cfg.poll_interval_secs);

        let mut cycle: u64 = 0;
        loop {
            interval.tick().await;
            cycle += 1;
            run_cycle(&service, &dispatcher, cycle).await;
        }
    })
}

/// One poll cycle: deliver everything due, then maybe clean up.
///
/// A store read failure aborts this cycle only; the loop keeps ticking. A
/// cycle that outlives the poll interval is not overlapped, the next tick is
/// skipped instead.
pub async fn run_cycle(service: &SchedulerService, dispatcher: &Dispatcher, cycle: u64) {
    let Ok(_guard) = service.run_lock().try_lock() else {
        warn!("⏭️ cycle {cycle}: previous cycle still draining, skipping tick");
        return;
    };

    let cfg = &service.config().scheduler;
    let now = Utc::now();

    let due = match service.store().due(now, cfg.due_limit) {
        Ok(due) => due,
        Err(err) => {
            warn!("cycle {cycle}: store read failed, aborting cycle: {err}");
            return;
        }
    };

    if !due.is_empty() {
        info!("⏰ cycle {cycle}: {} post(s) due", due.len());
    }

    for (i, post) in due.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(Duration::from_secs(cfg.inter_post_delay_secs)).await;
        }
        if let Err(err) = dispatcher.deliver(post).await {
            error!("cycle {cycle}: post {} delivery failed: {err}", post.id);
        }
    }

    if cfg.cleanup_every_cycles > 0 && cycle % u64::from(cfg.cleanup_every_cycles) == 0 {
        let cutoff = now - chrono::Duration::minutes(cfg.retention_minutes as i64);
        match service.store().purge_delivered_before(cutoff) {
            Ok(0) => {}
            Ok(removed) => match service.store().stats() {
                Ok(stats) => info!(
                    "🧹 cleanup: removed {removed} delivered post(s), db now {} bytes",
                    stats.db_size_bytes
                ),
                Err(_) => info!("🧹 cleanup: removed {removed} delivered post(s)"),
            },
            Err(err) => warn!("cycle {cycle}: cleanup failed: {err}"),
        }
    }
}

//! Shared scheduler state: store handle, configuration, display timezone,
//! and the poll-cycle lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;

use postcast_core::config::PostcastConfig;
use postcast_core::error::Result;
use postcast_core::types::PostPayload;

use crate::store::PostStore;
use crate::timebox;

pub struct SchedulerService {
    store: Arc<PostStore>,
    config: PostcastConfig,
    tz: Tz,
    run_lock: Mutex<()>,
}

impl SchedulerService {
    pub fn new(store: Arc<PostStore>, config: PostcastConfig) -> Result<Self> {
        let tz = config.timezone()?;
        Ok(Self { store, config, tz, run_lock: Mutex::new(()) })
    }

    pub fn store(&self) -> &Arc<PostStore> {
        &self.store
    }

    pub fn config(&self) -> &PostcastConfig {
        &self.config
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Lock held for the duration of one poll cycle. `try_lock` failing means
    /// the previous cycle is still draining and this tick should be skipped.
    pub fn run_lock(&self) -> &Mutex<()> {
        &self.run_lock
    }

    /// Resolve an operator time expression in the display timezone.
    pub fn resolve_time(&self, expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        timebox::resolve(expr, now, self.tz)
    }

    /// Parse an operator duration expression to minutes.
    pub fn parse_duration(&self, expr: &str, now: DateTime<Utc>) -> Result<i64> {
        timebox::parse_duration_minutes(expr, now, self.tz)
    }

    /// Persist a planned batch of posts. The destination count is snapshotted
    /// at commit time for display; fan-out re-reads the live set later.
    pub fn commit_plan(&self, entries: Vec<(PostPayload, DateTime<Utc>)>) -> Result<Vec<i64>> {
        let destination_count = self.store.active_destination_count()?;
        let mut ids = Vec::with_capacity(entries.len());
        for (payload, at) in entries {
            ids.push(self.store.create(&payload, at, destination_count)?);
        }
        Ok(ids)
    }

    /// Format an instant in the display timezone for operator output.
    pub fn display_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz).format("%Y-%m-%d %H:%M %Z").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn service() -> SchedulerService {
        let store = Arc::new(PostStore::open_in_memory().unwrap());
        let config = PostcastConfig::default();
        SchedulerService::new(store, config).unwrap()
    }

    #[test]
    fn test_commit_plan_snapshots_destination_count() {
        let svc = service();
        svc.store().add_or_reactivate("-100111", None).unwrap();
        svc.store().add_or_reactivate("-100222", None).unwrap();

        let at = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let ids = svc
            .commit_plan(vec![
                (PostPayload::Text("a".into()), at),
                (PostPayload::Text("b".into()), at + chrono::Duration::minutes(5)),
            ])
            .unwrap();
        assert_eq!(ids.len(), 2);

        let pending = svc.store().list_pending().unwrap();
        assert!(pending.iter().all(|p| p.destination_count == 2));
    }

    #[test]
    fn test_display_time_uses_configured_zone() {
        let svc = service();
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        // Default display timezone is Asia/Kolkata (UTC+5:30).
        assert_eq!(svc.display_time(at), "2026-03-10 17:30 IST");
    }

    #[test]
    fn test_resolve_time_round_trip() {
        let svc = service();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let at = svc.resolve_time("2h", now).unwrap();
        assert_eq!(at, now + chrono::Duration::hours(2));
    }
}

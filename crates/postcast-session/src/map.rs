//! Session registry keyed by chat id. Sessions live in memory only; a
//! restart drops any half-finished compose flow.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::debug;

use crate::machine::{ComposeAction, ComposeEvent, ComposeReply, ComposeSession};

pub struct SessionMap {
    sessions: Mutex<HashMap<i64, ComposeSession>>,
    tz: Tz,
}

impl SessionMap {
    pub fn new(tz: Tz) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), tz }
    }

    /// Route an event to the chat's session, creating one on demand for mode
    /// selection. Returns `None` when a plain message arrives with no session
    /// open, so the router can fall through to its own handling.
    pub async fn handle(
        &self,
        chat_id: i64,
        event: ComposeEvent,
        now: DateTime<Utc>,
        active_destinations: u32,
    ) -> Option<ComposeReply> {
        let mut sessions = self.sessions.lock().await;

        if !sessions.contains_key(&chat_id) {
            match event {
                ComposeEvent::Select(_) => {
                    sessions.insert(chat_id, ComposeSession::new(self.tz));
                }
                ComposeEvent::Message(_) => return None,
            }
        }
        let session = sessions.get_mut(&chat_id)?;

        let reply = session.handle(event, now, active_destinations);
        if matches!(reply.action, ComposeAction::Commit(_)) {
            debug!("session {chat_id}: committed, dropping");
            sessions.remove(&chat_id);
        }
        Some(reply)
    }

    /// Drop a session (operator /cancel). Returns whether one existed.
    pub async fn cancel(&self, chat_id: i64) -> bool {
        self.sessions.lock().await.remove(&chat_id).is_some()
    }

    pub async fn is_active(&self, chat_id: i64) -> bool {
        self.sessions.lock().await.contains_key(&chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use postcast_core::types::PostPayload;
    use postcast_scheduler::planner::PlanMode;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn text(s: &str) -> ComposeEvent {
        ComposeEvent::Message(PostPayload::Text(s.into()))
    }

    #[tokio::test]
    async fn test_message_without_session_falls_through() {
        let map = SessionMap::new(chrono_tz::UTC);
        assert!(map.handle(1, text("hello"), now(), 1).await.is_none());
        assert!(!map.is_active(1).await);
    }

    #[tokio::test]
    async fn test_sessions_isolated_per_chat() {
        let map = SessionMap::new(chrono_tz::UTC);
        map.handle(1, ComposeEvent::Select(PlanMode::Spaced), now(), 1).await;
        assert!(map.is_active(1).await);
        assert!(!map.is_active(2).await);
        assert!(map.handle(2, text("now"), now(), 1).await.is_none());
    }

    #[tokio::test]
    async fn test_commit_drops_session() {
        let map = SessionMap::new(chrono_tz::UTC);
        map.handle(7, ComposeEvent::Select(PlanMode::Relative), now(), 1).await;
        map.handle(7, text("30m"), now(), 1).await;
        map.handle(7, text("content"), now(), 1).await;
        let reply = map.handle(7, text("confirm"), now(), 1).await.unwrap();
        assert!(matches!(reply.action, ComposeAction::Commit(_)));
        assert!(!map.is_active(7).await);
    }

    #[tokio::test]
    async fn test_cancel_removes_session() {
        let map = SessionMap::new(chrono_tz::UTC);
        map.handle(3, ComposeEvent::Select(PlanMode::Exact), now(), 1).await;
        assert!(map.cancel(3).await);
        assert!(!map.cancel(3).await);
        assert!(!map.is_active(3).await);
    }
}

//! Operator command routing.
//!
//! Every incoming event passes the admin gate first, then goes to either the
//! slash-command handlers or the active compose session. The router produces
//! reply text only; the caller owns actually sending it.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use postcast_core::error::Result;
use postcast_scheduler::planner::PlanMode;
use postcast_scheduler::service::SchedulerService;
use postcast_session::{ComposeAction, ComposeEvent, SessionMap};
use postcast_telegram::IncomingEvent;
use postcast_core::types::PostPayload;

const HELP_TEXT: &str = "\
📮 Postcast — scheduled multi-channel posting

/schedule — compose new posts (pick a mode)
/list — pending posts
/delete <id> — remove a pending post
/stats — store statistics
/channels — destinations
/addchannel <id> [name] — add or reactivate a destination
/removechannel <id> — deactivate a destination
/export — destinations as restore commands
/reset confirm — delete ALL pending posts
/cancel — abort the current compose session";

const MODE_MENU: &str = "\
🗓 Pick a schedule mode (reply with the word):

• spaced — posts spread evenly over a duration
• grouped — posts in batches spread over a duration
• exact — one post at an exact time
• relative — one post after a delay";

pub struct Router {
    service: Arc<SchedulerService>,
    sessions: SessionMap,
    admin_id: i64,
}

impl Router {
    pub fn new(service: Arc<SchedulerService>, admin_id: i64) -> Self {
        let sessions = SessionMap::new(service.tz());
        Self { service, sessions, admin_id }
    }

    /// Handle one incoming event, returning the reply to show the operator.
    /// Non-admin senders get no reply at all.
    pub async fn respond(&self, event: IncomingEvent) -> Option<String> {
        if event.sender_id != self.admin_id {
            debug!("ignoring message from non-admin {}", event.sender_id);
            return None;
        }

        let text = match self.dispatch(event.chat_id, event.payload).await {
            Ok(text) => text,
            Err(err) => {
                warn!("command failed: {err}");
                format!("⚠️ {err}")
            }
        };
        Some(text)
    }

    async fn dispatch(&self, chat_id: i64, payload: PostPayload) -> Result<String> {
        if let PostPayload::Text(text) = &payload {
            let trimmed = text.trim();
            if let Some(rest) = trimmed.strip_prefix('/') {
                return self.command(chat_id, rest).await;
            }
            // Mode keywords open a session; inside a session they are content.
            if !self.sessions.is_active(chat_id).await
                && let Some(mode) = parse_mode(trimmed)
            {
                return self.session_event(chat_id, ComposeEvent::Select(mode)).await;
            }
        }

        match self
            .sessions
            .handle(
                chat_id,
                ComposeEvent::Message(payload),
                Utc::now(),
                self.service.store().active_destination_count()?,
            )
            .await
        {
            Some(reply) => self.apply(reply),
            None => Ok("Use /schedule to start composing, or /help for commands.".into()),
        }
    }

    async fn session_event(&self, chat_id: i64, event: ComposeEvent) -> Result<String> {
        let active = self.service.store().active_destination_count()?;
        match self.sessions.handle(chat_id, event, Utc::now(), active).await {
            Some(reply) => self.apply(reply),
            None => Ok("Use /schedule to start composing.".into()),
        }
    }

    /// Persist whatever the session machine decided.
    fn apply(&self, reply: postcast_session::ComposeReply) -> Result<String> {
        match reply.action {
            ComposeAction::None => Ok(reply.text),
            ComposeAction::Commit(planned) => {
                self.service.commit_plan(planned)?;
                Ok(reply.text)
            }
        }
    }

    async fn command(&self, chat_id: i64, input: &str) -> Result<String> {
        let (cmd, args) = match input.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (input, ""),
        };
        // Strip the @botname suffix Telegram appends in groups.
        let cmd = cmd.split('@').next().unwrap_or(cmd);

        match cmd {
            "start" | "help" => Ok(HELP_TEXT.into()),

            "schedule" => {
                if let Some(mode) = parse_mode(args) {
                    self.session_event(chat_id, ComposeEvent::Select(mode)).await
                } else {
                    Ok(MODE_MENU.into())
                }
            }

            "list" => self.list_pending(),

            "export" => self.export_destinations(),

            "delete" => {
                let id: i64 = args
                    .parse()
                    .map_err(|_| postcast_core::PostcastError::Format("Usage: /delete <id>".into()))?;
                if self.service.store().delete(id)? {
                    Ok(format!("🗑 Post {id} deleted."))
                } else {
                    Ok(format!("Post {id} not found (already delivered or removed)."))
                }
            }

            "stats" => {
                let stats = self.service.store().stats()?;
                let destinations = self.service.store().active_destination_count()?;
                Ok(format!(
                    "📊 Posts: {} total, {} pending, {} delivered\n📡 Active destinations: {}\n💾 Database: {} KB",
                    stats.total,
                    stats.pending,
                    stats.delivered,
                    destinations,
                    stats.db_size_bytes / 1024,
                ))
            }

            "channels" => {
                let destinations = self.service.store().all_destinations()?;
                if destinations.is_empty() {
                    return Ok("No destinations yet. Add one with /addchannel <id> [name].".into());
                }
                let mut out = String::from("📡 Destinations:\n");
                for d in destinations {
                    let marker = if d.active { "✅" } else { "💤" };
                    let name = d.name.as_deref().unwrap_or("-");
                    out.push_str(&format!("{marker} {} ({name})\n", d.id));
                }
                Ok(out)
            }

            "addchannel" => {
                let (id, name) = match args.split_once(char::is_whitespace) {
                    Some((id, name)) => (id, Some(name.trim())),
                    None => (args, None),
                };
                if id.is_empty() {
                    return Ok("Usage: /addchannel <id> [name]".into());
                }
                self.service.store().add_or_reactivate(id, name)?;
                Ok(format!("✅ Destination {id} is active."))
            }

            "removechannel" => {
                if args.is_empty() {
                    return Ok("Usage: /removechannel <id>".into());
                }
                if self.service.store().deactivate(args)? {
                    Ok(format!("💤 Destination {args} deactivated. Re-add to resume."))
                } else {
                    Ok(format!("Destination {args} is not active."))
                }
            }

            "reset" => {
                if args == "confirm" {
                    let removed = self.service.store().clear_pending()?;
                    Ok(format!("🗑 Removed {removed} pending post(s)."))
                } else {
                    Ok("⚠️ This deletes ALL pending posts. Type /reset confirm to proceed.".into())
                }
            }

            "cancel" => {
                if self.sessions.cancel(chat_id).await {
                    Ok("❌ Compose session cancelled.".into())
                } else {
                    Ok("Nothing to cancel.".into())
                }
            }

            _ => Ok(format!("Unknown command /{cmd}. Try /help.")),
        }
    }

    fn list_pending(&self) -> Result<String> {
        const LIST_LIMIT: usize = 10;
        let pending = self.service.store().list_pending()?;
        if pending.is_empty() {
            return Ok("No pending posts. Use /schedule to add some.".into());
        }
        let total = pending.len();
        let mut out = format!("📋 {total} pending post(s):\n");
        for post in pending.iter().take(LIST_LIMIT) {
            out.push_str(&format!(
                "#{} — {} — {}\n",
                post.id,
                self.service.display_time(post.scheduled_at),
                post.payload.preview(40),
            ));
        }
        if total > LIST_LIMIT {
            out.push_str(&format!("… and {} more\n", total - LIST_LIMIT));
        }
        Ok(out)
    }

    /// Dump destinations as /addchannel commands, replayable after a wipe.
    fn export_destinations(&self) -> Result<String> {
        let destinations = self.service.store().all_destinations()?;
        let active: Vec<_> = destinations.into_iter().filter(|d| d.active).collect();
        if active.is_empty() {
            return Ok("No active destinations to export.".into());
        }
        let mut out = String::from("📤 Restore commands:\n");
        for d in active {
            match d.name {
                Some(name) => out.push_str(&format!("/addchannel {} {name}\n", d.id)),
                None => out.push_str(&format!("/addchannel {}\n", d.id)),
            }
        }
        Ok(out)
    }
}

fn parse_mode(text: &str) -> Option<PlanMode> {
    match text.trim().to_lowercase().as_str() {
        "spaced" => Some(PlanMode::Spaced),
        "grouped" => Some(PlanMode::Grouped),
        "exact" => Some(PlanMode::Exact),
        "relative" => Some(PlanMode::Relative),
        _ => None,
    }
}

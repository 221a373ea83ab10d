//! The compose state machine.
//!
//! One session per operator chat. Input arrives as [`ComposeEvent`]s; every
//! event produces a [`ComposeReply`] with text to show the operator and,
//! on confirmation, the finished plan for the caller to persist. Bad input
//! never advances the state, it just re-prompts.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use postcast_core::types::PostPayload;
use postcast_scheduler::planner::{self, PlanMode, PlanParams};
use postcast_scheduler::timebox;

/// How many planned entries the confirmation preview shows.
const PREVIEW_LIMIT: usize = 5;

#[derive(Debug, Clone)]
enum ComposeState {
    ChooseMode,
    AwaitStart {
        mode: PlanMode,
    },
    AwaitBatchSize {
        start: DateTime<Utc>,
    },
    AwaitDuration {
        mode: PlanMode,
        start: DateTime<Utc>,
        batch_size: usize,
    },
    Collect {
        mode: PlanMode,
        start: DateTime<Utc>,
        batch_size: usize,
        duration_minutes: i64,
        items: Vec<PostPayload>,
    },
    AwaitSingleTime {
        mode: PlanMode,
    },
    AwaitSingleContent {
        mode: PlanMode,
        at: DateTime<Utc>,
    },
    Confirm {
        planned: Vec<(PostPayload, DateTime<Utc>)>,
    },
}

/// Operator input, already stripped of slash commands by the router.
#[derive(Debug, Clone)]
pub enum ComposeEvent {
    /// Schedule mode picked from the mode menu.
    Select(PlanMode),
    /// Any content message: text or media. Text doubles as parameter input
    /// and as the `done` / `confirm` keywords, interpreted per state.
    Message(PostPayload),
}

/// What the caller should do after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum ComposeAction {
    /// Nothing to persist; just show the reply text.
    None,
    /// Operator confirmed: persist these `(payload, scheduled_at)` pairs and
    /// drop the session.
    Commit(Vec<(PostPayload, DateTime<Utc>)>),
}

#[derive(Debug, Clone)]
pub struct ComposeReply {
    pub text: String,
    pub action: ComposeAction,
}

impl ComposeReply {
    fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), action: ComposeAction::None }
    }
}

pub struct ComposeSession {
    state: ComposeState,
    tz: Tz,
}

impl ComposeSession {
    pub fn new(tz: Tz) -> Self {
        Self { state: ComposeState::ChooseMode, tz }
    }

    /// Whether the session has progressed past mode selection.
    pub fn in_progress(&self) -> bool {
        !matches!(self.state, ComposeState::ChooseMode)
    }

    /// Feed one event through the machine. `active_destinations` gates mode
    /// entry: composing with nowhere to deliver is rejected up front.
    pub fn handle(
        &mut self,
        event: ComposeEvent,
        now: DateTime<Utc>,
        active_destinations: u32,
    ) -> ComposeReply {
        match event {
            ComposeEvent::Select(mode) => self.on_select(mode, active_destinations),
            ComposeEvent::Message(payload) => self.on_message(payload, now),
        }
    }

    fn on_select(&mut self, mode: PlanMode, active_destinations: u32) -> ComposeReply {
        if active_destinations == 0 {
            return ComposeReply::text(
                "⚠️ No active destinations. Add one with /addchannel before scheduling.",
            );
        }
        match mode {
            PlanMode::Spaced | PlanMode::Grouped => {
                self.state = ComposeState::AwaitStart { mode };
                ComposeReply::text(
                    "🕐 When should posting start?\nExamples: now, 30m, 2h, today 18:00, tomorrow 9am, 2025-12-31 23:59",
                )
            }
            PlanMode::Exact | PlanMode::Relative => {
                self.state = ComposeState::AwaitSingleTime { mode };
                let prompt = if mode == PlanMode::Relative {
                    "⏱ In how long should it post?\nExamples: 30m, 2h, 1d"
                } else {
                    "🕐 When exactly should it post?\nExamples: today 18:00, tomorrow 9am, 2025-12-31 23:59"
                };
                ComposeReply::text(prompt)
            }
        }
    }

    fn on_message(&mut self, payload: PostPayload, now: DateTime<Utc>) -> ComposeReply {
        // `done` and `confirm` are control keywords only as plain text.
        let keyword = match &payload {
            PostPayload::Text(t) => Some(t.trim().to_lowercase()),
            PostPayload::Media { .. } => None,
        };

        match std::mem::replace(&mut self.state, ComposeState::ChooseMode) {
            ComposeState::ChooseMode => {
                ComposeReply::text("Use /schedule to start composing.")
            }

            ComposeState::AwaitStart { mode } => {
                let Some(expr) = keyword.as_deref() else {
                    self.state = ComposeState::AwaitStart { mode };
                    return ComposeReply::text("Please send a start time as text.");
                };
                match timebox::resolve(expr, now, self.tz) {
                    Ok(start) if start >= now => {
                        if mode == PlanMode::Grouped {
                            self.state = ComposeState::AwaitBatchSize { start };
                            ComposeReply::text("📦 How many posts per batch? (e.g. 20)")
                        } else {
                            self.state = ComposeState::AwaitDuration { mode, start, batch_size: 0 };
                            ComposeReply::text(
                                "⏳ Over what duration should they spread?\nExamples: 30m, 2h, 1d, today",
                            )
                        }
                    }
                    Ok(_) => {
                        self.state = ComposeState::AwaitStart { mode };
                        ComposeReply::text("⚠️ That time is in the past. Try again.")
                    }
                    Err(err) => {
                        self.state = ComposeState::AwaitStart { mode };
                        ComposeReply::text(format!("⚠️ {err}"))
                    }
                }
            }

            ComposeState::AwaitBatchSize { start } => {
                match keyword.as_deref().and_then(|t| t.parse::<usize>().ok()) {
                    Some(size) if (1..=100).contains(&size) => {
                        self.state = ComposeState::AwaitDuration {
                            mode: PlanMode::Grouped,
                            start,
                            batch_size: size,
                        };
                        ComposeReply::text(
                            "⏳ Over what duration should the batches spread?\nExamples: 30m, 2h, 1d, today",
                        )
                    }
                    _ => {
                        self.state = ComposeState::AwaitBatchSize { start };
                        ComposeReply::text("⚠️ Send a batch size between 1 and 100.")
                    }
                }
            }

            ComposeState::AwaitDuration { mode, start, batch_size } => {
                let parsed = keyword
                    .as_deref()
                    .ok_or_else(|| "send the duration as text".to_string())
                    .and_then(|expr| {
                        timebox::parse_duration_minutes(expr, now, self.tz)
                            .map_err(|e| e.to_string())
                    });
                match parsed {
                    Ok(minutes) if minutes > 0 => {
                        self.state = ComposeState::Collect {
                            mode,
                            start,
                            batch_size,
                            duration_minutes: minutes,
                            items: Vec::new(),
                        };
                        ComposeReply::text(
                            "📝 Now send your posts one by one (text or media).\nType 'done' when finished.",
                        )
                    }
                    Ok(_) => {
                        self.state = ComposeState::AwaitDuration { mode, start, batch_size };
                        ComposeReply::text("⚠️ Duration must be positive.")
                    }
                    Err(err) => {
                        self.state = ComposeState::AwaitDuration { mode, start, batch_size };
                        ComposeReply::text(format!("⚠️ {err}"))
                    }
                }
            }

            ComposeState::Collect { mode, start, batch_size, duration_minutes, mut items } => {
                if keyword.as_deref() == Some("done") {
                    if items.is_empty() {
                        self.state = ComposeState::Collect {
                            mode,
                            start,
                            batch_size,
                            duration_minutes,
                            items,
                        };
                        return ComposeReply::text(
                            "⚠️ Nothing collected yet. Send at least one post before 'done'.",
                        );
                    }
                    let planned = planner::plan(
                        mode,
                        items,
                        PlanParams { start, duration_minutes, batch_size },
                    );
                    let preview = self.preview(&planned);
                    self.state = ComposeState::Confirm { planned };
                    return ComposeReply::text(preview);
                }
                items.push(payload);
                let count = items.len();
                self.state = ComposeState::Collect {
                    mode,
                    start,
                    batch_size,
                    duration_minutes,
                    items,
                };
                ComposeReply::text(format!("✅ Added ({count} collected). Send more or 'done'."))
            }

            ComposeState::AwaitSingleTime { mode } => {
                let Some(expr) = keyword.as_deref() else {
                    self.state = ComposeState::AwaitSingleTime { mode };
                    return ComposeReply::text("Please send the time as text.");
                };
                match timebox::resolve(expr, now, self.tz) {
                    Ok(at) if at >= now => {
                        self.state = ComposeState::AwaitSingleContent { mode, at };
                        ComposeReply::text("📝 Now send the post content (text or media).")
                    }
                    Ok(_) => {
                        self.state = ComposeState::AwaitSingleTime { mode };
                        ComposeReply::text("⚠️ That time is in the past. Try again.")
                    }
                    Err(err) => {
                        self.state = ComposeState::AwaitSingleTime { mode };
                        ComposeReply::text(format!("⚠️ {err}"))
                    }
                }
            }

            ComposeState::AwaitSingleContent { mode, at } => {
                if matches!(keyword.as_deref(), Some("done") | Some("confirm")) {
                    self.state = ComposeState::AwaitSingleContent { mode, at };
                    return ComposeReply::text("Send the post content first.");
                }
                let planned = planner::plan(
                    mode,
                    vec![payload],
                    PlanParams { start: at, duration_minutes: 0, batch_size: 0 },
                );
                let preview = self.preview(&planned);
                self.state = ComposeState::Confirm { planned };
                ComposeReply::text(preview)
            }

            ComposeState::Confirm { planned } => {
                if keyword.as_deref() == Some("confirm") {
                    let count = planned.len();
                    self.state = ComposeState::ChooseMode;
                    return ComposeReply {
                        text: format!("🎉 Scheduled {count} post(s)!"),
                        action: ComposeAction::Commit(planned),
                    };
                }
                self.state = ComposeState::Confirm { planned };
                ComposeReply::text("Type 'confirm' to schedule, or /cancel to abort.")
            }
        }
    }

    fn preview(&self, planned: &[(PostPayload, DateTime<Utc>)]) -> String {
        let mut out = format!("📋 Ready to schedule {} post(s):\n", planned.len());
        for (payload, at) in planned.iter().take(PREVIEW_LIMIT) {
            let local = at.with_timezone(&self.tz).format("%Y-%m-%d %H:%M %Z");
            out.push_str(&format!("  • {local} — {}\n", payload.preview(40)));
        }
        if planned.len() > PREVIEW_LIMIT {
            out.push_str(&format!("  … and {} more\n", planned.len() - PREVIEW_LIMIT));
        }
        out.push_str("\nType 'confirm' to schedule, or /cancel to abort.");
        out
    }
}

//! # Postcast Scheduler
//!
//! The scheduling, polling, and delivery-fanout engine.
//!
//! ## Architecture
//! ```text
//! Poll loop (tokio interval, exclusive run lock)
//!   ├── PostStore.due(now, 200)        → due posts, oldest first
//!   ├── Dispatcher.deliver(post)       → batched concurrent fan-out
//!   │     ├── batch of 20 destinations, join_all
//!   │     ├── per-destination bounded retry (5 attempts, linear backoff)
//!   │     └── mark_delivered(id, success_count) — exactly once
//!   └── every 2nd cycle: purge delivered posts past retention
//!
//! Compose flows feed the store through the planner:
//!   timebox::resolve → planner::plan → PostStore.create
//! ```
//!
//! All instants are UTC. The display timezone exists only inside `timebox`.

pub mod dispatch;
pub mod planner;
pub mod poller;
pub mod retry;
pub mod service;
pub mod store;
pub mod timebox;

pub use dispatch::Dispatcher;
pub use planner::{PlanMode, PlanParams, plan};
pub use service::SchedulerService;
pub use store::{PostStore, StoreStats};

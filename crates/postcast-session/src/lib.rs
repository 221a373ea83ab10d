//! # Postcast Session
//!
//! Per-operator compose sessions: a small state machine that walks an
//! operator through picking a schedule mode, entering timing parameters,
//! collecting content, and confirming the resulting plan. Committing and
//! persisting the plan is the caller's job; the machine only produces it.

pub mod machine;
pub mod map;

pub use machine::{ComposeAction, ComposeEvent, ComposeReply, ComposeSession};
pub use map::SessionMap;

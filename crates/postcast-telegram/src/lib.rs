//! # Postcast Telegram
//!
//! Telegram Bot API transport: long-polling for operator input, message
//! sending for operator replies, and the [`postcast_core::DestinationSender`]
//! implementation the dispatcher fans out through.

pub mod api;
pub mod sender;

pub use api::{IncomingEvent, TelegramClient, TelegramUpdate, UpdatePoller};
pub use sender::TelegramSender;

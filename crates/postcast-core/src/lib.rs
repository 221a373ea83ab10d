//! # Postcast Core
//!
//! Shared foundation for the Postcast scheduler: configuration, the error
//! taxonomy, post/destination types, and the `DestinationSender` capability
//! trait that delivery fan-out is written against.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::PostcastConfig;
pub use error::{PostcastError, Result, SendError};
pub use traits::DestinationSender;
pub use types::{DeliveryState, Destination, MediaKind, Post, PostPayload};

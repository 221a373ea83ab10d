//! Capability traits consumed by the scheduler core.

use async_trait::async_trait;

use crate::error::SendError;
use crate::types::PostPayload;

/// The outbound message transport, abstracted so the delivery dispatcher can
/// be exercised without a live bot. One call = one delivery attempt to one
/// destination; the implementation applies its own request timeout and maps
/// transport failures into the retryable/terminal split.
#[async_trait]
pub trait DestinationSender: Send + Sync {
    async fn send(&self, destination_id: &str, payload: &PostPayload) -> Result<(), SendError>;
}

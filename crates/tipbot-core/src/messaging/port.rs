use async_trait::async_trait;

use crate::{
    messaging::types::{MessagingCapabilities, OutgoingMessage, Visibility},
    Result,
};

/// Reply slot of a single inbound event (command or button press).
///
/// The first `show` sends a message; later calls replace that same message, which
/// is how "processing" turns into the final result.
#[async_trait]
pub trait Conversation: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// Tell the platform the event was received, before any slow work starts.
    ///
    /// `expected` is the visibility of the reply the event will most likely
    /// produce. Platforms without a response deadline need not do anything.
    async fn acknowledge(&self, expected: Visibility) -> Result<()> {
        let _ = expected;
        Ok(())
    }

    async fn show(&self, message: OutgoingMessage) -> Result<()>;
}

/// Unsolicited direct message to a platform-native user id.
#[async_trait]
pub trait DirectMessenger: Send + Sync {
    async fn send_direct(&self, native_id: u64, text: &str) -> Result<()>;
}

//! Message handlers invoked by the subscription loop.

use async_trait::async_trait;

use crate::messaging::types::Message;

/// Handles one delivered message.
///
/// Returning `Some(payload)` publishes it to the message's reply subject, if
/// the message has one.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> Option<Vec<u8>>;
}

/// Logs each delivery and never replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, message: &Message) -> Option<Vec<u8>> {
        tracing::debug!(
            subject = %message.subject,
            sid = message.sid,
            reply_to = ?message.reply_to,
            bytes = message.payload.len(),
            "Message received"
        );
        None
    }
}

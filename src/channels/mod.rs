//! Outbound message channels.

pub mod admin;
pub mod twitter;

use async_trait::async_trait;

use crate::error::SendError;

pub use admin::ReplyAdminNotifier;
pub use twitter::TwitterReplySender;

/// Posts a public message, optionally as a reply to another message.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Post `text`. `in_reply_to` is the numeric id of the message being answered.
    async fn post(&self, text: &str, in_reply_to: Option<&str>) -> Result<(), SendError>;
}

/// Best-effort operator notification. Failures are logged by the implementation.
#[async_trait]
pub trait AdminNotifier: Send + Sync {
    async fn notify(&self, text: &str);
}

//! Reply gating: blacklist, mention prefix, timestamp suffix, send-disabled mode.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::channels::ReplySender;
use crate::error::SendError;
use crate::pipeline::types::IncomingMessage;

/// Wraps a [`ReplySender`] with the rules every outbound reply obeys.
pub struct ReplyPolicy {
    sender: Arc<dyn ReplySender>,
    blacklist: Vec<String>,
    send_enabled: bool,
}

impl ReplyPolicy {
    pub fn new(sender: Arc<dyn ReplySender>, blacklist: Vec<String>, send_enabled: bool) -> Self {
        Self {
            sender,
            blacklist: blacklist.into_iter().map(|s| s.trim().to_string()).collect(),
            send_enabled,
        }
    }

    /// True when the author must never be messaged.
    pub fn is_blacklisted(&self, author: &str) -> bool {
        self.blacklist.iter().any(|b| b == author)
    }

    /// Reply to `message` with `text`.
    ///
    /// Returns `Ok(true)` when the reply went out (or would have, with sending
    /// disabled) and `Ok(false)` when the author is blacklisted. Steps that
    /// depend on the reply must only run on `Ok(true)`.
    pub async fn send_reply(
        &self,
        message: &IncomingMessage,
        text: &str,
        add_timestamp: bool,
    ) -> Result<bool, SendError> {
        if self.is_blacklisted(&message.author) {
            info!(author = %message.author, "Author is blacklisted, not replying");
            return Ok(false);
        }

        let reply_to = message
            .numeric_id()
            .ok_or_else(|| SendError::MissingReplyId(message.id.clone()))?;

        let mut reply = format!("@{} {}", message.author, text);
        if add_timestamp {
            reply.push_str(&format!(" {}", Utc::now().timestamp_millis()));
        }

        if !self.send_enabled {
            info!(reply = %reply, reply_to, "Sending disabled, would have replied");
            return Ok(true);
        }

        self.sender.post(&reply, Some(reply_to)).await?;
        debug!(reply = %reply, reply_to, "Reply sent");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        posts: Mutex<Vec<(String, Option<String>)>>,
        fail: bool,
    }

    #[async_trait]
    impl ReplySender for RecordingSender {
        async fn post(&self, text: &str, in_reply_to: Option<&str>) -> Result<(), SendError> {
            if self.fail {
                return Err(SendError::Rejected {
                    status: 403,
                    body: "duplicate".into(),
                });
            }
            self.posts
                .lock()
                .unwrap()
                .push((text.to_string(), in_reply_to.map(String::from)));
            Ok(())
        }
    }

    fn message(author: &str) -> IncomingMessage {
        IncomingMessage::from_activity(serde_json::json!({
            "id": "tag:search.twitter.com,2005:5551234",
            "actor": { "preferredUsername": author },
            "body": "banjir"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn reply_mentions_author_and_targets_message() {
        let sender = Arc::new(RecordingSender::default());
        let policy = ReplyPolicy::new(sender.clone(), vec![], true);

        let sent = policy.send_reply(&message("alice"), "hello", false).await.unwrap();
        assert!(sent);
        let posts = sender.posts.lock().unwrap();
        assert_eq!(posts[0], ("@alice hello".to_string(), Some("5551234".to_string())));
    }

    #[tokio::test]
    async fn timestamp_is_appended() {
        let sender = Arc::new(RecordingSender::default());
        let policy = ReplyPolicy::new(sender.clone(), vec![], true);

        policy.send_reply(&message("alice"), "hello", true).await.unwrap();
        let posts = sender.posts.lock().unwrap();
        let suffix = posts[0].0.strip_prefix("@alice hello ").unwrap();
        assert!(suffix.parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn blacklisted_author_gets_nothing() {
        let sender = Arc::new(RecordingSender::default());
        let policy = ReplyPolicy::new(sender.clone(), vec!["petajkt".into(), " excluded ".into()], true);

        let mut ran_callback = false;
        if policy.send_reply(&message("excluded"), "hello", true).await.unwrap() {
            ran_callback = true;
        }
        assert!(!ran_callback);
        assert!(sender.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_sending_still_reports_success() {
        let sender = Arc::new(RecordingSender::default());
        let policy = ReplyPolicy::new(sender.clone(), vec![], false);

        assert!(policy.send_reply(&message("alice"), "hello", true).await.unwrap());
        assert!(sender.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_error() {
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..Default::default()
        });
        let policy = ReplyPolicy::new(sender, vec![], true);
        let err = policy.send_reply(&message("alice"), "hello", false).await.unwrap_err();
        assert!(matches!(err, SendError::Rejected { status: 403, .. }));
    }

    #[tokio::test]
    async fn message_without_numeric_id_cannot_be_answered() {
        let sender = Arc::new(RecordingSender::default());
        let policy = ReplyPolicy::new(sender.clone(), vec![], true);
        let mut msg = message("alice");
        msg.id = "tag:search.twitter.com,2005:".into();
        let err = policy.send_reply(&msg, "hello", false).await.unwrap_err();
        assert!(matches!(err, SendError::MissingReplyId(_)));
    }
}

//! Admin notifications delivered as public mentions.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::channels::{AdminNotifier, ReplySender};

/// Mentions each configured admin account with the notification text.
pub struct ReplyAdminNotifier {
    sender: Arc<dyn ReplySender>,
    recipients: Vec<String>,
}

impl ReplyAdminNotifier {
    pub fn new(sender: Arc<dyn ReplySender>, recipients: Vec<String>) -> Self {
        Self { sender, recipients }
    }
}

#[async_trait]
impl AdminNotifier for ReplyAdminNotifier {
    async fn notify(&self, text: &str) {
        if self.recipients.is_empty() {
            warn!(notification = %text, "No admin recipients configured");
            return;
        }

        for recipient in &self.recipients {
            let message = format!("@{recipient} {text}");
            match self.sender.post(&message, None).await {
                Ok(()) => info!(recipient = %recipient, "Admin notification sent"),
                Err(e) => error!(recipient = %recipient, error = %e, "Admin notification failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SendError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        posts: Mutex<Vec<(String, Option<String>)>>,
        fail: bool,
    }

    #[async_trait]
    impl ReplySender for RecordingSender {
        async fn post(&self, text: &str, in_reply_to: Option<&str>) -> Result<(), SendError> {
            self.posts
                .lock()
                .unwrap()
                .push((text.to_string(), in_reply_to.map(String::from)));
            if self.fail {
                return Err(SendError::Request("offline".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn mentions_every_recipient() {
        let sender = Arc::new(RecordingSender::default());
        let notifier = ReplyAdminNotifier::new(sender.clone(), vec!["ops".into(), "oncall".into()]);
        notifier.notify("stream offline").await;

        let posts = sender.posts.lock().unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0], ("@ops stream offline".to_string(), None));
        assert_eq!(posts[1].0, "@oncall stream offline");
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..Default::default()
        });
        let notifier = ReplyAdminNotifier::new(sender.clone(), vec!["ops".into(), "oncall".into()]);
        notifier.notify("stream offline").await;
        // Second recipient is still attempted
        assert_eq!(sender.posts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn no_recipients_posts_nothing() {
        let sender = Arc::new(RecordingSender::default());
        let notifier = ReplyAdminNotifier::new(sender.clone(), Vec::new());
        notifier.notify("stream offline").await;
        assert!(sender.posts.lock().unwrap().is_empty());
    }
}

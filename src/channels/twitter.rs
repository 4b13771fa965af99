//! Twitter v2 reply sender (`POST /2/tweets`, user-context bearer token).

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::channels::ReplySender;
use crate::error::SendError;

pub struct TwitterReplySender {
    client: reqwest::Client,
    api_url: String,
    bearer_token: SecretString,
}

impl TwitterReplySender {
    pub fn new(api_url: impl Into<String>, bearer_token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            bearer_token,
        }
    }

    fn tweets_url(&self) -> String {
        format!("{}/2/tweets", self.api_url.trim_end_matches('/'))
    }
}

/// Request body for a new tweet, with the reply target when answering.
fn tweet_body(text: &str, in_reply_to: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({ "text": text });
    if let Some(id) = in_reply_to {
        body["reply"] = serde_json::json!({ "in_reply_to_tweet_id": id });
    }
    body
}

#[async_trait]
impl ReplySender for TwitterReplySender {
    async fn post(&self, text: &str, in_reply_to: Option<&str>) -> Result<(), SendError> {
        let resp = self
            .client
            .post(self.tweets_url())
            .bearer_auth(self.bearer_token.expose_secret())
            .json(&tweet_body(text, in_reply_to))
            .send()
            .await
            .map_err(|e| SendError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(in_reply_to = ?in_reply_to, "Tweet posted");
        Ok(())
    }
}

//! Stream transport seams: events, sessions, rules.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{RuleSyncError, StreamError};

/// One event from an open stream session.
#[derive(Debug)]
pub enum StreamEvent {
    /// The connection is established and data will follow.
    Ready,
    /// Heartbeat with no payload.
    KeepAlive,
    /// One activity (or system message) envelope.
    Data(serde_json::Value),
    /// The connection failed.
    Error(String),
    /// The remote closed the stream.
    End,
}

/// An open stream connection.
///
/// Events arrive on a channel fed by a reader task. Dropping or destroying
/// the session stops the reader.
pub struct TransportSession {
    events: mpsc::Receiver<StreamEvent>,
    reader: Option<JoinHandle<()>>,
}

impl TransportSession {
    pub fn new(events: mpsc::Receiver<StreamEvent>, reader: JoinHandle<()>) -> Self {
        Self {
            events,
            reader: Some(reader),
        }
    }

    /// A session fed directly through a channel, with no reader task.
    pub fn from_channel(events: mpsc::Receiver<StreamEvent>) -> Self {
        Self {
            events,
            reader: None,
        }
    }

    /// Next event, or `None` once the reader has gone away.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Tear down the connection.
    pub fn destroy(mut self) {
        self.stop_reader();
        debug!("Stream session destroyed");
    }

    fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.events.close();
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

/// A server-side filter rule. Matching messages carry its tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRule {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl StreamRule {
    /// Build the rule set from a `tag → rule value` map.
    pub fn from_config(rules: &BTreeMap<String, String>) -> Vec<Self> {
        rules
            .iter()
            .map(|(tag, value)| Self {
                value: value.clone(),
                tag: Some(tag.clone()),
            })
            .collect()
    }
}

/// Opens stream sessions.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn start(&self) -> Result<TransportSession, StreamError>;
}

/// Replaces the server-side rule set.
#[async_trait]
pub trait RuleSync: Send + Sync {
    /// Delete every existing rule, then add `rules`.
    async fn replace_rules(&self, rules: &[StreamRule]) -> Result<(), RuleSyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_from_tag_map() {
        let map = BTreeMap::from([
            ("addressed".to_string(), "@petajkt".to_string()),
            ("boundingbox".to_string(), "bounding_box:[106.5 -6.4 107.0 -6.1]".to_string()),
        ]);
        let rules = StreamRule::from_config(&map);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].tag.as_deref(), Some("addressed"));
        assert_eq!(rules[0].value, "@petajkt");
    }

    #[test]
    fn rule_without_tag_serializes_value_only() {
        let rule = StreamRule {
            value: "banjir".into(),
            tag: None,
        };
        assert_eq!(serde_json::to_value(&rule).unwrap(), serde_json::json!({ "value": "banjir" }));
    }

    #[tokio::test]
    async fn channel_session_yields_events_then_none() {
        let (tx, rx) = mpsc::channel(4);
        let mut session = TransportSession::from_channel(rx);
        tx.send(StreamEvent::Ready).await.unwrap();
        drop(tx);

        assert!(matches!(session.next_event().await, Some(StreamEvent::Ready)));
        assert!(session.next_event().await.is_none());
        session.destroy();
    }
}

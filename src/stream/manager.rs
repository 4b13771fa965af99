//! Stream connection manager.
//!
//! Syncs the rule set once, then keeps a stream session open forever:
//! connect, consume events until a fault, back off, reconnect. Faults are
//! transport errors, remote close, failed connects, and idle timeouts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::channels::AdminNotifier;
use crate::config::StreamConfig;
use crate::error::{PipelineError, RuleSyncError, StreamError};
use crate::pipeline::cache::CacheGate;
use crate::pipeline::types::IncomingMessage;
use crate::stream::backoff::ReconnectState;
use crate::stream::types::{RuleSync, StreamEvent, StreamRule, StreamTransport, TransportSession};

/// Timing and rules for a [`StreamConnectionManager`].
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub instance: String,
    pub rules: Vec<StreamRule>,
    pub idle_timeout: Duration,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl ManagerSettings {
    pub fn from_config(instance: &str, config: &StreamConfig) -> Self {
        Self {
            instance: instance.to_string(),
            rules: StreamRule::from_config(&config.rules),
            idle_timeout: config.idle_timeout(),
            initial_reconnect_delay: config.initial_reconnect_delay(),
            max_reconnect_delay: config.max_reconnect_delay(),
        }
    }
}

pub struct StreamConnectionManager {
    settings: ManagerSettings,
    transport: Arc<dyn StreamTransport>,
    rule_sync: Arc<dyn RuleSync>,
    gate: Arc<CacheGate>,
    notifier: Arc<dyn AdminNotifier>,
    backoff: ReconnectState,
}

impl StreamConnectionManager {
    pub fn new(
        settings: ManagerSettings,
        transport: Arc<dyn StreamTransport>,
        rule_sync: Arc<dyn RuleSync>,
        gate: Arc<CacheGate>,
        notifier: Arc<dyn AdminNotifier>,
    ) -> Self {
        let backoff = ReconnectState::new(
            settings.initial_reconnect_delay,
            settings.max_reconnect_delay,
        );
        Self {
            settings,
            transport,
            rule_sync,
            gate,
            notifier,
            backoff,
        }
    }

    /// Replace the upstream rules, then stream until the task is cancelled.
    ///
    /// Only a rule sync failure returns; the stream itself is never given up on.
    pub async fn run(&mut self) -> Result<(), RuleSyncError> {
        info!(count = self.settings.rules.len(), "Replacing stream rules");
        self.rule_sync.replace_rules(&self.settings.rules).await?;
        info!("Stream rules replaced");

        loop {
            info!("Connecting to stream");
            let fault = match self.transport.start().await {
                Ok(session) => self.consume(session).await,
                Err(e) => e,
            };
            self.reconnect(fault).await;
        }
    }

    /// Handle events until the session faults, then destroy it.
    async fn consume(&mut self, mut session: TransportSession) -> StreamError {
        let idle_timeout = self.settings.idle_timeout;
        let fault = loop {
            let event = match tokio::time::timeout(idle_timeout, session.next_event()).await {
                Ok(Some(event)) => event,
                Ok(None) => break StreamError::Ended,
                Err(_) => break StreamError::IdleTimeout(idle_timeout),
            };

            match event {
                StreamEvent::Ready => {
                    info!("Stream connected");
                    self.backoff.reset();
                }
                StreamEvent::KeepAlive => debug!("Stream keep-alive"),
                StreamEvent::Data(envelope) => self.dispatch(envelope).await,
                StreamEvent::Error(e) => break StreamError::Transport(e),
                StreamEvent::End => break StreamError::Ended,
            }
        };
        session.destroy();
        fault
    }

    /// Hand one envelope to the cache gate. System messages are only logged.
    async fn dispatch(&self, envelope: serde_json::Value) {
        match IncomingMessage::from_activity(envelope) {
            Ok(message) => self.gate.submit(message).await,
            Err(PipelineError::NotActivity(raw)) => {
                info!(message = %raw, "Stream system message");
            }
            Err(e) => error!(error = %e, "Dropping unreadable activity"),
        }
    }

    /// Wait out the backoff delay, alerting admins once per outage.
    async fn reconnect(&mut self, fault: StreamError) {
        let next = self.backoff.next();
        warn!(
            error = %fault,
            delay_ms = next.delay.as_millis() as u64,
            "Stream disconnected, reconnecting"
        );

        if next.notify {
            let text = format!(
                "{} stream is down, retrying every {}s: {}",
                self.settings.instance,
                next.delay.as_secs(),
                fault
            );
            self.notifier.notify(&text).await;
        }

        tokio::time::sleep(next.delay).await;
    }
}

//! PowerTrack HTTP stream and rules API clients.
//!
//! The stream is a long-lived GET returning newline-delimited JSON. Blank
//! lines are heartbeats. Both endpoints use basic auth.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{RuleSyncError, StreamError};
use crate::stream::types::{RuleSync, StreamEvent, StreamRule, StreamTransport, TransportSession};

/// Events buffered between the reader task and the manager.
const EVENT_BUFFER: usize = 256;

/// Longest accepted activity line.
const MAX_LINE_BYTES: usize = 1024 * 1024;

// ── Stream ──────────────────────────────────────────────────────────

/// Streaming connection to a PowerTrack endpoint.
pub struct PowertrackStream {
    client: reqwest::Client,
    url: String,
    username: String,
    password: SecretString,
}

impl PowertrackStream {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.stream_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

#[async_trait]
impl StreamTransport for PowertrackStream {
    async fn start(&self) -> Result<TransportSession, StreamError> {
        let resp = self
            .client
            .get(&self.url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StreamError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(read_stream(resp, tx));
        Ok(TransportSession::new(rx, reader))
    }
}

/// Pump response chunks into events until the body ends or the session goes away.
async fn read_stream(mut resp: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    if tx.send(StreamEvent::Ready).await.is_err() {
        return;
    }

    let mut decoder = LineDecoder::default();
    loop {
        let event_batch = match resp.chunk().await {
            Ok(Some(chunk)) => decoder.push(&chunk),
            Ok(None) => vec![StreamEvent::End],
            Err(e) => vec![StreamEvent::Error(e.to_string())],
        };

        let done = matches!(
            event_batch.last(),
            Some(StreamEvent::End | StreamEvent::Error(_))
        );
        for event in event_batch {
            if tx.send(event).await.is_err() {
                debug!("Stream session dropped, stopping reader");
                return;
            }
        }
        if done {
            return;
        }
    }
}

/// Splits a byte stream into newline-terminated events.
///
/// A line longer than `max_line` is discarded up to its newline.
#[derive(Debug)]
struct LineDecoder {
    pending: Vec<u8>,
    /// Bytes of `pending` already searched for a newline.
    scanned: usize,
    max_line: usize,
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            scanned: 0,
            max_line,
            discarding: false,
        }
    }

    /// Feed one chunk, returning every event completed by it.
    fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(offset) = self.pending[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            self.scanned = 0;

            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }
        self.scanned = self.pending.len();

        if self.pending.len() > self.max_line {
            if !self.discarding {
                warn!(max_line = self.max_line, "Stream line too long, discarding it");
            }
            self.discarding = true;
            self.pending.clear();
            self.scanned = 0;
        }
        events
    }
}

fn decode_line(line: &[u8]) -> Option<StreamEvent> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Some(StreamEvent::KeepAlive);
    }
    match serde_json::from_slice(line) {
        Ok(value) => Some(StreamEvent::Data(value)),
        Err(e) => {
            warn!(error = %e, "Skipping unparseable stream line");
            None
        }
    }
}

// ── Rules ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct RuleList {
    rules: Vec<StreamRule>,
}

/// Client for the PowerTrack rules endpoint.
pub struct PowertrackRules {
    client: reqwest::Client,
    url: String,
    username: String,
    password: SecretString,
}

impl PowertrackRules {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.rules_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    async fn fetch(&self) -> Result<Vec<StreamRule>, RuleSyncError> {
        let resp = self
            .client
            .get(&self.url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .send()
            .await
            .map_err(|e| RuleSyncError::Request(e.to_string()))?;
        let resp = check_status(resp).await?;

        let list: RuleList = resp
            .json()
            .await
            .map_err(|e| RuleSyncError::InvalidResponse(e.to_string()))?;
        Ok(list.rules)
    }

    async fn submit(&self, url: &str, rules: Vec<StreamRule>) -> Result<(), RuleSyncError> {
        let resp = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .json(&RuleList { rules })
            .send()
            .await
            .map_err(|e| RuleSyncError::Request(e.to_string()))?;
        check_status(resp).await?;
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, RuleSyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RuleSyncError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RuleSync for PowertrackRules {
    async fn replace_rules(&self, rules: &[StreamRule]) -> Result<(), RuleSyncError> {
        let existing = self.fetch().await?;
        if !existing.is_empty() {
            let count = existing.len();
            self.submit(&format!("{}?_method=delete", self.url), existing)
                .await?;
            info!(count, "Deleted existing stream rules");
        }

        if !rules.is_empty() {
            self.submit(&self.url, rules.to_vec()).await?;
        }
        info!(count = rules.len(), "Added stream rules");
        Ok(())
    }
}

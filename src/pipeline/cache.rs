//! Failover cache in front of the message handler.
//!
//! While enabled, messages are held in arrival order instead of being handled.
//! Disabling drains the buffer through the handler before any later message.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::PipelineError;
use crate::pipeline::types::IncomingMessage;

/// Something that consumes parsed messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: IncomingMessage) -> Result<(), PipelineError>;
}

struct GateState {
    enabled: bool,
    buffer: Vec<IncomingMessage>,
}

/// Pass-through or buffering gate in front of a [`MessageHandler`].
///
/// The state lock is held for the whole of a submit or flush, so a message
/// submitted after `disable()` can never overtake a buffered one.
pub struct CacheGate {
    state: Mutex<GateState>,
    handler: Arc<dyn MessageHandler>,
}

impl CacheGate {
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            state: Mutex::new(GateState {
                enabled: false,
                buffer: Vec::new(),
            }),
            handler,
        }
    }

    /// Start buffering. No-op when already enabled.
    pub async fn enable(&self) {
        let mut state = self.state.lock().await;
        if !state.enabled {
            state.enabled = true;
            info!("Message cache enabled, buffering incoming messages");
        }
    }

    /// Return to pass-through and hand every buffered message to the handler.
    pub async fn disable(&self) {
        let mut state = self.state.lock().await;
        if !state.enabled {
            return;
        }
        state.enabled = false;

        let buffered = std::mem::take(&mut state.buffer);
        info!(count = buffered.len(), "Message cache disabled, flushing");
        for message in buffered {
            self.deliver(message).await;
        }
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.enabled
    }

    /// Number of messages currently held.
    pub async fn buffered(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    /// Buffer the message when enabled, otherwise handle it now.
    pub async fn submit(&self, message: IncomingMessage) {
        let mut state = self.state.lock().await;
        if state.enabled {
            debug!(id = %message.id, "Caching message");
            state.buffer.push(message);
            return;
        }
        self.deliver(message).await;
    }

    /// Hand one message to the handler. Errors and panics stop here.
    async fn deliver(&self, message: IncomingMessage) {
        let id = message.id.clone();
        let outcome = AssertUnwindSafe(self.handler.handle(message))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(id = %id, error = %e, "Failed to process message"),
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(
                    id = %id,
                    error = %PipelineError::HandlerPanicked(reason),
                    "Message handler panicked"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Report processing pipeline.
//!
//! Every message accepted from the stream flows through:
//! 1. `CacheGate`: pass-through, or buffered while the cache is enabled
//! 2. `rules::classify_message()`: rule tags + geo into `Signals`
//! 3. `rules::categorize()`: `Signals` into one `Action`
//! 4. `ActionExecutor::execute()`: store writes and replies
//!
//! A share by the verifying account first marks the shared report as
//! verified, then is categorized like any other message.

pub mod cache;
pub mod executor;
pub mod messages;
pub mod reply;
pub mod rules;
pub mod types;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::PipelineError;
use crate::pipeline::cache::MessageHandler;
use crate::pipeline::executor::ActionExecutor;
use crate::pipeline::types::IncomingMessage;

/// Verb of an activity that re-shares another one.
const SHARE_VERB: &str = "share";

/// Classifies each message and executes the resulting action.
pub struct ReportPipeline {
    executor: ActionExecutor,
    verifier: Option<String>,
}

impl ReportPipeline {
    pub fn new(executor: ActionExecutor, verifier: Option<String>) -> Self {
        Self { executor, verifier }
    }

    fn is_verification(&self, message: &IncomingMessage) -> bool {
        message.verb == SHARE_VERB
            && self
                .verifier
                .as_deref()
                .is_some_and(|v| v.eq_ignore_ascii_case(&message.author))
    }
}

#[async_trait]
impl MessageHandler for ReportPipeline {
    async fn handle(&self, message: IncomingMessage) -> Result<(), PipelineError> {
        if self.is_verification(&message) {
            if let Err(e) = self.executor.verify(&message).await {
                error!(id = %message.id, error = %e, "Failed to verify shared report");
            }
        }

        let signals = rules::classify_message(&message);
        let action = rules::categorize(signals);
        info!(
            id = %message.id,
            signals = %signals.summary(),
            action = action.label(),
            "Message categorized"
        );

        self.executor.execute(action, &message).await
    }
}

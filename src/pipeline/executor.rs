//! Side effects per categorized action: store writes and replies.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::pipeline::messages::{ASK_FOR_GEO_TEXT, INVITE_TEXT, MessageTexts, THANKS_TEXT};
use crate::pipeline::reply::ReplyPolicy;
use crate::pipeline::types::{Action, IncomingMessage};
use crate::store::{ReportRecord, ReportStore};

/// Runs the store writes and replies for one categorized message.
pub struct ActionExecutor {
    store: Arc<dyn ReportStore>,
    replies: ReplyPolicy,
    texts: MessageTexts,
    add_timestamp: bool,
}

impl ActionExecutor {
    pub fn new(
        store: Arc<dyn ReportStore>,
        replies: ReplyPolicy,
        texts: MessageTexts,
        add_timestamp: bool,
    ) -> Self {
        Self {
            store,
            replies,
            texts,
            add_timestamp,
        }
    }

    pub async fn execute(
        &self,
        action: Action,
        message: &IncomingMessage,
    ) -> Result<(), PipelineError> {
        match action {
            Action::Confirmed => self.confirmed(message).await,
            Action::Unconfirmed => self.unconfirmed(message).await,
            Action::AskForGeo => self.ask_for_geo(message).await,
            Action::Invite => self.invite_if_new(message).await,
            Action::NoMatch => {
                debug!(id = %message.id, "No action for message");
                Ok(())
            }
        }
    }

    /// Store the report, count the reporter, thank them with the report reference.
    async fn confirmed(&self, message: &IncomingMessage) -> Result<(), PipelineError> {
        let report_id = self
            .store
            .insert_confirmed_report(&ReportRecord::from_message(message))
            .await?;
        info!(id = %message.id, report_id, "Confirmed report stored");

        self.store.upsert_reporter(&message.author_hash()).await?;

        let Some(reference) = self.store.report_reference(report_id).await? else {
            warn!(report_id, "Confirmed report has no reference, not thanking author");
            return Ok(());
        };

        if let Some(thanks) = self.texts.resolve(THANKS_TEXT, &message.languages) {
            // The reference number already makes the text unique
            self.replies
                .send_reply(message, &format!("{thanks}{reference}"), false)
                .await?;
        }
        Ok(())
    }

    /// Store the coordinates only, then invite a first-time author.
    async fn unconfirmed(&self, message: &IncomingMessage) -> Result<(), PipelineError> {
        let geo = message.geo.ok_or_else(|| {
            PipelineError::MalformedActivity(format!("{} has no coordinates", message.id))
        })?;
        self.store
            .insert_unconfirmed_report(message.posted_at, geo)
            .await?;
        debug!(id = %message.id, "Unconfirmed report stored");

        self.invite_if_new(message).await
    }

    /// Store the text, remember the author, ask them to turn on location.
    async fn ask_for_geo(&self, message: &IncomingMessage) -> Result<(), PipelineError> {
        self.store
            .insert_nonspatial_report(&ReportRecord::from_message(message).without_geo())
            .await?;

        let author = message.author_hash();
        if !self.store.is_known_user(&author).await? {
            self.store.insert_nonspatial_user(&author).await?;
        }

        if let Some(text) = self.texts.resolve(ASK_FOR_GEO_TEXT, &message.languages) {
            self.replies
                .send_reply(message, &text, self.add_timestamp)
                .await?;
        }
        Ok(())
    }

    /// Invite the author unless we've been in contact before.
    ///
    /// The invitee is only recorded once the invite actually went out.
    async fn invite_if_new(&self, message: &IncomingMessage) -> Result<(), PipelineError> {
        let author = message.author_hash();
        if self.store.is_known_user(&author).await? {
            debug!(id = %message.id, "Author already contacted, not inviting");
            return Ok(());
        }

        let Some(text) = self.texts.resolve(INVITE_TEXT, &message.languages) else {
            return Ok(());
        };
        if self
            .replies
            .send_reply(message, &text, self.add_timestamp)
            .await?
        {
            self.store.insert_invitee(&author).await?;
        }
        Ok(())
    }

    /// Mark the report behind a verifying account's share as verified.
    pub async fn verify(&self, message: &IncomingMessage) -> Result<(), PipelineError> {
        let Some(source_id) = message.shared_numeric_id() else {
            warn!(id = %message.id, "Verification share has no shared object id");
            return Ok(());
        };

        match self.store.find_report_by_source_id(source_id).await? {
            Some(report_id) => {
                self.store.mark_report_verified(report_id).await?;
                info!(report_id, source_id, "Report verified");
            }
            None => debug!(source_id, "Shared message is not a confirmed report"),
        }
        Ok(())
    }
}

//! # Sending a draft.
//!
//! Drives one send attempt through its stages and reports a single outcome.
//! There are no retries here, a failed attempt is retried by whoever queued it.

use anyhow::{bail, Context as _, Result};
use strum_macros::Display;

use crate::context::Context;
use crate::draft::MsgId;
use crate::error::{Diagnostics, PartialFailure, SendError};
use crate::events::EventType;
use crate::log::LogExt;
use crate::metadata::prepare_metadata;
use crate::request::{assemble_request, SendSchedule};
use crate::transport::SendResponse;

/// Stage of a send attempt.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum SendStage {
    PreparingMetadata,
    PreparingRequest,
    Submitting,
    Succeeded,
    Failed,
}

/// Outcome of a successful send attempt.
#[derive(Debug, Clone)]
pub struct SendReport {
    pub msg_id: MsgId,
    /// Number of recipients the message was packaged for.
    pub packages: usize,
    pub response: SendResponse,
    /// The service already had the message on its way.
    pub already_sent: bool,
    /// Recipients and attachments that were skipped.
    pub failures: Vec<PartialFailure>,
}

struct SendAttempt<'a> {
    context: &'a Context,
    msg_id: &'a MsgId,
    diagnostics: Diagnostics,
    stage: SendStage,
}

impl SendAttempt<'_> {
    fn enter(&mut self, stage: SendStage) {
        self.stage = stage;
        self.context.emit_event(EventType::SendStageChanged {
            msg_id: self.msg_id.clone(),
            stage,
        });
    }

    async fn run(&mut self, schedule: SendSchedule) -> Result<SendReport> {
        let context = self.context;

        self.enter(SendStage::PreparingMetadata);
        let metadata = prepare_metadata(context, self.msg_id, &self.diagnostics).await?;

        self.enter(SendStage::PreparingRequest);
        let request = assemble_request(context, &metadata, schedule).await?;
        // Session keys and unlocked keys do not outlive the preparation.
        drop(metadata);

        self.enter(SendStage::Submitting);
        let response = context
            .transport()
            .submit(&request)
            .await
            .context("failed to submit message")?;
        if !response.is_success() {
            bail!("message rejected: {}", response.error_message());
        }
        let already_sent = response.code != SendResponse::OK;
        if already_sent {
            info!(context, [self.msg_id] "already sent.");
        }

        context
            .draft_store()
            .mark_as_sent(self.msg_id, &response)
            .await
            .context("failed to mark message as sent")
            .log_err(context);

        Ok(SendReport {
            msg_id: self.msg_id.clone(),
            packages: request.packages.len(),
            response,
            already_sent,
            failures: self.diagnostics.failures(),
        })
    }
}

/// Sends the draft `msg_id`.
///
/// Every recipient gets the package matching their keys and preferences.
/// Recipients and attachments that cannot be handled are skipped and listed in
/// the report; the attempt only fails if the message cannot be sent at all.
pub async fn send_message(
    context: &Context,
    msg_id: &MsgId,
    schedule: SendSchedule,
) -> Result<SendReport, SendError> {
    let mut attempt = SendAttempt {
        context,
        msg_id,
        diagnostics: Diagnostics::new(msg_id.clone()),
        stage: SendStage::PreparingMetadata,
    };
    match attempt.run(schedule).await {
        Ok(report) => {
            attempt.enter(SendStage::Succeeded);
            info!(
                context,
                [msg_id] "sent to {} recipient(s), {} skipped.",
                report.packages,
                report.failures.len()
            );
            context.emit_event(EventType::MessageSent {
                msg_id: msg_id.clone(),
            });
            Ok(report)
        }
        Err(err) => {
            let stage = attempt.stage;
            error!(context, [msg_id] "sending failed during {}: {:#}.", stage, err);
            attempt.enter(SendStage::Failed);
            context.emit_event(EventType::MessageSendFailed {
                msg_id: msg_id.clone(),
                stage,
                error: format!("{err:#}"),
            });
            Err(SendError {
                stage,
                source: err,
                failures: attempt.diagnostics.failures(),
            })
        }
    }
}

//! # Error types.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::attachment::AttachmentId;
use crate::context::Context;
use crate::draft::MsgId;
use crate::events::EventType;
use crate::send::SendStage;

/// Errors that abort the preparation of a whole message.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PrepareError {
    #[error("message id is empty")]
    EmptyMessageId,

    #[error("sender address {0:?} is not one of the user's addresses")]
    NoSenderAddress(String),

    #[error("no key of the sender address could be unlocked")]
    NoSenderAddressKey,

    #[error("draft has no valid recipient")]
    NoRecipients,

    #[error("failed to split the message body")]
    SplitMessageFailed,

    #[error("failed to extract the body session key")]
    BodySessionKeyFailed,

    #[error("session key packet does not name its algorithm")]
    MissingAlgorithm,

    #[error("no sender key could decrypt the message body")]
    DecryptBodyFailed,

    #[error("message body is not UTF-8")]
    BodyNotUtf8,

    #[error("no recipients resolved")]
    NoRecipientsResolved,

    #[error("no address package could be built")]
    NoPackagesBuilt,
}

/// Errors that stop the package of a single recipient.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PackageError {
    #[error("{0} rendering was not prepared")]
    MissingRendering(&'static str),

    #[error("invalid modulus id")]
    InvalidModulusId,

    #[error("invalid modulus")]
    InvalidModulus,
}

/// Entity a partial failure is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailedEntity {
    Recipient(String),
    Attachment(AttachmentId),
}

impl fmt::Display for FailedEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FailedEntity::Recipient(addr) => write!(f, "recipient {addr}"),
            FailedEntity::Attachment(id) => write!(f, "attachment {id}"),
        }
    }
}

/// Failure of one recipient or attachment that did not stop the send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFailure {
    pub stage: SendStage,
    pub entity: FailedEntity,
    /// Error chain, formatted with `{:#}`.
    pub error: String,
}

impl fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} failed during {}: {}", self.entity, self.stage, self.error)
    }
}

/// Collects the partial failures of one send attempt.
///
/// Shared between the concurrent units of work; every recorded failure is also
/// emitted as a warning and a skip event.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    msg_id: MsgId,
    failures: Arc<Mutex<Vec<PartialFailure>>>,
}

impl Diagnostics {
    pub fn new(msg_id: MsgId) -> Self {
        Diagnostics {
            msg_id,
            failures: Default::default(),
        }
    }

    /// Records that `entity` was skipped because of `error`.
    pub(crate) fn record(
        &self,
        context: &Context,
        stage: SendStage,
        entity: FailedEntity,
        error: &anyhow::Error,
    ) {
        let failure = PartialFailure {
            stage,
            entity,
            error: format!("{error:#}"),
        };
        warn!(context, [self.msg_id] "{}", failure);
        let event = match &failure.entity {
            FailedEntity::Recipient(addr) => EventType::RecipientSkipped {
                msg_id: self.msg_id.clone(),
                addr: addr.clone(),
                reason: failure.error.clone(),
            },
            FailedEntity::Attachment(id) => EventType::AttachmentSkipped {
                msg_id: self.msg_id.clone(),
                attachment_id: id.clone(),
                reason: failure.error.clone(),
            },
        };
        context.emit_event(event);
        self.failures.lock().push(failure);
    }

    /// Returns true if a failure was recorded for the entity.
    pub fn contains(&self, entity: &FailedEntity) -> bool {
        self.failures.lock().iter().any(|f| &f.entity == entity)
    }

    /// Returns a copy of all failures recorded so far.
    pub fn failures(&self) -> Vec<PartialFailure> {
        self.failures.lock().clone()
    }
}

/// Terminal failure of a send attempt.
#[derive(Debug, thiserror::Error)]
#[error("sending failed during {stage}")]
pub struct SendError {
    pub stage: SendStage,
    #[source]
    pub source: anyhow::Error,
    /// Failures recorded before the attempt was given up.
    pub failures: Vec<PartialFailure>,
}

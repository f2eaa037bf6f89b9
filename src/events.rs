//! # Events.

use async_channel::{self as channel, Receiver, Sender, TrySendError};

use crate::attachment::AttachmentId;
use crate::draft::MsgId;
use crate::send::SendStage;

/// Event channel.
#[derive(Debug, Clone)]
pub struct Events {
    receiver: Receiver<Event>,
    sender: Sender<Event>,
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}

impl Events {
    /// Creates a new event channel.
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(1_000);

        Self { receiver, sender }
    }

    /// Emits an event into event channel.
    ///
    /// If the channel is full, deletes the oldest event first.
    pub fn emit(&self, event: Event) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                // when we are full, we pop remove the oldest event and push on the new one
                let _ = self.receiver.try_recv();

                // try again
                self.emit(event);
            }
            Err(TrySendError::Closed(_)) => {
                unreachable!("unable to emit event, channel disconnected");
            }
        }
    }

    /// Creates an event emitter.
    pub fn get_emitter(&self) -> EventEmitter {
        EventEmitter(self.receiver.clone())
    }
}

/// A receiver of events from a [`Context`].
///
/// See [`Context::get_event_emitter`] to create an instance.  If multiple instances are
/// created events emitted by the [`Context`] will only be delivered to one of the
/// `EventEmitter`s.
///
/// [`Context`]: crate::context::Context
/// [`Context::get_event_emitter`]: crate::context::Context::get_event_emitter
#[derive(Debug, Clone)]
pub struct EventEmitter(Receiver<Event>);

impl EventEmitter {
    /// Async recv of an event. Return `None` if the `Sender` has been dropped.
    pub async fn recv(&self) -> Option<Event> {
        self.0.recv().await.ok()
    }

    /// Tries to receive an event without blocking.
    pub fn try_recv(&self) -> Option<Event> {
        self.0.try_recv().ok()
    }
}

/// The event emitted by a [`Context`] from an [`EventEmitter`].
///
/// [`Context`]: crate::context::Context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The ID of the [`Context`] which emitted this event.
    ///
    /// This allows using multiple [`Context`]s in a single process as they are identified
    /// by this ID.
    ///
    /// [`Context`]: crate::context::Context
    pub id: u32,

    /// The event payload.
    pub typ: EventType,
}

/// Event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    /// The library-user may write an informational string to the log.
    ///
    /// This event should *not* be reported to the end-user using a popup or something like
    /// that.
    Info(String),

    /// The library-user should write a warning string to the log.
    ///
    /// This event should *not* be reported to the end-user using a popup or something like
    /// that.
    Warning(String),

    /// The library-user should report an error to the end-user.
    Error(String),

    /// A send attempt moved to a new stage.
    SendStageChanged {
        /// Draft being sent.
        msg_id: MsgId,
        /// New stage.
        stage: SendStage,
    },

    /// A recipient was left out of the request.
    RecipientSkipped {
        /// Draft being sent.
        msg_id: MsgId,
        /// Address of the recipient.
        addr: String,
        /// Why it was skipped, never containing key material.
        reason: String,
    },

    /// An attachment was left out of the request or of the MIME body.
    AttachmentSkipped {
        /// Draft being sent.
        msg_id: MsgId,
        /// Attachment that was skipped.
        attachment_id: AttachmentId,
        /// Why it was skipped.
        reason: String,
    },

    /// The transport accepted the request.
    MessageSent {
        /// Draft that was sent.
        msg_id: MsgId,
    },

    /// The send attempt ended in failure.
    MessageSendFailed {
        /// Draft that could not be sent.
        msg_id: MsgId,
        /// Stage at which it failed.
        stage: SendStage,
        /// Error chain.
        error: String,
    },
}

//! # Drafts and the sender identity.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use mailpack_address::addr_cmp;

use crate::attachment::AttachmentDescriptor;
use crate::crypto::Passphrase;
use crate::key::{AddressKey, PrivateKey};
use crate::transport::SendResponse;

/// Message ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MsgId(String);

impl MsgId {
    pub fn new(id: impl Into<String>) -> MsgId {
        MsgId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Msg#{}", self.0)
    }
}

/// Stored draft, read-only here.
#[derive(Debug, Clone)]
pub struct Draft {
    pub id: MsgId,
    /// Sender address.
    pub from: String,
    /// Armored body, encrypted to the sender address key.
    pub body: String,
    pub attachments: Vec<AttachmentDescriptor>,
    /// Password for recipients without a key.
    pub password: Option<Passphrase>,
    pub password_hint: Option<String>,
    /// Seconds after which the message expires, `0` for never.
    pub expiration_offset: i64,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

impl Draft {
    /// Returns the password if one is set and not empty.
    pub fn password(&self) -> Option<&Passphrase> {
        self.password.as_ref().filter(|p| !p.is_empty())
    }
}

/// One of the user's own addresses.
#[derive(Debug, Clone)]
pub struct OwnAddress {
    pub email: String,
    pub keys: Vec<AddressKey>,
}

impl OwnAddress {
    /// Returns the primary key, or the first key if none is marked primary.
    pub fn primary_key(&self) -> Option<&AddressKey> {
        self.keys
            .iter()
            .find(|k| k.primary)
            .or_else(|| self.keys.first())
    }
}

/// Keys and addresses of the sending user.
#[derive(Debug, Clone)]
pub struct SenderIdentity {
    pub user_keys: Vec<PrivateKey>,
    pub mailbox_passphrase: Passphrase,
    pub addresses: Vec<OwnAddress>,
    /// Whether outgoing mail is signed by default.
    pub sign_messages: Option<bool>,
}

impl SenderIdentity {
    /// Looks up one of the user's addresses.
    pub fn address(&self, email: &str) -> Option<&OwnAddress> {
        self.addresses.iter().find(|a| addr_cmp(&a.email, email))
    }

    fn is_complete(&self) -> bool {
        !self.user_keys.is_empty() && !self.addresses.is_empty()
    }
}

/// Everything needed to send one draft.
#[derive(Debug, Clone)]
pub struct MessageSendingData {
    pub draft: Draft,
    /// Sender identity cached alongside the draft, e.g. by a send queue.
    pub cached_identity: Option<SenderIdentity>,
}

impl MessageSendingData {
    /// Returns the cached identity if it is usable.
    pub fn usable_cached_identity(&self) -> Option<&SenderIdentity> {
        self.cached_identity.as_ref().filter(|i| i.is_complete())
    }
}

/// Local draft storage.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn fetch_sending_data(&self, msg_id: &MsgId) -> Result<MessageSendingData>;

    /// Called once the transport accepted the message.
    async fn mark_as_sent(&self, msg_id: &MsgId, response: &SendResponse) -> Result<()>;
}

/// Source of the current user's identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sender_identity(&self) -> Result<SenderIdentity>;
}

//! Recipient key sources: the user's contacts and the public key directory.

use anyhow::Result;
use async_trait::async_trait;

use crate::constants::{ContentType, PgpScheme};
use crate::key::PublicKey;

/// Whether the directory knows the address as one of the service's own users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientType {
    Internal,
    External,
}

/// Directory answer for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysResponse {
    pub recipient_type: RecipientType,
    /// Published keys, primary first.
    pub keys: Vec<PublicKey>,
}

/// Sending preferences the user stored on a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactPreferences {
    pub email: String,
    /// Keys the user pinned for this contact.
    pub pinned_keys: Vec<PublicKey>,
    /// Whether to encrypt with a pinned key.
    pub encrypt: bool,
    pub sign: Option<bool>,
    pub scheme: Option<PgpScheme>,
    pub content_type: Option<ContentType>,
}

impl ContactPreferences {
    pub fn new(email: impl Into<String>) -> Self {
        ContactPreferences {
            email: email.into(),
            pinned_keys: Vec::new(),
            encrypt: true,
            sign: None,
            scheme: None,
            content_type: None,
        }
    }
}

/// The user's address book.
#[async_trait]
pub trait ContactKeyStore: Send + Sync {
    /// Returns the preferences of all given addresses that are contacts.
    async fn fetch_contacts(&self, emails: &[String]) -> Result<Vec<ContactPreferences>>;
}

/// Public key directory of the service.
#[async_trait]
pub trait PublicKeyDirectory: Send + Sync {
    async fn fetch_public_keys(&self, email: &str) -> Result<KeysResponse>;
}

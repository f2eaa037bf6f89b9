//! # Send preference resolution.
//!
//! Decides for every recipient how they can be reached: as a user of the same
//! service, with PGP to an external key, or in the clear. The decision also fixes
//! the formats the recipient needs and whether the message is signed for them.

use std::collections::BTreeMap;

use anyhow::Result;
use futures::future::join_all;
use mailpack_address::{addr_cmp, ContactAddress};

use crate::config::Config;
use crate::constants::{ContentType, PgpScheme};
use crate::context::Context;
use crate::directory::{ContactPreferences, KeysResponse, RecipientType};
use crate::draft::SenderIdentity;
use crate::error::{Diagnostics, FailedEntity, PrepareError};
use crate::key::PublicKey;
use crate::log::LogExt;
use crate::send::SendStage;

/// How a recipient can be encrypted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionCapability {
    /// User of the same service, the service re-encrypts on its side.
    Internal,
    /// External recipient with a usable public key.
    PgpCapable(PublicKey),
    /// External recipient without a usable key.
    PlainNoPgp,
}

/// Problems noticed with a recipient's keys that did not prevent sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWarning {
    /// The directory's primary key is not among the keys pinned on the contact.
    PrimaryNotPinned,
    /// An internal user without any published key.
    InternalUserNoApiKey,
    /// An internal user whose published keys are all compromised or obsolete.
    InternalUserNoValidApiKey,
}

/// Resolved sending preference of one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientSendPreference {
    pub email: String,
    pub capability: EncryptionCapability,
    pub requires_mime: bool,
    pub requires_plain_text: bool,
    /// The draft password protects the message for this recipient.
    pub encrypted_to_outsider: bool,
    pub sign: bool,
    /// The key used is pinned on the contact.
    pub pinned: bool,
    pub warnings: Vec<KeyWarning>,
}

/// Sender-side inputs of the resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolverSettings {
    pub default_scheme: PgpScheme,
    pub sign_messages: bool,
    pub has_password: bool,
}

/// Computes the preference of one recipient from what is known about them.
///
/// Pure: the same inputs always give the same preference.
pub(crate) fn decide(
    email: &str,
    keys: &KeysResponse,
    contact: Option<&ContactPreferences>,
    settings: &ResolverSettings,
) -> RecipientSendPreference {
    let pinned_keys = contact.map(|c| c.pinned_keys.as_slice()).unwrap_or_default();
    let is_pinned =
        |key: &PublicKey| pinned_keys.iter().any(|k| k.fingerprint == key.fingerprint);
    let primary = keys.keys.iter().find(|k| k.is_usable_for_sending());

    let mut warnings = Vec::new();
    let mut pinned = false;
    let capability = match keys.recipient_type {
        RecipientType::Internal => {
            match primary {
                None if keys.keys.is_empty() => warnings.push(KeyWarning::InternalUserNoApiKey),
                None => warnings.push(KeyWarning::InternalUserNoValidApiKey),
                Some(key) => {
                    pinned = is_pinned(key);
                    if !pinned && !pinned_keys.is_empty() {
                        warnings.push(KeyWarning::PrimaryNotPinned);
                    }
                }
            }
            EncryptionCapability::Internal
        }
        RecipientType::External => match primary {
            Some(key) => {
                pinned = is_pinned(key);
                if !pinned && !pinned_keys.is_empty() {
                    warnings.push(KeyWarning::PrimaryNotPinned);
                }
                EncryptionCapability::PgpCapable(key.clone())
            }
            None => {
                let pinned_key = contact
                    .filter(|c| c.encrypt)
                    .and_then(|c| c.pinned_keys.iter().find(|k| k.is_usable_for_sending()));
                match pinned_key {
                    Some(key) => {
                        pinned = true;
                        EncryptionCapability::PgpCapable(key.clone())
                    }
                    None => EncryptionCapability::PlainNoPgp,
                }
            }
        },
    };

    let encrypted_to_outsider =
        settings.has_password && capability != EncryptionCapability::Internal;
    let sign = match &capability {
        _ if encrypted_to_outsider => false,
        EncryptionCapability::Internal | EncryptionCapability::PgpCapable(_) => true,
        EncryptionCapability::PlainNoPgp => contact
            .and_then(|c| c.sign)
            .unwrap_or(settings.sign_messages),
    };
    let requires_mime = match &capability {
        _ if encrypted_to_outsider => false,
        EncryptionCapability::Internal => false,
        EncryptionCapability::PgpCapable(_) => {
            contact.and_then(|c| c.scheme).unwrap_or(settings.default_scheme) == PgpScheme::Mime
        }
        // A cleartext signature needs MIME.
        EncryptionCapability::PlainNoPgp => sign,
    };
    let requires_plain_text =
        !requires_mime && contact.and_then(|c| c.content_type) == Some(ContentType::Plain);

    RecipientSendPreference {
        email: email.to_string(),
        capability,
        requires_mime,
        requires_plain_text,
        encrypted_to_outsider,
        sign,
        pinned,
        warnings,
    }
}

/// Resolves the preferences of all recipients.
///
/// Directory lookups run in parallel. A failed lookup is recorded in
/// `diagnostics`; the recipient is left out unless
/// [`Config::CleartextOnKeyLookupFailure`] is set, in which case it gets the
/// message in the clear. If every lookup fails the whole resolution fails.
pub(crate) async fn resolve_send_preferences(
    context: &Context,
    identity: &SenderIdentity,
    recipients: &[ContactAddress],
    has_password: bool,
    diagnostics: &Diagnostics,
) -> Result<Vec<RecipientSendPreference>> {
    let settings = ResolverSettings {
        default_scheme: context
            .get_config_parsed(Config::DefaultPgpScheme)
            .await?
            .unwrap_or_default(),
        sign_messages: match identity.sign_messages {
            Some(sign) => sign,
            None => context.get_config_bool(Config::SignMessages).await?,
        },
        has_password,
    };
    let cleartext_fallback = context
        .get_config_bool(Config::CleartextOnKeyLookupFailure)
        .await?;

    let emails: Vec<String> = recipients.iter().map(|r| r.to_string()).collect();
    let contacts = context
        .contact_store()
        .fetch_contacts(&emails)
        .await
        .log_err(context)
        .unwrap_or_default();
    let contacts: BTreeMap<&str, &ContactPreferences> = emails
        .iter()
        .filter_map(|email| {
            contacts
                .iter()
                .find(|c| addr_cmp(&c.email, email))
                .map(|c| (email.as_str(), c))
        })
        .collect();

    let lookups = join_all(
        emails
            .iter()
            .map(|email| lookup_keys(context, identity, email)),
    )
    .await;

    let mut preferences = Vec::with_capacity(emails.len());
    let mut failed = 0;
    for (email, lookup) in emails.iter().zip(lookups) {
        let contact = contacts.get(email.as_str()).copied();
        let keys = match lookup {
            Ok(keys) => keys,
            Err(err) => {
                failed += 1;
                diagnostics.record(
                    context,
                    SendStage::PreparingMetadata,
                    FailedEntity::Recipient(email.clone()),
                    &err.context("public key lookup failed"),
                );
                if !cleartext_fallback {
                    continue;
                }
                KeysResponse {
                    recipient_type: RecipientType::External,
                    keys: Vec::new(),
                }
            }
        };
        let preference = decide(email, &keys, contact, &settings);
        if !preference.warnings.is_empty() {
            warn!(context, "Key warnings for {}: {:?}.", email, preference.warnings);
        }
        preferences.push(preference);
    }

    if failed == emails.len() {
        return Err(PrepareError::NoRecipientsResolved.into());
    }
    Ok(preferences)
}

async fn lookup_keys(
    context: &Context,
    identity: &SenderIdentity,
    email: &str,
) -> Result<KeysResponse> {
    // Sending to oneself needs no lookup.
    if let Some(own) = identity.address(email) {
        return Ok(KeysResponse {
            recipient_type: RecipientType::Internal,
            keys: own.primary_key().map(|k| k.public_key()).into_iter().collect(),
        });
    }
    context.key_directory().fetch_public_keys(email).await
}

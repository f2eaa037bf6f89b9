//! # Address packages.
//!
//! Every recipient gets one package describing how the message reaches them.
//! [`PackageBuilder`] picks the strategy from the resolved preference and builds
//! the package from the session keys shared by all recipients.

use std::collections::BTreeMap;

use anyhow::{Context as _, Result};
use base64::Engine as _;
use futures::future::join_all;

use crate::attachment::{AttachmentId, PreAttachment};
use crate::auth::{make_password_auth, PasswordAuth};
use crate::body::BodyRendering;
use crate::constants::{SendScheme, OUTSIDER_TOKEN_LEN};
use crate::context::Context;
use crate::crypto::{Passphrase, SessionKey};
use crate::error::{FailedEntity, PackageError};
use crate::key::PublicKey;
use crate::metadata::SendMessageMetadata;
use crate::send::SendStage;
use crate::send_prefs::{EncryptionCapability, RecipientSendPreference};
use crate::tools::create_token;

/// Package of one recipient, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPackage {
    pub email: String,
    pub scheme: SendScheme,
    /// The recipient reads the plain text rendering.
    pub plain_text: bool,
    pub sign: bool,
    pub payload: PackagePayload,
}

impl AddressPackage {
    /// Returns the body key packet, if the package carries one.
    pub fn body_key_packet(&self) -> Option<&[u8]> {
        match &self.payload {
            PackagePayload::Empty => None,
            PackagePayload::PublicKey {
                body_key_packet, ..
            }
            | PackagePayload::Password {
                body_key_packet, ..
            } => Some(body_key_packet),
        }
    }

    /// Returns the attachment key packets, if the package carries any.
    pub fn attachment_key_packets(&self) -> Option<&BTreeMap<AttachmentId, Vec<u8>>> {
        match &self.payload {
            PackagePayload::Empty => None,
            PackagePayload::PublicKey {
                attachment_key_packets,
                ..
            }
            | PackagePayload::Password {
                attachment_key_packets,
                ..
            } => Some(attachment_key_packets),
        }
    }
}

/// Strategy specific content of an [`AddressPackage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackagePayload {
    /// Nothing is re-encrypted: the service delivers internally or in the clear.
    Empty,
    /// Session keys encrypted to the recipient's public key.
    PublicKey {
        body_key_packet: Vec<u8>,
        /// Empty for PGP/MIME, the attachments are inside the body.
        attachment_key_packets: BTreeMap<AttachmentId, Vec<u8>>,
    },
    /// Session keys encrypted with the draft password.
    Password {
        body_key_packet: Vec<u8>,
        attachment_key_packets: BTreeMap<AttachmentId, Vec<u8>>,
        /// Base64 random token.
        token: String,
        /// The token, armored and encrypted with the password.
        enc_token: String,
        auth: PasswordAuth,
        password_hint: Option<String>,
    },
}

/// Builds the package of one recipient.
#[derive(Debug, Clone)]
pub enum PackageBuilder<'a> {
    Internal(&'a RecipientSendPreference),
    PgpInline {
        preference: &'a RecipientSendPreference,
        key: &'a PublicKey,
    },
    PgpMime {
        preference: &'a RecipientSendPreference,
        key: &'a PublicKey,
    },
    ClearInline(&'a RecipientSendPreference),
    ClearMime(&'a RecipientSendPreference),
    PasswordProtected {
        preference: &'a RecipientSendPreference,
        password: &'a Passphrase,
    },
}

impl<'a> PackageBuilder<'a> {
    /// Picks the strategy for a recipient.
    ///
    /// A draft password beats a PGP key: outsiders always get the password package.
    pub fn new(preference: &'a RecipientSendPreference, password: Option<&'a Passphrase>) -> Self {
        match (&preference.capability, password) {
            (EncryptionCapability::Internal, _) => PackageBuilder::Internal(preference),
            (_, Some(password)) if preference.encrypted_to_outsider => {
                PackageBuilder::PasswordProtected {
                    preference,
                    password,
                }
            }
            (EncryptionCapability::PgpCapable(key), _) if preference.requires_mime => {
                PackageBuilder::PgpMime { preference, key }
            }
            (EncryptionCapability::PgpCapable(key), _) => {
                PackageBuilder::PgpInline { preference, key }
            }
            (EncryptionCapability::PlainNoPgp, _) if preference.requires_mime => {
                PackageBuilder::ClearMime(preference)
            }
            (EncryptionCapability::PlainNoPgp, _) => PackageBuilder::ClearInline(preference),
        }
    }

    pub fn preference(&self) -> &'a RecipientSendPreference {
        match self {
            PackageBuilder::Internal(preference)
            | PackageBuilder::ClearInline(preference)
            | PackageBuilder::ClearMime(preference)
            | PackageBuilder::PgpInline { preference, .. }
            | PackageBuilder::PgpMime { preference, .. }
            | PackageBuilder::PasswordProtected { preference, .. } => *preference,
        }
    }

    pub fn scheme(&self) -> SendScheme {
        match self {
            PackageBuilder::Internal(_) => SendScheme::Internal,
            PackageBuilder::PgpInline { .. } => SendScheme::PgpInline,
            PackageBuilder::PgpMime { .. } => SendScheme::PgpMime,
            PackageBuilder::ClearInline(_) => SendScheme::ClearInline,
            PackageBuilder::ClearMime(_) => SendScheme::ClearMime,
            PackageBuilder::PasswordProtected { .. } => SendScheme::PasswordProtected,
        }
    }

    /// Builds the package.
    pub async fn build(
        &self,
        context: &Context,
        metadata: &SendMessageMetadata,
    ) -> Result<AddressPackage> {
        let preference = self.preference();
        let payload = match self {
            PackageBuilder::Internal(_)
            | PackageBuilder::ClearInline(_)
            | PackageBuilder::ClearMime(_) => PackagePayload::Empty,
            PackageBuilder::PgpInline { key, .. } => {
                let body = inline_body(metadata, preference)?;
                wrap_for_key(context, key, &body.session_key, &metadata.attachments).await?
            }
            PackageBuilder::PgpMime { key, .. } => {
                let body = metadata
                    .mime_body
                    .as_ref()
                    .ok_or(PackageError::MissingRendering("MIME"))?;
                wrap_for_key(context, key, &body.session_key, &[]).await?
            }
            PackageBuilder::PasswordProtected { password, .. } => {
                let body = inline_body(metadata, preference)?;
                wrap_for_password(context, metadata, password, &body.session_key).await?
            }
        };
        Ok(AddressPackage {
            email: preference.email.clone(),
            scheme: self.scheme(),
            plain_text: preference.requires_plain_text,
            sign: preference.sign,
            payload,
        })
    }
}

/// Body rendering a non-MIME recipient reads.
fn inline_body<'m>(
    metadata: &'m SendMessageMetadata,
    preference: &RecipientSendPreference,
) -> Result<&'m BodyRendering> {
    if preference.requires_plain_text {
        metadata
            .plain_text_body
            .as_ref()
            .ok_or_else(|| PackageError::MissingRendering("plain text").into())
    } else {
        Ok(&metadata.body)
    }
}

async fn wrap_for_key(
    context: &Context,
    key: &PublicKey,
    body_key: &SessionKey,
    attachments: &[PreAttachment],
) -> Result<PackagePayload> {
    let key = key.clone();
    let body_key = body_key.clone();
    let attachment_keys: Vec<(AttachmentId, SessionKey)> = attachments
        .iter()
        .map(|a| (a.id.clone(), a.session_key.clone()))
        .collect();
    context
        .crypto()
        .run(move |crypto| {
            let body_key_packet = crypto
                .encrypt_session_key(&body_key, &key)
                .context("failed to encrypt body session key")?;
            let mut attachment_key_packets = BTreeMap::new();
            for (id, session_key) in &attachment_keys {
                let packet = crypto
                    .encrypt_session_key(session_key, &key)
                    .with_context(|| format!("failed to encrypt session key of attachment {id}"))?;
                attachment_key_packets.insert(id.clone(), packet);
            }
            Ok(PackagePayload::PublicKey {
                body_key_packet,
                attachment_key_packets,
            })
        })
        .await
}

async fn wrap_for_password(
    context: &Context,
    metadata: &SendMessageMetadata,
    password: &Passphrase,
    body_key: &SessionKey,
) -> Result<PackagePayload> {
    let token = base64::engine::general_purpose::STANDARD.encode(create_token(OUTSIDER_TOKEN_LEN));

    let job_password = password.clone();
    let job_token = token.clone();
    let body_key = body_key.clone();
    let attachment_keys: Vec<(AttachmentId, SessionKey)> = metadata
        .attachments
        .iter()
        .map(|a| (a.id.clone(), a.session_key.clone()))
        .collect();
    let packets = context.crypto().run(move |crypto| {
        let enc_token = crypto
            .encrypt_with_password(job_token.as_bytes(), &job_password)
            .context("failed to encrypt token")?;
        let body_key_packet = crypto
            .encrypt_session_key_with_password(&body_key, &job_password)
            .context("failed to encrypt body session key")?;
        let mut attachment_key_packets = BTreeMap::new();
        for (id, session_key) in &attachment_keys {
            let packet = crypto
                .encrypt_session_key_with_password(session_key, &job_password)
                .with_context(|| format!("failed to encrypt session key of attachment {id}"))?;
            attachment_key_packets.insert(id.clone(), packet);
        }
        Ok((enc_token, body_key_packet, attachment_key_packets))
    });

    let ((enc_token, body_key_packet, attachment_key_packets), auth) =
        tokio::try_join!(packets, make_password_auth(context, password))?;

    Ok(PackagePayload::Password {
        body_key_packet,
        attachment_key_packets,
        token,
        enc_token,
        auth,
        password_hint: metadata.password_hint.clone(),
    })
}

/// Builds the packages of all recipients concurrently.
///
/// A recipient whose package fails is recorded in the metadata's diagnostics and
/// left out. The result keeps the order of the recipients.
pub(crate) async fn build_packages(
    context: &Context,
    metadata: &SendMessageMetadata,
) -> Vec<AddressPackage> {
    let builders: Vec<PackageBuilder> = metadata
        .recipients
        .iter()
        .map(|preference| PackageBuilder::new(preference, metadata.password.as_ref()))
        .collect();
    let results = join_all(builders.iter().map(|b| b.build(context, metadata))).await;

    let mut packages = Vec::with_capacity(results.len());
    for (builder, res) in builders.iter().zip(results) {
        match res {
            Ok(package) => packages.push(package),
            Err(err) => metadata.diagnostics.record(
                context,
                SendStage::PreparingRequest,
                FailedEntity::Recipient(builder.preference().email.clone()),
                &err.context(format!("{} package failed", builder.scheme())),
            ),
        }
    }
    packages
}

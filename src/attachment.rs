//! # Attachment session keys.
//!
//! Every attachment of a draft is stored encrypted with its own session key.
//! Before packaging, the session keys are taken out of the stored key packets so
//! they can be wrapped again for each recipient. Recipients reading the MIME
//! rendering get the attachment bodies embedded instead.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use base64::Engine as _;
use futures::future::join_all;
use parking_lot::Mutex;

use crate::context::Context;
use crate::crypto::SessionKey;
use crate::error::{Diagnostics, FailedEntity};
use crate::key::UnlockedKey;
use crate::send::SendStage;

/// Attachment ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId(String);

impl AttachmentId {
    pub fn new(id: impl Into<String>) -> Self {
        AttachmentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attachment as stored on the draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    pub id: AttachmentId,
    pub file_name: String,
    pub mime_type: String,
    /// Base64 key packet, encrypted to the sender address key.
    pub key_packet: Option<String>,
    /// Set for inline images referenced from the HTML body.
    pub content_id: Option<String>,
}

/// Attachment storage.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Downloads the attachment and decrypts it with the session key in `key_packet`.
    async fn fetch_attachment(&self, id: &AttachmentId, key_packet: &[u8]) -> Result<Vec<u8>>;
}

/// Attachment whose session key has been extracted.
#[derive(Debug, Clone)]
pub struct PreAttachment {
    pub id: AttachmentId,
    pub session_key: SessionKey,
    /// Decoded key packet as stored.
    pub key_packet: Vec<u8>,
    pub descriptor: AttachmentDescriptor,
}

/// Attachment body ready to be embedded into a MIME rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAttachment {
    pub id: AttachmentId,
    pub file_name: String,
    pub mime_type: String,
    pub content_id: Option<String>,
    /// Decrypted attachment body.
    pub data: Vec<u8>,
}

/// Extracts the session keys of all attachments.
///
/// Attachments whose key packet cannot be opened are left out and recorded in
/// `diagnostics`. The result keeps the order of `attachments`.
pub(crate) async fn prepare_attachments(
    context: &Context,
    attachments: &[AttachmentDescriptor],
    keys: &[UnlockedKey],
    diagnostics: &Diagnostics,
) -> Vec<PreAttachment> {
    let results = join_all(
        attachments
            .iter()
            .map(|attachment| prepare_attachment(context, attachment, keys)),
    )
    .await;

    let mut prepared = Vec::with_capacity(results.len());
    for (attachment, res) in attachments.iter().zip(results) {
        match res {
            Ok(pre) => prepared.push(pre),
            Err(err) => diagnostics.record(
                context,
                SendStage::PreparingMetadata,
                FailedEntity::Attachment(attachment.id.clone()),
                &err,
            ),
        }
    }
    prepared
}

async fn prepare_attachment(
    context: &Context,
    attachment: &AttachmentDescriptor,
    keys: &[UnlockedKey],
) -> Result<PreAttachment> {
    let encoded = attachment
        .key_packet
        .as_deref()
        .filter(|p| !p.is_empty())
        .context("attachment has no key packet")?;
    let key_packet = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .context("attachment key packet is not valid base64")?;
    let session_key = context
        .crypto()
        .open_key_packet(key_packet.clone(), keys.to_vec())
        .await
        .context("failed to decrypt attachment key packet")?;
    Ok(PreAttachment {
        id: attachment.id.clone(),
        session_key,
        key_packet,
        descriptor: attachment.clone(),
    })
}

/// Fetches the bodies of the prepared attachments for the MIME rendering.
///
/// Downloads run in parallel. An attachment that cannot be fetched is left out of
/// the result and recorded; it stays attached for recipients not reading MIME.
pub(crate) async fn encode_attachments(
    context: &Context,
    prepared: &[PreAttachment],
    diagnostics: &Diagnostics,
) -> Vec<EncodedAttachment> {
    let encoded: Arc<Mutex<BTreeMap<AttachmentId, EncodedAttachment>>> = Default::default();

    let handles = prepared.iter().map(|attachment| {
        let context = context.clone();
        let attachment = attachment.clone();
        let encoded = Arc::clone(&encoded);
        let diagnostics = diagnostics.clone();
        tokio::spawn(async move {
            match fetch_for_mime(&context, &attachment).await {
                Ok(body) => {
                    encoded.lock().insert(attachment.id.clone(), body);
                }
                Err(err) => diagnostics.record(
                    &context,
                    SendStage::PreparingMetadata,
                    FailedEntity::Attachment(attachment.id.clone()),
                    &err,
                ),
            }
        })
    });
    for (attachment, res) in prepared.iter().zip(join_all(handles).await) {
        if let Err(err) = res {
            let err = anyhow::Error::new(err).context("attachment download task failed");
            diagnostics.record(
                context,
                SendStage::PreparingMetadata,
                FailedEntity::Attachment(attachment.id.clone()),
                &err,
            );
        }
    }

    let mut encoded = std::mem::take(&mut *encoded.lock());
    prepared
        .iter()
        .filter_map(|attachment| encoded.remove(&attachment.id))
        .collect()
}

async fn fetch_for_mime(
    context: &Context,
    attachment: &PreAttachment,
) -> Result<EncodedAttachment> {
    let data = context
        .attachment_store()
        .fetch_attachment(&attachment.id, &attachment.key_packet)
        .await
        .context("failed to fetch attachment")?;
    let descriptor = &attachment.descriptor;
    Ok(EncodedAttachment {
        id: attachment.id.clone(),
        file_name: descriptor.file_name.clone(),
        mime_type: descriptor.mime_type.clone(),
        content_id: descriptor.content_id.clone(),
        data,
    })
}

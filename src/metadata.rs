//! # Send metadata preparation.
//!
//! Gathers everything the packages are built from: the unlocked sender keys,
//! the recipients' preferences, the body session key with the renderings the
//! recipients need and the attachment session keys.

use anyhow::{ensure, Context as _, Result};
use mailpack_address::RecipientSet;

use crate::attachment::{encode_attachments, prepare_attachments, EncodedAttachment, PreAttachment};
use crate::body::{decrypt_html, open_body, render_mime, render_plain_text, BodyRendering};
use crate::context::Context;
use crate::crypto::Passphrase;
use crate::draft::{MsgId, OwnAddress, SenderIdentity};
use crate::error::{Diagnostics, FailedEntity, PrepareError};
use crate::key::UnlockedKey;
use crate::send::SendStage;
use crate::send_prefs::{resolve_send_preferences, RecipientSendPreference};

/// Everything the packages of one send attempt are built from.
///
/// Built once per attempt and dropped with it; the key material inside is
/// never cached.
#[derive(Debug)]
pub struct SendMessageMetadata {
    pub msg_id: MsgId,
    pub sender_address: String,
    /// Unlocked keys of the sender address, primary first.
    pub sender_keys: Vec<UnlockedKey>,
    pub recipients: Vec<RecipientSendPreference>,
    /// The stored body, as sent to recipients reading HTML.
    pub body: BodyRendering,
    /// Only set if a recipient reads MIME.
    pub mime_body: Option<BodyRendering>,
    /// Only set if a recipient reads plain text.
    pub plain_text_body: Option<BodyRendering>,
    pub attachments: Vec<PreAttachment>,
    /// Attachment bodies embedded into the MIME rendering.
    pub encoded_attachments: Vec<EncodedAttachment>,
    pub password: Option<Passphrase>,
    pub password_hint: Option<String>,
    pub expiration_offset: i64,
    pub diagnostics: Diagnostics,
}

/// Prepares the metadata of the draft `msg_id`.
///
/// Recipient resolution, body and attachment key extraction run concurrently.
/// The body is only decrypted if a recipient needs the MIME or plain text
/// rendering. Partial failures go to `diagnostics`.
pub(crate) async fn prepare_metadata(
    context: &Context,
    msg_id: &MsgId,
    diagnostics: &Diagnostics,
) -> Result<SendMessageMetadata> {
    ensure!(!msg_id.is_empty(), PrepareError::EmptyMessageId);

    let data = context
        .draft_store()
        .fetch_sending_data(msg_id)
        .await
        .context("failed to fetch draft")?;
    let identity = match data.usable_cached_identity() {
        Some(identity) => identity.clone(),
        None => context
            .identity_provider()
            .sender_identity()
            .await
            .context("failed to get sender identity")?,
    };
    let draft = data.draft;

    let address = identity
        .address(&draft.from)
        .ok_or_else(|| PrepareError::NoSenderAddress(draft.from.clone()))?;
    let sender_keys = unlock_address_keys(context, &identity, address).await?;
    info!(
        context,
        [msg_id] "unlocked {} key(s) of {}.",
        sender_keys.len(),
        address.email
    );

    let recipients = RecipientSet::collect([
        draft.to.as_slice(),
        draft.cc.as_slice(),
        draft.bcc.as_slice(),
    ]);
    for (raw, err) in &recipients.invalid {
        diagnostics.record(
            context,
            SendStage::PreparingMetadata,
            FailedEntity::Recipient(raw.clone()),
            err,
        );
    }
    ensure!(!recipients.is_empty(), PrepareError::NoRecipients);

    let password = draft.password().cloned();
    let (preferences, body, attachments) = tokio::join!(
        resolve_send_preferences(
            context,
            &identity,
            &recipients.valid,
            password.is_some(),
            diagnostics
        ),
        open_body(context, &draft.body, &sender_keys),
        prepare_attachments(context, &draft.attachments, &sender_keys, diagnostics),
    );
    let preferences = preferences?;
    let body = body?;
    info!(
        context,
        [msg_id] "resolved {} recipient(s), {} of {} attachment(s) ready.",
        preferences.len(),
        attachments.len(),
        draft.attachments.len()
    );

    let needs_mime = preferences.iter().any(|p| p.requires_mime);
    let needs_plain_text = preferences.iter().any(|p| p.requires_plain_text);
    let sign_mime = preferences.iter().any(|p| p.requires_mime && p.sign);

    let html = if needs_mime || needs_plain_text {
        Some(decrypt_html(context, &draft.body, &sender_keys).await?)
    } else {
        None
    };
    let algorithm = body.session_key.algorithm();

    let (mime, plain_text_body) = tokio::try_join!(
        async {
            let Some(html) = html.as_deref().filter(|_| needs_mime) else {
                return Ok(None);
            };
            let encoded = encode_attachments(context, &attachments, diagnostics).await;
            let signer = if sign_mime { sender_keys.first() } else { None };
            let rendering = render_mime(context, html, algorithm, &encoded, signer).await?;
            anyhow::Ok(Some((rendering, encoded)))
        },
        async {
            let Some(html) = html.as_deref().filter(|_| needs_plain_text) else {
                return Ok(None);
            };
            render_plain_text(context, html, algorithm).await.map(Some)
        },
    )?;
    let (mime_body, encoded_attachments) = match mime {
        Some((rendering, encoded)) => (Some(rendering), encoded),
        None => (None, Vec::new()),
    };
    info!(
        context,
        [msg_id] "renderings prepared (mime: {}, plain text: {}).",
        mime_body.is_some(),
        plain_text_body.is_some()
    );

    Ok(SendMessageMetadata {
        msg_id: msg_id.clone(),
        sender_address: address.email.clone(),
        sender_keys,
        recipients: preferences,
        body,
        mime_body,
        plain_text_body,
        attachments,
        encoded_attachments,
        password,
        password_hint: draft.password_hint.filter(|h| !h.is_empty()),
        expiration_offset: draft.expiration_offset,
        diagnostics: diagnostics.clone(),
    })
}

/// Unlocks the keys of one sender address, primary key first.
///
/// Keys that cannot be unlocked are skipped; if none can, fails with
/// [`PrepareError::NoSenderAddressKey`].
pub(crate) async fn unlock_address_keys(
    context: &Context,
    identity: &SenderIdentity,
    address: &OwnAddress,
) -> Result<Vec<UnlockedKey>> {
    let mut keys: Vec<_> = address.keys.iter().collect();
    keys.sort_by_key(|k| !k.primary);

    let mut unlocked = Vec::with_capacity(keys.len());
    for key in keys {
        let token = key.token.clone();
        let user_keys = identity.user_keys.clone();
        let mailbox_passphrase = identity.mailbox_passphrase.clone();
        let res = context
            .crypto()
            .run(move |crypto| {
                crypto.unlock_address_key(token.as_deref(), &user_keys, &mailbox_passphrase)
            })
            .await;
        match res {
            Ok(passphrase) => unlocked.push(UnlockedKey {
                key: key.key.clone(),
                passphrase,
            }),
            Err(err) => warn!(
                context,
                "Cannot unlock key {} of {}: {:#}.",
                key.key.fingerprint.hex(),
                address.email,
                err
            ),
        }
    }
    ensure!(!unlocked.is_empty(), PrepareError::NoSenderAddressKey);
    Ok(unlocked)
}

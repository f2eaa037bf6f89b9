//! # Message body decryption and alternate renderings.
//!
//! The stored draft body is sent as is to recipients reading HTML, only its
//! session key is extracted. Recipients reading MIME or plain text get their own
//! rendering, each encrypted with a fresh session key. The body is decrypted
//! once, and only if one of these renderings is needed.

use anyhow::{Context as _, Result};

use crate::attachment::EncodedAttachment;
use crate::config::Config;
use crate::context::Context;
use crate::crypto::{SessionKey, SplitMessage, SymmetricAlgorithm};
use crate::dehtml::dehtml;
use crate::error::PrepareError;
use crate::key::UnlockedKey;
use crate::mimefactory::{build_related, wrap_signed};
use crate::tools::to_crlf;

/// One encrypted body: the data packet and the session key it is encrypted with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyRendering {
    pub session_key: SessionKey,
    pub data_packet: Vec<u8>,
}

/// Extracts the session key of the stored body.
///
/// The body itself stays encrypted; it is sent as is to recipients reading HTML.
pub(crate) async fn open_body(
    context: &Context,
    armored: &str,
    keys: &[UnlockedKey],
) -> Result<BodyRendering> {
    let armored = armored.to_string();
    let SplitMessage {
        key_packet,
        data_packet,
    } = context
        .crypto()
        .run(move |crypto| crypto.split_message(&armored))
        .await
        .context(PrepareError::SplitMessageFailed)?;

    let session_key = match context
        .crypto()
        .open_key_packet(key_packet, keys.to_vec())
        .await
    {
        Ok(session_key) => session_key,
        Err(err) if err.downcast_ref::<PrepareError>() == Some(&PrepareError::MissingAlgorithm) => {
            return Err(err)
        }
        Err(err) => return Err(err.context(PrepareError::BodySessionKeyFailed)),
    };

    Ok(BodyRendering {
        session_key,
        data_packet,
    })
}

/// Decrypts the stored body to HTML.
///
/// Only needed to build the MIME and plain text renderings.
pub(crate) async fn decrypt_html(
    context: &Context,
    armored: &str,
    keys: &[UnlockedKey],
) -> Result<String> {
    let armored = armored.to_string();
    let keys = keys.to_vec();
    let plain = context
        .crypto()
        .run(move |crypto| {
            let mut last_err = None;
            for key in &keys {
                match crypto.decrypt_message(&armored, &key.key, &key.passphrase) {
                    Ok(plain) => return Ok(plain),
                    Err(err) => last_err = Some(err),
                }
            }
            Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no sender keys")))
        })
        .await
        .context(PrepareError::DecryptBodyFailed)?;
    String::from_utf8(plain)
        .map_err(|err| anyhow::Error::new(err).context(PrepareError::BodyNotUtf8))
}

/// Encrypts `content` with a freshly generated session key.
async fn encrypt_rendering(
    context: &Context,
    content: Vec<u8>,
    algorithm: SymmetricAlgorithm,
) -> Result<BodyRendering> {
    let session_key = SessionKey::generate(algorithm);
    let job_key = session_key.clone();
    let data_packet = context
        .crypto()
        .run(move |crypto| crypto.encrypt_with_session_key(&content, &job_key))
        .await?;
    Ok(BodyRendering {
        session_key,
        data_packet,
    })
}

/// Builds and encrypts the MIME rendering of `html`.
///
/// With a `signer` the rendering is wrapped into `multipart/signed`.
pub(crate) async fn render_mime(
    context: &Context,
    html: &str,
    algorithm: SymmetricAlgorithm,
    attachments: &[EncodedAttachment],
    signer: Option<&UnlockedKey>,
) -> Result<BodyRendering> {
    let language = context
        .get_config(Config::MimeContentLanguage)
        .await?
        .unwrap_or_default();
    let related = build_related(html, attachments, &language)?;

    let part = match signer {
        Some(signer) => {
            let signed_data = related.formatted();
            let signer = signer.clone();
            let signature = context
                .crypto()
                .run(move |crypto| {
                    crypto.sign_detached(&signed_data, &signer.key, &signer.passphrase)
                })
                .await
                .context("failed to sign MIME body")?;
            wrap_signed(related, &signature)?
        }
        None => related,
    };

    encrypt_rendering(context, part.formatted(), algorithm)
        .await
        .context("failed to encrypt MIME body")
}

/// Converts `html` to plain text and encrypts it.
pub(crate) async fn render_plain_text(
    context: &Context,
    html: &str,
    algorithm: SymmetricAlgorithm,
) -> Result<BodyRendering> {
    let text = to_crlf(&dehtml(html).unwrap_or_default());
    encrypt_rendering(context, text.into_bytes(), algorithm)
        .await
        .context("failed to encrypt plain text body")
}

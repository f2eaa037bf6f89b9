//! # MIME rendering of a draft.
//!
//! Builds the `multipart/related` body sent to recipients reading MIME, and the
//! RFC 3156 `multipart/signed` wrapper around it.

use std::error::Error as StdError;

use anyhow::{anyhow, Context as _, Result};
use lettre::message::header::{
    ContentDisposition, ContentId, ContentTransferEncoding, ContentType, Header, HeaderName,
    HeaderValue,
};
use lettre::message::{Body, MultiPart, SinglePart};

use crate::attachment::EncodedAttachment;
use crate::tools::to_crlf;

/// `Content-Language` of the HTML part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContentLanguage(String);

impl Header for ContentLanguage {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("Content-Language")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Ok(ContentLanguage(s.trim().to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// Builds the `multipart/related` rendering: the HTML body followed by the attachments.
pub(crate) fn build_related(
    html: &str,
    attachments: &[EncodedAttachment],
    language: &str,
) -> Result<MultiPart> {
    let mut related = MultiPart::related().singlepart(html_part(html, language)?);
    for attachment in attachments {
        related = related.singlepart(attachment_part(attachment)?);
    }
    Ok(related)
}

fn html_part(html: &str, language: &str) -> Result<SinglePart> {
    let body = Body::new_with_encoding(to_crlf(html), ContentTransferEncoding::QuotedPrintable)
        .map_err(|_| anyhow!("HTML body cannot be quoted-printable encoded"))?;
    Ok(SinglePart::builder()
        .header(ContentType::TEXT_HTML)
        .header(ContentLanguage(language.to_string()))
        .body(body))
}

fn attachment_part(attachment: &EncodedAttachment) -> Result<SinglePart> {
    let mime = attachment
        .mime_type
        .parse::<mime::Mime>()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM);
    let content_type = ContentType::parse(mime.as_ref())
        .with_context(|| format!("invalid content type {mime}"))?;
    let body = Body::new_with_encoding(attachment.data.clone(), ContentTransferEncoding::Base64)
        .map_err(|_| anyhow!("attachment {} cannot be base64 encoded", attachment.id))?;

    let part = SinglePart::builder().header(content_type);
    let part = match &attachment.content_id {
        Some(cid) => part
            .header(ContentDisposition::inline_with_name(&attachment.file_name))
            .header(ContentId::from(format!(
                "<{}>",
                cid.trim_start_matches('<').trim_end_matches('>')
            ))),
        None => part.header(ContentDisposition::attachment(&attachment.file_name)),
    };
    Ok(part.body(body))
}

/// Wraps `content` into `multipart/signed` with a detached `signature`.
///
/// `signature` must be over `content.formatted()`.
pub(crate) fn wrap_signed(content: MultiPart, signature: &str) -> Result<MultiPart> {
    let signature_type = ContentType::parse("application/pgp-signature; name=\"signature.asc\"")
        .context("invalid signature type")?;
    let signature_part = SinglePart::builder()
        .header(signature_type)
        .header(ContentDisposition::attachment("signature.asc"))
        .body(to_crlf(signature));
    Ok(MultiPart::signed(
        "application/pgp-signature".to_string(),
        "pgp-sha256".to_string(),
    )
    .multipart(content)
    .singlepart(signature_part))
}

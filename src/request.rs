//! # Send request assembly.
//!
//! Combines the packages of all recipients with the shared bodies into the one
//! request handed to the transport.

use std::collections::BTreeMap;

use anyhow::{ensure, Context as _, Result};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::attachment::AttachmentId;
use crate::config::Config;
use crate::constants::{SendScheme, MIME_TYPE_HTML, MIME_TYPE_MIXED, MIME_TYPE_PLAIN};
use crate::context::Context;
use crate::crypto::SessionKey;
use crate::draft::MsgId;
use crate::error::PrepareError;
use crate::metadata::SendMessageMetadata;
use crate::package::{build_packages, AddressPackage, PackagePayload};

/// When the transport delivers the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendSchedule {
    /// Unix time of a scheduled delivery.
    pub delivery_time: Option<i64>,
    /// Undo-send delay, [`Config::UndoSendDelay`] if not set.
    pub delay_seconds: Option<i64>,
}

impl SendSchedule {
    /// Deliver right away, after the configured undo-send delay.
    pub fn now() -> Self {
        Self::default()
    }

    /// Deliver at the given time.
    pub fn at(time: DateTime<Utc>) -> Self {
        SendSchedule {
            delivery_time: Some(time.timestamp()),
            delay_seconds: None,
        }
    }

    pub fn with_delay(self, seconds: i64) -> Self {
        SendSchedule {
            delay_seconds: Some(seconds),
            ..self
        }
    }
}

/// The request sending one message, immutable once built.
///
/// Clear session keys are only present if a recipient gets the message in
/// the clear and the service has to read it.
#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub msg_id: MsgId,
    /// Seconds until the message expires, `0` for never.
    pub expires_in: i64,
    pub delay_seconds: i64,
    pub delivery_time: Option<i64>,
    pub packages: Vec<AddressPackage>,
    /// Data packet of the HTML body.
    pub body: Vec<u8>,
    pub clear_body: Option<SessionKey>,
    pub clear_attachments: BTreeMap<AttachmentId, SessionKey>,
    pub mime_body: Option<Vec<u8>>,
    pub clear_mime_body: Option<SessionKey>,
    pub plain_text_body: Option<Vec<u8>>,
    pub clear_plain_text_body: Option<SessionKey>,
}

/// Builds the packages of all recipients and assembles the request.
///
/// Recipients whose package fails are left out; fails only if no package at
/// all could be built.
pub(crate) async fn assemble_request(
    context: &Context,
    metadata: &SendMessageMetadata,
    schedule: SendSchedule,
) -> Result<SendMessageRequest> {
    let packages = build_packages(context, metadata).await;
    ensure!(!packages.is_empty(), PrepareError::NoPackagesBuilt);
    info!(
        context,
        [metadata.msg_id] "built {} of {} package(s).",
        packages.len(),
        metadata.recipients.len()
    );

    let delay_seconds = match schedule.delay_seconds {
        Some(delay) => delay,
        None => context.get_config_i64(Config::UndoSendDelay).await?,
    };

    let has_cleartext = packages.iter().any(|p| p.scheme.is_cleartext());
    let has_clear_mime = packages.iter().any(|p| p.scheme == SendScheme::ClearMime);
    let has_clear_plain_text = packages
        .iter()
        .any(|p| p.scheme.is_cleartext() && p.plain_text);

    let clear_body = has_cleartext.then(|| metadata.body.session_key.clone());
    let clear_attachments = if has_cleartext {
        metadata
            .attachments
            .iter()
            .map(|a| (a.id.clone(), a.session_key.clone()))
            .collect()
    } else {
        BTreeMap::new()
    };
    let clear_mime_body = metadata
        .mime_body
        .as_ref()
        .filter(|_| has_clear_mime)
        .map(|b| b.session_key.clone());
    let clear_plain_text_body = metadata
        .plain_text_body
        .as_ref()
        .filter(|_| has_clear_plain_text)
        .map(|b| b.session_key.clone());

    Ok(SendMessageRequest {
        msg_id: metadata.msg_id.clone(),
        expires_in: metadata.expiration_offset,
        delay_seconds,
        delivery_time: schedule.delivery_time,
        packages,
        body: metadata.body.data_packet.clone(),
        clear_body,
        clear_attachments,
        mime_body: metadata.mime_body.as_ref().map(|b| b.data_packet.clone()),
        clear_mime_body,
        plain_text_body: metadata
            .plain_text_body
            .as_ref()
            .map(|b| b.data_packet.clone()),
        clear_plain_text_body,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in: Option<i64>,
    delay_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    delivery_time: Option<i64>,
    packages: Vec<WireGroup>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireGroup {
    addresses: BTreeMap<String, WireAddress>,
    /// OR of the schemes of all addresses.
    #[serde(rename = "Type")]
    scheme: u32,
    body: String,
    #[serde(rename = "MIMEType")]
    mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body_key: Option<WireKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment_keys: Option<BTreeMap<String, WireKey>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireKey {
    key: String,
    algorithm: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireAddress {
    #[serde(rename = "Type")]
    scheme: u32,
    signature: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    body_key_packet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment_key_packets: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enc_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth: Option<WireAuth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password_hint: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireAuth {
    #[serde(rename = "ModulusID")]
    modulus_id: String,
    salt: String,
    verifier: String,
    version: u32,
}

fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

impl WireKey {
    fn new(key: &SessionKey) -> Self {
        WireKey {
            key: b64(key.as_bytes()),
            algorithm: key.algorithm().as_str(),
        }
    }
}

impl WireAddress {
    fn new(package: &AddressPackage) -> Self {
        let mut address = WireAddress {
            scheme: package.scheme.bits(),
            signature: package.sign.into(),
            body_key_packet: None,
            attachment_key_packets: None,
            token: None,
            enc_token: None,
            auth: None,
            password_hint: None,
        };
        let encode_packets = |packets: &BTreeMap<AttachmentId, Vec<u8>>| -> BTreeMap<String, String> {
            packets
                .iter()
                .map(|(id, packet)| (id.to_string(), b64(packet)))
                .collect()
        };
        match &package.payload {
            PackagePayload::Empty => {}
            PackagePayload::PublicKey {
                body_key_packet,
                attachment_key_packets,
            } => {
                address.body_key_packet = Some(b64(body_key_packet));
                address.attachment_key_packets = Some(encode_packets(attachment_key_packets));
            }
            PackagePayload::Password {
                body_key_packet,
                attachment_key_packets,
                token,
                enc_token,
                auth,
                password_hint,
            } => {
                address.body_key_packet = Some(b64(body_key_packet));
                address.attachment_key_packets = Some(encode_packets(attachment_key_packets));
                address.token = Some(token.clone());
                address.enc_token = Some(enc_token.clone());
                address.auth = Some(WireAuth {
                    modulus_id: auth.modulus_id.clone(),
                    salt: auth.salt.clone(),
                    verifier: auth.verifier.clone(),
                    version: auth.version,
                });
                address.password_hint = password_hint.clone();
            }
        }
        address
    }
}

impl SendMessageRequest {
    /// Encodes the request for the transport.
    ///
    /// Packages are grouped by the body they need: plain text, HTML and MIME.
    /// Clear keys are only put into groups containing a cleartext package.
    pub fn to_wire_json(&self) -> Result<serde_json::Value> {
        let (mime, inline): (Vec<&AddressPackage>, Vec<&AddressPackage>) =
            self.packages.iter().partition(|p| p.scheme.is_mime());
        let (plain_text, html): (Vec<&AddressPackage>, Vec<&AddressPackage>) =
            inline.into_iter().partition(|p| p.plain_text);

        let mut groups = Vec::new();
        if !plain_text.is_empty() {
            let body = self
                .plain_text_body
                .as_deref()
                .context("plain text package without plain text body")?;
            groups.push(self.group(
                &plain_text,
                body,
                MIME_TYPE_PLAIN,
                self.clear_plain_text_body.as_ref(),
                true,
            ));
        }
        if !html.is_empty() {
            groups.push(self.group(&html, &self.body, MIME_TYPE_HTML, self.clear_body.as_ref(), true));
        }
        if !mime.is_empty() {
            let body = self
                .mime_body
                .as_deref()
                .context("MIME package without MIME body")?;
            groups.push(self.group(
                &mime,
                body,
                MIME_TYPE_MIXED,
                self.clear_mime_body.as_ref(),
                false,
            ));
        }

        let request = WireRequest {
            expires_in: Some(self.expires_in).filter(|e| *e > 0),
            delay_seconds: self.delay_seconds,
            delivery_time: self.delivery_time,
            packages: groups,
        };
        serde_json::to_value(request).context("failed to encode send request")
    }

    fn group(
        &self,
        packages: &[&AddressPackage],
        body: &[u8],
        mime_type: &'static str,
        clear_body: Option<&SessionKey>,
        with_attachments: bool,
    ) -> WireGroup {
        let has_cleartext = packages.iter().any(|p| p.scheme.is_cleartext());
        let attachment_keys: Option<BTreeMap<String, WireKey>> =
            (has_cleartext && with_attachments && !self.clear_attachments.is_empty()).then(|| {
                self.clear_attachments
                    .iter()
                    .map(|(id, key)| (id.to_string(), WireKey::new(key)))
                    .collect()
            });
        WireGroup {
            addresses: packages
                .iter()
                .map(|p| (p.email.clone(), WireAddress::new(p)))
                .collect(),
            scheme: packages.iter().fold(0, |acc, p| acc | p.scheme.bits()),
            body: b64(body),
            mime_type,
            body_key: clear_body.filter(|_| has_cleartext).map(WireKey::new),
            attachment_keys,
        }
    }
}

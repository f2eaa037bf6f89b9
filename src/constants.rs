//! # Constants.

#![allow(missing_docs)]

use strum_macros::{Display, EnumIter, EnumString};

/// Encryption scheme of one address package, as put on the wire.
///
/// The numeric values are bit flags; a wire package group carries the OR
/// of all schemes of the addresses it contains.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
#[repr(u32)]
pub enum SendScheme {
    Internal = 1,
    PasswordProtected = 2,
    ClearInline = 4,
    PgpInline = 8,
    PgpMime = 16,
    ClearMime = 32,
}

impl SendScheme {
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Whether the recipient gets the MIME rendering.
    pub fn is_mime(self) -> bool {
        matches!(self, SendScheme::PgpMime | SendScheme::ClearMime)
    }

    /// Whether the server needs the session keys in the open for this scheme.
    pub fn is_cleartext(self) -> bool {
        matches!(self, SendScheme::ClearInline | SendScheme::ClearMime)
    }
}

/// How PGP is applied for an external recipient with a key.
#[derive(Debug, Default, Display, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PgpScheme {
    #[default] // also change Config.DefaultPgpScheme props(default) on changes
    Inline,
    Mime,
}

/// Content type a recipient prefers to read.
#[derive(Debug, Default, Display, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ContentType {
    #[default]
    Html,
    Plain,
}

pub const MIME_TYPE_PLAIN: &str = "text/plain";
pub const MIME_TYPE_HTML: &str = "text/html";
pub const MIME_TYPE_MIXED: &str = "multipart/mixed";

/// Transport response codes telling that the message is already on its way.
pub const ALREADY_SENT_CODES: [i64; 2] = [2500, 15004];

/// Length of the random token handed to password protected recipients.
pub const OUTSIDER_TOKEN_LEN: usize = 32;

/// Number of random salt bytes for the password verifier.
pub const SRP_SALT_LEN: usize = 10;

/// Version of the password verifier scheme.
pub const SRP_AUTH_VERSION: u32 = 4;

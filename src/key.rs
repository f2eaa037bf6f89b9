//! Cryptographic key handles.
//!
//! Keys are opaque to this crate: it only carries the armored material to the
//! [`Crypto`](crate::crypto::Crypto) implementation and looks at fingerprints and
//! usage flags to pick the right key.

use std::fmt;
use std::str::FromStr;

use anyhow::{ensure, Context as _, Result};

use crate::crypto::Passphrase;

/// OpenPGP key fingerprint.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// Creates new 160-bit (20 bytes) or 256-bit (32 bytes) fingerprint.
    pub fn new(v: Vec<u8>) -> Fingerprint {
        Fingerprint(v)
    }

    /// Make a hex string from the fingerprint.
    ///
    /// Use [std::fmt::Display] or [ToString::to_string] to get a
    /// human-readable formatted string.
    pub fn hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint")
            .field("hex", &self.hex())
            .finish()
    }
}

/// Make a human-readable fingerprint.
impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Split key into chunks of 4 with space and newline at 20 chars
        for (i, c) in self.hex().chars().enumerate() {
            if i > 0 && i % 20 == 0 {
                writeln!(f)?;
            } else if i > 0 && i % 4 == 0 {
                write!(f, " ")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Parse a human-readable or otherwise formatted fingerprint.
impl FromStr for Fingerprint {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        let hex_repr: String = input
            .to_uppercase()
            .chars()
            .filter(|&c| c.is_ascii_hexdigit())
            .collect();
        let v: Vec<u8> = hex::decode(&hex_repr).context("invalid fingerprint")?;
        ensure!(!v.is_empty(), "empty fingerprint");
        Ok(Fingerprint::new(v))
    }
}

/// Usage flags the key directory publishes with every key.
///
/// A key without the verification flag is considered compromised, a key without
/// the encryption flag is obsolete. Neither may be used to encrypt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyFlags {
    pub verification_enabled: bool,
    pub encryption_enabled: bool,
}

impl KeyFlags {
    /// Flags of a key that may be used for everything.
    pub const ALL: KeyFlags = KeyFlags {
        verification_enabled: true,
        encryption_enabled: true,
    };

    /// Decodes the directory's bit representation, `1` = verification, `2` = encryption.
    pub fn from_bits(bits: u32) -> Self {
        KeyFlags {
            verification_enabled: bits & 1 != 0,
            encryption_enabled: bits & 2 != 0,
        }
    }
}

/// Public key of a recipient, either pinned on a contact or published in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub armored: String,
    pub fingerprint: Fingerprint,
    pub flags: KeyFlags,
}

impl PublicKey {
    /// Returns true if the key may be used to encrypt to its owner.
    pub fn is_usable_for_sending(&self) -> bool {
        self.flags.verification_enabled && self.flags.encryption_enabled
    }
}

/// Locked private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateKey {
    pub armored: String,
    pub fingerprint: Fingerprint,
}

/// Private key of one of the sender's addresses.
///
/// If `token` is set the key passphrase is that token, itself encrypted to the
/// user keys. Otherwise the key is locked with the mailbox passphrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressKey {
    pub key: PrivateKey,
    pub token: Option<String>,
    pub primary: bool,
}

impl AddressKey {
    /// Public part of the key, as used when the sender sends to themselves.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            armored: self.key.armored.clone(),
            fingerprint: self.key.fingerprint.clone(),
            flags: KeyFlags::ALL,
        }
    }
}

/// Address key together with the passphrase that unlocks it.
///
/// Lives only for one send attempt.
#[derive(Debug, Clone)]
pub struct UnlockedKey {
    pub key: PrivateKey,
    pub passphrase: Passphrase,
}

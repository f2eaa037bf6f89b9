//! # Crypto primitives.
//!
//! The OpenPGP operations themselves are provided by a [`Crypto`] implementation.
//! This module holds the secret value types passed to it and the [`CryptoPool`]
//! through which the pipeline runs every blocking primitive.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, ensure, Context as _, Result};
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use rand::{thread_rng, Rng};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use zeroize::ZeroizeOnDrop;

use crate::auth::SrpModulus;
use crate::error::PrepareError;
use crate::key::{PrivateKey, PublicKey, UnlockedKey};

/// Symmetric cipher of a session key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymmetricAlgorithm(SymmetricKeyAlgorithm);

impl SymmetricAlgorithm {
    pub const AES128: SymmetricAlgorithm = SymmetricAlgorithm(SymmetricKeyAlgorithm::AES128);
    pub const AES256: SymmetricAlgorithm = SymmetricAlgorithm(SymmetricKeyAlgorithm::AES256);

    /// Length of a key of this algorithm in bytes.
    pub fn key_size(&self) -> usize {
        self.0.key_size()
    }

    /// Name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            SymmetricKeyAlgorithm::AES128 => "aes128",
            SymmetricKeyAlgorithm::AES192 => "aes192",
            SymmetricKeyAlgorithm::AES256 => "aes256",
            SymmetricKeyAlgorithm::TripleDES => "3des",
            SymmetricKeyAlgorithm::CAST5 => "cast5",
            SymmetricKeyAlgorithm::Blowfish => "blowfish",
            SymmetricKeyAlgorithm::Twofish => "twofish",
            SymmetricKeyAlgorithm::IDEA => "idea",
            _ => "unknown",
        }
    }

    /// The rPGP algorithm identifier.
    pub fn to_pgp(self) -> SymmetricKeyAlgorithm {
        self.0
    }
}

impl FromStr for SymmetricAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let alg = match s.trim().to_lowercase().as_str() {
            "aes128" => SymmetricKeyAlgorithm::AES128,
            "aes192" => SymmetricKeyAlgorithm::AES192,
            "aes256" => SymmetricKeyAlgorithm::AES256,
            "3des" | "tripledes" => SymmetricKeyAlgorithm::TripleDES,
            "cast5" => SymmetricKeyAlgorithm::CAST5,
            "blowfish" => SymmetricKeyAlgorithm::Blowfish,
            "twofish" => SymmetricKeyAlgorithm::Twofish,
            "idea" => SymmetricKeyAlgorithm::IDEA,
            _ => bail!("unknown symmetric algorithm {s:?}"),
        };
        Ok(SymmetricAlgorithm(alg))
    }
}

impl fmt::Display for SymmetricAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
struct KeyBytes(Vec<u8>);

/// Symmetric key of one encrypted payload.
///
/// Never logged: the `Debug` output only shows the algorithm.
/// The key bytes are wiped when the value is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey {
    key: KeyBytes,
    algorithm: SymmetricAlgorithm,
}

impl SessionKey {
    /// Wraps raw key bytes, checking they fit the algorithm.
    pub fn new(key: Vec<u8>, algorithm: SymmetricAlgorithm) -> Result<Self> {
        ensure!(
            key.len() == algorithm.key_size(),
            "{} session key must be {} bytes, got {}",
            algorithm,
            algorithm.key_size(),
            key.len()
        );
        Ok(SessionKey {
            key: KeyBytes(key),
            algorithm,
        })
    }

    /// Generates a fresh random key.
    pub fn generate(algorithm: SymmetricAlgorithm) -> Self {
        let mut key = vec![0u8; algorithm.key_size()];
        thread_rng().fill(&mut key[..]);
        SessionKey {
            key: KeyBytes(key),
            algorithm,
        }
    }

    /// Converts what the crypto implementation extracted from a key packet.
    ///
    /// A key packet without algorithm is an error, there is no fallback cipher.
    pub fn from_raw(raw: &RawSessionKey) -> Result<Self> {
        let algorithm = match &raw.algorithm {
            Some(name) => name.parse::<SymmetricAlgorithm>()?,
            None => return Err(PrepareError::MissingAlgorithm.into()),
        };
        SessionKey::new(raw.key.clone(), algorithm)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key.0
    }

    pub fn algorithm(&self) -> SymmetricAlgorithm {
        self.algorithm
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("key", &"***")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Session key as extracted from a key packet, before validation.
#[derive(Clone, ZeroizeOnDrop)]
pub struct RawSessionKey {
    pub key: Vec<u8>,
    pub algorithm: Option<String>,
}

impl fmt::Debug for RawSessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSessionKey")
            .field("key", &"***")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Secret string: key passphrase, mailbox passphrase or a draft password.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(s: impl Into<String>) -> Self {
        Passphrase(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not reveal secret values when printing debug info.
        f.write_str("Passphrase(***)")
    }
}

/// An encrypted message split into its two parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitMessage {
    /// Session key packet(s), encrypted to the keys that may read the message.
    pub key_packet: Vec<u8>,
    /// Symmetrically encrypted data packet.
    pub data_packet: Vec<u8>,
}

/// OpenPGP operations the pipeline relies on.
///
/// All methods are blocking and are only ever called from a [`CryptoPool`] worker.
pub trait Crypto: Send + Sync + 'static {
    /// Splits an armored message into key packet and data packet.
    fn split_message(&self, armored: &str) -> Result<SplitMessage>;

    /// Derives the passphrase of an address key.
    ///
    /// Keys carrying a token are unlocked by decrypting the token with the user keys,
    /// other keys use the mailbox passphrase.
    fn unlock_address_key(
        &self,
        token: Option<&str>,
        user_keys: &[PrivateKey],
        mailbox_passphrase: &Passphrase,
    ) -> Result<Passphrase>;

    /// Decrypts a key packet with a private key.
    fn decrypt_session_key(
        &self,
        key_packet: &[u8],
        key: &PrivateKey,
        passphrase: &Passphrase,
    ) -> Result<RawSessionKey>;

    /// Decrypts an armored message with a private key.
    fn decrypt_message(
        &self,
        armored: &str,
        key: &PrivateKey,
        passphrase: &Passphrase,
    ) -> Result<Vec<u8>>;

    /// Encrypts a session key to a public key, returning the key packet.
    fn encrypt_session_key(&self, session_key: &SessionKey, key: &PublicKey) -> Result<Vec<u8>>;

    /// Encrypts a session key with a password, returning the key packet.
    fn encrypt_session_key_with_password(
        &self,
        session_key: &SessionKey,
        password: &Passphrase,
    ) -> Result<Vec<u8>>;

    /// Encrypts bytes with a password, returning an armored message.
    fn encrypt_with_password(&self, plain: &[u8], password: &Passphrase) -> Result<String>;

    /// Encrypts bytes with a session key, returning the data packet.
    fn encrypt_with_session_key(&self, plain: &[u8], session_key: &SessionKey) -> Result<Vec<u8>>;

    /// Creates an armored detached signature.
    fn sign_detached(&self, data: &[u8], key: &PrivateKey, passphrase: &Passphrase)
        -> Result<String>;

    /// Computes the SRP verifier of a password.
    ///
    /// Fails if the modulus signature does not check out.
    fn srp_verifier(
        &self,
        password: &Passphrase,
        modulus: &SrpModulus,
        salt: &[u8],
    ) -> Result<Vec<u8>>;
}

/// Executor for blocking crypto work.
///
/// Owned by the [`Context`](crate::context::Context); every job runs on the blocking
/// thread pool of the given runtime, at most `max_jobs` at once.
#[derive(Clone)]
pub struct CryptoPool {
    crypto: Arc<dyn Crypto>,
    runtime: Handle,
    permits: Arc<Semaphore>,
}

impl fmt::Debug for CryptoPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoPool")
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl CryptoPool {
    pub fn new(crypto: Arc<dyn Crypto>, runtime: Handle, max_jobs: usize) -> Self {
        CryptoPool {
            crypto,
            runtime,
            permits: Arc::new(Semaphore::new(max_jobs.max(1))),
        }
    }

    /// Runs `job` on a blocking worker and returns its result.
    pub async fn run<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&dyn Crypto) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .context("crypto pool is closed")?;
        let crypto = Arc::clone(&self.crypto);
        self.runtime
            .spawn_blocking(move || job(crypto.as_ref()))
            .await
            .context("crypto job panicked")?
    }

    /// Opens a key packet with the first of `keys` that can decrypt it.
    pub async fn open_key_packet(
        &self,
        key_packet: Vec<u8>,
        keys: Vec<UnlockedKey>,
    ) -> Result<SessionKey> {
        let raw = self
            .run(move |crypto| {
                let mut last_err = None;
                for key in &keys {
                    match crypto.decrypt_session_key(&key_packet, &key.key, &key.passphrase) {
                        Ok(raw) => return Ok(raw),
                        Err(err) => last_err = Some(err),
                    }
                }
                Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no keys to try")))
            })
            .await?;
        SessionKey::from_raw(&raw)
    }
}

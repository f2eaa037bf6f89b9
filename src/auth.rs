//! # Password verifier material for password protected recipients.

use anyhow::{ensure, Context as _, Result};
use async_trait::async_trait;
use base64::Engine as _;
use rand::{thread_rng, Rng};

use crate::constants::{SRP_AUTH_VERSION, SRP_SALT_LEN};
use crate::context::Context;
use crate::crypto::Passphrase;
use crate::error::PackageError;

/// SRP modulus as handed out by the auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpModulus {
    pub id: String,
    /// Armored, signed modulus.
    pub modulus: String,
}

/// Auth service handing out fresh SRP moduli.
#[async_trait]
pub trait ModulusService: Send + Sync {
    async fn fetch_modulus(&self) -> Result<SrpModulus>;
}

/// What the outsider needs to prove knowledge of the password later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordAuth {
    pub modulus_id: String,
    /// Base64 of the random salt.
    pub salt: String,
    /// Base64 of the verifier.
    pub verifier: String,
    pub version: u32,
}

/// Fetches a modulus and computes the verifier of `password` over it.
pub(crate) async fn make_password_auth(
    context: &Context,
    password: &Passphrase,
) -> Result<PasswordAuth> {
    let modulus = context
        .modulus_service()
        .fetch_modulus()
        .await
        .context("failed to fetch SRP modulus")?;
    ensure!(!modulus.id.is_empty(), PackageError::InvalidModulusId);
    ensure!(!modulus.modulus.is_empty(), PackageError::InvalidModulus);

    let mut salt = vec![0u8; SRP_SALT_LEN];
    thread_rng().fill(&mut salt[..]);

    let password = password.clone();
    let job_modulus = modulus.clone();
    let job_salt = salt.clone();
    let verifier = context
        .crypto()
        .run(move |crypto| crypto.srp_verifier(&password, &job_modulus, &job_salt))
        .await
        .context("failed to compute password verifier")?;
    ensure!(!verifier.is_empty(), "empty password verifier");

    let b64 = base64::engine::general_purpose::STANDARD;
    Ok(PasswordAuth {
        modulus_id: modulus.id,
        salt: b64.encode(&salt),
        verifier: b64.encode(&verifier),
        version: SRP_AUTH_VERSION,
    })
}

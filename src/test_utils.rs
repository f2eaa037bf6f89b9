//! Utilities to help writing tests.
//!
//! This module is only compiled for test runs.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, ensure, Context as _, Result};
use async_trait::async_trait;
use base64::Engine as _;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::attachment::{AttachmentDescriptor, AttachmentId, AttachmentStore};
use crate::auth::{ModulusService, SrpModulus};
use crate::context::{Context, ContextBuilder};
use crate::crypto::{
    Crypto, Passphrase, RawSessionKey, SessionKey, SplitMessage, SymmetricAlgorithm,
};
use crate::directory::{
    ContactKeyStore, ContactPreferences, KeysResponse, PublicKeyDirectory, RecipientType,
};
use crate::draft::{
    Draft, DraftStore, IdentityProvider, MessageSendingData, MsgId, OwnAddress, SenderIdentity,
};
use crate::events::{EventEmitter, EventType};
use crate::key::{AddressKey, Fingerprint, KeyFlags, PrivateKey, PublicKey, UnlockedKey};
use crate::metadata::unlock_address_keys;
use crate::request::SendMessageRequest;
use crate::transport::{SendResponse, SendTransport};

const ARMOR_BEGIN: &str = "-----BEGIN PGP MESSAGE-----";
const ARMOR_END: &str = "-----END PGP MESSAGE-----";
const ALICE_ADDR: &str = "alice@example.org";

/// A [`Context`] wired to in-memory fakes of all collaborators.
///
/// The fakes stay reachable through the public fields so tests can prepare
/// answers and count calls.
pub(crate) struct TestContext {
    pub ctx: Context,
    pub crypto: Arc<FakeCrypto>,
    pub drafts: Arc<FakeDrafts>,
    pub identity: Arc<FakeIdentity>,
    pub contacts: Arc<FakeContacts>,
    pub directory: Arc<FakeDirectory>,
    pub attachments: Arc<FakeAttachments>,
    pub modulus: Arc<FakeModulus>,
    pub transport: Arc<FakeTransport>,
    events: EventEmitter,
    next_draft: AtomicU32,
}

impl Deref for TestContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.ctx
    }
}

impl TestContext {
    /// Creates a context sending as alice@example.org.
    pub async fn new_alice() -> Self {
        let crypto = Arc::new(FakeCrypto::default());
        let drafts = Arc::new(FakeDrafts::default());
        let identity = Arc::new(FakeIdentity::default());
        let contacts = Arc::new(FakeContacts::default());
        let directory = Arc::new(FakeDirectory::default());
        let attachments = Arc::new(FakeAttachments::default());
        let modulus = Arc::new(FakeModulus::default());
        let transport = Arc::new(FakeTransport::default());

        let ctx = ContextBuilder::new()
            .with_crypto(crypto.clone())
            .with_draft_store(drafts.clone())
            .with_identity_provider(identity.clone())
            .with_contact_store(contacts.clone())
            .with_key_directory(directory.clone())
            .with_attachment_store(attachments.clone())
            .with_modulus_service(modulus.clone())
            .with_transport(transport.clone())
            .build()
            .unwrap();
        let events = ctx.get_event_emitter();

        TestContext {
            ctx,
            crypto,
            drafts,
            identity,
            contacts,
            directory,
            attachments,
            modulus,
            transport,
            events,
            next_draft: AtomicU32::new(1),
        }
    }

    /// Returns a builder with fresh fakes, for tests of the builder itself.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
            .with_crypto(Arc::new(FakeCrypto::default()))
            .with_draft_store(Arc::new(FakeDrafts::default()))
            .with_identity_provider(Arc::new(FakeIdentity::default()))
            .with_contact_store(Arc::new(FakeContacts::default()))
            .with_key_directory(Arc::new(FakeDirectory::default()))
            .with_attachment_store(Arc::new(FakeAttachments::default()))
            .with_modulus_service(Arc::new(FakeModulus::default()))
            .with_transport(Arc::new(FakeTransport::default()))
    }

    /// Takes all events emitted since the last call.
    pub fn drain_events(&self) -> Vec<EventType> {
        std::iter::from_fn(|| self.events.try_recv())
            .map(|event| event.typ)
            .collect()
    }

    /// Takes all pending events and returns the info messages among them.
    pub fn drain_infos(&self) -> Vec<String> {
        self.drain_events()
            .into_iter()
            .filter_map(|typ| match typ {
                EventType::Info(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    /// Takes all pending events and returns the last warning among them.
    pub async fn get_last_warning(&self) -> Option<String> {
        tokio::task::yield_now().await;
        self.drain_events()
            .into_iter()
            .rev()
            .find_map(|typ| match typ {
                EventType::Warning(msg) => Some(msg),
                _ => None,
            })
    }

    /// Unlocks the keys of alice's address.
    pub async fn alice_keys(&self) -> Result<Vec<UnlockedKey>> {
        let identity = alice_identity();
        let address = identity
            .address(ALICE_ADDR)
            .context("alice has no address")?;
        unlock_address_keys(self, &identity, address).await
    }

    pub fn alice_public_key(&self) -> PublicKey {
        FakeCrypto::public_key("alice")
    }

    /// Encrypts a draft body to alice's primary key.
    pub fn encrypt_body(&self, html: &str) -> String {
        FakeCrypto::encrypt_message(
            html.as_bytes(),
            &self.alice_public_key(),
            Some(SymmetricAlgorithm::AES256),
        )
    }

    /// Creates a draft with a fresh ID and the body `<p>Hello Bob</p>`.
    pub fn draft(&self, from: &str, to: &[&str]) -> Draft {
        let id = self.next_draft.fetch_add(1, Ordering::Relaxed);
        Draft {
            to: to.iter().map(|addr| addr.to_string()).collect(),
            body: self.encrypt_body("<p>Hello Bob</p>"),
            ..plain_draft(MsgId::new(format!("draft-{id}")), from)
        }
    }

    /// Stores the draft without cached identity and returns its ID.
    pub fn store_draft(&self, draft: Draft) -> MsgId {
        let msg_id = draft.id.clone();
        self.drafts.insert(MessageSendingData {
            draft,
            cached_identity: None,
        });
        msg_id
    }

    /// Uploads an attachment whose key packet alice can open.
    pub fn attachment(&self, id: &str, file_name: &str, data: &[u8]) -> AttachmentDescriptor {
        self.attachment_for_key(id, file_name, data, "alice")
    }

    /// Uploads an attachment whose key packet is encrypted to the key `key_name`.
    pub fn attachment_for_key(
        &self,
        id: &str,
        file_name: &str,
        data: &[u8],
        key_name: &str,
    ) -> AttachmentDescriptor {
        self.attachments.insert(id, data);
        let key_packet = FakeCrypto::key_packet(key_name, &self.attachment_session_key(id));
        let mime_type = match file_name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("txt") => "text/plain",
            Some("pdf") => "application/pdf",
            Some("png") => "image/png",
            _ => "application/octet-stream",
        };
        AttachmentDescriptor {
            id: AttachmentId::new(id),
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            key_packet: Some(base64::engine::general_purpose::STANDARD.encode(key_packet)),
            content_id: None,
        }
    }

    /// Session key of the attachment `id`, derived from the ID.
    pub fn attachment_session_key(&self, id: &str) -> SessionKey {
        SessionKey::new(
            Sha256::digest(id.as_bytes()).to_vec(),
            SymmetricAlgorithm::AES256,
        )
        .unwrap()
    }
}

/// Identity of alice@example.org.
///
/// The primary key is unlocked by a token, the second key by the mailbox
/// passphrase. Signing is left to the config.
pub(crate) fn alice_identity() -> SenderIdentity {
    SenderIdentity {
        user_keys: vec![FakeCrypto::private_key("alice-user")],
        mailbox_passphrase: Passphrase::new("mailbox secret"),
        addresses: vec![OwnAddress {
            email: ALICE_ADDR.to_string(),
            keys: vec![
                AddressKey {
                    key: FakeCrypto::private_key("alice"),
                    token: Some("TOKEN|alice key passphrase".to_string()),
                    primary: true,
                },
                AddressKey {
                    key: FakeCrypto::private_key("alice-old"),
                    token: None,
                    primary: false,
                },
            ],
        }],
        sign_messages: None,
    }
}

/// Draft without recipients and with an empty body.
pub(crate) fn plain_draft(id: MsgId, from: &str) -> Draft {
    Draft {
        id,
        from: from.to_string(),
        body: FakeCrypto::encrypt_message(
            b"",
            &FakeCrypto::public_key("alice"),
            Some(SymmetricAlgorithm::AES256),
        ),
        attachments: Vec::new(),
        password: None,
        password_hint: None,
        expiration_offset: 0,
        to: Vec::new(),
        cc: Vec::new(),
        bcc: Vec::new(),
    }
}

/// Deterministic stand-in for OpenPGP.
///
/// Keys are identified by name. Packets are readable text, "encryption" only
/// tags the data with a digest of the session key, which is enough to check
/// that the right key was used.
#[derive(Debug, Default)]
pub(crate) struct FakeCrypto {
    calls: Mutex<BTreeMap<&'static str, usize>>,
}

impl FakeCrypto {
    /// Number of calls of the [`Crypto`] method `name`.
    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().get(name).copied().unwrap_or_default()
    }

    fn count(&self, name: &'static str) {
        *self.calls.lock().entry(name).or_default() += 1;
    }

    fn fingerprint(name: &str) -> Fingerprint {
        Fingerprint::new(Sha256::digest(name.as_bytes())[..20].to_vec())
    }

    pub fn public_key(name: &str) -> PublicKey {
        Self::public_key_with_flags(name, KeyFlags::ALL)
    }

    pub fn public_key_with_flags(name: &str, flags: KeyFlags) -> PublicKey {
        PublicKey {
            armored: format!("PUBKEY:{name}"),
            fingerprint: Self::fingerprint(name),
            flags,
        }
    }

    /// A usable key that nothing can be encrypted to.
    pub fn broken_public_key(name: &str) -> PublicKey {
        PublicKey {
            armored: format!("BROKEN:{name}"),
            ..Self::public_key(name)
        }
    }

    pub fn private_key(name: &str) -> PrivateKey {
        PrivateKey {
            armored: format!("PRIVKEY:{name}"),
            fingerprint: Self::fingerprint(name),
        }
    }

    fn tag(key: &[u8]) -> String {
        hex::encode(&Sha256::digest(key)[..8])
    }

    fn password_name(password: &str) -> String {
        format!("password:{}", Self::tag(password.as_bytes()))
    }

    fn encode_key_packet(
        recipient: &str,
        algorithm: Option<SymmetricAlgorithm>,
        key: &[u8],
    ) -> Vec<u8> {
        format!(
            "KEYPACKET|{}|{}|{}",
            recipient,
            algorithm.map(|a| a.as_str()).unwrap_or("-"),
            hex::encode(key)
        )
        .into_bytes()
    }

    fn parse_key_packet(packet: &[u8], recipient: &str) -> Result<RawSessionKey> {
        let packet = std::str::from_utf8(packet).context("key packet is not text")?;
        let parts: Vec<&str> = packet.split('|').collect();
        ensure!(
            parts.len() == 4 && parts[0] == "KEYPACKET",
            "not a key packet"
        );
        ensure!(parts[1] == recipient, "key packet is not for {recipient}");
        Ok(RawSessionKey {
            key: hex::decode(parts[3]).context("bad key bytes")?,
            algorithm: (parts[2] != "-").then(|| parts[2].to_string()),
        })
    }

    fn encrypt_data(plain: &[u8], key: &[u8]) -> Vec<u8> {
        let mut data = format!("DATA|{}|", Self::tag(key)).into_bytes();
        data.extend_from_slice(plain);
        data
    }

    fn decrypt_raw(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        let header = format!("DATA|{}|", Self::tag(key));
        data.strip_prefix(header.as_bytes())
            .map(|plain| plain.to_vec())
            .context("data packet is not encrypted with this session key")
    }

    fn armor(key_packet: &[u8], data_packet: &[u8]) -> String {
        format!(
            "{ARMOR_BEGIN}\n{}\n{}\n{ARMOR_END}\n",
            hex::encode(key_packet),
            hex::encode(data_packet)
        )
    }

    fn dearmor(armored: &str) -> Result<SplitMessage> {
        let lines: Vec<&str> = armored.trim().lines().collect();
        ensure!(
            lines.len() == 4 && lines[0] == ARMOR_BEGIN && lines[3] == ARMOR_END,
            "not an armored message"
        );
        Ok(SplitMessage {
            key_packet: hex::decode(lines[1]).context("bad key packet")?,
            data_packet: hex::decode(lines[2]).context("bad data packet")?,
        })
    }

    fn key_name<'k>(armored: &'k str, prefix: &str) -> Result<&'k str> {
        armored
            .strip_prefix(prefix)
            .with_context(|| format!("not a fake key: {armored:?}"))
    }

    /// Key packet of `key` for the key named `recipient`.
    pub fn key_packet(recipient: &str, key: &SessionKey) -> Vec<u8> {
        Self::encode_key_packet(recipient, Some(key.algorithm()), key.as_bytes())
    }

    /// Encrypts a message to `key` with a fresh session key.
    ///
    /// Without `algorithm` the key packet does not name its cipher.
    pub fn encrypt_message(
        plain: &[u8],
        key: &PublicKey,
        algorithm: Option<SymmetricAlgorithm>,
    ) -> String {
        let session_key = SessionKey::generate(algorithm.unwrap_or(SymmetricAlgorithm::AES256));
        let recipient = Self::key_name(&key.armored, "PUBKEY:").unwrap();
        let key_packet =
            Self::encode_key_packet(recipient, algorithm, session_key.as_bytes());
        Self::armor(&key_packet, &Self::encrypt_data(plain, session_key.as_bytes()))
    }

    /// Decrypts a data packet.
    pub fn decrypt_data(data_packet: &[u8], key: &SessionKey) -> Result<Vec<u8>> {
        Self::decrypt_raw(data_packet, key.as_bytes())
    }

    /// Opens a key packet with the private key `name`.
    pub fn open_packet(packet: &[u8], name: &str) -> Result<SessionKey> {
        SessionKey::from_raw(&Self::parse_key_packet(packet, name)?)
    }

    /// Opens a key packet with a password.
    pub fn open_password_packet(packet: &[u8], password: &str) -> Result<SessionKey> {
        SessionKey::from_raw(&Self::parse_key_packet(
            packet,
            &Self::password_name(password),
        )?)
    }

    /// Decrypts an armored message encrypted with a password.
    pub fn decrypt_with_password(armored: &str, password: &str) -> Result<Vec<u8>> {
        let split = Self::dearmor(armored)?;
        let key = Self::open_password_packet(&split.key_packet, password)?;
        Self::decrypt_data(&split.data_packet, &key)
    }
}

impl Crypto for FakeCrypto {
    fn split_message(&self, armored: &str) -> Result<SplitMessage> {
        self.count("split_message");
        Self::dearmor(armored)
    }

    fn unlock_address_key(
        &self,
        token: Option<&str>,
        user_keys: &[PrivateKey],
        mailbox_passphrase: &Passphrase,
    ) -> Result<Passphrase> {
        self.count("unlock_address_key");
        match token {
            Some(token) => {
                ensure!(!user_keys.is_empty(), "no user keys to decrypt the token");
                let passphrase = token
                    .strip_prefix("TOKEN|")
                    .context("cannot decrypt key token")?;
                Ok(Passphrase::new(passphrase))
            }
            None => Ok(mailbox_passphrase.clone()),
        }
    }

    fn decrypt_session_key(
        &self,
        key_packet: &[u8],
        key: &PrivateKey,
        passphrase: &Passphrase,
    ) -> Result<RawSessionKey> {
        self.count("decrypt_session_key");
        ensure!(!passphrase.is_empty(), "key is locked");
        Self::parse_key_packet(key_packet, Self::key_name(&key.armored, "PRIVKEY:")?)
    }

    fn decrypt_message(
        &self,
        armored: &str,
        key: &PrivateKey,
        passphrase: &Passphrase,
    ) -> Result<Vec<u8>> {
        self.count("decrypt_message");
        ensure!(!passphrase.is_empty(), "key is locked");
        let split = Self::dearmor(armored)?;
        let raw = Self::parse_key_packet(
            &split.key_packet,
            Self::key_name(&key.armored, "PRIVKEY:")?,
        )?;
        Self::decrypt_raw(&split.data_packet, &raw.key)
    }

    fn encrypt_session_key(&self, session_key: &SessionKey, key: &PublicKey) -> Result<Vec<u8>> {
        self.count("encrypt_session_key");
        let recipient = Self::key_name(&key.armored, "PUBKEY:")?;
        Ok(Self::key_packet(recipient, session_key))
    }

    fn encrypt_session_key_with_password(
        &self,
        session_key: &SessionKey,
        password: &Passphrase,
    ) -> Result<Vec<u8>> {
        self.count("encrypt_session_key_with_password");
        ensure!(!password.is_empty(), "empty password");
        Ok(Self::key_packet(
            &Self::password_name(password.as_str()),
            session_key,
        ))
    }

    fn encrypt_with_password(&self, plain: &[u8], password: &Passphrase) -> Result<String> {
        self.count("encrypt_with_password");
        ensure!(!password.is_empty(), "empty password");
        let session_key = SessionKey::generate(SymmetricAlgorithm::AES256);
        let key_packet = Self::key_packet(&Self::password_name(password.as_str()), &session_key);
        Ok(Self::armor(
            &key_packet,
            &Self::encrypt_data(plain, session_key.as_bytes()),
        ))
    }

    fn encrypt_with_session_key(&self, plain: &[u8], session_key: &SessionKey) -> Result<Vec<u8>> {
        self.count("encrypt_with_session_key");
        Ok(Self::encrypt_data(plain, session_key.as_bytes()))
    }

    fn sign_detached(
        &self,
        data: &[u8],
        key: &PrivateKey,
        passphrase: &Passphrase,
    ) -> Result<String> {
        self.count("sign_detached");
        ensure!(!passphrase.is_empty(), "key is locked");
        let signer = Self::key_name(&key.armored, "PRIVKEY:")?;
        Ok(format!(
            "-----BEGIN PGP SIGNATURE-----\n\n{}:{}\n-----END PGP SIGNATURE-----\n",
            signer,
            Self::tag(data)
        ))
    }

    fn srp_verifier(
        &self,
        password: &Passphrase,
        modulus: &SrpModulus,
        salt: &[u8],
    ) -> Result<Vec<u8>> {
        self.count("srp_verifier");
        ensure!(
            modulus.modulus.starts_with("signed"),
            "modulus signature is invalid"
        );
        let mut hasher = Sha256::new();
        hasher.update(password.as_str().as_bytes());
        hasher.update(modulus.modulus.as_bytes());
        hasher.update(salt);
        Ok(hasher.finalize().to_vec())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeDrafts {
    drafts: Mutex<BTreeMap<MsgId, MessageSendingData>>,
    sent: Mutex<Vec<(MsgId, SendResponse)>>,
    fetch_calls: AtomicUsize,
}

impl FakeDrafts {
    pub fn insert(&self, data: MessageSendingData) {
        self.drafts.lock().insert(data.draft.id.clone(), data);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Drafts marked as sent, in order.
    pub fn sent(&self) -> Vec<(MsgId, SendResponse)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl DraftStore for FakeDrafts {
    async fn fetch_sending_data(&self, msg_id: &MsgId) -> Result<MessageSendingData> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.drafts
            .lock()
            .get(msg_id)
            .cloned()
            .with_context(|| format!("no draft {msg_id}"))
    }

    async fn mark_as_sent(&self, msg_id: &MsgId, response: &SendResponse) -> Result<()> {
        self.sent.lock().push((msg_id.clone(), response.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeIdentity {
    calls: AtomicUsize,
}

impl FakeIdentity {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sender_identity(&self) -> Result<SenderIdentity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(alice_identity())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeContacts {
    contacts: Mutex<Vec<ContactPreferences>>,
    failing: AtomicBool,
}

impl FakeContacts {
    pub fn add(&self, contact: ContactPreferences) {
        self.contacts.lock().push(contact);
    }

    /// Makes every following lookup fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContactKeyStore for FakeContacts {
    async fn fetch_contacts(&self, emails: &[String]) -> Result<Vec<ContactPreferences>> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("contact store unavailable");
        }
        Ok(self
            .contacts
            .lock()
            .iter()
            .filter(|c| {
                emails
                    .iter()
                    .any(|e| mailpack_address::addr_cmp(&c.email, e))
            })
            .cloned()
            .collect())
    }
}

/// Key directory; unknown addresses are external without keys.
#[derive(Debug, Default)]
pub(crate) struct FakeDirectory {
    entries: Mutex<BTreeMap<String, Option<KeysResponse>>>,
    calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn set_internal(&self, email: &str, keys: Vec<PublicKey>) {
        self.set(email, RecipientType::Internal, keys);
    }

    pub fn set_external(&self, email: &str, keys: Vec<PublicKey>) {
        self.set(email, RecipientType::External, keys);
    }

    fn set(&self, email: &str, recipient_type: RecipientType, keys: Vec<PublicKey>) {
        self.entries.lock().insert(
            email.to_lowercase(),
            Some(KeysResponse {
                recipient_type,
                keys,
            }),
        );
    }

    /// Makes lookups of `email` fail.
    pub fn fail(&self, email: &str) {
        self.entries.lock().insert(email.to_lowercase(), None);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublicKeyDirectory for FakeDirectory {
    async fn fetch_public_keys(&self, email: &str) -> Result<KeysResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.entries.lock().get(&email.to_lowercase()) {
            Some(Some(keys)) => Ok(keys.clone()),
            Some(None) => bail!("key server unreachable"),
            None => Ok(KeysResponse {
                recipient_type: RecipientType::External,
                keys: Vec::new(),
            }),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeAttachments {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
    failing: Mutex<BTreeSet<String>>,
    fetch_calls: AtomicUsize,
}

impl FakeAttachments {
    pub fn insert(&self, id: &str, data: &[u8]) {
        self.data.lock().insert(id.to_string(), data.to_vec());
    }

    /// Makes downloads of the attachment `id` fail.
    pub fn fail(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttachmentStore for FakeAttachments {
    async fn fetch_attachment(&self, id: &AttachmentId, key_packet: &[u8]) -> Result<Vec<u8>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        ensure!(!key_packet.is_empty(), "no key packet");
        if self.failing.lock().contains(id.as_str()) {
            bail!("attachment storage unreachable");
        }
        self.data
            .lock()
            .get(id.as_str())
            .cloned()
            .with_context(|| format!("unknown attachment {id}"))
    }
}

#[derive(Debug)]
pub(crate) struct FakeModulus {
    modulus: Mutex<Result<SrpModulus, String>>,
    calls: AtomicUsize,
}

impl Default for FakeModulus {
    fn default() -> Self {
        FakeModulus {
            modulus: Mutex::new(Ok(SrpModulus {
                id: "modulus-1".to_string(),
                modulus: "signed modulus".to_string(),
            })),
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeModulus {
    /// Sets the answer of all following fetches, `Err` holds the error message.
    pub fn set(&self, modulus: Result<SrpModulus, String>) {
        *self.modulus.lock() = modulus;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModulusService for FakeModulus {
    async fn fetch_modulus(&self) -> Result<SrpModulus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.modulus.lock().clone().map_err(|msg| anyhow!(msg))
    }
}

/// Transport answering `1000` unless told otherwise.
#[derive(Debug)]
pub(crate) struct FakeTransport {
    response: Mutex<Result<SendResponse, String>>,
    requests: Mutex<Vec<SendMessageRequest>>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        FakeTransport {
            response: Mutex::new(Ok(SendResponse {
                code: SendResponse::OK,
                payload: serde_json::json!({"Code": 1000}),
            })),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeTransport {
    pub fn respond(&self, code: i64, payload: serde_json::Value) {
        *self.response.lock() = Ok(SendResponse { code, payload });
    }

    /// Makes submissions fail with a network error.
    pub fn fail(&self, msg: &str) {
        *self.response.lock() = Err(msg.to_string());
    }

    /// Requests submitted so far.
    pub fn requests(&self) -> Vec<SendMessageRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SendTransport for FakeTransport {
    async fn submit(&self, request: &SendMessageRequest) -> Result<SendResponse> {
        self.requests.lock().push(request.clone());
        self.response.lock().clone().map_err(|msg| anyhow!(msg))
    }
}

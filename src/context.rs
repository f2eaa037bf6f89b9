//! Context module.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use strum::EnumProperty;
use tokio::runtime::Handle;
use tokio::sync::RwLock;

use crate::attachment::AttachmentStore;
use crate::auth::ModulusService;
use crate::config::{parse_config_toml, Config};
use crate::crypto::{Crypto, CryptoPool};
use crate::directory::{ContactKeyStore, PublicKeyDirectory};
use crate::draft::{DraftStore, IdentityProvider};
use crate::events::{Event, EventEmitter, EventType, Events};
use crate::transport::SendTransport;

/// Builder for the [`Context`].
///
/// All collaborators must be set before calling [`ContextBuilder::build`].
///
/// # Examples
///
/// ```no_run
/// # fn collaborators() -> mailpack::ContextBuilder { unimplemented!() }
/// # async fn example() -> anyhow::Result<()> {
/// let context = collaborators()
///     .with_config_toml("sign_messages = true")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ContextBuilder {
    id: Option<u32>,
    events: Option<Events>,
    runtime: Option<Handle>,
    config: BTreeMap<Config, String>,
    crypto: Option<Arc<dyn Crypto>>,
    drafts: Option<Arc<dyn DraftStore>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    contacts: Option<Arc<dyn ContactKeyStore>>,
    directory: Option<Arc<dyn PublicKeyDirectory>>,
    attachments: Option<Arc<dyn AttachmentStore>>,
    modulus: Option<Arc<dyn ModulusService>>,
    transport: Option<Arc<dyn SendTransport>>,
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the context ID.
    ///
    /// By default a unique ID is allocated.
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the event channel.
    ///
    /// By default a new channel is created.
    pub fn with_events(mut self, events: Events) -> Self {
        self.events = Some(events);
        self
    }

    /// Sets the runtime crypto jobs are spawned on.
    ///
    /// By default the runtime `build()` is called from.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Sets configuration from a TOML document.
    pub fn with_config_toml(mut self, toml: &str) -> Result<Self> {
        self.config.extend(parse_config_toml(toml)?);
        Ok(self)
    }

    pub fn with_crypto(mut self, crypto: Arc<dyn Crypto>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    pub fn with_draft_store(mut self, drafts: Arc<dyn DraftStore>) -> Self {
        self.drafts = Some(drafts);
        self
    }

    pub fn with_identity_provider(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_contact_store(mut self, contacts: Arc<dyn ContactKeyStore>) -> Self {
        self.contacts = Some(contacts);
        self
    }

    pub fn with_key_directory(mut self, directory: Arc<dyn PublicKeyDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_attachment_store(mut self, attachments: Arc<dyn AttachmentStore>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    pub fn with_modulus_service(mut self, modulus: Arc<dyn ModulusService>) -> Self {
        self.modulus = Some(modulus);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn SendTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the [`Context`].
    ///
    /// Must be called within a tokio runtime unless one was set with
    /// [`ContextBuilder::with_runtime`].
    pub fn build(self) -> Result<Context> {
        static NEXT_ID: AtomicU32 = AtomicU32::new(1);

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().context("not inside a tokio runtime")?,
        };
        let key = Config::MaxConcurrentCryptoJobs;
        let max_jobs = self
            .config
            .get(&key)
            .map(|s| s.as_str())
            .or_else(|| key.get_str("default"))
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(1);
        let crypto = CryptoPool::new(self.crypto.context("crypto is not set")?, runtime, max_jobs);

        let inner = InnerContext {
            id: self
                .id
                .unwrap_or_else(|| NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            config: RwLock::new(self.config),
            events: self.events.unwrap_or_default(),
            crypto,
            drafts: self.drafts.context("draft store is not set")?,
            identity: self.identity.context("identity provider is not set")?,
            contacts: self.contacts.context("contact store is not set")?,
            directory: self.directory.context("key directory is not set")?,
            attachments: self.attachments.context("attachment store is not set")?,
            modulus: self.modulus.context("modulus service is not set")?,
            transport: self.transport.context("transport is not set")?,
        };
        Ok(Context {
            inner: Arc::new(inner),
        })
    }
}

/// The context for a single sending account.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone, Debug)]
pub struct Context {
    pub(crate) inner: Arc<InnerContext>,
}

impl Deref for Context {
    type Target = InnerContext;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Actual context, expensive to clone.
pub struct InnerContext {
    /// ID of the context, copied into every event.
    pub(crate) id: u32,
    pub(crate) config: RwLock<BTreeMap<Config, String>>,
    pub(crate) events: Events,
    pub(crate) crypto: CryptoPool,
    pub(crate) drafts: Arc<dyn DraftStore>,
    pub(crate) identity: Arc<dyn IdentityProvider>,
    pub(crate) contacts: Arc<dyn ContactKeyStore>,
    pub(crate) directory: Arc<dyn PublicKeyDirectory>,
    pub(crate) attachments: Arc<dyn AttachmentStore>,
    pub(crate) modulus: Arc<dyn ModulusService>,
    pub(crate) transport: Arc<dyn SendTransport>,
}

impl std::fmt::Debug for InnerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnerContext")
            .field("id", &self.id)
            .field("crypto", &self.crypto)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Returns context id.
    pub fn get_id(&self) -> u32 {
        self.id
    }

    /// Emits a single event.
    pub fn emit_event(&self, event: EventType) {
        self.events.emit(Event {
            id: self.id,
            typ: event,
        });
    }

    /// Returns a receiver for emitted events.
    ///
    /// Multiple emitters can be created, but note that in this case each emitted event will
    /// only be received by one of the emitters, not by all of them.
    pub fn get_event_emitter(&self) -> EventEmitter {
        self.events.get_emitter()
    }

    pub(crate) fn crypto(&self) -> &CryptoPool {
        &self.crypto
    }

    pub(crate) fn draft_store(&self) -> &dyn DraftStore {
        self.drafts.as_ref()
    }

    pub(crate) fn identity_provider(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    pub(crate) fn contact_store(&self) -> &dyn ContactKeyStore {
        self.contacts.as_ref()
    }

    pub(crate) fn key_directory(&self) -> &dyn PublicKeyDirectory {
        self.directory.as_ref()
    }

    pub(crate) fn attachment_store(&self) -> &dyn AttachmentStore {
        self.attachments.as_ref()
    }

    pub(crate) fn modulus_service(&self) -> &dyn ModulusService {
        self.modulus.as_ref()
    }

    pub(crate) fn transport(&self) -> &dyn SendTransport {
        self.transport.as_ref()
    }
}

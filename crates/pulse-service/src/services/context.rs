//! Service context - dependency container for the delivery core
//!
//! Built once at process start and shared by the gateway handlers and the
//! HTTP surface.

use std::sync::Arc;

use pulse_cache::{KvStore, Mailbox, PresenceTracker, StatusBatcher};
use pulse_common::{CallConfig, MailboxConfig, PresenceConfig};
use pulse_core::{ChatRepository, IdentityResolver, MembershipDirectory, Transport};

use super::calls::CallSessionRegistry;
use super::error::{ServiceError, ServiceResult};
use super::router::FanoutRouter;

/// Service context containing all dependencies
///
/// Provides access to:
/// - the shared key-value store and the transport
/// - presence, mailbox and the fan-out router built on them
/// - the call registry
/// - the identity, membership and chat collaborators
#[derive(Clone)]
pub struct ServiceContext {
    store: Arc<dyn KvStore>,
    transport: Arc<dyn Transport>,

    presence: Arc<PresenceTracker>,
    mailbox: Mailbox,
    router: Arc<FanoutRouter>,
    calls: Arc<CallSessionRegistry>,

    identity: Arc<dyn IdentityResolver>,
    directory: Arc<dyn MembershipDirectory>,
    chats: Arc<dyn ChatRepository>,

    presence_config: PresenceConfig,
}

impl ServiceContext {
    /// Get the shared key-value store
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn presence(&self) -> &PresenceTracker {
        self.presence.as_ref()
    }

    pub fn batcher(&self) -> &Arc<StatusBatcher> {
        self.presence.batcher()
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn router(&self) -> &FanoutRouter {
        self.router.as_ref()
    }

    pub fn calls(&self) -> &Arc<CallSessionRegistry> {
        &self.calls
    }

    pub fn identity(&self) -> &dyn IdentityResolver {
        self.identity.as_ref()
    }

    pub fn directory(&self) -> &dyn MembershipDirectory {
        self.directory.as_ref()
    }

    pub fn chats(&self) -> &dyn ChatRepository {
        self.chats.as_ref()
    }

    pub fn presence_config(&self) -> &PresenceConfig {
        &self.presence_config
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("presence", &self.presence)
            .field("mailbox", &self.mailbox)
            .field("calls", &self.calls)
            .field("collaborators", &"...")
            .finish()
    }
}

/// Builder for creating ServiceContext with custom configuration
#[derive(Default)]
pub struct ServiceContextBuilder {
    store: Option<Arc<dyn KvStore>>,
    transport: Option<Arc<dyn Transport>>,
    identity: Option<Arc<dyn IdentityResolver>>,
    directory: Option<Arc<dyn MembershipDirectory>>,
    chats: Option<Arc<dyn ChatRepository>>,
    presence: PresenceConfig,
    mailbox: MailboxConfig,
    calls: CallConfig,
}

impl ServiceContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn MembershipDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn chats(mut self, chats: Arc<dyn ChatRepository>) -> Self {
        self.chats = Some(chats);
        self
    }

    /// Use one value for all three collaborators
    pub fn collaborators<T>(self, collaborators: Arc<T>) -> Self
    where
        T: IdentityResolver + MembershipDirectory + ChatRepository + 'static,
    {
        self.identity(collaborators.clone())
            .directory(collaborators.clone())
            .chats(collaborators)
    }

    pub fn presence_config(mut self, config: PresenceConfig) -> Self {
        self.presence = config;
        self
    }

    pub fn mailbox_config(mut self, config: MailboxConfig) -> Self {
        self.mailbox = config;
        self
    }

    pub fn call_config(mut self, config: CallConfig) -> Self {
        self.calls = config;
        self
    }

    /// Build the ServiceContext
    ///
    /// # Errors
    /// Returns `ServiceError::Validation` if any required dependency is missing
    pub fn build(self) -> ServiceResult<ServiceContext> {
        let store = self
            .store
            .ok_or_else(|| ServiceError::validation("store is required"))?;
        let transport = self
            .transport
            .ok_or_else(|| ServiceError::validation("transport is required"))?;
        let identity = self
            .identity
            .ok_or_else(|| ServiceError::validation("identity is required"))?;
        let directory = self
            .directory
            .ok_or_else(|| ServiceError::validation("directory is required"))?;
        let chats = self
            .chats
            .ok_or_else(|| ServiceError::validation("chats is required"))?;

        let batcher = Arc::new(StatusBatcher::new(self.presence.status_batch_capacity));
        let presence = Arc::new(
            PresenceTracker::new(store.clone(), transport.clone(), batcher)
                .with_user_timeout(self.presence.user_timeout_secs),
        );
        let mailbox = Mailbox::with_limits(
            store.clone(),
            self.mailbox.max_messages,
            self.mailbox.ttl_secs,
        );
        let router = Arc::new(FanoutRouter::new(
            presence.clone(),
            mailbox.clone(),
            transport.clone(),
            directory.clone(),
        ));
        let calls = Arc::new(
            CallSessionRegistry::new(transport.clone()).with_ring_timeout(self.calls.ring_timeout()),
        );

        Ok(ServiceContext {
            store,
            transport,
            presence,
            mailbox,
            router,
            calls,
            identity,
            directory,
            chats,
            presence_config: self.presence,
        })
    }
}

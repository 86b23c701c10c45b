//! API client facade
//!
//! A [`Client`] talks to one server as one principal. Reads go through the
//! resource cache; every mutating call returns a [`TaskHandle`], and the
//! `*_and_wait` variants poll it to completion and then drop the cached
//! inventory so the next listing shows the change.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use stratus_credential::{CredentialSource, Profile, StaticCredentials};
use stratus_resilience::CancellationToken;
use tracing::{info, instrument};

use crate::api::Api;
use crate::config::ClientConfig;
use crate::enrich::{AddressResolver, Enricher};
use crate::error::{ClientError, ClientResult};
use crate::factory::ClientKey;
use crate::http::Transport;
use crate::inventory::{InventorySource, ResourceCache, ResourceSnapshot};
use crate::model::{Address, EnrichedResource, Resource, ResourceKind, TaskHandle, TaskStatus};
use crate::session::Session;
use crate::task::{LogProgress, TaskMonitor, TaskStatusSource};

/// A VM or container addressed by node, kind and id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuestRef {
    /// Node currently hosting the guest
    pub node: String,
    /// `Qemu` or `Lxc`
    pub kind: ResourceKind,
    /// Guest id
    pub vmid: u32,
}

impl GuestRef {
    /// QEMU virtual machine on `node`
    pub fn qemu(node: impl Into<String>, vmid: u32) -> Self {
        Self {
            node: node.into(),
            kind: ResourceKind::Qemu,
            vmid,
        }
    }

    /// LXC container on `node`
    pub fn lxc(node: impl Into<String>, vmid: u32) -> Self {
        Self {
            node: node.into(),
            kind: ResourceKind::Lxc,
            vmid,
        }
    }

    fn path(&self) -> String {
        format!("nodes/{}/{}/{}", self.node, self.kind, self.vmid)
    }

    fn handle(&self, upid: String) -> TaskHandle {
        TaskHandle::from_upid(upid.clone()).unwrap_or_else(|| TaskHandle::new(upid, self.node.clone()))
    }
}

impl TryFrom<&Resource> for GuestRef {
    type Error = ClientError;

    fn try_from(resource: &Resource) -> Result<Self, Self::Error> {
        match (resource.kind.is_guest(), resource.vmid) {
            (true, Some(vmid)) => Ok(Self {
                node: resource.node.clone(),
                kind: resource.kind,
                vmid,
            }),
            _ => Err(ClientError::InvalidRequest(format!(
                "'{}' is not a guest",
                resource.id
            ))),
        }
    }
}

impl fmt::Display for GuestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.kind, self.vmid, self.node)
    }
}

/// Power state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    /// Boot the guest
    Start,
    /// Hard stop
    Stop,
    /// Graceful shutdown
    Shutdown,
    /// Graceful reboot
    Reboot,
}

impl PowerAction {
    /// Path segment under `status/`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Shutdown => "shutdown",
            Self::Reboot => "reboot",
        }
    }
}

/// Parameters for cloning a guest
#[derive(Debug, Clone)]
pub struct CloneRequest {
    /// Guest to copy
    pub source: GuestRef,
    /// Id for the copy; the next free id when unset
    pub new_vmid: Option<u32>,
    /// Name (VMs) or hostname (containers) of the copy
    pub name: Option<String>,
    /// Full copy instead of a linked clone
    pub full: bool,
    /// Node to place the copy on; the source node when unset
    pub target_node: Option<String>,
}

impl CloneRequest {
    /// Full clone of `source` with server-chosen id and default name
    pub fn new(source: GuestRef) -> Self {
        Self {
            source,
            new_vmid: None,
            name: None,
            full: true,
            target_node: None,
        }
    }

    /// Use this id for the copy
    pub fn vmid(mut self, vmid: u32) -> Self {
        self.new_vmid = Some(vmid);
        self
    }

    /// Name the copy
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Linked instead of full clone
    pub fn linked(mut self) -> Self {
        self.full = false;
        self
    }

    /// Place the copy on `node`
    pub fn target(mut self, node: impl Into<String>) -> Self {
        self.target_node = Some(node.into());
        self
    }
}

/// Parameters for moving a guest to another node
#[derive(Debug, Clone)]
pub struct MigrateRequest {
    /// Guest to move
    pub guest: GuestRef,
    /// Destination node
    pub target_node: String,
    /// Live migration for VMs, restart migration for containers
    pub online: bool,
}

impl MigrateRequest {
    /// Offline migration of `guest` to `target_node`
    pub fn new(guest: GuestRef, target_node: impl Into<String>) -> Self {
        Self {
            guest,
            target_node: target_node.into(),
            online: false,
        }
    }

    /// Keep the guest running during the move
    pub fn online(mut self) -> Self {
        self.online = true;
        self
    }
}

/// Numeric fields the API returns as either a number or a string
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseU32 {
    Number(u32),
    Text(String),
}

/// Client for one principal on one server
pub struct Client {
    key: ClientKey,
    api: Arc<Api>,
    resources: ResourceCache,
    enricher: Enricher,
    monitor: TaskMonitor,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("principal", &self.key.principal)
            .field("endpoint", &self.key.endpoint)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Client logging in with the profile's credentials
    pub fn new(profile: &Profile, config: &ClientConfig) -> ClientResult<Self> {
        Self::with_credentials(
            ClientKey::from(profile),
            Arc::new(StaticCredentials::new(profile.clone())),
            config,
        )
    }

    /// Client asking `credentials` for a login each time it needs one
    pub fn with_credentials(
        key: ClientKey,
        credentials: Arc<dyn CredentialSource>,
        config: &ClientConfig,
    ) -> ClientResult<Self> {
        config.validate()?;
        let transport = Transport::new(&key.endpoint, config)?;

        let mut monitor =
            TaskMonitor::new(config.task_backoff.clone()).with_progress(Arc::new(LogProgress));
        if let Some(timeout) = config.task_timeout {
            monitor = monitor.with_timeout(timeout);
        }

        Ok(Self {
            key,
            api: Arc::new(Api::new(transport, credentials)),
            resources: ResourceCache::new(config.cache_ttl),
            enricher: Enricher::new(config.max_enrich_workers),
            monitor,
        })
    }

    /// Principal and endpoint this client serves
    pub fn key(&self) -> &ClientKey {
        &self.key
    }

    /// Log in now unless a session already exists
    pub async fn authenticate(&self) -> ClientResult<Arc<Session>> {
        self.api.session().await
    }

    /// Logins performed by this client so far
    pub fn login_count(&self) -> u64 {
        self.api.login_count()
    }

    // ── Inventory ─────────────────────────────────────────────────────────

    /// Cluster inventory, served from cache within the TTL
    pub async fn resources(&self) -> ClientResult<Arc<Vec<Resource>>> {
        self.resources.get(self.api.as_ref()).await
    }

    /// Cached inventory with capture time and queries
    pub async fn snapshot(&self) -> ClientResult<ResourceSnapshot> {
        self.resources.snapshot(self.api.as_ref()).await
    }

    /// Drop the cached inventory
    pub async fn invalidate_resources(&self) {
        self.resources.invalidate().await;
    }

    /// Locate a guest by id in the cached inventory
    pub async fn find_guest(&self, vmid: u32) -> ClientResult<GuestRef> {
        let snapshot = self.snapshot().await?;
        snapshot
            .find_guest(vmid)
            .ok_or(ClientError::GuestNotFound(vmid))
            .and_then(GuestRef::try_from)
    }

    /// Inventory with live addresses for running guests
    pub async fn enriched_resources(&self) -> ClientResult<Vec<EnrichedResource>> {
        let resources = self.resources().await?;
        Ok(self.enrich(resources.to_vec()).await)
    }

    /// Attach live addresses to `resources`
    pub async fn enrich(&self, resources: Vec<Resource>) -> Vec<EnrichedResource> {
        self.enricher.enrich(Arc::clone(&self.api), resources).await
    }

    // ── Tasks ─────────────────────────────────────────────────────────────

    /// Wait for a task using the configured policy
    pub async fn wait_for_task(&self, handle: &TaskHandle, cancel: &CancellationToken) -> ClientResult<()> {
        self.monitor.wait(self.api.as_ref(), handle, cancel).await
    }

    async fn finish(&self, handle: TaskHandle, cancel: &CancellationToken) -> ClientResult<TaskHandle> {
        let outcome = self.wait_for_task(&handle, cancel).await;
        if !matches!(outcome, Err(ClientError::Cancelled)) {
            self.invalidate_resources().await;
        }
        outcome.map(|()| handle)
    }

    // ── Power ─────────────────────────────────────────────────────────────

    /// Request a power transition
    #[instrument(skip(self, guest), fields(guest = %guest))]
    pub async fn power(&self, guest: &GuestRef, action: PowerAction) -> ClientResult<TaskHandle> {
        let path = format!("{}/status/{}", guest.path(), action.as_str());
        let upid: String = self.api.post(&path, &[]).await?;
        info!(upid = %upid, action = action.as_str(), "power task submitted");
        Ok(guest.handle(upid))
    }

    /// Power transition, waiting for it to finish
    pub async fn power_and_wait(
        &self,
        guest: &GuestRef,
        action: PowerAction,
        cancel: &CancellationToken,
    ) -> ClientResult<TaskHandle> {
        let handle = self.power(guest, action).await?;
        self.finish(handle, cancel).await
    }

    /// Boot a guest
    pub async fn start(&self, guest: &GuestRef) -> ClientResult<TaskHandle> {
        self.power(guest, PowerAction::Start).await
    }

    /// Hard-stop a guest
    pub async fn stop(&self, guest: &GuestRef) -> ClientResult<TaskHandle> {
        self.power(guest, PowerAction::Stop).await
    }

    /// Gracefully shut down a guest
    pub async fn shutdown(&self, guest: &GuestRef) -> ClientResult<TaskHandle> {
        self.power(guest, PowerAction::Shutdown).await
    }

    /// Gracefully reboot a guest
    pub async fn reboot(&self, guest: &GuestRef) -> ClientResult<TaskHandle> {
        self.power(guest, PowerAction::Reboot).await
    }

    // ── Provisioning ──────────────────────────────────────────────────────

    /// Next free guest id
    pub async fn next_vmid(&self) -> ClientResult<u32> {
        match self.api.get::<LooseU32>("cluster/nextid").await? {
            LooseU32::Number(id) => Ok(id),
            LooseU32::Text(text) => text.trim().parse().map_err(|_| ClientError::UnexpectedResponse {
                path: "cluster/nextid".to_string(),
                reason: format!("'{text}' is not a guest id"),
            }),
        }
    }

    /// Copy a guest
    ///
    /// Without an explicit id the next free one is taken; call
    /// [`next_vmid`](Self::next_vmid) first to know it in advance.
    #[instrument(skip(self, request), fields(source = %request.source))]
    pub async fn clone_guest(&self, request: &CloneRequest) -> ClientResult<TaskHandle> {
        let new_vmid = match request.new_vmid {
            Some(id) => id,
            None => self.next_vmid().await?,
        };

        let mut params = vec![
            ("newid", new_vmid.to_string()),
            ("full", u8::from(request.full).to_string()),
        ];
        if let Some(name) = &request.name {
            let field = match request.source.kind {
                ResourceKind::Lxc => "hostname",
                _ => "name",
            };
            params.push((field, name.clone()));
        }
        if let Some(target) = &request.target_node {
            params.push(("target", target.clone()));
        }

        let path = format!("{}/clone", request.source.path());
        let upid: String = self.api.post(&path, &params).await?;
        info!(upid = %upid, new_vmid, "clone task submitted");
        Ok(request.source.handle(upid))
    }

    /// Copy a guest, waiting for the copy to finish
    pub async fn clone_and_wait(
        &self,
        request: &CloneRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<TaskHandle> {
        let handle = self.clone_guest(request).await?;
        self.finish(handle, cancel).await
    }

    /// Move a guest to another node
    #[instrument(skip(self, request), fields(guest = %request.guest, target = %request.target_node))]
    pub async fn migrate(&self, request: &MigrateRequest) -> ClientResult<TaskHandle> {
        let mut params = vec![("target", request.target_node.clone())];
        if request.online {
            let flag = match request.guest.kind {
                ResourceKind::Lxc => "restart",
                _ => "online",
            };
            params.push((flag, "1".to_string()));
        }

        let path = format!("{}/migrate", request.guest.path());
        let upid: String = self.api.post(&path, &params).await?;
        info!(upid = %upid, "migration task submitted");
        Ok(request.guest.handle(upid))
    }

    /// Move a guest, waiting for the move to finish
    pub async fn migrate_and_wait(
        &self,
        request: &MigrateRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<TaskHandle> {
        let handle = self.migrate(request).await?;
        self.finish(handle, cancel).await
    }

    /// Destroy a guest
    #[instrument(skip(self, guest), fields(guest = %guest))]
    pub async fn delete_guest(&self, guest: &GuestRef) -> ClientResult<TaskHandle> {
        let upid: String = self.api.delete(&guest.path()).await?;
        info!(upid = %upid, "delete task submitted");
        Ok(guest.handle(upid))
    }

    /// Destroy a guest, waiting for removal to finish
    pub async fn delete_and_wait(&self, guest: &GuestRef, cancel: &CancellationToken) -> ClientResult<TaskHandle> {
        let handle = self.delete_guest(guest).await?;
        self.finish(handle, cancel).await
    }
}

#[async_trait]
impl InventorySource for Client {
    async fn fetch_resources(&self) -> ClientResult<Vec<Resource>> {
        self.api.fetch_resources().await
    }
}

#[async_trait]
impl AddressResolver for Client {
    async fn resolve_address(&self, resource: &Resource) -> ClientResult<Address> {
        self.api.resolve_address(resource).await
    }
}

#[async_trait]
impl TaskStatusSource for Client {
    async fn task_status(&self, handle: &TaskHandle) -> ClientResult<TaskStatus> {
        self.api.task_status(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{guest, node};
    use pretty_assertions::assert_eq;

    #[test]
    fn guest_paths() {
        assert_eq!(GuestRef::qemu("pve1", 100).path(), "nodes/pve1/qemu/100");
        assert_eq!(GuestRef::lxc("pve2", 200).path(), "nodes/pve2/lxc/200");
        assert_eq!(GuestRef::lxc("pve2", 200).to_string(), "lxc/200@pve2");
    }

    #[test]
    fn guest_ref_from_resource() {
        let vm = guest(ResourceKind::Qemu, 100, "pve1", "running");
        assert_eq!(GuestRef::try_from(&vm).unwrap(), GuestRef::qemu("pve1", 100));
        assert!(matches!(
            GuestRef::try_from(&node("pve1")),
            Err(ClientError::InvalidRequest(_))
        ));
    }

    #[test]
    fn handle_prefers_node_from_upid() {
        let guest = GuestRef::qemu("pve1", 100);
        assert_eq!(guest.handle("UPID:pve3:00:00:00:qmigrate:100:root@pam:".into()).node, "pve3");
        assert_eq!(guest.handle("opaque".into()).node, "pve1");
    }

    #[test]
    fn request_builders() {
        let clone = CloneRequest::new(GuestRef::lxc("pve1", 200))
            .vmid(201)
            .name("web-2")
            .linked()
            .target("pve2");
        assert_eq!(clone.new_vmid, Some(201));
        assert!(!clone.full);
        assert_eq!(clone.target_node.as_deref(), Some("pve2"));

        let migrate = MigrateRequest::new(GuestRef::qemu("pve1", 100), "pve2").online();
        assert!(migrate.online);
    }
}

//! Cached cluster inventory
//!
//! One fetch per TTL window no matter how many callers ask; callers arriving
//! during a refresh wait for it and then share its result. Snapshots are
//! replaced whole, never patched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::cache::CacheEntry;
use crate::error::{ClientError, ClientResult};
use crate::model::{Resource, ResourceKind};

/// Prefix attached to every inventory fetch failure
pub const LIST_RESOURCES_CONTEXT: &str = "failed to list cluster resources";

/// Where the inventory comes from
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// List node, VM and container rows
    async fn fetch_resources(&self) -> ClientResult<Vec<Resource>>;
}

#[async_trait]
impl<T: InventorySource + ?Sized> InventorySource for Arc<T> {
    async fn fetch_resources(&self) -> ClientResult<Vec<Resource>> {
        (**self).fetch_resources().await
    }
}

/// An immutable inventory listing
#[derive(Debug, Clone)]
pub struct ResourceSnapshot {
    resources: Arc<Vec<Resource>>,
    captured_at: DateTime<Utc>,
}

impl ResourceSnapshot {
    /// Wrap a freshly fetched listing
    pub fn new(resources: Vec<Resource>) -> Self {
        Self {
            resources: Arc::new(resources),
            captured_at: Utc::now(),
        }
    }

    /// All rows in server order
    pub fn resources(&self) -> &Arc<Vec<Resource>> {
        &self.resources
    }

    /// When the listing was fetched
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Guest with the given id
    pub fn find_guest(&self, vmid: u32) -> Option<&Resource> {
        self.guests().find(|r| r.vmid == Some(vmid))
    }

    /// Node rows
    pub fn nodes(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| r.kind == ResourceKind::Node)
    }

    /// VM and container rows
    pub fn guests(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| r.kind.is_guest())
    }
}

/// TTL cache over an [`InventorySource`]
#[derive(Debug)]
pub struct ResourceCache {
    entry: CacheEntry<ResourceSnapshot>,
}

impl ResourceCache {
    /// Default snapshot lifetime
    pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

    /// Cache whose snapshots live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: CacheEntry::with_ttl("resources", ttl),
        }
    }

    /// Current listing, fetching from `source` if stale
    pub async fn get<S>(&self, source: &S) -> ClientResult<Arc<Vec<Resource>>>
    where
        S: InventorySource + ?Sized,
    {
        self.snapshot(source).await.map(|s| s.resources)
    }

    /// Current snapshot, fetching from `source` if stale
    ///
    /// On failure the previous snapshot is kept for later callers.
    #[instrument(skip_all)]
    pub async fn snapshot<S>(&self, source: &S) -> ClientResult<ResourceSnapshot>
    where
        S: InventorySource + ?Sized,
    {
        self.entry
            .get_or_fetch(|| async {
                let resources = source
                    .fetch_resources()
                    .await
                    .map_err(|e| e.context(LIST_RESOURCES_CONTEXT))?;
                tracing::debug!(count = resources.len(), "inventory refreshed");
                Ok::<_, ClientError>(ResourceSnapshot::new(resources))
            })
            .await
    }

    /// Force the next read to fetch
    pub async fn invalidate(&self) {
        self.entry.invalidate().await;
    }

    /// Fetches started so far
    pub fn fetch_count(&self) -> u64 {
        self.entry.fetch_count()
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeInventory, guest, node};
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn refetches_after_ttl() {
        let source = FakeInventory::new(vec![node("pve1")]);
        let cache = ResourceCache::new(Duration::from_secs(10));

        cache.get(&source).await.unwrap();
        tokio::time::advance(Duration::from_secs(9)).await;
        cache.get(&source).await.unwrap();
        assert_eq!(source.calls(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        cache.get(&source).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn errors_carry_the_static_prefix() {
        let source = FakeInventory::failing();
        let cache = ResourceCache::default();

        let err = cache.get(&source).await.unwrap_err();
        assert!(err.to_string().starts_with(LIST_RESOURCES_CONTEXT));
        assert!(matches!(err, ClientError::Context { .. }));
    }

    #[tokio::test]
    async fn snapshot_queries() {
        let source = FakeInventory::new(vec![
            node("pve1"),
            guest(ResourceKind::Qemu, 100, "pve1", "running"),
            guest(ResourceKind::Lxc, 200, "pve1", "stopped"),
        ]);
        let cache = ResourceCache::default();
        let snapshot = cache.snapshot(&source).await.unwrap();

        assert_eq!(snapshot.nodes().count(), 1);
        assert_eq!(snapshot.guests().count(), 2);
        assert_eq!(snapshot.find_guest(200).map(|r| r.kind), Some(ResourceKind::Lxc));
        assert!(snapshot.find_guest(999).is_none());
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let source = FakeInventory::new(vec![node("pve1")]);
        let cache = ResourceCache::default();

        cache.get(&source).await.unwrap();
        cache.invalidate().await;
        cache.get(&source).await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(cache.fetch_count(), 2);
    }
}

//! # Stratus Client
//!
//! Client runtime for virtualization-management APIs (nodes, QEMU virtual
//! machines, LXC containers).
//!
//! - [`ClientFactory`] - one shared [`Client`] per principal and endpoint
//! - lazy login with a single re-authentication on `401`
//! - [`ResourceCache`] - TTL cache over the cluster inventory, one fetch per
//!   window for any number of callers
//! - [`Enricher`] - bounded worker pool attaching live guest addresses
//! - [`TaskMonitor`] - polls asynchronous tasks to completion with backoff
//!   and cancellation
//!
//! ```rust,no_run
//! use stratus_client::{ClientConfig, ClientFactory, GuestRef, PowerAction};
//! use stratus_credential::Profile;
//! use stratus_resilience::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = ClientFactory::new(ClientConfig::from_env()?)?;
//! let profile = Profile::new("lab", "root@pam", "secret", "https://pve.lab:8006")?;
//! let client = factory.get_client(&profile).await?;
//!
//! for row in client.enriched_resources().await? {
//!     println!("{} {}", row.resource.display_name(), row.address);
//! }
//!
//! client
//!     .power_and_wait(&GuestRef::qemu("pve1", 100), PowerAction::Start, &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod api;
pub mod cache;
mod client;
pub mod config;
pub mod enrich;
pub mod error;
pub mod factory;
mod http;
pub mod inventory;
pub mod model;
pub mod session;
pub mod task;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cache::CacheEntry;
pub use client::{Client, CloneRequest, GuestRef, MigrateRequest, PowerAction};
pub use config::ClientConfig;
pub use enrich::{AddressResolver, Enricher};
pub use error::{ClientError, ClientResult, ConfigError};
pub use factory::{ClientFactory, ClientKey};
pub use http::{AUTH_COOKIE, CSRF_HEADER};
pub use inventory::{InventorySource, LIST_RESOURCES_CONTEXT, ResourceCache, ResourceSnapshot};
pub use model::{
    Address, EnrichedResource, Resource, ResourceKind, TaskHandle, TaskState, TaskStatus,
};
pub use session::{AUTHENTICATE_CONTEXT, Session};
pub use task::{LogProgress, TaskMonitor, TaskProgress, TaskStatusSource};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::{
        Address, AddressResolver, Client, ClientConfig, ClientError, ClientFactory, ClientResult,
        CloneRequest, GuestRef, InventorySource, MigrateRequest, PowerAction, Resource,
        ResourceKind, TaskHandle, TaskMonitor, TaskStatusSource,
    };
}

//! Authenticated API access
//!
//! [`Api`] pairs the transport with the session manager and implements the
//! read-side seams ([`InventorySource`], [`AddressResolver`],
//! [`TaskStatusSource`]) against the real endpoints.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use stratus_credential::CredentialSource;
use tracing::{debug, instrument};

use crate::enrich::AddressResolver;
use crate::error::{ClientError, ClientResult};
use crate::http::Transport;
use crate::inventory::InventorySource;
use crate::model::{Address, RawResource, Resource, ResourceKind, TaskHandle, TaskStatus};
use crate::session::{Session, SessionManager};
use crate::task::TaskStatusSource;

pub(crate) type Params<'a> = [(&'a str, String)];

pub(crate) struct Api {
    transport: Arc<Transport>,
    sessions: SessionManager,
}

impl Api {
    pub(crate) fn new(transport: Transport, credentials: Arc<dyn CredentialSource>) -> Self {
        let transport = Arc::new(transport);
        Self {
            sessions: SessionManager::new(Arc::clone(&transport), credentials),
            transport,
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    pub(crate) async fn session(&self) -> ClientResult<Arc<Session>> {
        self.sessions.current().await
    }

    pub(crate) fn login_count(&self) -> u64 {
        self.sessions.login_count()
    }

    /// Authenticated request with one re-login on 401
    ///
    /// The retry happens at most once; a second 401 is returned as
    /// [`ClientError::Unauthorized`].
    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &Params<'_>,
    ) -> ClientResult<T> {
        let session = self.sessions.current().await?;
        match self
            .transport
            .call(method.clone(), path, params, &session)
            .await
        {
            Err(ClientError::Unauthorized) => {
                debug!(path, "session rejected, re-authenticating");
                self.sessions.invalidate(&session).await;
                let session = self.sessions.current().await?;
                self.transport.call(method, path, params, &session).await
            }
            other => other,
        }
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request(Method::GET, path, &[]).await
    }

    pub(crate) async fn post<T: DeserializeOwned>(&self, path: &str, params: &Params<'_>) -> ClientResult<T> {
        self.request(Method::POST, path, params).await
    }

    pub(crate) async fn delete<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request(Method::DELETE, path, &[]).await
    }
}

#[async_trait]
impl InventorySource for Api {
    #[instrument(skip(self), fields(endpoint = %self.endpoint()))]
    async fn fetch_resources(&self) -> ClientResult<Vec<Resource>> {
        let rows: Vec<RawResource> = self.get("cluster/resources").await?;
        Ok(rows.into_iter().filter_map(RawResource::into_resource).collect())
    }
}

#[async_trait]
impl AddressResolver for Api {
    async fn resolve_address(&self, resource: &Resource) -> ClientResult<Address> {
        let Some(vmid) = resource.vmid else {
            return Ok(Address::Skipped);
        };
        let node = &resource.node;

        let ip = match resource.kind {
            ResourceKind::Qemu => {
                let path = format!("nodes/{node}/qemu/{vmid}/agent/network-get-interfaces");
                let reply: AgentReply = self.get(&path).await?;
                first_agent_ipv4(&reply.result)
            }
            ResourceKind::Lxc => {
                let path = format!("nodes/{node}/lxc/{vmid}/interfaces");
                let interfaces: Vec<LxcInterface> = self.get(&path).await?;
                first_lxc_ipv4(&interfaces)
            }
            ResourceKind::Node => return Ok(Address::Skipped),
        };

        Ok(ip.map_or(Address::NotReported, |ip| Address::Resolved(ip.to_string())))
    }
}

#[async_trait]
impl TaskStatusSource for Api {
    async fn task_status(&self, handle: &TaskHandle) -> ClientResult<TaskStatus> {
        let path = format!("nodes/{}/tasks/{}/status", handle.node, handle.upid);
        self.get(&path).await
    }
}

#[derive(Debug, Deserialize)]
struct AgentReply {
    #[serde(default)]
    result: Vec<AgentInterface>,
}

#[derive(Debug, Deserialize)]
struct AgentInterface {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "ip-addresses")]
    ip_addresses: Vec<AgentIp>,
}

#[derive(Debug, Deserialize)]
struct AgentIp {
    #[serde(rename = "ip-address-type")]
    kind: String,
    #[serde(rename = "ip-address")]
    address: String,
}

#[derive(Debug, Deserialize)]
struct LxcInterface {
    #[serde(default)]
    name: String,
    #[serde(default)]
    inet: Option<String>,
}

fn usable_ipv4(text: &str) -> Option<Ipv4Addr> {
    text.parse::<Ipv4Addr>()
        .ok()
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
}

fn first_agent_ipv4(interfaces: &[AgentInterface]) -> Option<Ipv4Addr> {
    interfaces
        .iter()
        .filter(|iface| iface.name != "lo")
        .flat_map(|iface| &iface.ip_addresses)
        .filter(|ip| ip.kind == "ipv4")
        .find_map(|ip| usable_ipv4(&ip.address))
}

fn first_lxc_ipv4(interfaces: &[LxcInterface]) -> Option<Ipv4Addr> {
    interfaces
        .iter()
        .filter(|iface| iface.name != "lo")
        .filter_map(|iface| iface.inet.as_deref())
        .find_map(|inet| usable_ipv4(inet.split('/').next().unwrap_or(inet)))
}

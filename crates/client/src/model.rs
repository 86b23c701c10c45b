//! Data model shared across the client runtime

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of inventory row the runtime tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Hypervisor host
    Node,
    /// QEMU virtual machine
    Qemu,
    /// LXC container
    Lxc,
}

impl ResourceKind {
    /// Path segment used by guest endpoints
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Qemu => "qemu",
            Self::Lxc => "lxc",
        }
    }

    /// VMs and containers, as opposed to nodes
    pub fn is_guest(self) -> bool {
        matches!(self, Self::Qemu | Self::Lxc)
    }

    /// Parse the `type` column of the inventory; `None` for kinds the
    /// runtime ignores (storage, pool, sdn, ...)
    pub fn from_api(value: &str) -> Option<Self> {
        match value {
            "node" => Some(Self::Node),
            "qemu" => Some(Self::Qemu),
            "lxc" => Some(Self::Lxc),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the cluster inventory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    /// Inventory id, e.g. `qemu/100` or `node/pve1`
    pub id: String,
    /// Row kind
    pub kind: ResourceKind,
    /// Node hosting the row (a node's own name for nodes)
    pub node: String,
    /// Guest id; absent for nodes
    pub vmid: Option<u32>,
    /// Guest name
    pub name: Option<String>,
    /// Runtime status, e.g. `running`, `stopped`, `online`
    pub status: Option<String>,
    /// CPU utilization in `0.0..=maxcpu`
    pub cpu: Option<f64>,
    /// Used memory in bytes
    pub mem: u64,
    /// Memory limit in bytes
    pub maxmem: u64,
    /// Used disk in bytes
    pub disk: u64,
    /// Disk limit in bytes
    pub maxdisk: u64,
    /// Seconds since start
    pub uptime: u64,
}

impl Resource {
    /// Whether the row is a guest in `running` state
    pub fn is_running_guest(&self) -> bool {
        self.kind.is_guest() && self.status.as_deref() == Some("running")
    }

    /// Name if known, else the inventory id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Wire shape of an inventory row
#[derive(Debug, Deserialize)]
pub(crate) struct RawResource {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    vmid: Option<u32>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    cpu: Option<f64>,
    #[serde(default)]
    mem: Option<u64>,
    #[serde(default)]
    maxmem: Option<u64>,
    #[serde(default)]
    disk: Option<u64>,
    #[serde(default)]
    maxdisk: Option<u64>,
    #[serde(default)]
    uptime: Option<u64>,
}

impl RawResource {
    /// Typed row, or `None` for kinds outside node/qemu/lxc
    pub(crate) fn into_resource(self) -> Option<Resource> {
        let kind = ResourceKind::from_api(&self.kind)?;
        Some(Resource {
            node: self.node.unwrap_or_default(),
            id: self.id,
            kind,
            vmid: self.vmid,
            name: self.name,
            status: self.status,
            cpu: self.cpu,
            mem: self.mem.unwrap_or(0),
            maxmem: self.maxmem.unwrap_or(0),
            disk: self.disk.unwrap_or(0),
            maxdisk: self.maxdisk.unwrap_or(0),
            uptime: self.uptime.unwrap_or(0),
        })
    }
}

/// Handle to a server-side asynchronous operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle {
    /// Unique process id, `UPID:<node>:...`
    pub upid: String,
    /// Node that runs the task
    pub node: String,
}

impl TaskHandle {
    /// Handle for an explicit node
    pub fn new(upid: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            upid: upid.into(),
            node: node.into(),
        }
    }

    /// Handle with the node taken from the UPID itself
    ///
    /// ```
    /// use stratus_client::TaskHandle;
    ///
    /// let handle = TaskHandle::from_upid("UPID:pve1:000A1B2C:0F00:6523:qmstart:100:root@pam:").unwrap();
    /// assert_eq!(handle.node, "pve1");
    /// assert!(TaskHandle::from_upid("not-a-upid").is_none());
    /// ```
    pub fn from_upid(upid: impl Into<String>) -> Option<Self> {
        let upid = upid.into();
        let mut parts = upid.split(':');
        if parts.next() != Some("UPID") {
            return None;
        }
        let node = parts.next().filter(|n| !n.is_empty())?.to_string();
        Some(Self { upid, node })
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.upid)
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Still executing
    Running,
    /// Finished, successfully or not
    Stopped,
}

/// Snapshot of a task as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Lifecycle state
    pub status: TaskState,
    /// Exit string once stopped; `OK` on success
    #[serde(default, rename = "exitstatus")]
    pub exit_status: Option<String>,
}

impl TaskStatus {
    /// Exit string the server uses for success
    pub const EXIT_OK: &'static str = "OK";

    /// Still running
    pub fn running() -> Self {
        Self {
            status: TaskState::Running,
            exit_status: None,
        }
    }

    /// Stopped with the given exit string
    pub fn stopped(exit_status: impl Into<String>) -> Self {
        Self {
            status: TaskState::Stopped,
            exit_status: Some(exit_status.into()),
        }
    }

    /// Reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.status == TaskState::Stopped
    }

    /// Stopped with `OK`
    pub fn is_success(&self) -> bool {
        self.is_finished() && self.exit_status.as_deref() == Some(Self::EXIT_OK)
    }
}

/// Live address of a resource, as far as enrichment could tell
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "state", content = "ip", rename_all = "snake_case")]
pub enum Address {
    /// First non-loopback IPv4 address reported by the guest
    Resolved(String),
    /// The guest answered but reported no usable address
    NotReported,
    /// The lookup failed (agent not running, request error, ...)
    Unavailable,
    /// No lookup was attempted: nodes and guests that are not running
    Skipped,
}

impl Address {
    /// Placeholder shown for anything that is not a resolved address
    pub const SENTINEL: &'static str = "N/A";

    /// The resolved address, if any
    pub fn ip(&self) -> Option<&str> {
        match self {
            Self::Resolved(ip) => Some(ip),
            _ => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ip().unwrap_or(Self::SENTINEL))
    }
}

/// Inventory row with its enrichment result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedResource {
    /// The row as listed
    #[serde(flatten)]
    pub resource: Resource,
    /// Enrichment result
    pub address: Address,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn raw_rows_drop_unknown_kinds() {
        let rows: Vec<RawResource> = serde_json::from_str(
            r#"[
                {"id": "node/pve1", "type": "node", "node": "pve1", "status": "online", "maxmem": 1024},
                {"id": "storage/pve1/local", "type": "storage", "node": "pve1"},
                {"id": "qemu/100", "type": "qemu", "node": "pve1", "vmid": 100, "name": "web", "status": "running", "cpu": 0.25},
                {"id": "pool/dev", "type": "pool"}
            ]"#,
        )
        .unwrap();

        let resources: Vec<Resource> = rows.into_iter().filter_map(RawResource::into_resource).collect();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].kind, ResourceKind::Node);
        assert_eq!(resources[0].maxmem, 1024);
        assert_eq!(resources[1].vmid, Some(100));
        assert!(resources[1].is_running_guest());
        assert!(!resources[0].is_running_guest());
    }

    #[rstest]
    #[case("UPID:pve2:00001234:00005678:65000000:vzdump:101:root@pam:", Some("pve2"))]
    #[case("UPID::x", None)]
    #[case("TASK:pve2:x", None)]
    #[case("", None)]
    fn upid_node_parsing(#[case] upid: &str, #[case] node: Option<&str>) {
        assert_eq!(
            TaskHandle::from_upid(upid).map(|h| h.node),
            node.map(str::to_string)
        );
    }

    #[test]
    fn task_status_decodes_wire_shape() {
        let status: TaskStatus =
            serde_json::from_str(r#"{"status":"stopped","exitstatus":"OK","pid":42}"#).unwrap();
        assert!(status.is_success());

        let status: TaskStatus = serde_json::from_str(r#"{"status":"running"}"#).unwrap();
        assert_eq!(status, TaskStatus::running());
        assert!(!status.is_finished());

        assert!(!TaskStatus::stopped("command failed").is_success());
    }

    #[rstest]
    #[case(Address::Resolved("10.0.0.5".into()), "10.0.0.5")]
    #[case(Address::NotReported, "N/A")]
    #[case(Address::Unavailable, "N/A")]
    #[case(Address::Skipped, "N/A")]
    fn address_display(#[case] address: Address, #[case] expected: &str) {
        assert_eq!(address.to_string(), expected);
    }
}

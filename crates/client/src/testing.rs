//! Fakes for the inventory, address and task-status seams
//!
//! Enabled with the `test-util` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::enrich::AddressResolver;
use crate::error::{ClientError, ClientResult};
use crate::inventory::InventorySource;
use crate::model::{Address, Resource, ResourceKind, TaskHandle, TaskStatus};
use crate::task::TaskStatusSource;

/// Node row named `name`
pub fn node(name: &str) -> Resource {
    Resource {
        id: format!("node/{name}"),
        kind: ResourceKind::Node,
        node: name.to_string(),
        vmid: None,
        name: None,
        status: Some("online".to_string()),
        cpu: Some(0.05),
        mem: 4 << 30,
        maxmem: 16 << 30,
        disk: 10 << 30,
        maxdisk: 100 << 30,
        uptime: 86_400,
    }
}

/// Guest row with the given kind, id, node and status
pub fn guest(kind: ResourceKind, vmid: u32, node: &str, status: &str) -> Resource {
    Resource {
        id: format!("{kind}/{vmid}"),
        kind,
        node: node.to_string(),
        vmid: Some(vmid),
        name: Some(format!("guest-{vmid}")),
        status: Some(status.to_string()),
        cpu: Some(0.0),
        mem: 512 << 20,
        maxmem: 2 << 30,
        disk: 0,
        maxdisk: 8 << 30,
        uptime: 0,
    }
}

fn api_error(path: &str, message: &str) -> ClientError {
    ClientError::Api {
        status: 500,
        path: path.to_string(),
        message: message.to_string(),
    }
}

/// [`InventorySource`] serving a fixed listing and counting calls
#[derive(Debug, Default)]
pub struct FakeInventory {
    resources: Mutex<Option<Vec<Resource>>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeInventory {
    /// Serve `resources` on every call
    pub fn new(resources: Vec<Resource>) -> Self {
        Self {
            resources: Mutex::new(Some(resources)),
            ..Self::default()
        }
    }

    /// Fail every call
    pub fn failing() -> Self {
        Self::default()
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replace the listing; `None` makes later calls fail
    pub fn set(&self, resources: Option<Vec<Resource>>) {
        *self.resources.lock() = resources;
    }

    /// Calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventorySource for FakeInventory {
    async fn fetch_resources(&self) -> ClientResult<Vec<Resource>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let resources = self.resources.lock().clone();
        resources.ok_or_else(|| api_error("cluster/resources", "inventory unavailable"))
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Fail,
    Unreported,
}

/// [`AddressResolver`] answering `10.0.0.<vmid % 256>`
///
/// Tracks how many lookups run at once so tests can check the worker bound.
#[derive(Debug, Default)]
pub struct FakeResolver {
    delay: Duration,
    delays: HashMap<u32, Duration>,
    outcomes: HashMap<u32, Outcome>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeResolver {
    /// Resolver that answers immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Every lookup takes `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Lookups for `vmid` take `delay`
    pub fn delay_for(mut self, vmid: u32, delay: Duration) -> Self {
        self.delays.insert(vmid, delay);
        self
    }

    /// Lookups for `vmid` fail
    pub fn fail_for(mut self, vmid: u32) -> Self {
        self.outcomes.insert(vmid, Outcome::Fail);
        self
    }

    /// Lookups for `vmid` report no address
    pub fn unreported_for(mut self, vmid: u32) -> Self {
        self.outcomes.insert(vmid, Outcome::Unreported);
        self
    }

    /// Lookups so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Lookups that ran to the end
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent lookups observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressResolver for FakeResolver {
    async fn resolve_address(&self, resource: &Resource) -> ClientResult<Address> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let vmid = resource.vmid.unwrap_or_default();
        let delay = self.delays.get(&vmid).copied().unwrap_or(self.delay);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.get(&vmid) {
            Some(Outcome::Fail) => Err(api_error(&resource.id, "guest agent is not running")),
            Some(Outcome::Unreported) => Ok(Address::NotReported),
            None => Ok(Address::Resolved(format!("10.0.0.{}", vmid % 256))),
        }
    }
}

/// [`TaskStatusSource`] replaying a scripted sequence
///
/// The last status repeats once the script runs out.
#[derive(Debug)]
pub struct ScriptedTask {
    script: Mutex<VecDeque<TaskStatus>>,
    last: TaskStatus,
    delay: Duration,
    polls: AtomicUsize,
}

impl ScriptedTask {
    /// Answer with `script`, one entry per poll
    pub fn new(script: Vec<TaskStatus>) -> Self {
        let last = script.last().cloned().unwrap_or_else(TaskStatus::running);
        Self {
            script: Mutex::new(script.into()),
            last,
            delay: Duration::ZERO,
            polls: AtomicUsize::new(0),
        }
    }

    /// Task that never stops
    pub fn forever_running() -> Self {
        Self::new(vec![TaskStatus::running()])
    }

    /// Each poll takes `delay` to answer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Polls so far
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskStatusSource for ScriptedTask {
    async fn task_status(&self, _handle: &TaskHandle) -> ClientResult<TaskStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().pop_front();
        Ok(next.unwrap_or_else(|| self.last.clone()))
    }
}

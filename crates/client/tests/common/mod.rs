//! Shared helpers for HTTP-level client tests

#![allow(dead_code)]

use std::time::Duration;

use serde_json::{Value, json};
use stratus_client::{Client, ClientConfig};
use stratus_credential::Profile;
use stratus_log::LoggerGuard;
use stratus_resilience::BackoffPolicy;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PRINCIPAL: &str = "root@pam";
pub const UPID: &str = "UPID:pve1:0000A1B2:0001C3D4:65F0A0B0:qmstart:100:root@pam:";

pub fn logging() -> LoggerGuard {
    stratus_log::init_test()
}

/// Config with a fast poll cadence so HTTP tests finish quickly
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        task_backoff: BackoffPolicy::fixed(Duration::from_millis(10)),
        request_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    }
}

pub fn profile(server: &MockServer) -> Profile {
    Profile::new("test", PRINCIPAL, "hunter2", server.uri()).expect("valid profile")
}

pub fn client(server: &MockServer) -> Client {
    Client::new(&profile(server), &fast_config()).expect("client builds")
}

pub fn data(value: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "data": value }))
}

pub fn ticket(ticket: &str, csrf: &str) -> ResponseTemplate {
    data(json!({
        "ticket": ticket,
        "CSRFPreventionToken": csrf,
        "username": PRINCIPAL,
    }))
}

pub fn cookie(ticket: &str) -> String {
    format!("PVEAuthCookie={ticket}")
}

/// Login that always hands out `TICKET1` / `CSRF1`
pub async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .and(body_string_contains("username=root%40pam"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(ticket("TICKET1", "CSRF1"))
        .mount(server)
        .await;
}

pub fn inventory() -> Value {
    json!([
        {"id": "node/pve1", "type": "node", "node": "pve1", "status": "online", "maxmem": 17179869184u64},
        {"id": "qemu/100", "type": "qemu", "node": "pve1", "vmid": 100, "name": "web", "status": "running"},
        {"id": "lxc/101", "type": "lxc", "node": "pve1", "vmid": 101, "name": "cache", "status": "running"},
        {"id": "qemu/102", "type": "qemu", "node": "pve1", "vmid": 102, "name": "batch", "status": "stopped"},
        {"id": "qemu/103", "type": "qemu", "node": "pve1", "vmid": 103, "name": "legacy", "status": "running"},
        {"id": "storage/pve1/local", "type": "storage", "node": "pve1", "status": "available"}
    ])
}

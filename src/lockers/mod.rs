//! Coordination backends
//!
//! The `Locker` trait is the capability interface the cluster delegates all
//! coordination to: mutual exclusion, point-in-time key listing, service
//! registration with TTL, and membership streaming. Backends are selected
//! by the `type` field of the locker config block.

pub mod mem;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::{ClusterError, Result};

pub use mem::MemLocker;

/// One registered service as seen by watchers
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    /// Registration ID, `<instance-name>-api` for cluster API services
    pub id: String,
    /// `host:port` the service answers on, usable directly in URLs
    pub address: String,
    /// Ordered tags; index 0 and 1 carry cluster and instance names
    pub tags: Vec<String>,
}

impl Service {
    /// Instance name carried in the `instance-name=` tag, if any
    pub fn instance_name(&self) -> Option<&str> {
        self.tags
            .iter()
            .find_map(|tag| tag.strip_prefix("instance-name="))
    }

    /// Registration ID with the `-api` suffix stripped
    pub fn short_id(&self) -> &str {
        self.id.strip_suffix("-api").unwrap_or(&self.id)
    }
}

/// Registration of this instance's API service
#[derive(Debug, Clone)]
pub struct ServiceRegistration {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub ttl: Duration,
}

/// Renewal channels of a held lock
///
/// `done` fires when the lock is lost cleanly, `errors` when renewal
/// failed. Either ends the holder's leadership.
pub struct KeepAlive {
    pub done: mpsc::Receiver<()>,
    pub errors: mpsc::Receiver<ClusterError>,
}

/// Capability interface of the coordination backend
#[async_trait]
pub trait Locker: Send + Sync {
    /// Attempt to atomically acquire `key` with `value`
    ///
    /// Returns `Ok(true)` on acquisition, `Ok(false)` when the key is
    /// already held, `Err` on backend failure.
    async fn lock(&self, key: &str, value: &str) -> Result<bool>;

    /// Start renewing a held lock, yielding its loss channels
    async fn keep_lock(&self, key: &str) -> Result<KeepAlive>;

    /// Release a held lock
    async fn unlock(&self, key: &str) -> Result<()>;

    /// Whether `key` is currently held by anyone
    async fn is_locked(&self, key: &str) -> Result<bool>;

    /// Point-in-time read of all keys under `prefix`, key → value
    async fn list(&self, prefix: &str) -> Result<HashMap<String, String>>;

    /// Register a service; the backend renews the TTL until stop
    async fn register(&self, registration: &ServiceRegistration) -> Result<()>;

    /// Stream service snapshots for `name` until the receiver is dropped
    ///
    /// Each update is the full set of services matching `name` whose tags
    /// include every entry of `filters`, delivered at most every
    /// `interval`.
    async fn watch_services(
        &self,
        name: &str,
        filters: &[String],
        updates: mpsc::Sender<Vec<Service>>,
        interval: Duration,
    ) -> Result<()>;

    /// Release everything held by this client
    async fn stop(&self) -> Result<()>;
}

/// Locker block of the clustering config, tagged by backend type
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LockerConfig {
    /// In-process backend for tests and single-node deployments
    Mem {},
}

/// Instantiate the configured locker backend
///
/// Unknown backend types are rejected when the config block is
/// deserialized; a missing block is the caller's startup error.
pub fn new_locker(config: &LockerConfig) -> Result<Arc<dyn Locker>> {
    match config {
        LockerConfig::Mem {} => Ok(Arc::new(MemLocker::new())),
    }
}

/// Parse a raw locker config block and instantiate its backend
pub fn new_locker_from_value(raw: &serde_json::Value) -> Result<Arc<dyn Locker>> {
    let locker_type = raw
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ClusterError::Config {
            message: "missing locker type field".into(),
        })?;
    let config: LockerConfig =
        serde_json::from_value(raw.clone()).map_err(|_| ClusterError::UnknownLockerType {
            locker_type: locker_type.to_string(),
        })?;
    new_locker(&config)
}

//! In-process locker backend
//!
//! Backs tests and single-node deployments with the same trait surface as
//! a real coordination service. Lock loss and TTL expiry are driven
//! explicitly through the session hooks, which keeps scenario tests
//! deterministic.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::{KeepAlive, Locker, Service, ServiceRegistration};
use crate::error::{ClusterError, Result};

struct Keeper {
    done: mpsc::Sender<()>,
    errors: mpsc::Sender<ClusterError>,
}

struct LockEntry {
    value: String,
    keeper: Option<Keeper>,
}

struct RegisteredService {
    name: String,
    address: String,
    port: u16,
    tags: Vec<String>,
}

#[derive(Default)]
struct Inner {
    stopped: bool,
    locks: HashMap<String, LockEntry>,
    services: HashMap<String, RegisteredService>,
}

/// In-process `Locker` implementation
pub struct MemLocker {
    inner: Mutex<Inner>,
}

impl MemLocker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Expire one instance's session: drop its locks and registrations
    ///
    /// Models the TTL elapsing after an instance crash. Keepers of the
    /// dropped locks observe `done`.
    pub fn expire_session(&self, instance_name: &str) {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .locks
            .iter()
            .filter(|(_, entry)| entry.value == instance_name)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            if let Some(entry) = inner.locks.remove(&key) {
                debug!(key = %key, "expiring lock");
                if let Some(keeper) = entry.keeper {
                    let _ = keeper.done.try_send(());
                }
            }
        }
        let instance_tag = format!("instance-name={instance_name}");
        inner
            .services
            .retain(|_, service| !service.tags.contains(&instance_tag));
    }

    /// Fail renewal of one held lock; its keeper observes `errors`
    pub fn fail_keepalive(&self, key: &str) {
        let inner = self.inner.lock();
        if let Some(Keeper { errors, .. }) =
            inner.locks.get(key).and_then(|entry| entry.keeper.as_ref())
        {
            let _ = errors.try_send(ClusterError::Coordination {
                message: format!("keepalive failed for {key:?}"),
            });
        }
    }

    /// Drop one service registration by ID
    pub fn deregister(&self, service_id: &str) {
        self.inner.lock().services.remove(service_id);
    }

    fn guard(&self) -> Result<parking_lot::MutexGuard<'_, Inner>> {
        let inner = self.inner.lock();
        if inner.stopped {
            return Err(ClusterError::LockerStopped);
        }
        Ok(inner)
    }
}

impl Default for MemLocker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Locker for MemLocker {
    async fn lock(&self, key: &str, value: &str) -> Result<bool> {
        let mut inner = self.guard()?;
        if inner.locks.contains_key(key) {
            return Ok(false);
        }
        inner.locks.insert(
            key.to_string(),
            LockEntry {
                value: value.to_string(),
                keeper: None,
            },
        );
        Ok(true)
    }

    async fn keep_lock(&self, key: &str) -> Result<KeepAlive> {
        let (done_tx, done_rx) = mpsc::channel(1);
        let (err_tx, err_rx) = mpsc::channel(1);
        let mut inner = self.guard()?;
        match inner.locks.get_mut(key) {
            Some(entry) => {
                entry.keeper = Some(Keeper {
                    done: done_tx,
                    errors: err_tx,
                });
            }
            // Nothing to renew; the caller observes an immediate loss.
            None => {
                let _ = done_tx.try_send(());
            }
        }
        Ok(KeepAlive {
            done: done_rx,
            errors: err_rx,
        })
    }

    async fn unlock(&self, key: &str) -> Result<()> {
        let mut inner = self.guard()?;
        if let Some(entry) = inner.locks.remove(key) {
            if let Some(keeper) = entry.keeper {
                let _ = keeper.done.try_send(());
            }
        }
        Ok(())
    }

    async fn is_locked(&self, key: &str) -> Result<bool> {
        Ok(self.guard()?.locks.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<HashMap<String, String>> {
        let inner = self.guard()?;
        Ok(inner
            .locks
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }

    async fn register(&self, registration: &ServiceRegistration) -> Result<()> {
        let mut inner = self.guard()?;
        inner.services.insert(
            registration.id.clone(),
            RegisteredService {
                name: registration.name.clone(),
                address: registration.address.clone(),
                port: registration.port,
                tags: registration.tags.clone(),
            },
        );
        Ok(())
    }

    async fn watch_services(
        &self,
        name: &str,
        filters: &[String],
        updates: mpsc::Sender<Vec<Service>>,
        interval: Duration,
    ) -> Result<()> {
        loop {
            let snapshot: Vec<Service> = {
                let inner = self.inner.lock();
                if inner.stopped {
                    return Ok(());
                }
                inner
                    .services
                    .iter()
                    .filter(|(_, service)| service.name == name)
                    .filter(|(_, service)| {
                        filters.iter().all(|filter| service.tags.contains(filter))
                    })
                    .map(|(id, service)| Service {
                        id: id.clone(),
                        address: format!("{}:{}", service.address, service.port),
                        tags: service.tags.clone(),
                    })
                    .collect()
            };
            if updates.send(snapshot).await.is_err() {
                // Receiver dropped, the watcher is gone.
                return Ok(());
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.stopped = true;
        for (_, entry) in inner.locks.drain() {
            if let Some(keeper) = entry.keeper {
                let _ = keeper.done.try_send(());
            }
        }
        inner.services.clear();
        Ok(())
    }
}

//! Service membership view
//!
//! Every instance keeps an in-memory map of its cluster peers, fed by the
//! locker's service watch. Snapshots replace the view wholesale under one
//! write lock, so readers never observe a partial merge; the dispatcher
//! holds the read side across a full pass to freeze the peer set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ClusterConfig, RETRY_TIMER};
use crate::lockers::{Locker, Service};
use crate::metrics::standard;

/// Current set of live cluster peers, keyed by service ID
pub struct MembershipView {
    services: RwLock<HashMap<String, Service>>,
}

impl MembershipView {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Read access to the view; holding the guard blocks snapshot updates
    pub async fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Service>> {
        self.services.read().await
    }

    /// Apply one watch snapshot, replacing the view wholesale
    pub async fn apply_snapshot(&self, snapshot: Vec<Service>) {
        let mut services = self.services.write().await;
        debug!(count = snapshot.len(), "received service update");

        if snapshot.is_empty() {
            if !services.is_empty() {
                info!("deleting all services");
                services.clear();
                standard::CLUSTER_SERVICES.set(0);
            }
            return;
        }

        let snapshot: HashMap<String, Service> = snapshot
            .into_iter()
            .map(|service| (service.id.clone(), service))
            .collect();
        services.retain(|id, _| {
            let keep = snapshot.contains_key(id);
            if !keep {
                info!(id = %id, "deleting service");
            }
            keep
        });
        for (id, service) in snapshot {
            if !services.contains_key(&id) {
                info!(id = %id, "adding service");
            }
            services.insert(id, service);
        }
        standard::CLUSTER_SERVICES.set(services.len() as i64);
    }

    /// Watch cluster services until the scope is cancelled
    ///
    /// Re-subscribes after watch failures with a fixed backoff.
    pub async fn run(
        &self,
        locker: Arc<dyn Locker>,
        config: ClusterConfig,
        scope: CancellationToken,
    ) {
        let service_name = config.api_service_name();
        let filters = vec![format!("cluster-name={}", config.cluster_name)];
        loop {
            let (updates_tx, mut updates_rx) = mpsc::channel(1);
            let watch = locker.watch_services(
                &service_name,
                &filters,
                updates_tx,
                config.services_watch_timer,
            );
            tokio::pin!(watch);
            loop {
                tokio::select! {
                    _ = scope.cancelled() => return,
                    result = &mut watch => {
                        if let Err(e) = result {
                            warn!(error = %e, "failed getting services");
                        }
                        break;
                    }
                    Some(snapshot) = updates_rx.recv() => {
                        self.apply_snapshot(snapshot).await;
                    }
                }
            }
            if !sleep_cancellable(RETRY_TIMER, &scope).await {
                return;
            }
        }
    }
}

impl Default for MembershipView {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep unless the scope is cancelled first; false on cancellation
pub(crate) async fn sleep_cancellable(duration: Duration, scope: &CancellationToken) -> bool {
    tokio::select! {
        _ = scope.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

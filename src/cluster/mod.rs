//! Cluster coordination
//!
//! Wires registration, membership, election, and dispatch together under
//! one scope tree:
//!
//! ```text
//! process ─┬─ ServiceRegistrar   (all instances)
//!          ├─ MembershipView     (all instances)
//!          └─ Leadership ─┬─ Dispatcher
//!                         └─ lock renewal watch
//! ```
//!
//! Losing leadership cancels only the Leadership subtree.

pub mod api_client;
pub mod dispatcher;
pub mod election;
pub mod membership;
pub mod placement;
pub mod registrar;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

pub use api_client::{ApiClientConfig, WorkerApiClient};
pub use dispatcher::Dispatcher;
pub use election::LeaderElector;
pub use membership::MembershipView;
pub use placement::TargetPlacer;
pub use registrar::ServiceRegistrar;

use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::lockers::Locker;
use crate::runtime::ShutdownSignal;
use crate::target::TargetConfig;

/// One cluster instance: registration, membership, election, dispatch
pub struct ClusterManager {
    config: ClusterConfig,
    locker: Arc<dyn Locker>,
    api: WorkerApiClient,
    view: Arc<MembershipView>,
    targets: Arc<RwLock<Vec<TargetConfig>>>,
    is_leader: Arc<AtomicBool>,
}

impl ClusterManager {
    /// Create a manager; fails on invalid configuration
    pub fn new(config: ClusterConfig, locker: Arc<dyn Locker>) -> Result<Self> {
        config.validate()?;
        let api = WorkerApiClient::new(ApiClientConfig::default())?;
        Ok(Self {
            config,
            locker,
            api,
            view: Arc::new(MembershipView::new()),
            targets: Arc::new(RwLock::new(Vec::new())),
            is_leader: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replace the dispatched target set
    ///
    /// Targets are visited in the given order on every dispatcher pass.
    pub async fn set_targets(&self, targets: Vec<TargetConfig>) {
        *self.targets.write().await = targets;
    }

    /// Whether this instance currently holds the leader key
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Relaxed)
    }

    /// The membership view of this instance
    pub fn view(&self) -> Arc<MembershipView> {
        self.view.clone()
    }

    /// Start the clustering tasks under the given shutdown signal
    pub fn start(&self, shutdown: &ShutdownSignal) {
        info!(
            cluster = %self.config.cluster_name,
            instance = %self.config.instance_name,
            "starting cluster instance"
        );

        let registrar = ServiceRegistrar::new(self.locker.clone(), self.config.clone());
        let scope = shutdown.child_scope();
        tokio::spawn(async move { registrar.run(scope).await });

        let view = self.view.clone();
        let locker = self.locker.clone();
        let config = self.config.clone();
        let scope = shutdown.child_scope();
        tokio::spawn(async move { view.run(locker, config, scope).await });

        let placer = TargetPlacer::new(self.locker.clone(), self.api.clone(), self.config.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            self.config.clone(),
            self.view.clone(),
            placer,
            self.targets.clone(),
        ));
        let elector = LeaderElector::new(
            self.locker.clone(),
            self.config.clone(),
            dispatcher,
            self.is_leader.clone(),
        );
        let shutdown = shutdown.clone();
        tokio::spawn(async move { elector.run(shutdown).await });
    }

    /// Remove a target cluster-wide
    ///
    /// Deletes the target's config from every known service; each worker
    /// releases the target lock if it owns it.
    pub async fn delete_target(&self, target_name: &str) -> Result<()> {
        let services: Vec<_> = self.view.read().await.values().cloned().collect();
        let mut failures = 0;
        for service in &services {
            if let Err(e) = self.api.remove_target_config(service, target_name).await {
                warn!(
                    target = %target_name,
                    service = %service.id,
                    error = %e,
                    "failed deleting target"
                );
                failures += 1;
            }
        }
        if failures > 0 {
            return Err(ClusterError::DeleteTarget {
                target: target_name.to_string(),
                failures,
            });
        }
        Ok(())
    }

    /// Map of target name to owning instance, from the current locks
    pub async fn target_mapping(&self) -> Result<HashMap<String, String>> {
        let locks = self.locker.list(&self.config.targets_prefix()).await?;
        Ok(locks
            .into_iter()
            .map(|(key, owner)| {
                let name = key.rsplit('/').next().unwrap_or(&key).to_string();
                (name, owner)
            })
            .collect())
    }

    /// Release this instance's coordination state
    pub async fn stop(&self) -> Result<()> {
        self.locker.stop().await
    }
}

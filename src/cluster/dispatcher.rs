//! Leader-only target dispatch
//!
//! Walks the configured target set on a fixed cadence and ensures every
//! target is owned by a suitable worker. The membership view's read guard
//! is held across a full pass so load counts stay consistent with the
//! peer set being placed against.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::membership::{sleep_cancellable, MembershipView};
use super::placement::TargetPlacer;
use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::metrics::standard;
use crate::target::TargetConfig;

/// Dispatches configured targets to cluster workers
pub struct Dispatcher {
    config: ClusterConfig,
    view: Arc<MembershipView>,
    placer: TargetPlacer,
    targets: Arc<RwLock<Vec<TargetConfig>>>,
}

impl Dispatcher {
    pub fn new(
        config: ClusterConfig,
        view: Arc<MembershipView>,
        placer: TargetPlacer,
        targets: Arc<RwLock<Vec<TargetConfig>>>,
    ) -> Self {
        Self {
            config,
            view,
            placer,
            targets,
        }
    }

    /// Dispatch until the leadership scope is cancelled
    pub async fn run(&self, scope: CancellationToken) {
        loop {
            tokio::select! {
                _ = scope.cancelled() => return,
                _ = self.pass() => {}
            }
            if !sleep_cancellable(self.config.targets_watch_timer, &scope).await {
                return;
            }
        }
    }

    /// One pass over the target set, in configuration order
    async fn pass(&self) {
        let services = self.view.read().await;
        if services.is_empty() {
            info!("no services found, waiting");
            return;
        }
        let targets = self.targets.read().await;
        for target in targets.iter() {
            match self.placer.place(target, &services).await {
                Ok(()) => {}
                Err(ClusterError::NotFound) => {
                    // No registered services at all; later targets would
                    // fail the same way.
                    warn!("no services available, ending pass");
                    break;
                }
                Err(ClusterError::NoMoreSuitableServices) => {
                    warn!(target = %target.name, "no suitable service for target");
                }
                Err(e) => {
                    warn!(target = %target.name, error = %e, "failed to dispatch target");
                }
            }
        }
        standard::DISPATCH_PASSES.inc();
    }
}

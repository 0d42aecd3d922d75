//! Leader election
//!
//! Every instance contends for the cluster leader key. The winner runs
//! the dispatcher under a child scope and watches its lock renewal; a
//! clean loss or a renewal failure tears the subtree down and sends the
//! instance back to contending. Registration and membership are outside
//! the subtree and survive leadership changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::dispatcher::Dispatcher;
use super::membership::sleep_cancellable;
use crate::config::{ClusterConfig, RETRY_TIMER};
use crate::lockers::Locker;
use crate::metrics::standard;
use crate::runtime::ShutdownSignal;

/// Contends for cluster leadership and runs the dispatcher while holding it
pub struct LeaderElector {
    locker: Arc<dyn Locker>,
    config: ClusterConfig,
    dispatcher: Arc<Dispatcher>,
    is_leader: Arc<AtomicBool>,
}

impl LeaderElector {
    pub fn new(
        locker: Arc<dyn Locker>,
        config: ClusterConfig,
        dispatcher: Arc<Dispatcher>,
        is_leader: Arc<AtomicBool>,
    ) -> Self {
        Self {
            locker,
            config,
            dispatcher,
            is_leader,
        }
    }

    fn set_leader(&self, leader: bool) {
        self.is_leader.store(leader, Ordering::Relaxed);
        standard::IS_LEADER.set(leader as i64);
    }

    /// Contend for leadership until process shutdown
    pub async fn run(&self, shutdown: ShutdownSignal) {
        let leader_key = self.config.leader_key();
        while !shutdown.is_shutdown() {
            self.set_leader(false);
            let acquired = tokio::select! {
                _ = shutdown.cancelled() => return,
                result = self.locker.lock(&leader_key, &self.config.instance_name) => result,
            };
            match acquired {
                Ok(true) => {}
                Ok(false) => {
                    if !self.backoff(&shutdown).await {
                        return;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "failed to acquire leader lock");
                    if !self.backoff(&shutdown).await {
                        return;
                    }
                    continue;
                }
            }

            self.set_leader(true);
            standard::LEADER_ELECTIONS.inc();
            info!(instance = %self.config.instance_name, "became the cluster leader");

            let scope = shutdown.child_scope();
            let dispatcher = self.dispatcher.clone();
            let dispatch_scope = scope.clone();
            let leader_wait = self.config.leader_wait_timer;
            tokio::spawn(async move {
                // Let the membership view populate before the first pass.
                if sleep_cancellable(leader_wait, &dispatch_scope).await {
                    dispatcher.run(dispatch_scope).await;
                }
            });

            let keepalive = tokio::select! {
                _ = shutdown.cancelled() => {
                    scope.cancel();
                    return;
                }
                result = self.locker.keep_lock(&leader_key) => result,
            };
            let keepalive = match keepalive {
                Ok(keepalive) => keepalive,
                Err(e) => {
                    warn!(error = %e, "failed to start leader lock renewal");
                    scope.cancel();
                    self.set_leader(false);
                    if !self.backoff(&shutdown).await {
                        return;
                    }
                    continue;
                }
            };

            let mut done = keepalive.done;
            let mut errors = keepalive.errors;
            tokio::select! {
                _ = done.recv() => {
                    info!(instance = %self.config.instance_name, "lost leader role");
                }
                Some(e) = errors.recv() => {
                    warn!(
                        instance = %self.config.instance_name,
                        error = %e,
                        "failed to maintain the leader key"
                    );
                }
                _ = shutdown.cancelled() => {
                    scope.cancel();
                    return;
                }
            }
            scope.cancel();
            self.set_leader(false);
        }
    }

    async fn backoff(&self, shutdown: &ShutdownSignal) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(RETRY_TIMER) => true,
        }
    }
}

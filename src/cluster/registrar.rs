//! API service registration
//!
//! Keeps this instance discoverable by publishing its API endpoint to the
//! locker under the cluster's service name. The locker renews the TTL
//! after a successful registration; this task only has to get the initial
//! registration through.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::membership::sleep_cancellable;
use crate::config::{ClusterConfig, REGISTRATION_TTL, RETRY_TIMER};
use crate::lockers::{Locker, ServiceRegistration};

/// Publishes this instance's API service to the locker
pub struct ServiceRegistrar {
    locker: Arc<dyn Locker>,
    config: ClusterConfig,
}

impl ServiceRegistrar {
    pub fn new(locker: Arc<dyn Locker>, config: ClusterConfig) -> Self {
        Self { locker, config }
    }

    /// Synthesize this instance's registration from the cluster config
    ///
    /// Tag order is significant: cluster name, instance name, then user
    /// tags in configuration order.
    pub fn registration(&self) -> ServiceRegistration {
        let (host, port) = split_host_port(&self.config.api_address);
        let address = if self.config.service_address.is_empty() {
            host
        } else {
            self.config.service_address.clone()
        };

        let mut tags = Vec::with_capacity(2 + self.config.tags.len());
        tags.push(format!("cluster-name={}", self.config.cluster_name));
        tags.push(format!("instance-name={}", self.config.instance_name));
        tags.extend(self.config.tags.iter().cloned());

        ServiceRegistration {
            id: self.config.api_service_id(),
            name: self.config.api_service_name(),
            address,
            port,
            tags,
            ttl: REGISTRATION_TTL,
        }
    }

    /// Register until it sticks, retrying on failure
    pub async fn run(&self, scope: CancellationToken) {
        let registration = self.registration();
        info!(
            id = %registration.id,
            name = %registration.name,
            address = %registration.address,
            port = registration.port,
            "registering api service"
        );
        while !scope.is_cancelled() {
            let result = tokio::select! {
                _ = scope.cancelled() => return,
                result = self.locker.register(&registration) => result,
            };
            match result {
                Ok(()) => return,
                Err(e) => {
                    warn!(error = %e, "api service registration failed");
                    if !sleep_cancellable(RETRY_TIMER, &scope).await {
                        return;
                    }
                }
            }
        }
    }
}

fn split_host_port(address: &str) -> (String, u16) {
    match address.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(0)),
        None => (address.to_string(), 0),
    }
}

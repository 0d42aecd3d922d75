//! Worker API client
//!
//! Leader-side client of the per-instance worker API. Workers expose a
//! plain-HTTP surface; all four operations are idempotent and the
//! per-target lock, not the RPC outcome, is the source of truth for
//! ownership.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::config::UNASSIGN_TIMEOUT;
use crate::error::{ClusterError, Result};
use crate::lockers::Service;
use crate::target::TargetConfig;

/// Configuration for the worker API client
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Per-request timeout for assign and config calls
    pub request_timeout: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for the worker API of cluster peers
#[derive(Clone)]
pub struct WorkerApiClient {
    client: Client,
}

impl WorkerApiClient {
    /// Create a new client with the given timeouts
    pub fn new(config: ApiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClusterError::Config {
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    /// Push a target config to a worker and start it
    ///
    /// Two calls: POST `/config/targets` with the JSON config, then POST
    /// `/targets/<name>` to begin the subscription. The worker acquires
    /// the per-target lock once it accepts the second call.
    pub async fn assign_target(&self, service: &Service, target: &TargetConfig) -> Result<()> {
        let url = format!("http://{}/config/targets", service.address);
        let response = self
            .client
            .post(&url)
            .json(target)
            .send()
            .await
            .map_err(|e| transport_error(service, e))?;
        debug!(
            target = %target.name,
            service = %service.id,
            status = response.status().as_u16(),
            "target config add response"
        );
        check_status(service, response.status().as_u16())?;

        let url = format!("http://{}/targets/{}", service.address, target.name);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| transport_error(service, e))?;
        debug!(
            target = %target.name,
            service = %service.id,
            status = response.status().as_u16(),
            "target start response"
        );
        check_status(service, response.status().as_u16())
    }

    /// Tell a worker to stop a target, best effort
    ///
    /// The response is ignored; the call is bounded by a short timeout so
    /// reselection is not held up by an unresponsive peer.
    pub async fn unassign_target(&self, service: &Service, target_name: &str) -> Result<()> {
        let url = format!("http://{}/targets/{}", service.address, target_name);
        let response = self
            .client
            .delete(&url)
            .timeout(UNASSIGN_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(service, e))?;
        debug!(
            target = %target_name,
            service = %service.id,
            status = response.status().as_u16(),
            "target unassign response"
        );
        Ok(())
    }

    /// Remove a target's config from a worker
    pub async fn remove_target_config(&self, service: &Service, target_name: &str) -> Result<()> {
        let url = format!("http://{}/config/targets/{}", service.address, target_name);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| transport_error(service, e))?;
        debug!(
            target = %target_name,
            service = %service.id,
            status = response.status().as_u16(),
            "target config removal response"
        );
        Ok(())
    }
}

fn transport_error(service: &Service, error: reqwest::Error) -> ClusterError {
    ClusterError::PeerRpcTransport {
        service: service.id.clone(),
        message: error.to_string(),
    }
}

// Workers answer assigns with a bare 200; anything above, 201 included,
// is a refusal.
fn check_status(service: &Service, status: u16) -> Result<()> {
    if status > 200 {
        return Err(ClusterError::PeerRpcStatus {
            service: service.id.clone(),
            status,
        });
    }
    Ok(())
}

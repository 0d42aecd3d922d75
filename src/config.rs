//! Clustering configuration
//!
//! Plain config structs with defaults plus an environment factory for the
//! service binaries. Config-file parsing lives outside this crate.

use std::time::Duration;

use crate::error::{ClusterError, Result};

/// Cluster name used when none is configured
pub const DEFAULT_CLUSTER_NAME: &str = "default-cluster";

/// Backoff between retries of locker operations
pub const RETRY_TIMER: Duration = Duration::from_secs(2);

/// Poll interval while waiting for a target lock to appear
pub const LOCK_WAIT_TIME: Duration = Duration::from_millis(100);

/// Service name suffix under which instance APIs register
pub const API_SERVICE_NAME: &str = "gnmic-api";

/// TTL of the API service registration
pub const REGISTRATION_TTL: Duration = Duration::from_secs(5);

/// Per-request budget for the best-effort unassign RPC
pub const UNASSIGN_TIMEOUT: Duration = Duration::from_millis(500);

/// Configuration for one cluster instance
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Cluster name shared by all peers
    pub cluster_name: String,
    /// Name of this instance, unique within the cluster
    pub instance_name: String,
    /// Bind address of this instance's API, `host:port`
    pub api_address: String,
    /// Advertised service address; falls back to the api-address host
    pub service_address: String,
    /// User tags, order-significant for placement affinity
    pub tags: Vec<String>,
    /// Grace period after winning the election before dispatching
    pub leader_wait_timer: Duration,
    /// Poll interval of the service membership watch
    pub services_watch_timer: Duration,
    /// Cadence of dispatcher passes over the target set
    pub targets_watch_timer: Duration,
    /// Wall-clock budget for one (target, service) assignment attempt
    pub target_assignment_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: DEFAULT_CLUSTER_NAME.into(),
            instance_name: String::new(),
            api_address: "0.0.0.0:7890".into(),
            service_address: String::new(),
            tags: Vec::new(),
            leader_wait_timer: Duration::from_secs(5),
            services_watch_timer: Duration::from_secs(60),
            targets_watch_timer: Duration::from_secs(20),
            target_assignment_timeout: Duration::from_secs(10),
        }
    }
}

impl ClusterConfig {
    /// Load configuration from environment variables
    ///
    /// Variables:
    /// - CLUSTER_NAME: cluster name (default: "default-cluster")
    /// - INSTANCE_NAME: this instance's name (required)
    /// - API_ADDRESS: API bind address (default: "0.0.0.0:7890")
    /// - SERVICE_ADDRESS: advertised address (optional)
    /// - CLUSTER_TAGS: comma-separated user tags (optional)
    /// - LEADER_WAIT_TIMER_SECS, SERVICES_WATCH_TIMER_SECS,
    ///   TARGETS_WATCH_TIMER_SECS, TARGET_ASSIGNMENT_TIMEOUT_SECS
    pub fn from_env() -> Result<Self> {
        let mut config = Self {
            cluster_name: std::env::var("CLUSTER_NAME")
                .unwrap_or_else(|_| DEFAULT_CLUSTER_NAME.into()),
            instance_name: std::env::var("INSTANCE_NAME").unwrap_or_default(),
            ..Default::default()
        };
        if let Ok(addr) = std::env::var("API_ADDRESS") {
            config.api_address = addr;
        }
        if let Ok(addr) = std::env::var("SERVICE_ADDRESS") {
            config.service_address = addr;
        }
        if let Ok(tags) = std::env::var("CLUSTER_TAGS") {
            config.tags = tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }
        for (var, field) in [
            ("LEADER_WAIT_TIMER_SECS", &mut config.leader_wait_timer),
            ("SERVICES_WATCH_TIMER_SECS", &mut config.services_watch_timer),
            ("TARGETS_WATCH_TIMER_SECS", &mut config.targets_watch_timer),
            (
                "TARGET_ASSIGNMENT_TIMEOUT_SECS",
                &mut config.target_assignment_timeout,
            ),
        ] {
            if let Ok(value) = std::env::var(var) {
                let secs = value.parse::<u64>().map_err(|_| ClusterError::Config {
                    message: format!("{var} must be an integer number of seconds"),
                })?;
                *field = Duration::from_secs(secs);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, surfacing misconfiguration at startup
    pub fn validate(&self) -> Result<()> {
        if self.instance_name.is_empty() {
            return Err(ClusterError::Config {
                message: "instance-name must not be empty".into(),
            });
        }
        if self.cluster_name.is_empty() {
            return Err(ClusterError::Config {
                message: "cluster-name must not be empty".into(),
            });
        }
        if self.target_assignment_timeout < LOCK_WAIT_TIME {
            return Err(ClusterError::Config {
                message: "target-assignment-timeout must be at least 100ms".into(),
            });
        }
        Ok(())
    }

    /// Key under which the cluster leader is elected
    pub fn leader_key(&self) -> String {
        format!("gnmic/{}/leader", self.cluster_name)
    }

    /// Lock key of one target
    pub fn target_key(&self, target_name: &str) -> String {
        format!("gnmic/{}/targets/{}", self.cluster_name, target_name)
    }

    /// Listing prefix covering all target locks of this cluster
    pub fn targets_prefix(&self) -> String {
        format!("gnmic/{}/targets", self.cluster_name)
    }

    /// Registered name of the per-instance API service
    pub fn api_service_name(&self) -> String {
        format!("{}-{}", self.cluster_name, API_SERVICE_NAME)
    }

    /// Registered ID of this instance's API service
    pub fn api_service_id(&self) -> String {
        format!("{}-api", self.instance_name)
    }
}

//! Target placement
//!
//! Places one target on one live worker. Selection prefers tag affinity
//! (ordered prefix match), then falls back to the least-loaded candidate;
//! the leader never takes the target lock itself, it waits for the chosen
//! worker to acquire it. A worker that refuses or fails to confirm is
//! denied for the rest of the placement and selection starts over.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::api_client::WorkerApiClient;
use crate::config::{ClusterConfig, LOCK_WAIT_TIME};
use crate::error::{ClusterError, Result};
use crate::lockers::{Locker, Service};
use crate::metrics::standard;
use crate::target::TargetConfig;

/// Placement state machine
///
/// `denied` lives outside the states: a service denied once is out for
/// the whole placement.
enum PlaceState {
    Select,
    Assign(Service),
    Confirm(Service),
    Done,
    Failed(ClusterError),
}

/// Places targets on cluster workers
pub struct TargetPlacer {
    locker: Arc<dyn Locker>,
    api: WorkerApiClient,
    config: ClusterConfig,
}

impl TargetPlacer {
    pub fn new(locker: Arc<dyn Locker>, api: WorkerApiClient, config: ClusterConfig) -> Self {
        Self {
            locker,
            api,
            config,
        }
    }

    /// Ensure `target` is owned by a suitable service
    ///
    /// Idempotent across dispatcher passes: an already-locked target is
    /// healthy and placement returns immediately.
    pub async fn place(
        &self,
        target: &TargetConfig,
        services: &HashMap<String, Service>,
    ) -> Result<()> {
        let key = self.config.target_key(&target.name);
        if self.locker.is_locked(&key).await? {
            debug!(target = %target.name, "target already locked");
            return Ok(());
        }
        info!(target = %target.name, "dispatching target");

        let started = Instant::now();
        let mut denied: HashSet<String> = HashSet::new();
        let mut state = PlaceState::Select;
        loop {
            state = match state {
                PlaceState::Select => {
                    match self.select_service(services, &target.tags, &denied).await {
                        Ok(service) => {
                            info!(
                                target = %target.name,
                                service = %service.id,
                                "selected service"
                            );
                            PlaceState::Assign(service)
                        }
                        Err(e) => PlaceState::Failed(e),
                    }
                }
                PlaceState::Assign(service) => {
                    match self.api.assign_target(&service, target).await {
                        Ok(()) => PlaceState::Confirm(service),
                        Err(e) => {
                            warn!(
                                target = %target.name,
                                service = %service.id,
                                error = %e,
                                "failed assigning target"
                            );
                            denied.insert(service.id);
                            PlaceState::Select
                        }
                    }
                }
                PlaceState::Confirm(service) => match self.await_lock(target, &service).await {
                    Ok(()) => PlaceState::Done,
                    Err(e) => {
                        warn!(
                            target = %target.name,
                            service = %service.id,
                            error = %e,
                            "assignment not confirmed, reselecting"
                        );
                        if let Err(e) = self.api.unassign_target(&service, &target.name).await {
                            warn!(
                                target = %target.name,
                                service = %service.id,
                                error = %e,
                                "failed to unassign target"
                            );
                        }
                        denied.insert(service.id);
                        PlaceState::Select
                    }
                },
                PlaceState::Done => {
                    standard::TARGETS_ASSIGNED.inc();
                    standard::PLACEMENT_DURATION.observe_since(started);
                    return Ok(());
                }
                PlaceState::Failed(e) => {
                    if matches!(e, ClusterError::NoMoreSuitableServices) {
                        standard::PLACEMENT_FAILURES.inc();
                    }
                    return Err(e);
                }
            };
        }
    }

    /// Select a service by tag affinity, then by load
    async fn select_service(
        &self,
        services: &HashMap<String, Service>,
        target_tags: &[String],
        denied: &HashSet<String>,
    ) -> Result<Service> {
        let candidates = affinity_candidates(services, target_tags, denied)?;
        if candidates.len() == 1 {
            return Ok(candidates[0].clone());
        }

        let locks = self.locker.list(&self.config.targets_prefix()).await?;
        let mut load: HashMap<String, usize> = HashMap::new();
        for owner in locks.values() {
            *load.entry(owner.clone()).or_default() += 1;
        }
        debug!(?load, "current instances load");

        least_loaded(&candidates, &load)
            .cloned()
            .ok_or(ClusterError::NoMoreSuitableServices)
    }

    /// Wait for the chosen worker to take the target lock
    ///
    /// Polls the lock key every 100 ms until the assignment timeout. A
    /// lock held by any other instance leaves the attempt unresolved and
    /// polling continues until the deadline.
    async fn await_lock(&self, target: &TargetConfig, service: &Service) -> Result<()> {
        let key = self.config.target_key(&target.name);
        let expected = service.instance_name().unwrap_or(service.short_id());
        info!(key = %key, instance = %expected, "waiting for target lock");

        let deadline = Instant::now() + self.config.target_assignment_timeout;
        loop {
            match self.locker.list(&key).await {
                Err(e) => {
                    warn!(key = %key, error = %e, "failed reading target lock");
                }
                Ok(values) => {
                    if let Some(owner) = values.get(&key) {
                        if owner == expected {
                            info!(key = %key, instance = %expected, "target lock acquired");
                            return Ok(());
                        }
                    }
                }
            }
            if Instant::now() + LOCK_WAIT_TIME >= deadline {
                return Err(ClusterError::ConfirmationTimeout {
                    target: target.name.clone(),
                    service: service.id.clone(),
                });
            }
            tokio::time::sleep(LOCK_WAIT_TIME).await;
        }
    }
}

/// Count how many leading target tags match the service's tag list
///
/// Comparison is positional and stops at the first mismatch; `[a,b,c]`
/// against `[a,b,x]` counts 2, against `[x,a,b]` counts 0.
pub fn tag_affinity(target_tags: &[String], service_tags: &[String]) -> usize {
    target_tags
        .iter()
        .zip(service_tags)
        .take_while(|(want, have)| want == have)
        .count()
}

/// Candidates for a placement: non-denied services with maximum affinity
///
/// With no target tags every non-denied service is a candidate. A single
/// remaining service is returned without looking at tags at all.
pub fn affinity_candidates<'a>(
    services: &'a HashMap<String, Service>,
    target_tags: &[String],
    denied: &HashSet<String>,
) -> Result<Vec<&'a Service>> {
    if services.is_empty() {
        return Err(ClusterError::NotFound);
    }
    let available: Vec<&Service> = services
        .values()
        .filter(|service| !denied.contains(&service.id))
        .collect();
    if available.is_empty() {
        return Err(ClusterError::NoMoreSuitableServices);
    }
    if available.len() == 1 || target_tags.is_empty() {
        return Ok(available);
    }

    let mut best = 0;
    let mut candidates: Vec<&Service> = Vec::new();
    for service in available {
        let affinity = tag_affinity(target_tags, &service.tags);
        if affinity > best {
            best = affinity;
            candidates.clear();
        }
        if affinity == best {
            candidates.push(service);
        }
    }
    Ok(candidates)
}

/// Pick the candidate with the fewest owned target locks
///
/// Candidates without a lock entry count as load 0. Ties break by service
/// ID order, deterministic for a given snapshot.
pub fn least_loaded<'a>(
    candidates: &[&'a Service],
    load: &HashMap<String, usize>,
) -> Option<&'a Service> {
    let mut sorted: Vec<&Service> = candidates.to_vec();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    sorted
        .into_iter()
        .min_by_key(|service| load.get(service.short_id()).copied().unwrap_or(0))
}

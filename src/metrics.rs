//! Cluster metrics
//!
//! Process-local counters and gauges rendered in Prometheus text format.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

/// Counter metric (monotonically increasing)
pub struct Counter {
    value: AtomicU64,
    name: &'static str,
    help: &'static str,
}

impl Counter {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name,
            help,
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn render(&self) -> String {
        format!(
            "# HELP {n} {h}\n# TYPE {n} counter\n{n} {v}\n",
            n = self.name,
            h = self.help,
            v = self.get()
        )
    }
}

/// Gauge metric (can go up or down)
pub struct Gauge {
    value: AtomicI64,
    name: &'static str,
    help: &'static str,
}

impl Gauge {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            value: AtomicI64::new(0),
            name,
            help,
        }
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn render(&self) -> String {
        format!(
            "# HELP {n} {h}\n# TYPE {n} gauge\n{n} {v}\n",
            n = self.name,
            h = self.help,
            v = self.get()
        )
    }
}

/// Seconds histogram with fixed buckets
pub struct Histogram {
    buckets: [(f64, AtomicU64); 7],
    sum_micros: AtomicU64,
    count: AtomicU64,
    name: &'static str,
    help: &'static str,
}

impl Histogram {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        const fn bucket(bound: f64) -> (f64, AtomicU64) {
            (bound, AtomicU64::new(0))
        }
        Self {
            buckets: [
                bucket(0.01),
                bucket(0.05),
                bucket(0.1),
                bucket(0.5),
                bucket(1.0),
                bucket(5.0),
                bucket(10.0),
            ],
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
            name,
            help,
        }
    }

    pub fn observe(&self, seconds: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((seconds * 1_000_000.0) as u64, Ordering::Relaxed);
        for (bound, count) in &self.buckets {
            if seconds <= *bound {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record the time elapsed since `start`
    pub fn observe_since(&self, start: Instant) {
        self.observe(start.elapsed().as_secs_f64());
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "# HELP {n} {h}\n# TYPE {n} histogram\n",
            n = self.name,
            h = self.help
        );
        for (bound, count) in &self.buckets {
            out.push_str(&format!(
                "{}_bucket{{le=\"{}\"}} {}\n",
                self.name,
                bound,
                count.load(Ordering::Relaxed)
            ));
        }
        out.push_str(&format!(
            "{}_sum {}\n{}_count {}\n",
            self.name,
            self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            self.name,
            self.count.load(Ordering::Relaxed)
        ));
        out
    }
}

/// Standard clustering metrics
pub mod standard {
    use super::*;

    pub static LEADER_ELECTIONS: Counter = Counter::new(
        "gnmic_cluster_leader_elections_total",
        "Times this instance won the leader election",
    );

    pub static IS_LEADER: Gauge = Gauge::new(
        "gnmic_cluster_is_leader",
        "Whether this instance currently holds the leader key",
    );

    pub static CLUSTER_SERVICES: Gauge = Gauge::new(
        "gnmic_cluster_services",
        "Services in the current membership view",
    );

    pub static DISPATCH_PASSES: Counter = Counter::new(
        "gnmic_cluster_dispatch_passes_total",
        "Completed dispatcher passes over the target set",
    );

    pub static TARGETS_ASSIGNED: Counter = Counter::new(
        "gnmic_cluster_targets_assigned_total",
        "Successful target placements confirmed by a lock",
    );

    pub static PLACEMENT_FAILURES: Counter = Counter::new(
        "gnmic_cluster_placement_failures_total",
        "Placements abandoned after all candidates were denied",
    );

    pub static PLACEMENT_DURATION: Histogram = Histogram::new(
        "gnmic_cluster_placement_duration_seconds",
        "Wall time of one target placement",
    );
}

/// Render all standard metrics in Prometheus text format
pub fn gather() -> String {
    let mut out = String::new();
    out.push_str(&standard::LEADER_ELECTIONS.render());
    out.push_str(&standard::IS_LEADER.render());
    out.push_str(&standard::CLUSTER_SERVICES.render());
    out.push_str(&standard::DISPATCH_PASSES.render());
    out.push_str(&standard::TARGETS_ASSIGNED.render());
    out.push_str(&standard::PLACEMENT_FAILURES.render());
    out.push_str(&standard::PLACEMENT_DURATION.render());
    out
}

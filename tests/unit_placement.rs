//! Unit tests for target placement selection
//!
//! Covers tag affinity, load tie-breaking, and the denied set.

use std::collections::{HashMap, HashSet};

use gnmic_cluster::cluster::placement::{affinity_candidates, least_loaded, tag_affinity};
use gnmic_cluster::error::ClusterError;
use gnmic_cluster::lockers::Service;

fn service(instance: &str, user_tags: &[&str]) -> Service {
    let mut tags = vec![
        "cluster-name=c".to_string(),
        format!("instance-name={instance}"),
    ];
    tags.extend(user_tags.iter().map(|t| t.to_string()));
    Service {
        id: format!("{instance}-api"),
        address: "127.0.0.1:7890".into(),
        tags,
    }
}

fn view(services: Vec<Service>) -> HashMap<String, Service> {
    services.into_iter().map(|s| (s.id.clone(), s)).collect()
}

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|t| t.to_string()).collect()
}

#[test]
fn test_affinity_is_prefix_count() {
    // Stops at the first positional mismatch.
    assert_eq!(
        tag_affinity(&tags(&["a", "b", "c"]), &tags(&["a", "b", "x", "y"])),
        2
    );
    assert_eq!(tag_affinity(&tags(&["x", "a", "b"]), &tags(&["a", "b", "c"])), 0);
    // Exhausting the target tags ends the comparison.
    assert_eq!(tag_affinity(&tags(&["a", "b"]), &tags(&["a", "b", "c"])), 2);
    assert_eq!(tag_affinity(&[], &tags(&["a", "b"])), 0);
}

#[test]
fn test_tag_affinity_overrides_load() {
    // Two regions; the target names the eu instance's tag prefix.
    let services = view(vec![
        service("i1", &["region=eu"]),
        service("i2", &["region=us"]),
    ]);
    let target_tags = tags(&["cluster-name=c", "instance-name=i1", "region=eu"]);

    let candidates = affinity_candidates(&services, &target_tags, &HashSet::new()).unwrap();
    assert_eq!(candidates.len(), 1, "affinity winner should be unique");
    assert_eq!(candidates[0].id, "i1-api");
}

#[test]
fn test_load_balancing_prefers_idle_instance() {
    // i1 already owns two targets, i2 owns none.
    let services = view(vec![service("i1", &[]), service("i2", &[])]);
    let candidates = affinity_candidates(&services, &[], &HashSet::new()).unwrap();
    assert_eq!(candidates.len(), 2);

    let load = HashMap::from([("i1".to_string(), 2)]);
    let chosen = least_loaded(&candidates, &load).unwrap();
    assert_eq!(chosen.id, "i2-api");
}

#[test]
fn test_untagged_target_considers_every_service() {
    let services = view(vec![
        service("i1", &["region=eu"]),
        service("i2", &["region=us"]),
        service("i3", &[]),
    ]);
    let candidates = affinity_candidates(&services, &[], &HashSet::new()).unwrap();
    assert_eq!(candidates.len(), 3);
}

#[test]
fn test_denied_service_is_never_reselected() {
    let services = view(vec![
        service("i1", &["region=eu"]),
        service("i2", &["region=us"]),
    ]);
    let target_tags = tags(&["cluster-name=c", "instance-name=i1", "region=eu"]);

    // i1 is the sole affinity winner, but a denied service must not come
    // back within the same placement.
    let denied: HashSet<String> = HashSet::from(["i1-api".to_string()]);
    let candidates = affinity_candidates(&services, &target_tags, &denied).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].id, "i2-api");

    let denied: HashSet<String> =
        HashSet::from(["i1-api".to_string(), "i2-api".to_string()]);
    let result = affinity_candidates(&services, &target_tags, &denied);
    assert!(matches!(result, Err(ClusterError::NoMoreSuitableServices)));
}

#[test]
fn test_empty_view_is_not_found() {
    let empty_view = HashMap::new();
    let empty_tags: Vec<String> = Vec::new();
    let empty_denied = HashSet::new();
    let result = affinity_candidates(&empty_view, &empty_tags, &empty_denied);
    assert!(matches!(result, Err(ClusterError::NotFound)));
}

#[test]
fn test_single_service_ignores_tags_and_load() {
    let services = view(vec![service("i1", &["region=us"])]);
    let candidates =
        affinity_candidates(&services, &tags(&["region=eu"]), &HashSet::new()).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].id, "i1-api");
}

#[test]
fn test_load_tie_breaks_by_service_id() {
    let services = view(vec![
        service("i3", &[]),
        service("i1", &[]),
        service("i2", &[]),
    ]);
    let candidates = affinity_candidates(&services, &[], &HashSet::new()).unwrap();

    // All loads equal; the tie-break is stable for a given snapshot.
    let load = HashMap::from([
        ("i1".to_string(), 1),
        ("i2".to_string(), 1),
        ("i3".to_string(), 1),
    ]);
    let first = least_loaded(&candidates, &load).unwrap();
    let second = least_loaded(&candidates, &load).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.id, "i1-api");
}

#[test]
fn test_missing_load_entry_counts_as_zero() {
    let services = view(vec![service("i1", &[]), service("i2", &[])]);
    let candidates = affinity_candidates(&services, &[], &HashSet::new()).unwrap();

    let load = HashMap::from([("i1".to_string(), 1)]);
    assert_eq!(least_loaded(&candidates, &load).unwrap().id, "i2-api");
}

//! Registry uniqueness and deduplication

mod common;

use std::sync::Arc;

use common::{init_logger, record};
use kodegen_agent_deck::{ExternalSessionId, Instance, InstanceId, Registry};

#[test]
fn test_earliest_created_keeps_duplicate_id() {
    init_logger();

    // Registry order differs from creation order on purpose.
    let (registry, cleared) = Registry::from_records(vec![
        record("late", Some("s-late"), Some("conv-1"), 30),
        record("early", Some("s-early"), Some("conv-1"), 10),
        record("other", Some("s-other"), Some("conv-2"), 20),
    ]);

    assert_eq!(cleared, vec![InstanceId::new("late")]);
    let early = registry.get(&InstanceId::new("early")).unwrap();
    let late = registry.get(&InstanceId::new("late")).unwrap();
    assert_eq!(early.external_session_id(), Some(ExternalSessionId::new("conv-1")));
    assert_eq!(late.external_session_id(), None);
    assert!(late.needs_identity());
    assert!(!early.needs_identity());

    // Registry order is preserved.
    let ids: Vec<String> = registry.ids().iter().map(|i| i.to_string()).collect();
    assert_eq!(ids, ["late", "early", "other"]);
}

#[test]
fn test_creation_tie_broken_by_registry_order() {
    init_logger();

    let (registry, cleared) = Registry::from_records(vec![
        record("first", None, Some("conv"), 5),
        record("second", None, Some("conv"), 5),
        record("third", None, Some("conv"), 5),
    ]);

    assert_eq!(cleared, vec![InstanceId::new("second"), InstanceId::new("third")]);
    let claimed = registry.claimed_external_ids();
    assert_eq!(claimed.len(), 1);
    assert_eq!(
        registry.get(&InstanceId::new("first")).unwrap().external_session_id(),
        Some(ExternalSessionId::new("conv"))
    );
}

#[test]
fn test_claim_refuses_held_id() {
    init_logger();

    let (registry, _) = Registry::from_records(vec![
        record("holder", None, Some("conv-x"), 1),
        record("seeker", None, None, 2),
    ]);
    let seeker = InstanceId::new("seeker");

    assert!(!registry.claim_external_id(&seeker, ExternalSessionId::new("conv-x")).unwrap());
    assert_eq!(registry.get(&seeker).unwrap().external_session_id(), None);

    assert!(registry.claim_external_id(&seeker, ExternalSessionId::new("conv-y")).unwrap());
    let instance = registry.get(&seeker).unwrap();
    assert_eq!(instance.external_session_id(), Some(ExternalSessionId::new("conv-y")));
    assert!(!instance.needs_identity());

    // Re-claiming one's own id is fine.
    assert!(registry.claim_external_id(&seeker, ExternalSessionId::new("conv-y")).unwrap());
}

#[test]
fn test_claim_for_unknown_instance_fails() {
    let registry = Registry::new();
    let result = registry.claim_external_id(&InstanceId::new("ghost"), ExternalSessionId::new("c"));
    assert!(result.is_err());
}

#[test]
fn test_release_flags_for_detection() {
    let (registry, _) = Registry::from_records(vec![record("a", None, Some("conv"), 1)]);
    let id = InstanceId::new("a");

    registry.release_external_id(&id).unwrap();

    let instance = registry.get(&id).unwrap();
    assert_eq!(instance.external_session_id(), None);
    assert!(instance.needs_identity());
    assert!(registry.claimed_external_ids().is_empty());
}

#[test]
fn test_insert_replaces_same_id() {
    let registry = Registry::new();
    let instance = Arc::new(Instance::from_record(record("a", None, None, 1)));
    registry.insert(Arc::clone(&instance));

    let mut updated = record("a", Some("s-a"), None, 1);
    updated.title = "renamed".to_string();
    registry.insert(Arc::new(Instance::from_record(updated)));

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get(&InstanceId::new("a")).unwrap().title(), "renamed");
}

#[test]
fn test_remove_and_lookup_by_session() {
    let (registry, _) = Registry::from_records(vec![
        record("a", Some("s-a"), None, 1),
        record("b", Some("s-b"), None, 2),
    ]);

    let found = registry.find_by_session(&"s-b".into()).unwrap();
    assert_eq!(found.id(), &InstanceId::new("b"));

    assert!(registry.remove(&InstanceId::new("b")).is_some());
    assert!(registry.remove(&InstanceId::new("b")).is_none());
    assert!(registry.find_by_session(&"s-b".into()).is_none());
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_records_round_trip_through_instances() {
    let original = vec![
        record("a", Some("s-a"), Some("conv-a"), 1),
        record("b", None, None, 2),
    ];
    let (registry, cleared) = Registry::from_records(original.clone());

    assert!(cleared.is_empty());
    assert_eq!(registry.records(), original);
}

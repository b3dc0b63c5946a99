//! Unit tests for reconcile_helpers module

use super::*;
use crate::claim::RELEASE_FINALIZER;
use crate::test_utils::*;
use crds::{CrdValidationError, TypedLocalReference};
use std::collections::BTreeMap;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test]
fn test_finalizer_added_before_anything_is_reserved() {
    let claim = create_test_claim("md-0-abc", "default", "vlan-10");
    let patch = finalizer_to_add(&claim).expect("fresh claim needs the finalizer");
    assert_eq!(patch["metadata"]["finalizers"][0], RELEASE_FINALIZER);

    let mut held = claim.clone();
    held.metadata.finalizers = Some(vec![RELEASE_FINALIZER.to_string()]);
    assert!(finalizer_to_add(&held).is_none());
}

#[test]
fn test_plan_ensure_reserved_commits_address_then_status() {
    let plan = plan_ensure("md-0-abc", EnsureOutcome::Reserved(ip("10.0.0.5")));
    assert_eq!(plan.create_address, Some(ip("10.0.0.5")));
    assert_eq!(plan.status.state, ClaimState::Allocated);
    assert_eq!(plan.status.address.as_deref(), Some("md-0-abc"));
    assert_eq!(plan.status.error, None);
    assert_eq!(plan.next, Next::Done);
}

#[test]
fn test_plan_ensure_already_present_creates_nothing() {
    let plan = plan_ensure("md-0-abc", EnsureOutcome::AlreadyPresent);
    assert_eq!(plan.create_address, None);
    assert_eq!(plan.status.state, ClaimState::Allocated);
    assert_eq!(plan.next, Next::Done);
}

#[test]
fn test_plan_ensure_pending_polls_again() {
    let plan = plan_ensure("md-0-abc", EnsureOutcome::Pending);
    assert_eq!(plan.create_address, None);
    assert_eq!(plan.status.state, ClaimState::Pending);
    assert_eq!(plan.status.address, None);
    assert_eq!(plan.next, Next::PollAgain);
}

#[test]
fn test_failed_status_carries_error() {
    let status = DesiredStatus::failed(&ControllerError::PoolNotFound("default/vlan-10".to_string()));
    assert_eq!(status.state, ClaimState::Failed);
    assert_eq!(status.address, None);
    assert_eq!(status.error.as_deref(), Some("NutanixIPPool not found: default/vlan-10"));
}

#[test]
fn test_address_for_is_owned_by_claim() {
    let claim = create_test_claim("md-0-abc", "default", "vlan-10");
    let address = address_for(&claim, ip("10.0.0.5"));

    assert_eq!(address.metadata.name.as_deref(), Some("md-0-abc"));
    assert_eq!(address.metadata.namespace.as_deref(), Some("default"));
    assert_eq!(address.spec.address, "10.0.0.5");
    assert_eq!(address.spec.claim_ref.name, "md-0-abc");
    assert_eq!(address.spec.pool_ref, TypedLocalReference::nutanix_ip_pool("vlan-10"));

    let owners = address.metadata.owner_references.expect("owner reference");
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].kind, "IPAddressClaim");
    assert_eq!(owners[0].name, "md-0-abc");
    assert_eq!(owners[0].uid, "uid-md-0-abc");
    assert_eq!(owners[0].controller, Some(true));
}

#[test]
fn test_existing_address_from_earlier_pass_is_accepted() {
    let claim = create_test_claim("md-0-abc", "default", "vlan-10");
    let existing = create_test_address(&claim, "10.0.0.5");
    assert!(check_existing_address(&existing, "md-0-abc", ip("10.0.0.5")).is_ok());
}

#[test]
fn test_existing_address_with_other_ip_is_conflict() {
    let claim = create_test_claim("md-0-abc", "default", "vlan-10");
    let existing = create_test_address(&claim, "10.0.0.9");
    let err = check_existing_address(&existing, "md-0-abc", ip("10.0.0.5")).unwrap_err();
    assert!(matches!(err, ControllerError::AddressConflict(_)), "got {err:?}");

    let other = create_test_claim("someone-else", "default", "vlan-10");
    let mut foreign = create_test_address(&other, "10.0.0.5");
    foreign.metadata.name = Some("md-0-abc".to_string());
    assert!(check_existing_address(&foreign, "md-0-abc", ip("10.0.0.5")).is_err());
}

#[test]
fn test_release_skips_remote_when_pool_gone() {
    match release_target(None) {
        ReleaseTarget::Skip(reason) => assert!(reason.contains("gone"), "got {reason}"),
        ReleaseTarget::Remote(_) => panic!("expected skip"),
    }
}

#[test]
fn test_release_skips_remote_when_pool_invalid() {
    let mut pool = create_test_pool("vlan-10", "default");
    pool.spec.subnet = "vlan-10".to_string();
    pool.spec.cluster = None;
    match release_target(Some(pool)) {
        ReleaseTarget::Skip(reason) => {
            let expected = CrdValidationError::ClusterRequired {
                subnet: "vlan-10".to_string(),
            };
            assert!(reason.contains(&expected.to_string()), "got {reason}");
        }
        ReleaseTarget::Remote(_) => panic!("expected skip"),
    }
}

#[test]
fn test_release_goes_remote_through_valid_pool() {
    let pool = create_test_pool("vlan-10", "default");
    assert!(matches!(release_target(Some(pool)), ReleaseTarget::Remote(_)));
}

#[test]
fn test_plan_release() {
    assert_eq!(plan_release(ReleaseOutcome::Released), ReleaseStep::RemoveFinalizer);
    assert_eq!(plan_release(ReleaseOutcome::NothingToRelease), ReleaseStep::RemoveFinalizer);
    assert_eq!(plan_release(ReleaseOutcome::Pending), ReleaseStep::PollAgain);
}

#[test]
fn test_claims_for_pool_matches_namespace_and_name() {
    let pool = create_test_pool("vlan-10", "default");
    let mut foreign_kind = create_test_claim("foreign", "default", "vlan-10");
    foreign_kind.spec.pool_ref.kind = "InClusterIPPool".to_string();
    let claims = vec![
        Arc::new(create_test_claim("a", "default", "vlan-10")),
        Arc::new(create_test_claim("b", "default", "vlan-20")),
        Arc::new(create_test_claim("c", "other", "vlan-10")),
        Arc::new(foreign_kind),
        Arc::new(create_test_claim("d", "default", "vlan-10")),
    ];

    let refs = claims_for_pool(&pool, &claims);
    let names: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["a", "d"]);
    assert!(refs.iter().all(|r| r.namespace.as_deref() == Some("default")));
}

#[test]
fn test_paused_pool_triggers_nothing() {
    let mut pool = create_test_pool("vlan-10", "default");
    pool.metadata.annotations = Some(BTreeMap::from([(
        PAUSED_ANNOTATION.to_string(),
        String::new(),
    )]));
    let claims = vec![Arc::new(create_test_claim("a", "default", "vlan-10"))];
    assert!(claims_for_pool(&pool, &claims).is_empty());
}

#[test]
fn test_pool_wakes_claims_on_first_sight_and_unpause_only() {
    let pauses = PoolPauses::default();
    let mut pool = create_test_pool("vlan-10", "default");
    let key = "default/vlan-10";

    assert!(pauses.unpaused(key, &pool), "first sight of an unpaused pool");
    assert!(!pauses.unpaused(key, &pool), "plain update of an unpaused pool");

    pool.metadata.annotations = Some(BTreeMap::from([(
        PAUSED_ANNOTATION.to_string(),
        "true".to_string(),
    )]));
    assert!(!pauses.unpaused(key, &pool), "pausing");

    pool.metadata.annotations = None;
    assert!(pauses.unpaused(key, &pool), "unpausing");

    pauses.forget(key);
    assert!(pauses.unpaused(key, &pool), "recreated pool");
}

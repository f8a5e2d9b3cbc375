//! Integration tests for authorization records and their enforcement.

mod helpers;

use helpers::TestEngine;
use runway_batch::ElementSelector;
use runway_core::{Clock, ErrorKind, MissingAuthorization};
use runway_entity::authorization::{
    ANY, Authentication, Authorization, AuthorizationType, CompositePermissionCheck, Permission,
    PermissionCheck, PermissionSet, Resource,
};
use runway_entity::batch::BatchElement;
use runway_entity::job::Job;

fn admin() -> Authentication {
    Authentication::user("admin").with_groups(["runway-admin"])
}

fn kermit() -> Authentication {
    Authentication::user("kermit").with_groups(["muppets"])
}

fn gonzo() -> Authentication {
    Authentication::user("gonzo").with_groups(["muppets"])
}

fn read_batch(id: &str) -> CompositePermissionCheck {
    CompositePermissionCheck::atomic(Permission::Read, Resource::Batch, id)
}

fn delete_batch(id: &str) -> CompositePermissionCheck {
    CompositePermissionCheck::atomic(Permission::Delete, Resource::Batch, id)
}

async fn store(engine: &TestEngine, authorization: Authorization) -> Authorization {
    engine
        .authorizations
        .create_authorization(&admin(), authorization)
        .await
        .unwrap()
}

async fn allowed(
    engine: &TestEngine,
    subject: Authentication,
    check: CompositePermissionCheck,
) -> bool {
    engine
        .authorizations
        .is_user_authorized(&admin(), subject, check)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_denied_update_is_never_flushed() {
    let engine = TestEngine::new();
    let job = engine
        .jobs
        .schedule(Job::new("counting", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();
    let before = engine.datastore.commit_count().await;

    let err = engine
        .jobs
        .as_caller(kermit())
        .set_job_priority(job.id, 42)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Authorization);
    assert_eq!(
        err.missing_authorizations,
        vec![MissingAuthorization {
            permission: "UPDATE".to_string(),
            resource: "JOB".to_string(),
            resource_id: job.id.to_string(),
        }]
    );
    assert_eq!(engine.datastore.commit_count().await, before);
    let stored: Job = engine.datastore.get(job.id.into_uuid()).await.unwrap();
    assert_eq!(stored.priority, 0);
}

#[tokio::test]
async fn test_type_wide_grant_allows_update() {
    let engine = TestEngine::new();
    let job = engine
        .jobs
        .schedule(Job::new("counting", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();

    store(
        &engine,
        Authorization::new(AuthorizationType::Grant, Resource::Job, ANY)
            .for_user("kermit")
            .with_permissions(PermissionSet::of(&[Permission::Update])),
    )
    .await;

    engine
        .jobs
        .as_caller(kermit())
        .set_job_priority(job.id, 42)
        .await
        .unwrap();
    let stored: Job = engine.datastore.get(job.id.into_uuid()).await.unwrap();
    assert_eq!(stored.priority, 42);
}

#[tokio::test]
async fn test_user_revoke_beats_group_grant() {
    let engine = TestEngine::new();
    store(
        &engine,
        Authorization::new(AuthorizationType::Grant, Resource::Batch, ANY)
            .for_group("muppets")
            .with_permissions(PermissionSet::of(&[Permission::Read])),
    )
    .await;
    store(
        &engine,
        Authorization::new(AuthorizationType::Revoke, Resource::Batch, ANY)
            .for_user("kermit")
            .with_permissions(PermissionSet::of(&[Permission::Read])),
    )
    .await;

    assert!(!allowed(&engine, kermit(), read_batch("b-1")).await);
    assert!(allowed(&engine, gonzo(), read_batch("b-1")).await);
}

#[tokio::test]
async fn test_instance_scope_beats_type_wide_scope() {
    let engine = TestEngine::new();
    store(
        &engine,
        Authorization::new(AuthorizationType::Revoke, Resource::Batch, ANY)
            .for_user("kermit")
            .with_permissions(PermissionSet::of(&[Permission::Read])),
    )
    .await;
    store(
        &engine,
        Authorization::new(AuthorizationType::Grant, Resource::Batch, "b-1")
            .for_group("muppets")
            .with_permissions(PermissionSet::of(&[Permission::Read])),
    )
    .await;

    assert!(allowed(&engine, kermit(), read_batch("b-1")).await);
    assert!(!allowed(&engine, kermit(), read_batch("b-2")).await);
}

#[tokio::test]
async fn test_revoke_wins_within_group_level() {
    let engine = TestEngine::new();
    store(
        &engine,
        Authorization::new(AuthorizationType::Grant, Resource::Batch, ANY)
            .for_group("muppets")
            .with_permissions(PermissionSet::of(&[Permission::Read])),
    )
    .await;
    store(
        &engine,
        Authorization::new(AuthorizationType::Revoke, Resource::Batch, ANY)
            .for_group("frogs")
            .with_permissions(PermissionSet::of(&[Permission::Read])),
    )
    .await;

    let kermit_the_frog = Authentication::user("kermit").with_groups(["muppets", "frogs"]);
    assert!(!allowed(&engine, kermit_the_frog, read_batch("b-1")).await);
    assert!(allowed(&engine, gonzo(), read_batch("b-1")).await);
}

#[tokio::test]
async fn test_global_applies_when_nothing_more_specific_decides() {
    let engine = TestEngine::new();
    store(
        &engine,
        Authorization::new(AuthorizationType::Global, Resource::Batch, ANY)
            .with_permissions(PermissionSet::of(&[Permission::Read])),
    )
    .await;
    store(
        &engine,
        Authorization::new(AuthorizationType::Revoke, Resource::Batch, ANY)
            .for_group("muppets")
            .with_permissions(PermissionSet::of(&[Permission::Read])),
    )
    .await;

    let stranger = Authentication::user("statler");
    assert!(allowed(&engine, stranger.clone(), read_batch("b-1")).await);
    assert!(!allowed(&engine, gonzo(), read_batch("b-1")).await);
    // Nothing grants Delete.
    assert!(
        !allowed(
            &engine,
            stranger,
            CompositePermissionCheck::atomic(Permission::Delete, Resource::Batch, "b-1"),
        )
        .await
    );
}

#[tokio::test]
async fn test_composite_checks_report_every_missing_permission() {
    let engine = TestEngine::new();
    store(
        &engine,
        Authorization::new(AuthorizationType::Grant, Resource::Batch, ANY)
            .for_user("kermit")
            .with_permissions(PermissionSet::of(&[Permission::Read])),
    )
    .await;

    let either = CompositePermissionCheck::Any(vec![
        CompositePermissionCheck::atomic(Permission::Read, Resource::Job, "j-1"),
        read_batch("b-1"),
    ]);
    engine
        .authorizations
        .check_authorization(&kermit(), either)
        .await
        .unwrap();

    let both = CompositePermissionCheck::All(vec![
        CompositePermissionCheck::atomic(Permission::Read, Resource::Job, "j-1"),
        CompositePermissionCheck::atomic(Permission::Delete, Resource::Batch, "b-1"),
        read_batch("b-1"),
    ]);
    let err = engine
        .authorizations
        .check_authorization(&kermit(), both)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Authorization);
    assert_eq!(err.missing_authorizations.len(), 2);
    let delete_b1 = PermissionCheck::new(Permission::Delete, Resource::Batch, "b-1").to_missing();
    assert!(err.missing_authorizations.contains(&delete_b1));
}

#[tokio::test]
async fn test_admin_bypasses_checks_and_others_cannot_manage_records() {
    let engine = TestEngine::new();
    assert!(allowed(&engine, admin(), read_batch("anything")).await);

    let err = engine
        .authorizations
        .create_authorization(
            &kermit(),
            Authorization::new(AuthorizationType::Grant, Resource::Batch, ANY)
                .for_user("kermit")
                .with_permissions(PermissionSet::ALL),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Authorization);
}

#[tokio::test]
async fn test_permission_changes_take_effect() {
    let engine = TestEngine::new();
    let record = store(
        &engine,
        Authorization::new(AuthorizationType::Grant, Resource::Batch, ANY)
            .for_user("kermit")
            .with_permissions(PermissionSet::of(&[Permission::Read])),
    )
    .await;
    assert!(allowed(&engine, kermit(), read_batch("b-1")).await);
    assert!(!allowed(&engine, kermit(), delete_batch("b-1")).await);

    engine
        .authorizations
        .add_permission(&admin(), record.id, Permission::Delete)
        .await
        .unwrap();
    assert!(allowed(&engine, kermit(), delete_batch("b-1")).await);

    engine
        .authorizations
        .remove_permission(&admin(), record.id, Permission::Read)
        .await
        .unwrap();
    assert!(!allowed(&engine, kermit(), read_batch("b-1")).await);
    assert!(allowed(&engine, kermit(), delete_batch("b-1")).await);

    let replaced = engine
        .authorizations
        .replace_permissions(&admin(), record.id, vec![Permission::Read])
        .await
        .unwrap();
    assert!(replaced.permissions.contains(Permission::Read));
    assert!(allowed(&engine, kermit(), read_batch("b-1")).await);
    assert!(!allowed(&engine, kermit(), delete_batch("b-1")).await);

    engine
        .authorizations
        .delete_authorization(&admin(), record.id)
        .await
        .unwrap();
    assert!(!allowed(&engine, kermit(), read_batch("b-1")).await);
}

#[tokio::test]
async fn test_batch_creation_requires_create_permission() {
    let engine = TestEngine::new();
    let err = engine
        .batches
        .as_caller(kermit())
        .set_job_retries_async(ElementSelector::Static(vec![BatchElement::new("x")]), 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Authorization);
    assert!(engine.batches.batches(Default::default()).await.unwrap().is_empty());

    store(
        &engine,
        Authorization::new(AuthorizationType::Grant, Resource::Batch, ANY)
            .for_user("kermit")
            .with_permissions(PermissionSet::of(&[Permission::Create])),
    )
    .await;
    let batch = engine
        .batches
        .as_caller(kermit())
        .set_job_retries_async(ElementSelector::Static(vec![BatchElement::new("x")]), 1)
        .await
        .unwrap();
    assert_eq!(batch.created_by.as_deref(), Some("kermit"));
}

#[tokio::test]
async fn test_listing_batches_requires_read_permission() {
    let engine = TestEngine::new();
    engine
        .batches
        .set_job_retries_async(ElementSelector::Static(vec![BatchElement::new("x")]), 1)
        .await
        .unwrap();

    let err = engine
        .batches
        .as_caller(gonzo())
        .batches(Default::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Authorization);
    assert_eq!(
        err.missing_authorizations,
        vec![PermissionCheck::new(Permission::Read, Resource::Batch, ANY).to_missing()]
    );

    store(
        &engine,
        Authorization::new(AuthorizationType::Grant, Resource::Batch, ANY)
            .for_group("muppets")
            .with_permissions(PermissionSet::of(&[Permission::Read])),
    )
    .await;
    let listed = engine
        .batches
        .as_caller(gonzo())
        .batches(Default::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

use pamigrate_backend::{Backend, MemoryBackend};
use pamigrate_core::{
    Error,
    objects::{ObjectRef, ObjectType},
    profiles::{ConnectionSettings, ProfileDraft},
};

fn local_draft(name: &str, host: &str) -> ProfileDraft {
    ProfileDraft::new(
        name,
        ConnectionSettings::Local {
            host: host.into(),
            port: 8010,
            username: "admin".into(),
            password: "apple".into(),
            ssl_enabled: true,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn profiles_are_scoped_per_user() {
    let backend = MemoryBackend::new();
    let created = backend
        .create_profile("alice", &local_draft("Dev", "dev.local"))
        .await
        .unwrap();

    assert_eq!(backend.list_profiles("alice").await.unwrap(), vec![created]);
    assert!(backend.list_profiles("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn update_keeps_identity() {
    let backend = MemoryBackend::new();
    let created = backend
        .create_profile("alice", &local_draft("Dev", "dev.local"))
        .await
        .unwrap();
    let updated = backend
        .update_profile("alice", created.id(), &local_draft("Dev 2", "dev2.local"))
        .await
        .unwrap();

    assert_eq!(updated.id(), created.id());
    assert_eq!(updated.created_at(), created.created_at());
    assert_eq!(updated.name(), "Dev 2");
}

#[tokio::test]
async fn offline_backend_counts_and_fails_requests() {
    let backend = MemoryBackend::new();
    backend.set_offline(true);
    let err = backend.list_profiles("alice").await.unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(_)));
    assert_eq!(backend.request_count(), 1);
}

#[tokio::test]
async fn migration_reports_partial_failures() {
    let backend = MemoryBackend::new();
    let source = backend.seed_profile("alice", local_draft("Dev", "dev.local"));
    let target = backend.seed_profile("alice", local_draft("Prod", "prod.local"));
    backend.fail_object("Sales");
    backend.omit_result("Quiet");

    let objects = vec![
        ObjectRef::new(ObjectType::Dimension, "Region"),
        ObjectRef::new(ObjectType::Cube, "Sales"),
        ObjectRef::new(ObjectType::Process, "Quiet"),
    ];
    let reply = backend
        .migrate_objects(&source, &target, &objects)
        .await
        .unwrap();

    assert!(!reply.success);
    assert_eq!(reply.message, "Migrated 2 objects successfully, Error on Sales");
    assert_eq!(reply.results.len(), 2);
    assert_eq!(backend.migrations().len(), 1);
}

#[tokio::test]
async fn login_requires_registration() {
    let backend = MemoryBackend::new();
    let reply = backend.login("alice", "pw").await.unwrap();
    assert!(!reply.success);
    assert_eq!(reply.error.as_deref(), Some("Invalid credentials"));

    assert!(backend.register("alice", "pw").await.unwrap().success);
    assert!(backend.login("alice", "pw").await.unwrap().success);
    assert!(!backend.register("alice", "other").await.unwrap().success);
}

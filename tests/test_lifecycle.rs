//! Lifecycle operations against an in-memory multiplexer

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeMultiplexer, ScriptedIdentitySource, eventually, init_logger, options, record};
use kodegen_agent_deck::lifecycle::INSTANCE_ENV;
use kodegen_agent_deck::{
    AlwaysReady, DeckError, ExternalSessionId, Fingerprint, IdentityOutcome, InstanceId,
    InstanceRecord, LifecycleManager, MuxSessionName, NewInstance, RefreshRequest, Registry,
    Status, StatusScheduler, Tool,
};
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    mux: Arc<FakeMultiplexer>,
    source: Arc<ScriptedIdentitySource>,
    registry: Arc<Registry>,
    manager: Arc<LifecycleManager<FakeMultiplexer>>,
}

fn harness(records: Vec<InstanceRecord>, announced: &[&str]) -> Harness {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let mux = FakeMultiplexer::new();
    for record in &records {
        if let Some(session) = &record.mux_session {
            mux.add_session(session.as_str(), "ready> ");
        }
    }
    let source = ScriptedIdentitySource::new(announced);
    let (registry, _) = Registry::from_records(records);
    let registry = Arc::new(registry);

    let options = options(dir.path());
    let scheduler = Arc::new(StatusScheduler::spawn(
        Arc::clone(&registry),
        Arc::clone(&mux),
        options.batch_size,
    ));
    let manager = LifecycleManager::new(Arc::clone(&registry), Arc::clone(&mux), scheduler, options)
        .with_identity_source(source.clone())
        .with_readiness(Arc::new(AlwaysReady));

    Harness {
        _dir: dir,
        mux,
        source,
        registry,
        manager: Arc::new(manager),
    }
}

async fn announce_later(source: &ScriptedIdentitySource, id: &str) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    source.announce(id);
}

fn id(value: &str) -> InstanceId {
    InstanceId::new(value)
}

fn conv(value: &str) -> ExternalSessionId {
    ExternalSessionId::new(value)
}

// ============================================================================
// CREATE / START
// ============================================================================

#[tokio::test]
async fn test_create_claims_newly_announced_id() {
    let h = harness(Vec::new(), &["conv-old"]);

    let (report, ()) = tokio::join!(
        h.manager.create(NewInstance::new("api", "/work/api", Tool::Claude)),
        announce_later(&h.source, "conv-new"),
    );
    let report = report.unwrap();

    assert_eq!(report.identity, IdentityOutcome::Claimed(conv("conv-new")));
    let instance = h.registry.get(&report.id).unwrap();
    assert_eq!(instance.external_session_id(), Some(conv("conv-new")));
    assert!(!instance.needs_identity());

    let created = h.mux.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].command, "claude");
    assert_eq!(created[0].cwd, std::path::PathBuf::from("/work/api"));
    assert!(
        created[0]
            .env
            .contains(&(INSTANCE_ENV.to_string(), report.id.to_string()))
    );
    assert_eq!(instance.mux_session(), Some(created[0].name.clone()));
    assert_eq!(h.mux.piped().len(), 1);
}

#[tokio::test]
async fn test_concurrent_creates_never_share_an_id() {
    let h = harness(Vec::new(), &[]);

    let (first, second, (), ()) = tokio::join!(
        h.manager.create(NewInstance::new("one", "/work/p", Tool::Claude)),
        h.manager.create(NewInstance::new("two", "/work/p", Tool::Claude)),
        announce_later(&h.source, "conv-1"),
        announce_later(&h.source, "conv-2"),
    );
    let first = first.unwrap().identity;
    let second = second.unwrap().identity;

    let mut claimed = vec![first.claimed().cloned(), second.claimed().cloned()];
    claimed.sort();
    assert_eq!(claimed, vec![Some(conv("conv-1")), Some(conv("conv-2"))]);
    assert_eq!(h.registry.claimed_external_ids().len(), 2);
}

#[tokio::test]
async fn test_identity_timeout_keeps_instance_flagged() {
    let h = harness(Vec::new(), &["conv-old"]);

    let report = h
        .manager
        .create(NewInstance::new("quiet", "/work/q", Tool::Claude))
        .await
        .unwrap();

    assert_eq!(report.identity, IdentityOutcome::TimedOut);
    let instance = h.registry.get(&report.id).unwrap();
    assert_eq!(instance.external_session_id(), None);
    assert!(instance.needs_identity());
}

#[tokio::test]
async fn test_create_delivers_initial_prompt() {
    let h = harness(Vec::new(), &[]);

    let report = h
        .manager
        .create(NewInstance::new("sh", "/work/sh", Tool::Shell).prompt("make test"))
        .await
        .unwrap();

    assert_eq!(report.identity, IdentityOutcome::NotSupported);
    let session = h.registry.get(&report.id).unwrap().mux_session().unwrap();
    assert_eq!(h.mux.sent(), vec![(session.to_string(), "make test".to_string())]);
    assert_eq!(h.mux.created()[0].command, "bash");
}

#[tokio::test]
async fn test_failed_create_removes_instance() {
    let h = harness(Vec::new(), &[]);
    h.mux.set_fail_create(true);

    let err = h
        .manager
        .create(NewInstance::new("x", "/work/x", Tool::Shell))
        .await
        .unwrap_err();

    assert!(matches!(err, DeckError::Start { .. }));
    assert!(!err.is_fatal());
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_unavailable_multiplexer_is_fatal_on_start() {
    let h = harness(vec![record("u", None, None, 1)], &[]);
    h.mux.set_unavailable(true);

    let err = h.manager.start(&id("u")).await.unwrap_err();

    assert!(matches!(err, DeckError::Start { .. }));
    assert!(err.is_fatal());
    assert_eq!(h.registry.get(&id("u")).unwrap().status(), Status::Error);
}

#[tokio::test]
async fn test_start_resumes_known_conversation() {
    let h = harness(vec![record("r", None, Some("conv-r"), 1)], &[]);

    let report = h.manager.start(&id("r")).await.unwrap();

    assert_eq!(report.identity, IdentityOutcome::Claimed(conv("conv-r")));
    assert_eq!(h.mux.created()[0].command, "claude --resume conv-r");
}

// ============================================================================
// RESTART
// ============================================================================

#[tokio::test]
async fn test_restart_reuses_session_and_conversation() {
    let h = harness(vec![record("r", Some("s-r"), Some("conv-r"), 1)], &[]);

    let report = h.manager.restart(&id("r")).await.unwrap();

    assert_eq!(report.id, id("r"));
    assert_eq!(report.identity, IdentityOutcome::Claimed(conv("conv-r")));
    assert_eq!(h.mux.killed(), vec!["s-r".to_string()]);
    let created = h.mux.created();
    assert_eq!(created[0].name, MuxSessionName::new("s-r"));
    assert_eq!(created[0].command, "claude --resume conv-r");

    let instance = h.registry.get(&id("r")).unwrap();
    assert_eq!(instance.external_session_id(), Some(conv("conv-r")));
    assert_ne!(instance.status(), Status::Error);
}

#[tokio::test]
async fn test_restart_of_vanished_session_still_launches() {
    let h = harness(vec![record("r", Some("s-r"), Some("conv-r"), 1)], &[]);
    h.mux.remove_session("s-r");

    h.manager.restart(&id("r")).await.unwrap();

    assert!(h.mux.has("s-r"));
}

#[tokio::test]
async fn test_failed_restart_keeps_instance_in_error() {
    let h = harness(vec![record("r", Some("s-r"), Some("conv-r"), 1)], &[]);
    h.mux.set_fail_create(true);

    let err = h.manager.restart(&id("r")).await.unwrap_err();

    assert!(matches!(err, DeckError::Restart { .. }));
    let instance = h.registry.get(&id("r")).unwrap();
    assert_eq!(instance.status(), Status::Error);
    assert_eq!(instance.external_session_id(), Some(conv("conv-r")));
}

// ============================================================================
// FORK
// ============================================================================

#[tokio::test]
async fn test_fork_never_claims_parent_or_preexisting_ids() {
    let h = harness(
        vec![record("parent", Some("s-parent"), Some("conv-x"), 1)],
        &["conv-x", "conv-y"],
    );

    let parent = id("parent");
    let (report, ()) = tokio::join!(
        h.manager.fork(&parent, "child", "team"),
        announce_later(&h.source, "conv-z"),
    );
    let report = report.unwrap();

    assert_eq!(report.identity, IdentityOutcome::Claimed(conv("conv-z")));
    assert_eq!(
        h.mux.created()[0].command,
        "claude --resume conv-x --fork-session"
    );
    let child = h.registry.get(&report.id).unwrap();
    assert_eq!(child.project_path(), std::path::PathBuf::from("/work/project"));
    assert_eq!(child.group_path(), "team");
    assert_eq!(
        h.registry.get(&id("parent")).unwrap().external_session_id(),
        Some(conv("conv-x"))
    );
}

#[tokio::test]
async fn test_concurrent_forks_claim_distinct_ids() {
    let h = harness(
        vec![record("parent", Some("s-parent"), Some("conv-p"), 1)],
        &["conv-p"],
    );

    // Announced in the reverse order of the forks.
    let parent = id("parent");
    let (first, second, ()) = tokio::join!(
        h.manager.fork(&parent, "left", ""),
        h.manager.fork(&parent, "right", ""),
        async {
            announce_later(&h.source, "conv-y").await;
            announce_later(&h.source, "conv-x").await;
        },
    );
    let first = first.unwrap();
    let second = second.unwrap();

    let mut claimed = vec![
        first.identity.claimed().cloned(),
        second.identity.claimed().cloned(),
    ];
    claimed.sort();
    assert_eq!(claimed, vec![Some(conv("conv-x")), Some(conv("conv-y"))]);
    assert_eq!(h.registry.claimed_external_ids().len(), 3);
    assert_eq!(
        h.registry.get(&id("parent")).unwrap().external_session_id(),
        Some(conv("conv-p"))
    );
}

#[tokio::test]
async fn test_fork_without_capability_is_unsupported() {
    let mut codex = record("codex", Some("s-codex"), Some("conv-c"), 1);
    codex.tool = Tool::Codex;
    let h = harness(vec![codex], &[]);

    let err = h.manager.fork(&id("codex"), "child", "").await.unwrap_err();

    assert!(matches!(err, DeckError::Unsupported { .. }));
    assert_eq!(h.registry.len(), 1);
    assert!(h.mux.created().is_empty());
}

#[tokio::test]
async fn test_fork_without_parent_conversation_is_unsupported() {
    let h = harness(vec![record("parent", Some("s-parent"), None, 1)], &[]);

    let err = h.manager.fork(&id("parent"), "child", "").await.unwrap_err();

    assert!(matches!(err, DeckError::Unsupported { .. }));
    assert_eq!(h.registry.len(), 1);
}

// ============================================================================
// KILL / IMPORT / INPUT
// ============================================================================

#[tokio::test]
async fn test_kill_terminates_and_removes() {
    let h = harness(vec![record("k", Some("s-k"), Some("conv-k"), 1)], &[]);

    let outcome = h.manager.kill(&id("k")).await.unwrap();

    assert_eq!(outcome.warning, None);
    assert_eq!(h.mux.killed(), vec!["s-k".to_string()]);
    assert!(h.registry.is_empty());
    assert!(h.registry.claimed_external_ids().is_empty());
}

#[tokio::test]
async fn test_kill_with_missing_session_warns_but_removes() {
    let h = harness(vec![record("k", Some("s-k"), None, 1)], &[]);
    h.mux.remove_session("s-k");

    let outcome = h.manager.kill(&id("k")).await.unwrap();

    assert!(outcome.warning.is_some());
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_kill_unknown_instance_fails() {
    let h = harness(Vec::new(), &[]);

    let err = h.manager.kill(&id("ghost")).await.unwrap_err();

    assert!(matches!(err, DeckError::InstanceNotFound(_)));
}

#[tokio::test]
async fn test_import_adopts_existing_session_once() {
    let h = harness(Vec::new(), &[]);
    h.mux.add_session("external-1", "$ ");

    let imported = h
        .manager
        .import(MuxSessionName::new("external-1"), Tool::Shell, "ext", "/work/ext")
        .await
        .unwrap();
    let again = h
        .manager
        .import(MuxSessionName::new("external-1"), Tool::Shell, "ext", "/work/ext")
        .await
        .unwrap();

    assert_eq!(imported, again);
    assert_eq!(h.registry.len(), 1);
    assert_eq!(
        h.registry.get(&imported).unwrap().mux_session(),
        Some(MuxSessionName::new("external-1"))
    );
    assert!(h.mux.created().is_empty());
}

#[tokio::test]
async fn test_import_of_missing_session_fails() {
    let h = harness(Vec::new(), &[]);

    let err = h
        .manager
        .import(MuxSessionName::new("nope"), Tool::Shell, "x", "/work")
        .await
        .unwrap_err();

    assert!(err.is_session_missing());
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_send_text_types_and_submits() {
    let h = harness(vec![record("a", Some("s-a"), None, 1)], &[]);

    h.manager.send_text(&id("a"), "explain this").await.unwrap();

    assert_eq!(
        h.mux.sent(),
        vec![("s-a".to_string(), "explain this".to_string())]
    );
    assert!(
        eventually(|| h.registry.get(&id("a")).unwrap().status() == Status::Running).await
    );
}

// ============================================================================
// IDENTITY
// ============================================================================

#[tokio::test]
async fn test_redetect_after_dedup_takes_newest_unclaimed_id() {
    let h = harness(
        vec![
            record("first", Some("s-1"), Some("conv-shared"), 1),
            record("second", Some("s-2"), Some("conv-shared"), 2),
        ],
        &["conv-shared", "conv-stale", "conv-second"],
    );
    assert!(h.registry.get(&id("second")).unwrap().needs_identity());

    let outcome = h.manager.redetect_identity(&id("second")).await.unwrap();

    assert_eq!(outcome, IdentityOutcome::Claimed(conv("conv-second")));
    assert_eq!(
        h.registry.get(&id("first")).unwrap().external_session_id(),
        Some(conv("conv-shared"))
    );
}

// ============================================================================
// ATTACH
// ============================================================================

#[tokio::test]
async fn test_attach_acknowledges_and_refreshes_everything() {
    let h = harness(
        vec![
            record("a", Some("s-a"), None, 1),
            record("b", Some("s-b"), None, 2),
        ],
        &[],
    );
    // Establish baselines: first look is Running, the second settles.
    h.manager.scheduler().refresh_all().await.unwrap();
    h.manager.scheduler().refresh_all().await.unwrap();
    assert_eq!(h.registry.get(&id("a")).unwrap().status(), Status::Waiting);
    assert_eq!(h.registry.get(&id("b")).unwrap().status(), Status::Waiting);

    h.mux.on_attach(Duration::from_millis(150), |mux, _| {
        mux.set_content("s-a", "user typed here");
        mux.set_content("s-b", "b kept working");
    });

    let attach = {
        let manager = Arc::clone(&h.manager);
        tokio::spawn(async move { manager.attach(&InstanceId::new("a")).await })
    };
    assert!(eventually(|| h.manager.is_transitioning()).await);
    assert!(h.registry.get(&id("a")).unwrap().is_attached());

    // A second hand-off while the first is running is refused.
    let race = h.manager.attach(&id("b")).await.unwrap_err();
    assert!(matches!(race, DeckError::AttachRace));

    attach.await.unwrap().unwrap();
    assert!(!h.manager.is_transitioning());

    let a = h.registry.get(&id("a")).unwrap();
    assert!(!a.is_attached());
    assert!(a.acknowledged());
    assert_eq!(a.status(), Status::Idle);
    assert_eq!(h.registry.get(&id("b")).unwrap().status(), Status::Running);

    // The detach baseline holds on the next probe.
    h.manager.scheduler().refresh_all().await.unwrap();
    assert_eq!(a.status(), Status::Idle);
}

#[tokio::test]
async fn test_batch_captured_before_detach_cannot_undo_the_baseline() {
    let h = harness(vec![record("a", Some("s-a"), None, 1)], &[]);
    h.manager.scheduler().refresh_all().await.unwrap();
    h.manager.scheduler().refresh_all().await.unwrap();
    assert_eq!(h.registry.get(&id("a")).unwrap().status(), Status::Waiting);

    h.mux.set_content("s-a", "X");
    h.mux.on_attach(Duration::from_millis(150), |_, _| {});
    let attach = {
        let manager = Arc::clone(&h.manager);
        tokio::spawn(async move { manager.attach(&InstanceId::new("a")).await })
    };
    assert!(eventually(|| h.manager.is_transitioning()).await);

    // A batch reads "X" now and reports it only after detach.
    h.mux.clear_captures();
    h.mux.delay_next_capture(Duration::from_millis(300));
    assert!(
        h.manager
            .scheduler()
            .trigger_refresh(RefreshRequest::visible(vec![id("a")]))
    );
    assert!(eventually(|| h.mux.captures().contains(&"s-a".to_string())).await);
    h.mux.set_content("s-a", "Y");

    attach.await.unwrap().unwrap();

    let a = h.registry.get(&id("a")).unwrap();
    assert!(a.acknowledged());
    assert_eq!(a.status(), Status::Idle);
    assert_eq!(a.fingerprint(), Some(Fingerprint::of("Y")));

    h.manager.scheduler().refresh_all().await.unwrap();
    assert!(a.acknowledged());
    assert_eq!(a.status(), Status::Idle);
}

#[tokio::test]
async fn test_attach_without_session_fails_and_releases_guard() {
    let h = harness(vec![record("a", None, None, 1)], &[]);

    let err = h.manager.attach(&id("a")).await.unwrap_err();

    assert!(err.is_session_missing());
    assert!(!h.manager.is_transitioning());
}

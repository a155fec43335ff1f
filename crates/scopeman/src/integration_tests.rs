//
// integration_tests.rs
//
// End-to-end scenarios: editor events through the coordinator and channel
// to a scripted engine and back
//

use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::channel::AnalysisChannel;
use crate::collaborators::{DirEntry, DocumentSnapshot, ExtensionClassifier, FsDirectoryLister};
use crate::config::ScopeConfig;
use crate::coordinator::ScopeCoordinator;
use crate::correlator::OrphanPolicy;
use crate::environment::Environment;
use crate::error::HintError;
use crate::protocol::{CompletionsResponse, EngineMessage, EngineRequest, FileRequest};
use crate::test_utils::fakes::{js_listing, MemoryDocuments};
use crate::test_utils::fixture_project::FixtureProject;
use crate::test_utils::harness::CoordinatorHarness;

fn query_parts(request: EngineRequest) -> (String, String, usize, String) {
    match request {
        EngineRequest::Query {
            dir,
            file,
            offset,
            text,
        } => (dir, file, offset, text),
        other => panic!("expected query, got {other:?}"),
    }
}

#[tokio::test]
async fn test_activation_then_hints_round_trip() {
    let mut h = CoordinatorHarness::new();
    h.lister.set_listing(
        "/proj/",
        vec![DirEntry::file("/proj/a.js"), DirEntry::file("/proj/b.js")],
    );

    let doc = DocumentSnapshot::new("/proj/a.js", "var x = 1; x.");
    assert!(h.coordinator.on_editor_activated(&doc).await);
    match h.next_request().await {
        EngineRequest::Init { dir, files, env } => {
            assert_eq!(dir, "/proj/");
            assert_eq!(files, vec!["a.js", "b.js"]);
            assert!(env.is_empty());
        }
        other => panic!("expected init, got {other:?}"),
    }

    let task = h.spawn_hints("/proj/a.js", "var x = 1; x.", 13);
    let (dir, file, offset, text) = query_parts(h.next_request().await);
    assert_eq!((dir.as_str(), file.as_str(), offset), ("/proj/", "a.js", 13));
    assert_eq!(text, "var x = 1; x.");

    h.reply("/proj/", "a.js", &["toString", "valueOf"]).await;
    let session = task.await.unwrap().unwrap();
    assert_eq!(session.copy_completions(), vec!["toString", "valueOf"]);
    assert!(!h.channel().is_pending("a.js"));
}

#[tokio::test]
async fn test_get_file_served_while_query_pending() {
    let mut h = CoordinatorHarness::new();
    h.lister.set_listing("/proj/", js_listing("/proj/", 2));
    h.documents.insert("/proj/b.js", "function b() {}");
    h.coordinator
        .on_editor_activated(&DocumentSnapshot::new("/proj/a.js", ""))
        .await;
    let _ = h.next_request().await;

    let task = h.spawn_hints("/proj/a.js", "b", 1);
    let _ = h.next_request().await;

    h.channel()
        .dispatch(EngineMessage::GetFile(FileRequest {
            file: "b.js".to_string(),
        }))
        .await;
    assert_eq!(
        h.next_request().await,
        EngineRequest::FileContent {
            file: "b.js".to_string(),
            text: "function b() {}".to_string(),
        }
    );
    assert!(h.channel().is_pending("a.js"));

    h.reply("/proj/", "a.js", &["b"]).await;
    assert_eq!(task.await.unwrap().unwrap().copy_completions(), vec!["b"]);
}

#[tokio::test]
async fn test_overwritten_request_never_resolves() {
    let mut h = CoordinatorHarness::new();
    let first = h.spawn_hints("/proj/a.js", "x.y", 2);
    let _ = h.next_request().await;
    let second = h.spawn_hints("/proj/a.js", "x.y", 3);
    let (_, _, offset, _) = query_parts(h.next_request().await);
    assert_eq!(offset, 3);
    assert_eq!(h.channel().pending_count(), 1);

    h.reply("/proj/", "a.js", &["y"]).await;
    assert_eq!(second.await.unwrap().unwrap().copy_completions(), vec!["y"]);

    let first = tokio::time::timeout(Duration::from_millis(50), first).await;
    assert!(first.is_err(), "first caller must still be waiting");
}

#[tokio::test]
async fn test_notify_policy_reports_superseded() {
    let mut h = CoordinatorHarness::with_config(ScopeConfig {
        orphan_policy: OrphanPolicy::Notify,
        ..ScopeConfig::default()
    });
    let first = h.spawn_hints("/proj/a.js", "x.", 2);
    let _ = h.next_request().await;
    let second = h.spawn_hints("/proj/a.js", "x.", 2);
    let _ = h.next_request().await;

    assert_eq!(
        first.await.unwrap().unwrap_err(),
        HintError::Superseded {
            file: "a.js".to_string()
        }
    );
    h.reply("/proj/", "a.js", &["z"]).await;
    assert!(second.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_project_close_releases_orphans_and_state() {
    let mut h = CoordinatorHarness::new();
    h.coordinator
        .on_document_edited(&DocumentSnapshot::new("/proj/a.js", ""));
    let first = h.spawn_hints("/proj/a.js", "x.", 2);
    let _ = h.next_request().await;
    let _second = h.spawn_hints("/proj/a.js", "x.", 2);
    let _ = h.next_request().await;

    h.coordinator.on_project_closing();
    assert_eq!(h.coordinator.tracked_files(), 0);
    assert_eq!(
        first.await.unwrap().unwrap_err(),
        HintError::EngineGone {
            file: "a.js".to_string()
        }
    );
}

#[tokio::test]
async fn test_large_listing_is_capped() {
    let mut h = CoordinatorHarness::new();
    h.lister.set_listing("/big/", js_listing("/big/", 150));
    h.coordinator
        .on_editor_activated(&DocumentSnapshot::new("/big/f000.js", ""))
        .await;

    let files = h.init_files();
    assert_eq!(files.len(), 100);
    assert_eq!(files.first().map(String::as_str), Some("f000.js"));
    assert_eq!(files.last().map(String::as_str), Some("f099.js"));
}

#[tokio::test]
async fn test_cap_applies_before_filtering() {
    let mut h = CoordinatorHarness::new();
    let mut listing: Vec<DirEntry> = (0..100)
        .map(|i| DirEntry::file(format!("/proj/n{i:03}.txt")))
        .collect();
    listing.push(DirEntry::file("/proj/late.js"));
    h.lister.set_listing("/proj/", listing);

    h.coordinator
        .on_editor_activated(&DocumentSnapshot::new("/proj/late.js", ""))
        .await;
    assert!(h.init_files().is_empty());
}

#[tokio::test]
async fn test_text_length_limit() {
    let mut h = CoordinatorHarness::new();

    let too_long = "a".repeat(1_000_001);
    let rejected = h.spawn_hints("/proj/a.js", &too_long, 0);
    assert_eq!(
        rejected.await.unwrap().unwrap_err(),
        HintError::DocumentTooLarge {
            len: 1_000_001,
            max: 1_000_000
        }
    );
    assert!(h.drain_outbound().is_empty());
    assert!(!h.coordinator.file_state("/proj/", "a.js").active);

    let at_limit = "a".repeat(1_000_000);
    let accepted = h.spawn_hints("/proj/a.js", &at_limit, 0);
    let (_, _, _, text) = query_parts(h.next_request().await);
    assert_eq!(text.len(), 1_000_000);
    h.reply("/proj/", "a.js", &[]).await;
    assert!(accepted.await.unwrap().unwrap().copy_completions().is_empty());
}

#[tokio::test]
async fn test_limit_counts_characters_not_bytes() {
    let mut h = CoordinatorHarness::with_config(ScopeConfig {
        max_text_length: 4,
        ..ScopeConfig::default()
    });
    let task = h.spawn_hints("/proj/a.js", "\u{4E2D}\u{6587}.x", 0);
    let _ = h.next_request().await;
    h.reply("/proj/", "a.js", &["x"]).await;
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_timeout_releases_slot() {
    let mut h = CoordinatorHarness::with_config(ScopeConfig {
        request_timeout: Some(Duration::from_millis(30)),
        ..ScopeConfig::default()
    });
    let task = h.spawn_hints("/proj/a.js", "x.", 2);
    let _ = h.next_request().await;

    assert_eq!(
        task.await.unwrap().unwrap_err(),
        HintError::TimedOut {
            file: "a.js".to_string(),
            after: Duration::from_millis(30)
        }
    );
    assert!(!h.channel().is_pending("a.js"));
    assert!(!h.coordinator.file_state("/proj/", "a.js").active);

    // A late reply finds nothing to resolve.
    h.reply("/proj/", "a.js", &["late"]).await;
    assert_eq!(h.channel().pending_count(), 0);
}

#[tokio::test]
async fn test_rename_moves_state_into_new_directory() {
    let h = CoordinatorHarness::new();
    h.coordinator
        .on_document_edited(&DocumentSnapshot::new("/proj/a.js", ""));

    assert!(h.coordinator.on_file_renamed("/proj/a.js", "/moved/b.js"));
    assert_eq!(h.coordinator.tracked_files(), 1);
    assert!(h.coordinator.file_state("/moved/", "b.js").dirty_file);

    assert!(!h.coordinator.on_file_renamed("/proj/ghost.js", "/moved/c.js"));
    assert_eq!(h.coordinator.tracked_files(), 1);
}

#[tokio::test]
async fn test_listing_failure_sends_no_init() {
    let mut h = CoordinatorHarness::new();
    h.lister.set_error("/locked/", io::ErrorKind::PermissionDenied);

    let doc = DocumentSnapshot::new("/locked/a.js", "");
    assert!(!h.coordinator.on_editor_activated(&doc).await);
    assert!(h.drain_outbound().is_empty());
    assert!(h.channel().root_dir().is_none());
    assert!(h.coordinator.file_state("/locked/", "a.js").dirty_file);
}

#[tokio::test]
async fn test_stale_directory_reply_resolves_by_file_name() {
    let mut h = CoordinatorHarness::new();
    let task = h.spawn_hints("/old/a.js", "x.", 2);
    let _ = h.next_request().await;

    h.reply("/new/", "a.js", &["fromNewDir"]).await;
    assert_eq!(
        task.await.unwrap().unwrap().copy_completions(),
        vec!["fromNewDir"]
    );
}

#[tokio::test]
async fn test_definitions_travel_with_init() {
    let mut h = CoordinatorHarness::new();
    h.environment.push(json!({"!name": "ecma5"}));
    h.environment.push(json!({"!name": "browser"}));
    h.lister.set_listing("/proj/", js_listing("/proj/", 1));

    h.coordinator
        .on_editor_activated(&DocumentSnapshot::new("/proj/f000.js", ""))
        .await;
    match h.next_request().await {
        EngineRequest::Init { env, .. } => {
            let names: Vec<_> = env.iter().map(|d| d["!name"].clone()).collect();
            assert_eq!(names, vec![json!("ecma5"), json!("browser")]);
        }
        other => panic!("expected init, got {other:?}"),
    }
    assert_eq!(h.channel().session().unwrap().env_len, 2);
}

#[tokio::test]
async fn test_later_activation_wins_root() {
    let mut h = CoordinatorHarness::new();
    h.lister.set_listing("/a/", js_listing("/a/", 1));
    h.lister.set_listing("/b/", js_listing("/b/", 1));
    h.documents.insert("/b/f000.js", "var inB;");

    h.coordinator
        .on_editor_activated(&DocumentSnapshot::new("/a/f000.js", ""))
        .await;
    h.coordinator
        .on_editor_activated(&DocumentSnapshot::new("/b/f000.js", ""))
        .await;
    h.drain_outbound();
    assert_eq!(h.channel().root_dir().as_deref(), Some("/b/"));

    h.channel()
        .dispatch(EngineMessage::GetFile(FileRequest {
            file: "f000.js".to_string(),
        }))
        .await;
    assert_eq!(
        h.next_request().await,
        EngineRequest::FileContent {
            file: "f000.js".to_string(),
            text: "var inB;".to_string(),
        }
    );
}

#[tokio::test]
async fn test_run_loop_delivers_engine_replies() {
    let mut h = CoordinatorHarness::new();
    let (engine_tx, engine_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(h.channel().clone().run(engine_rx, cancel.clone()));

    let task = h.spawn_hints("/proj/a.js", "[].", 3);
    let (dir, file, offset, _) = query_parts(h.next_request().await);
    engine_tx
        .send(EngineMessage::Log("querying".to_string()))
        .unwrap();
    engine_tx
        .send(EngineMessage::Completions(CompletionsResponse {
            dir,
            file,
            offset,
            completions: vec!["push".to_string(), "pop".to_string()],
        }))
        .unwrap();

    assert_eq!(
        task.await.unwrap().unwrap().copy_completions(),
        vec!["push", "pop"]
    );
    cancel.cancel();
    run.await.unwrap();
}

#[tokio::test]
async fn test_filesystem_activation_filters_real_directory() {
    let project = FixtureProject::with_js_files(3);
    project.write(".eslintrc.js", "module.exports = {};");
    project.write("README", "docs");
    project.write("style.css", "body {}");
    project.write("lib/nested.js", "var nested;");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let channel = Arc::new(AnalysisChannel::new(
        tx,
        Arc::new(MemoryDocuments::new()),
        100,
        OrphanPolicy::Silent,
    ));
    let coordinator = ScopeCoordinator::new(
        ScopeConfig::default(),
        channel,
        Environment::new(),
        Arc::new(FsDirectoryLister),
        Arc::new(ExtensionClassifier),
    );

    let doc = DocumentSnapshot::new(project.file_path("f000.js"), "");
    assert!(coordinator.on_editor_activated(&doc).await);
    match rx.try_recv().unwrap() {
        EngineRequest::Init { dir, files, .. } => {
            assert_eq!(dir, project.root_dir());
            assert_eq!(files, vec!["f000.js", "f001.js", "f002.js"]);
        }
        other => panic!("expected init, got {other:?}"),
    }
}

#[tokio::test]
async fn test_edits_never_clear_dirty_flags() {
    let mut h = CoordinatorHarness::new();
    let doc = DocumentSnapshot::new("/proj/a.js", "x.");
    h.coordinator.on_document_edited(&doc);

    let task = h.spawn_hints("/proj/a.js", "x.", 2);
    let _ = h.next_request().await;
    h.reply("/proj/", "a.js", &["y"]).await;
    task.await.unwrap().unwrap();

    let state = h.coordinator.file_state("/proj/", "a.js");
    assert!(state.dirty_file);
    assert!(state.dirty_scope);
    assert!(h.coordinator.is_scope_dirty(&doc));
}

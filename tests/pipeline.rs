//! End-to-end indexing and chat through [`App`] with deterministic providers.

mod common;

use common::{test_app, test_config, write_file, write_pdf};
use onboard_rag::error::RagError;
use onboard_rag::index::VectorIndex;
use onboard_rag::models::{Role, SessionKey};
use std::path::Path;
use tempfile::TempDir;

#[tokio::test]
async fn partial_failure_indexes_valid_sources_only() {
    let tmp = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    let valid = write_pdf(docs.path(), "valid.pdf", "orientation week starts on monday");
    let missing = docs.path().join("missing.xyz").to_string_lossy().into_owned();

    let (app, _) = test_app(test_config(tmp.path())).await;
    let report = app
        .index_sources(&[valid.clone(), missing.clone()])
        .await
        .unwrap();

    assert_eq!(report.documents, 1);
    assert!(report.added >= 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source, missing);

    let index = app.handle().snapshot().unwrap();
    let sources = index.sources().await.unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].0, valid);
}

#[tokio::test]
async fn all_failed_batch_leaves_store_untouched() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let persist_dir = config.store.persist_dir.clone();
    let (app, _) = test_app(config).await;

    let err = app
        .index_sources(&["missing.xyz".to_string(), "/nowhere/handbook.pdf".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::NoDocumentsLoaded));
    assert!(!app.handle().is_ready());
    assert!(!VectorIndex::exists(&persist_dir));
}

#[tokio::test]
async fn all_failed_batch_keeps_existing_entries() {
    let tmp = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    let valid = write_pdf(docs.path(), "valid.pdf", "library opens at nine");
    let (app, _) = test_app(test_config(tmp.path())).await;
    app.index_sources(&[valid]).await.unwrap();
    let before = app.indexed_chunks().await.unwrap();

    assert!(app.index_sources(&["nope.xyz".to_string()]).await.is_err());
    assert_eq!(app.indexed_chunks().await.unwrap(), before);
}

#[tokio::test]
async fn empty_source_list_is_bad_input() {
    let tmp = TempDir::new().unwrap();
    let (app, _) = test_app(test_config(tmp.path())).await;
    let err = app.index_sources(&[]).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
}

#[tokio::test]
async fn reindexing_same_source_skips_duplicates() {
    let tmp = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    let valid = write_pdf(docs.path(), "valid.pdf", "mess timings are posted weekly");
    let (app, _) = test_app(test_config(tmp.path())).await;

    let first = app.index_sources(&[valid.clone()]).await.unwrap();
    let second = app.index_sources(&[valid]).await.unwrap();

    assert_eq!(second.added, 0);
    assert_eq!(second.skipped, first.added);
    assert_eq!(app.indexed_chunks().await.unwrap(), Some(first.added as i64));
}

#[tokio::test]
async fn index_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    let notes = write_file(
        docs.path(),
        "notes.md",
        b"# Library\n\nThe library lends up to five books per student.",
    );

    let count = {
        let (app, _) = test_app(test_config(tmp.path())).await;
        app.index_sources(&[notes.clone()]).await.unwrap();
        let index = app.handle().snapshot().unwrap();
        let count = index.count().await.unwrap();
        index.close().await;
        app.memory().close().await;
        count
    };

    let (app, _) = test_app(test_config(tmp.path())).await;
    assert!(app.handle().is_ready());
    assert_eq!(app.indexed_chunks().await.unwrap(), Some(count));

    let (answer, _) = app
        .chat("How many books can I borrow?", "alice", None)
        .await
        .unwrap();
    assert_eq!(answer.sources.into_iter().collect::<Vec<_>>(), vec![notes]);
}

#[tokio::test]
async fn chat_before_indexing_is_not_ready() {
    let tmp = TempDir::new().unwrap();
    let (app, _) = test_app(test_config(tmp.path())).await;
    let err = app.chat("hello", "alice", None).await.unwrap_err();
    assert!(matches!(err, RagError::NotReady));
}

#[tokio::test]
async fn sources_come_from_retrieved_chunks() {
    let tmp = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    let about = write_pdf(docs.path(), "about.pdf", "hostel rooms are allotted in the first week");
    let fees = write_file(
        docs.path(),
        "fees.txt",
        b"tuition fees are paid at the start of each semester",
    );

    let mut config = test_config(tmp.path());
    config.retrieval.k = 1;
    config.retrieval.fetch_k = 2;
    let (app, _) = test_app(config).await;
    app.index_sources(&[about.clone(), fees]).await.unwrap();

    let (answer, _) = app
        .chat("when are hostel rooms allotted", "alice", None)
        .await
        .unwrap();

    assert_eq!(answer.sources.len(), 1);
    assert!(answer.sources.contains(&about));
    assert!(Path::new(&about).ends_with("about.pdf"));
}

#[tokio::test]
async fn sessions_are_isolated_across_users() {
    let tmp = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    let notes = write_file(docs.path(), "notes.txt", b"the gym is open from six to ten");
    let (app, _) = test_app(test_config(tmp.path())).await;
    app.index_sources(&[notes]).await.unwrap();

    app.chat("when is the gym open", "alice", Some("s1".to_string()))
        .await
        .unwrap();

    let alice = app.memory().load(&SessionKey::new("alice", "s1")).await.unwrap();
    let bob = app.memory().load(&SessionKey::new("bob", "s1")).await.unwrap();
    assert_eq!(alice.len(), 2);
    assert_eq!(alice[0].role, Role::Human);
    assert_eq!(alice[0].content, "when is the gym open");
    assert!(bob.is_empty());
}

#[tokio::test]
async fn follow_up_uses_history_aware_rewrite() {
    let tmp = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    let notes = write_file(docs.path(), "notes.txt", b"the gym is open from six to ten");
    let (app, chat) = test_app(test_config(tmp.path())).await;
    app.index_sources(&[notes]).await.unwrap();

    let (first, key) = app.chat("when is the gym open", "alice", None).await.unwrap();
    assert_eq!(first.standalone_query, "when is the gym open");
    let (second, _) = app
        .chat("when is the gym open", "alice", Some(key.session_id.clone()))
        .await
        .unwrap();

    // A question that already stands alone comes back unchanged.
    assert_eq!(second.standalone_query, "when is the gym open");

    let requests = chat.requests();
    let contextualize = requests
        .iter()
        .find(|r| {
            r.system
                .as_deref()
                .is_some_and(|s| s.starts_with("Given a chat history"))
        })
        .expect("history-aware rewrite request");
    assert_eq!(contextualize.messages.len(), 3);
    assert_eq!(contextualize.messages[1].role, Role::Assistant);
}

#[tokio::test]
async fn memory_window_keeps_last_five_pairs() {
    let tmp = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    let notes = write_file(docs.path(), "notes.txt", b"the canteen serves lunch at noon");
    let (app, _) = test_app(test_config(tmp.path())).await;
    app.index_sources(&[notes]).await.unwrap();

    let session = Some("window".to_string());
    for i in 1..=7 {
        app.chat(&format!("question {}", i), "alice", session.clone())
            .await
            .unwrap();
    }

    let turns = app
        .memory()
        .load(&SessionKey::new("alice", "window"))
        .await
        .unwrap();
    assert_eq!(turns.len(), 10);
    let questions: Vec<_> = turns
        .iter()
        .filter(|t| t.role == Role::Human)
        .map(|t| t.content.as_str())
        .collect();
    assert_eq!(
        questions,
        vec!["question 3", "question 4", "question 5", "question 6", "question 7"]
    );
}

#[tokio::test]
async fn empty_query_or_user_is_bad_input() {
    let tmp = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    let notes = write_file(docs.path(), "notes.txt", b"the canteen serves lunch at noon");
    let (app, _) = test_app(test_config(tmp.path())).await;
    app.index_sources(&[notes]).await.unwrap();

    assert!(matches!(
        app.chat("   ", "alice", None).await.unwrap_err(),
        RagError::InvalidInput(_)
    ));
    assert!(matches!(
        app.chat("hi", "", None).await.unwrap_err(),
        RagError::InvalidInput(_)
    ));
}

#[tokio::test]
async fn cold_start_indexes_manifest_once() {
    let tmp = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    let notes = write_file(docs.path(), "notes.txt", b"the canteen serves lunch at noon");
    let manifest = docs.path().join("data.json");
    std::fs::write(
        &manifest,
        serde_json::json!({ "documents": [notes] }).to_string(),
    )
    .unwrap();

    let mut config = test_config(tmp.path());
    config.manifest.path = Some(manifest);
    let (app, _) = test_app(config).await;

    let report = app.cold_start().await.unwrap().expect("manifest indexed");
    assert_eq!(report.documents, 1);
    assert!(app.handle().is_ready());
    assert!(app.cold_start().await.unwrap().is_none());
}

#[tokio::test]
async fn huge_retention_keeps_history() {
    let tmp = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    let notes = write_file(docs.path(), "notes.txt", b"the canteen serves lunch at noon");
    let mut config = test_config(tmp.path());
    config.memory.retention_days = Some(u64::MAX);
    let (app, _) = test_app(config).await;
    app.index_sources(&[notes]).await.unwrap();

    app.chat("when is lunch", "alice", Some("s".to_string()))
        .await
        .unwrap();

    assert_eq!(app.prune_history().await.unwrap(), 0);
    let turns = app.memory().load(&SessionKey::new("alice", "s")).await.unwrap();
    assert_eq!(turns.len(), 2);
}

#[tokio::test]
async fn initialized_but_empty_index_is_not_ready() {
    let tmp = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    let notes = write_file(docs.path(), "notes.txt", b"the gym is open from six to ten");
    let config = test_config(tmp.path());
    onboard_rag::migrate::run_migrations(&config).await.unwrap();
    assert!(VectorIndex::exists(&config.store.persist_dir));

    let (app, _) = test_app(config).await;
    assert!(!app.handle().is_ready());
    assert!(matches!(
        app.chat("when is the gym open", "alice", None).await.unwrap_err(),
        RagError::NotReady
    ));

    app.index_sources(&[notes]).await.unwrap();
    assert!(app.handle().is_ready());
    let (answer, _) = app.chat("when is the gym open", "alice", None).await.unwrap();
    assert_eq!(answer.sources.len(), 1);
}

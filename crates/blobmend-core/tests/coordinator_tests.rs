//! End-to-end rename runs against an in-memory SQLite database and both
//! object store backends.

use async_trait::async_trait;
use blobmend::{
    BlobmendError, CopyBehavior, CopyStatus, Coordinator, FsObjectStore, ListPage,
    MemoryObjectStore, NullReporter, ObjectStore, PostsSchema, ProgressReporter, RecordId,
    ReferenceMatch, ReferenceStore, RenameConfig, RenameOutcome, RetryConfig, RunSummary,
    SqliteReferenceStore,
};
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn posts(rows: &[(i64, &str, &str)]) -> Arc<SqliteReferenceStore> {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE Post (Id INTEGER PRIMARY KEY, Title TEXT, PostContent TEXT);")
        .unwrap();
    for (id, title, body) in rows {
        conn.execute(
            "INSERT INTO Post (Id, Title, PostContent) VALUES (?1, ?2, ?3)",
            params![id, title, body],
        )
        .unwrap();
    }
    Arc::new(SqliteReferenceStore::from_connection(conn, PostsSchema::default()).unwrap())
}

fn body(store: &SqliteReferenceStore, id: i64) -> String {
    store.body_of(&RecordId::Integer(id)).unwrap().unwrap()
}

fn media(names: &[&str]) -> Arc<MemoryObjectStore> {
    let store = MemoryObjectStore::new("media").unwrap();
    for (i, name) in names.iter().enumerate() {
        let modified = Utc.with_ymd_and_hms(2024, 3, 1 + i as u32, 12, 0, 0).unwrap();
        store.insert(*name, name.as_bytes(), modified).unwrap();
    }
    Arc::new(store)
}

fn config() -> RenameConfig {
    RenameConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_copy_timeout(Duration::from_secs(1))
        .with_listing_retry(RetryConfig::new().with_base_delay(Duration::from_millis(1)))
}

/// Records outcome labels in the order the reporter saw them.
#[derive(Default)]
struct RecordingReporter {
    events: Mutex<Vec<String>>,
}

impl ProgressReporter for RecordingReporter {
    fn candidates_found(&self, count: usize) {
        self.events.lock().unwrap().push(format!("candidates:{count}"));
    }

    fn outcome(&self, asset_name: &str, outcome: &RenameOutcome) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{asset_name}:{}", outcome.label()));
    }

    fn finished(&self, summary: &RunSummary) {
        self.events
            .lock()
            .unwrap()
            .push(format!("finished:{}", summary.renamed));
    }
}

/// Delegates to SQLite but fails every replace after the first `allowed`.
struct FailingReplaces {
    inner: Arc<SqliteReferenceStore>,
    allowed: u32,
    calls: AtomicU32,
}

impl ReferenceStore for FailingReplaces {
    fn find_first_containing(&self, needle: &str) -> blobmend::Result<Option<ReferenceMatch>> {
        self.inner.find_first_containing(needle)
    }

    fn replace_in_body(
        &self,
        record_id: &RecordId,
        from: &str,
        to: &str,
    ) -> blobmend::Result<usize> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(BlobmendError::StoreUnavailable {
                message: "database is locked".to_string(),
                source: None,
            });
        }
        self.inner.replace_in_body(record_id, from, to)
    }
}

/// Delegates to SQLite but fails every lookup for one asset name.
struct FailingLookup {
    inner: Arc<SqliteReferenceStore>,
    broken: &'static str,
}

impl ReferenceStore for FailingLookup {
    fn find_first_containing(&self, needle: &str) -> blobmend::Result<Option<ReferenceMatch>> {
        if needle == self.broken {
            return Err(BlobmendError::StoreUnavailable {
                message: "database is locked".to_string(),
                source: None,
            });
        }
        self.inner.find_first_containing(needle)
    }

    fn replace_in_body(
        &self,
        record_id: &RecordId,
        from: &str,
        to: &str,
    ) -> blobmend::Result<usize> {
        self.inner.replace_in_body(record_id, from, to)
    }
}

/// Memory store whose copies out of one source name always fail to start.
struct RefusingCopy {
    inner: Arc<MemoryObjectStore>,
    refused: &'static str,
}

#[async_trait]
impl ObjectStore for RefusingCopy {
    fn container(&self) -> &str {
        self.inner.container()
    }

    async fn list_page(
        &self,
        marker: Option<&str>,
        max_results: usize,
    ) -> blobmend::Result<ListPage> {
        self.inner.list_page(marker, max_results).await
    }

    async fn start_copy(&self, source: &str, target: &str) -> blobmend::Result<CopyStatus> {
        if source == self.refused {
            return Err(BlobmendError::Storage {
                message: "copy rejected".to_string(),
                source: None,
            });
        }
        self.inner.start_copy(source, target).await
    }

    async fn copy_status(&self, target: &str) -> blobmend::Result<CopyStatus> {
        self.inner.copy_status(target).await
    }

    async fn abort_copy(&self, target: &str) -> blobmend::Result<()> {
        self.inner.abort_copy(target).await
    }

    async fn delete(&self, name: &str) -> blobmend::Result<()> {
        self.inner.delete(name).await
    }

    async fn exists(&self, name: &str) -> blobmend::Result<bool> {
        self.inner.exists(name).await
    }
}

#[tokio::test]
async fn test_referenced_asset_is_renamed() {
    let references = posts(&[(1, "Hello", r#"<p><img src="/abc123.jpg"></p>"#)]);
    let objects = media(&["abc123.jpg"]);
    let coordinator =
        Coordinator::new(config(), references.clone(), objects.clone(), Arc::new(NullReporter))
            .unwrap();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.renamed, 1);
    assert!(summary.is_clean());
    let names = objects.names().unwrap();
    assert_eq!(names.len(), 1);
    let new_name = &names[0];
    assert!(new_name.starts_with("img-"));
    assert!(new_name.ends_with(".jpg"));
    assert_eq!(
        body(&references, 1),
        format!(r#"<p><img src="/{}"></p>"#, new_name)
    );
    assert_eq!(objects.get(new_name).unwrap().unwrap(), b"abc123.jpg");
}

#[tokio::test]
async fn test_unreferenced_asset_is_listed_for_deletion() {
    let references = posts(&[(1, "Hello", "no images")]);
    let objects = media(&["logo.png"]);
    let coordinator =
        Coordinator::new(config(), references, objects.clone(), Arc::new(NullReporter)).unwrap();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.renamed, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.unreferenced, vec!["logo.png".to_string()]);
    assert_eq!(objects.names().unwrap(), vec!["logo.png".to_string()]);
}

#[tokio::test]
async fn test_failed_copy_restores_reference() {
    let original = r#"<img src="/abc123.jpg">"#;
    let references = posts(&[(1, "Hello", original)]);
    let objects = media(&["abc123.jpg"]);
    objects
        .set_copy_behavior(CopyBehavior::EndWith(CopyStatus::Failed))
        .unwrap();
    let coordinator =
        Coordinator::new(config(), references.clone(), objects.clone(), Arc::new(NullReporter))
            .unwrap();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.rolled_back, 1);
    assert_eq!(summary.renamed, 0);
    assert!(!summary.is_clean());
    assert_eq!(body(&references, 1), original);
    assert_eq!(objects.names().unwrap(), vec!["abc123.jpg".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_copy_times_out_and_rolls_back() {
    let original = r#"<img src="/abc123.jpg">"#;
    let references = posts(&[(1, "Hello", original)]);
    let objects = media(&["abc123.jpg"]);
    objects.set_copy_behavior(CopyBehavior::Never).unwrap();
    let coordinator =
        Coordinator::new(config(), references.clone(), objects.clone(), Arc::new(NullReporter))
            .unwrap();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.rolled_back, 1);
    assert_eq!(body(&references, 1), original);
    assert!(objects.get("abc123.jpg").unwrap().is_some());
}

#[tokio::test]
async fn test_failed_rollback_is_unrecoverable() {
    let inner = posts(&[(1, "Hello", r#"<img src="/abc123.jpg">"#)]);
    let references = Arc::new(FailingReplaces {
        inner: inner.clone(),
        allowed: 1,
        calls: AtomicU32::new(0),
    });
    let objects = media(&["abc123.jpg"]);
    objects
        .set_copy_behavior(CopyBehavior::EndWith(CopyStatus::Aborted))
        .unwrap();
    let coordinator =
        Coordinator::new(config(), references, objects, Arc::new(NullReporter)).unwrap();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.unrecoverable, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.inconsistent.len(), 1);
    let plan = &summary.inconsistent[0];
    assert_eq!(plan.old_name, "abc123.jpg");
    assert!(body(&inner, 1).contains(&plan.new_reference()));
}

#[tokio::test]
async fn test_conformant_assets_are_left_alone() {
    let references = posts(&[(1, "Hello", r#"<img src="/img-0001.jpg">"#)]);
    let objects = media(&["img-0001.jpg"]);
    let reporter = Arc::new(RecordingReporter::default());
    let coordinator =
        Coordinator::new(config(), references, objects.clone(), reporter.clone()).unwrap();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.listed, 1);
    assert_eq!(summary.candidates, 0);
    assert_eq!(
        *reporter.events.lock().unwrap(),
        vec!["candidates:0".to_string(), "finished:0".to_string()]
    );
    assert_eq!(objects.names().unwrap(), vec!["img-0001.jpg".to_string()]);
}

#[tokio::test]
async fn test_second_run_renames_nothing() {
    let references = posts(&[
        (1, "One", r#"<img src="/a.jpg">"#),
        (2, "Two", r#"<img src="/b.png">"#),
    ]);
    let objects = media(&["a.jpg", "b.png", "orphan.gif"]);
    let coordinator =
        Coordinator::new(config(), references, objects, Arc::new(NullReporter)).unwrap();

    let first = coordinator.run().await.unwrap();
    assert_eq!(first.renamed, 2);
    assert_eq!(first.unreferenced, vec!["orphan.gif".to_string()]);

    let second = coordinator.run().await.unwrap();
    assert_eq!(second.candidates, 1);
    assert_eq!(second.renamed, 0);
}

#[tokio::test]
async fn test_candidates_processed_newest_first() {
    let references = posts(&[]);
    let objects = media(&["first.jpg", "second.jpg", "third.jpg"]);
    let reporter = Arc::new(RecordingReporter::default());
    let coordinator =
        Coordinator::new(config(), references, objects, reporter.clone()).unwrap();

    coordinator.run().await.unwrap();

    assert_eq!(
        *reporter.events.lock().unwrap(),
        vec![
            "candidates:3".to_string(),
            "third.jpg:skipped_no_reference".to_string(),
            "second.jpg:skipped_no_reference".to_string(),
            "first.jpg:skipped_no_reference".to_string(),
            "finished:0".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_shared_reference_only_first_post_updated() {
    let shared = r#"<img src="/abc123.jpg">"#;
    let references = posts(&[(1, "One", shared), (2, "Two", shared)]);
    let objects = media(&["abc123.jpg"]);
    let coordinator =
        Coordinator::new(config(), references.clone(), objects, Arc::new(NullReporter)).unwrap();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.renamed, 1);
    assert_ne!(body(&references, 1), shared);
    assert_eq!(body(&references, 2), shared);
}

#[tokio::test]
async fn test_listing_failure_aborts_run() {
    let objects = media(&["abc123.jpg"]);
    objects.fail_next_lists(10).unwrap();
    let coordinator =
        Coordinator::new(config(), posts(&[]), objects.clone(), Arc::new(NullReporter)).unwrap();

    let err = coordinator.run().await.unwrap_err();

    match err {
        BlobmendError::StorageUnavailable { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(objects.list_calls().unwrap(), 3);
}

#[tokio::test]
async fn test_transient_listing_failure_is_retried() {
    let references = posts(&[(1, "Hello", r#"<img src="/abc123.jpg">"#)]);
    let objects = media(&["abc123.jpg"]);
    objects.fail_next_lists(1).unwrap();
    let coordinator =
        Coordinator::new(config(), references, objects, Arc::new(NullReporter)).unwrap();

    let summary = coordinator.run().await.unwrap();
    assert_eq!(summary.renamed, 1);
}

#[tokio::test]
async fn test_directory_store_end_to_end() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let container = temp_dir.path().join("media");
    std::fs::create_dir_all(container.join("thumbs")).unwrap();
    std::fs::write(container.join("abc123.jpg"), b"jpeg bytes").unwrap();
    std::fs::write(container.join("img-ready.png"), b"png bytes").unwrap();

    let db_path = temp_dir.path().join("blog.db");
    {
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE Post (Id INTEGER PRIMARY KEY, Title TEXT, PostContent TEXT);
            INSERT INTO Post VALUES (7, 'Trip', '<img src="/abc123.jpg">');
            "#,
        )
        .unwrap();
    }

    let objects = Arc::new(FsObjectStore::open(temp_dir.path(), "media").unwrap());
    let references = Arc::new(SqliteReferenceStore::open(&db_path, PostsSchema::default()).unwrap());
    let coordinator =
        Coordinator::new(config(), references.clone(), objects, Arc::new(NullReporter)).unwrap();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.listed, 2);
    assert_eq!(summary.renamed, 1);
    assert!(!container.join("abc123.jpg").exists());

    let renamed: Vec<String> = std::fs::read_dir(&container)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "img-ready.png")
        .collect();
    assert_eq!(renamed.len(), 1);
    assert_eq!(std::fs::read(container.join(&renamed[0])).unwrap(), b"jpeg bytes");
    assert_eq!(
        references.body_of(&RecordId::Integer(7)).unwrap().unwrap(),
        format!(r#"<img src="/{}">"#, renamed[0])
    );
    assert!(container.join("thumbs").is_dir());
}

#[tokio::test]
async fn test_one_candidate_failing_does_not_stop_the_run() {
    let inner = posts(&[
        (1, "Locked", r#"<img src="/locked.jpg">"#),
        (2, "Refused", r#"<img src="/refused.jpg">"#),
        (3, "Fine", r#"<img src="/fine.jpg">"#),
    ]);
    let references = Arc::new(FailingLookup {
        inner: inner.clone(),
        broken: "locked.jpg",
    });
    let memory = media(&["fine.jpg", "refused.jpg", "locked.jpg"]);
    let objects = Arc::new(RefusingCopy {
        inner: memory.clone(),
        refused: "refused.jpg",
    });
    let reporter = Arc::new(RecordingReporter::default());
    let coordinator = Coordinator::new(config(), references, objects, reporter.clone()).unwrap();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.rolled_back, 1);
    assert_eq!(summary.renamed, 1);
    assert_eq!(summary.unrecoverable, 0);
    assert_eq!(
        *reporter.events.lock().unwrap(),
        vec![
            "candidates:3".to_string(),
            "locked.jpg:failed".to_string(),
            "refused.jpg:rolled_back".to_string(),
            "fine.jpg:renamed".to_string(),
            "finished:1".to_string(),
        ]
    );

    assert_eq!(body(&inner, 1), r#"<img src="/locked.jpg">"#);
    assert_eq!(body(&inner, 2), r#"<img src="/refused.jpg">"#);
    assert_ne!(body(&inner, 3), r#"<img src="/fine.jpg">"#);
    let names = memory.names().unwrap();
    assert!(names.contains(&"locked.jpg".to_string()));
    assert!(names.contains(&"refused.jpg".to_string()));
    assert!(!names.contains(&"fine.jpg".to_string()));
}

#[tokio::test]
async fn test_underscore_name_resolves_to_its_own_post() {
    let references = posts(&[
        (1, "Lookalike", r#"<img src="/imgx1234.jpg">"#),
        (2, "Camera", r#"<img src="/IMG_1234.jpg">"#),
    ]);
    let objects = media(&["IMG_1234.jpg"]);
    let coordinator =
        Coordinator::new(config(), references.clone(), objects, Arc::new(NullReporter)).unwrap();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.renamed, 1);
    assert_eq!(body(&references, 1), r#"<img src="/imgx1234.jpg">"#);
    assert_ne!(body(&references, 2), r#"<img src="/IMG_1234.jpg">"#);
}

#[tokio::test(start_paused = true)]
async fn test_huge_copy_timeout_does_not_panic() {
    let references = posts(&[(1, "Hello", r#"<img src="/abc123.jpg">"#)]);
    let objects = media(&["abc123.jpg"]);
    objects.set_copy_behavior(CopyBehavior::AfterPolls(2)).unwrap();
    let config = config().with_copy_timeout(Duration::from_secs(u64::MAX));
    let coordinator =
        Coordinator::new(config, references, objects, Arc::new(NullReporter)).unwrap();

    let summary = coordinator.run().await.unwrap();
    assert_eq!(summary.renamed, 1);
}

//! SQLite store round trips through the public connect() entry point.

use kcidb_store::{connect, ObjectKind, SqliteStore, StoreClient, StoreError, StoreUrl};
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use tempfile::TempDir;

fn submission() -> serde_json::Value {
    json!({
        "version": {"major": 5, "minor": 3},
        "checkouts": [{
            "id": "lab:c1",
            "origin": "lab",
            "tree_name": "mainline",
            "git_repository_url": "https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git"
        }],
        "builds": [{"id": "lab:b1", "origin": "lab", "checkout_id": "lab:c1"}],
        "tests": [
            {"id": "lab:t1", "origin": "lab", "build_id": "lab:b1", "status": "PASS"},
            {"id": "lab:t2", "origin": "lab", "build_id": "lab:b1", "status": "FAIL"}
        ],
        "issues": [{"id": "lab:i1", "origin": "lab", "version": 1}],
    })
}

#[tokio::test]
async fn test_load_writes_every_collection() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db").join("kcidb.sqlite3");
    let store = SqliteStore::open(&path).await.unwrap();

    let report = store.load(&submission()).await.unwrap();
    assert_eq!(report.checkouts, 1);
    assert_eq!(report.builds, 1);
    assert_eq!(report.tests, 2);
    assert_eq!(report.issues, 1);
    assert_eq!(report.incidents, 0);

    assert_eq!(store.count(ObjectKind::Test).await.unwrap(), 2);
    let checkout = store.fetch(ObjectKind::Checkout, "lab:c1").await.unwrap().unwrap();
    assert_eq!(checkout["tree_name"], "mainline");
}

#[tokio::test]
async fn test_reload_replaces_existing_rows() {
    let temp = TempDir::new().unwrap();
    let store = SqliteStore::open(&temp.path().join("kcidb.sqlite3")).await.unwrap();

    store.load(&submission()).await.unwrap();
    let mut updated = submission();
    updated["tests"][0]["status"] = json!("FAIL");
    store.load(&updated).await.unwrap();

    assert_eq!(store.count(ObjectKind::Test).await.unwrap(), 2);
    let test = store.fetch(ObjectKind::Test, "lab:t1").await.unwrap().unwrap();
    assert_eq!(test["status"], "FAIL");
}

#[tokio::test]
async fn test_issue_versions_are_kept_side_by_side() {
    let temp = TempDir::new().unwrap();
    let store = SqliteStore::open(&temp.path().join("kcidb.sqlite3")).await.unwrap();

    store.load(&submission()).await.unwrap();
    store
        .load(&json!({"issues": [{"id": "lab:i1", "origin": "lab", "version": 2, "comment": "v2"}]}))
        .await
        .unwrap();

    assert_eq!(store.count(ObjectKind::Issue).await.unwrap(), 2);
    let latest = store.fetch(ObjectKind::Issue, "lab:i1").await.unwrap().unwrap();
    assert_eq!(latest["comment"], "v2");
}

#[tokio::test]
async fn test_object_without_id_is_rejected_before_writing() {
    let temp = TempDir::new().unwrap();
    let store = SqliteStore::open(&temp.path().join("kcidb.sqlite3")).await.unwrap();

    let mut broken = submission();
    broken["tests"][1] = json!({"origin": "lab"});
    let err = store.load(&broken).await.unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
    assert_eq!(store.count(ObjectKind::Checkout).await.unwrap(), 0);
}

#[tokio::test]
async fn test_database_error_rolls_back_earlier_rows() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kcidb.sqlite3");
    let store = SqliteStore::open(&path).await.unwrap();

    // Fail the second test row, after the checkout, build and first test went in.
    let admin = SqlitePool::connect_with(SqliteConnectOptions::new().filename(&path))
        .await
        .unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_t2 BEFORE INSERT ON tests WHEN NEW.id = 'lab:t2' \
         BEGIN SELECT RAISE(ABORT, 'rejected by trigger'); END",
    )
    .execute(&admin)
    .await
    .unwrap();
    admin.close().await;

    let err = store.load(&submission()).await.unwrap_err();
    assert!(err.to_string().contains("rejected by trigger"), "{err}");
    for kind in [ObjectKind::Checkout, ObjectKind::Build, ObjectKind::Test] {
        assert_eq!(store.count(kind).await.unwrap(), 0, "{kind}");
    }
}

#[tokio::test]
async fn test_connect_dispatches_on_target() {
    let temp = TempDir::new().unwrap();
    let raw = format!("sqlite:{}", temp.path().join("kcidb.sqlite3").display());
    let url = StoreUrl::parse(&raw).unwrap();

    let store = connect(&url, None).await.unwrap();
    assert_eq!(store.describe(), raw);
    store.load(&submission()).await.unwrap();

    let memory = connect(&StoreUrl::Memory, None).await.unwrap();
    assert_eq!(memory.describe(), "memory:");
}

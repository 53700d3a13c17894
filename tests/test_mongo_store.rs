#![cfg(feature = "mongo")]

use std::collections::BTreeSet;
use std::sync::Arc;

use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::mongo::Mongo;

use lernhilfe::access::session::{AccessSessionStore, MongoAccessSessionStore};
use lernhilfe::db::models::{DocumentRequest, HilfeDocument, ListQuery, SortOrder, UnitSpec};
use lernhilfe::db::repository::{DocumentRepository, MongoDocumentRepository};
use lernhilfe::error::AppError;

/// A MongoDB container plus both Mongo-backed stores.
struct MongoEnv {
    _mongo: ContainerAsync<Mongo>,
    db: mongodb::Database,
    repo: MongoDocumentRepository,
    sessions: Arc<MongoAccessSessionStore>,
}

impl MongoEnv {
    async fn start() -> Self {
        let mongo = Mongo::default()
            .start()
            .await
            .expect("Failed to start MongoDB container");
        let port = mongo
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get MongoDB port");
        let client = mongodb::Client::with_uri_str(format!("mongodb://127.0.0.1:{}", port))
            .await
            .expect("Failed to connect to MongoDB");
        let db = client.database("lernhilfe_test");

        let sessions = MongoAccessSessionStore::new(&db);
        sessions
            .ensure_indexes(chrono::Duration::hours(24))
            .await
            .expect("Failed to create indexes");

        Self {
            _mongo: mongo,
            repo: MongoDocumentRepository::new(&db),
            sessions: Arc::new(sessions),
            db,
        }
    }
}

fn document(title: &str, subject: &str, owner: &str) -> HilfeDocument {
    let draft = DocumentRequest {
        title: title.to_string(),
        subject: Some(subject.to_string()),
        units: vec![
            UnitSpec {
                content: "open".to_string(),
                ..Default::default()
            },
            UnitSpec {
                content: "gated".to_string(),
                locked: true,
                lock_code: Some("42".to_string()),
                ..Default::default()
            },
        ],
        expected_revision: None,
    }
    .into_draft()
    .unwrap();
    HilfeDocument::from_draft(draft, Some(owner.to_string()))
}

#[tokio::test]
async fn document_repository_round_trip() {
    let env = MongoEnv::start().await;
    let doc = document("Algebra", "Mathematik", "demo-teacher");

    env.repo.insert(&doc).await.unwrap();
    let stored = env.repo.find_by_id(&doc.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "Algebra");
    assert_eq!(stored.units[1].lock_code.as_deref(), Some("42"));
    assert!(env.repo.find_by_id("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn replace_checks_expected_revision() {
    let env = MongoEnv::start().await;
    let doc = document("Algebra", "Mathematik", "demo-teacher");
    env.repo.insert(&doc).await.unwrap();

    let mut next = doc.clone();
    next.title = "Algebra II".to_string();
    next.revision = 1;
    env.repo.replace(&next, Some(0)).await.unwrap();

    let stale = env.repo.replace(&next, Some(0)).await;
    assert!(matches!(stale, Err(AppError::Conflict(_))));

    let mut ghost = doc.clone();
    ghost.id = "ghost".to_string();
    assert!(matches!(
        env.repo.replace(&ghost, None).await,
        Err(AppError::NotFound(_))
    ));

    env.repo.delete(&doc.id).await.unwrap();
    assert!(matches!(
        env.repo.delete(&doc.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn list_by_owner_filters_and_sorts() {
    let env = MongoEnv::start().await;
    for (title, subject, owner) in [
        ("Geometrie", "Mathematik", "demo-teacher"),
        ("Atome", "Chemie", "demo-teacher"),
        ("Bruchrechnung", "Mathematik", "demo-teacher"),
        ("Fremd", "Mathematik", "demo-tutor"),
    ] {
        env.repo
            .insert(&document(title, subject, owner))
            .await
            .unwrap();
    }

    let query = ListQuery {
        subject: Some("Mathematik".to_string()),
        sort: Some(SortOrder::TitleAsc),
    };
    let titles: Vec<String> = env
        .repo
        .list_by_owner("demo-teacher", &query)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.title)
        .collect();
    assert_eq!(titles, vec!["Bruchrechnung", "Geometrie"]);
}

#[tokio::test]
async fn access_sessions_accumulate_and_reset() {
    let env = MongoEnv::start().await;

    assert!(env.sessions.unlocked("s1", "doc").await.unwrap().is_empty());

    env.sessions
        .record_unlock("s1", "doc", &BTreeSet::from([1, 2]))
        .await
        .unwrap();
    // Idempotent
    env.sessions
        .record_unlock("s1", "doc", &BTreeSet::from([2]))
        .await
        .unwrap();
    env.sessions
        .record_unlock("s1", "doc", &BTreeSet::from([4]))
        .await
        .unwrap();

    assert_eq!(
        env.sessions.unlocked("s1", "doc").await.unwrap(),
        BTreeSet::from([1, 2, 4])
    );
    assert!(env.sessions.unlocked("s2", "doc").await.unwrap().is_empty());

    env.sessions.reset("s1", "doc").await.unwrap();
    assert!(env.sessions.unlocked("s1", "doc").await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_unlocks_converge_to_union() {
    let env = MongoEnv::start().await;

    let mut handles = Vec::new();
    for index in 0..8usize {
        let sessions = env.sessions.clone();
        handles.push(tokio::spawn(async move {
            sessions
                .record_unlock("viewer", "doc", &BTreeSet::from([index]))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(
        env.sessions.unlocked("viewer", "doc").await.unwrap(),
        (0..8).collect::<BTreeSet<usize>>()
    );
}

#[tokio::test]
async fn forget_document_drops_every_viewer() {
    let env = MongoEnv::start().await;

    for viewer in ["a", "b"] {
        env.sessions
            .record_unlock(viewer, "doc", &BTreeSet::from([1]))
            .await
            .unwrap();
    }
    env.sessions
        .record_unlock("a", "other", &BTreeSet::from([1]))
        .await
        .unwrap();

    env.sessions.forget_document("doc").await.unwrap();

    assert!(env.sessions.unlocked("a", "doc").await.unwrap().is_empty());
    assert!(env.sessions.unlocked("b", "doc").await.unwrap().is_empty());
    assert_eq!(
        env.sessions.unlocked("a", "other").await.unwrap(),
        BTreeSet::from([1])
    );
}

#[tokio::test]
async fn reading_unlocks_refreshes_expiry() {
    use mongodb::bson::{doc, DateTime, Document};

    let env = MongoEnv::start().await;
    env.sessions
        .record_unlock("s1", "doc", &BTreeSet::from([1]))
        .await
        .unwrap();

    let raw = env.db.collection::<Document>("access_sessions");
    let filter = doc! { "session_id": "s1", "document_id": "doc" };
    let stale = DateTime::from_millis(DateTime::now().timestamp_millis() - 3_600_000);
    raw.update_one(filter.clone(), doc! { "$set": { "updated_at": stale } })
        .await
        .unwrap();

    assert_eq!(
        env.sessions.unlocked("s1", "doc").await.unwrap(),
        BTreeSet::from([1])
    );

    let record = raw.find_one(filter).await.unwrap().unwrap();
    let touched = record.get_datetime("updated_at").unwrap();
    assert!(touched.timestamp_millis() > stale.timestamp_millis());

    // Unknown keys are not created by a read
    assert!(env.sessions.unlocked("s2", "doc").await.unwrap().is_empty());
    assert_eq!(raw.count_documents(doc! {}).await.unwrap(), 1);
}

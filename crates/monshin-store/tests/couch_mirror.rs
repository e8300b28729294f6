//! Behavior of the write-through CouchDB session mirror, exercised against
//! a mock server.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use monshin_core::models::session::Session;
use monshin_store::backend::PersistenceBackend;
use monshin_store::config::{CouchConfig, StoreConfig};
use monshin_store::error::StoreError;
use monshin_store::sqlite::SqliteBackend;

const DB: &str = "monshin_sessions";

async fn mirrored_backend(server: &MockServer) -> (SqliteBackend, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        sqlite_path: dir.path().join("monshin.db"),
        couch: Some(CouchConfig {
            url: server.uri(),
            database: DB.to_string(),
            username: None,
            password: None,
        }),
        ..Default::default()
    };

    Mock::given(method("PUT"))
        .and(path(format!("/{DB}")))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;

    let backend = SqliteBackend::open(&config).unwrap();
    backend.init().await.unwrap();
    (backend, dir)
}

fn session(id: &str) -> Session {
    let mut s = Session::new("山田 太郎", "first", "general");
    s.id = id.to_string();
    s
}

#[tokio::test]
async fn save_mirrors_the_session_document() {
    let server = MockServer::start().await;
    let (backend, _dir) = mirrored_backend(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/{DB}/s1")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/{DB}/s1")))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    backend.save_session(session("s1")).await.unwrap();
}

#[tokio::test]
async fn update_conflict_is_retried_with_a_fresh_rev() {
    let server = MockServer::start().await;
    let (backend, _dir) = mirrored_backend(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/{DB}/s1")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "_id": "s1", "_rev": "1-abc", "type": "session",
            })),
        )
        .mount(&server)
        .await;
    // First write loses the race; the retry with the refetched rev lands.
    Mock::given(method("PUT"))
        .and(path(format!("/{DB}/s1")))
        .respond_with(ResponseTemplate::new(409))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/{DB}/s1")))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    backend.save_session(session("s1")).await.unwrap();
}

#[tokio::test]
async fn persistent_conflicts_exhaust_the_retry_budget() {
    let server = MockServer::start().await;
    let (backend, _dir) = mirrored_backend(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/{DB}/s1")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "_id": "s1", "_rev": "1-abc",
            })),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/{DB}/s1")))
        .respond_with(ResponseTemplate::new(409))
        .expect(3)
        .mount(&server)
        .await;

    assert!(matches!(
        backend.save_session(session("s1")).await,
        Err(StoreError::Conflict { .. })
    ));
}

#[tokio::test]
async fn a_failing_mirror_fails_the_save_loudly() {
    let server = MockServer::start().await;
    let (backend, _dir) = mirrored_backend(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/{DB}/s1")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/{DB}/s1")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(matches!(
        backend.save_session(session("s1")).await,
        Err(StoreError::Http(_))
    ));
}

#[tokio::test]
async fn mirror_delete_failures_do_not_fail_the_delete() {
    let server = MockServer::start().await;
    let (backend, _dir) = mirrored_backend(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/{DB}/s1")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/{DB}/s1")))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    backend.save_session(session("s1")).await.unwrap();

    // Now the mirror goes away entirely.
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(format!("/{DB}/s1")))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    // Local delete still succeeds; mirror cleanup is best-effort.
    backend.delete_session("s1").await.unwrap();
    assert!(backend.get_session("s1").await.unwrap().is_none());
}

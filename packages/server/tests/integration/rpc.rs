use serde_json::json;
use store::Store;

use crate::common::{PROXY_BASE, TestApp, wait_for};

mod routes {
    pub const EDITOR_SESSIONS: &str = "/api/v1/editor-sessions";
    pub const TRACKING_ADD: &str = "/api/v1/tracking/add";
    pub const TRACKING_REMOVE: &str = "/api/v1/tracking/remove";

    pub fn editor_session_save(id: &str) -> String {
        format!("/api/v1/editor-sessions/{id}/save")
    }
}

#[tokio::test]
async fn create_editor_session_round_trips_over_http() {
    let app = TestApp::spawn().await;
    let user_id = app.fixture.store.seed_user("u1");
    app.fixture.store.seed_token(user_id, "gh-token");
    app.fixture
        .source_host
        .add_repo("https://github.com/acme/proj");
    app.fixture
        .source_host
        .add_file("acme/proj", "README.md", b"# hello", Some(7));

    let res = app
        .post(
            routes::EDITOR_SESSIONS,
            &json!({
                "repo": "acme/proj",
                "path": "README.md",
                "chat_id": "u1",
                "ttl_seconds": 600,
            }),
        )
        .await;

    assert_eq!(res.status, 200, "body: {}", res.body);
    let one_time_url = res.body["one_time_url"].as_str().unwrap();
    assert!(one_time_url.starts_with(&format!("{PROXY_BASE}/edit/")));
    // Decimal-string session id.
    let session_id: i64 = res.body["session_id"].as_str().unwrap().parse().unwrap();
    assert!(session_id > 0);
    assert!(res.body["expires_at"].is_string());
}

#[tokio::test]
async fn create_editor_session_maps_validation_errors_to_400() {
    let app = TestApp::spawn().await;

    let res = app
        .post(
            routes::EDITOR_SESSIONS,
            &json!({
                "repo": "acme/proj",
                "path": "README.md",
                "chat_id": "u1",
                "ttl_seconds": 0,
            }),
        )
        .await;
    assert_eq!(res.status, 400);
    assert_eq!(res.body["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn create_editor_session_maps_missing_token_to_403() {
    let app = TestApp::spawn().await;
    // User exists, credential does not.
    app.fixture.store.seed_user("u1");

    let res = app
        .post(
            routes::EDITOR_SESSIONS,
            &json!({
                "repo": "acme/proj",
                "path": "README.md",
                "chat_id": "u1",
                "ttl_seconds": 600,
            }),
        )
        .await;
    assert_eq!(res.status, 403);
    assert_eq!(res.body["code"], "PERMISSION_DENIED");
}

#[tokio::test]
async fn save_editor_session_parses_the_decimal_id() {
    let app = TestApp::spawn().await;

    let res = app
        .post(&routes::editor_session_save("not-a-number"), &json!({}))
        .await;
    assert_eq!(res.status, 400);
    assert_eq!(res.body["code"], "INVALID_ARGUMENT");

    let res = app.post(&routes::editor_session_save("999"), &json!({})).await;
    assert_eq!(res.status, 404);
    assert_eq!(res.body["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn save_editor_session_returns_the_provisional_receipt() {
    let app = TestApp::spawn().await;
    let user_id = app.fixture.store.seed_user("u1");
    app.fixture.store.seed_token(user_id, "gh-token");
    app.fixture
        .source_host
        .add_repo("https://github.com/acme/proj");
    app.fixture
        .source_host
        .add_file("acme/proj", "README.md", b"# hello", Some(7));

    let created = app
        .post(
            routes::EDITOR_SESSIONS,
            &json!({
                "repo": "acme/proj",
                "path": "README.md",
                "chat_id": "u1",
                "ttl_seconds": 600,
            }),
        )
        .await;
    let session_id = created.body["session_id"].as_str().unwrap().to_string();

    let res = app
        .post(&routes::editor_session_save(&session_id), &json!({}))
        .await;
    assert_eq!(res.status, 200, "body: {}", res.body);
    let key = res.body["s3_key"].as_str().unwrap().to_string();
    assert!(key.starts_with("edited/acme/proj/"));
    assert!(res.body["saved_at"].is_string());

    let store = app.fixture.store.clone();
    let id: i64 = session_id.parse().unwrap();
    wait_for(
        || store.session_row(id).unwrap().saved_at.is_some(),
        "detached save to land",
    )
    .await;
    assert!(app.fixture.blobs.get(&key).is_some());
}

#[tokio::test]
async fn tracking_add_reports_reason_codes() {
    let app = TestApp::spawn().await;

    // Unknown user.
    let res = app
        .post(
            routes::TRACKING_ADD,
            &json!({"link": "https://github.com/acme/proj", "chat_id": "ghost"}),
        )
        .await;
    assert_eq!(res.status, 404);
    assert_eq!(res.body["code"], "USER_NOT_FOUND_REASON");

    // Known user, repository missing upstream.
    let user_id = app.fixture.store.seed_user("u1");
    app.fixture.store.seed_token(user_id, "gh-token");
    let res = app
        .post(
            routes::TRACKING_ADD,
            &json!({"link": "https://github.com/acme/proj", "chat_id": "u1"}),
        )
        .await;
    assert_eq!(res.status, 404);
    assert_eq!(res.body["code"], "REPO_NOT_FOUND_REASON");
}

#[tokio::test]
async fn tracking_add_rejects_blank_fields() {
    let app = TestApp::spawn().await;

    let res = app
        .post(routes::TRACKING_ADD, &json!({"link": "", "chat_id": "u1"}))
        .await;
    assert_eq!(res.status, 400);
    assert_eq!(res.body["code"], "INVALID_ARGUMENT");

    let res = app
        .post(
            routes::TRACKING_ADD,
            &json!({"link": "https://github.com/acme/proj", "chat_id": " "}),
        )
        .await;
    assert_eq!(res.status, 400);
}

#[tokio::test]
async fn tracking_add_without_a_token_row_is_internal() {
    let app = TestApp::spawn().await;
    // User exists but never registered a credential: unlike the editor
    // surface this is not a permission problem on the tracking surface.
    app.fixture.store.seed_user("u1");

    let res = app
        .post(
            routes::TRACKING_ADD,
            &json!({"link": "https://github.com/acme/proj", "chat_id": "u1"}),
        )
        .await;
    assert_eq!(res.status, 500);
    assert_eq!(res.body["code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn tracking_add_maps_invalid_tokens_to_403() {
    let app = TestApp::spawn().await;
    let user_id = app.fixture.store.seed_user("u1");
    app.fixture.store.seed_token(user_id, "gh-token");
    app.fixture
        .source_host
        .reject_token
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let res = app
        .post(
            routes::TRACKING_ADD,
            &json!({"link": "https://github.com/acme/proj", "chat_id": "u1"}),
        )
        .await;
    assert_eq!(res.status, 403);
    assert_eq!(res.body["code"], "PERMISSION_DENIED");
}

#[tokio::test]
async fn tracking_add_then_remove_round_trips() {
    let app = TestApp::spawn().await;
    let user_id = app.fixture.store.seed_user("u1");
    app.fixture.store.seed_token(user_id, "gh-token");
    app.fixture
        .source_host
        .add_repo("https://github.com/acme/proj");

    let res = app
        .post(
            routes::TRACKING_ADD,
            &json!({"link": "https://github.com/acme/proj", "chat_id": "u1"}),
        )
        .await;
    assert_eq!(res.status, 200, "body: {}", res.body);
    assert_eq!(app.fixture.store.count_tracking().await.unwrap(), 1);

    let res = app
        .post(
            routes::TRACKING_REMOVE,
            &json!({"link": "https://github.com/acme/proj", "chat_id": "u1"}),
        )
        .await;
    assert_eq!(res.status, 200);
    assert_eq!(app.fixture.store.count_tracking().await.unwrap(), 0);
}

use chrono::{Duration, Utc};
use store::CreateSessionParams;
use store::Store;

use server::editor::CreateSessionRequest;
use server::error::ServiceError;

use crate::common::{
    EDITOR_URL, PROXY_BASE, direct_settings, fixture, gateway_settings, wait_for,
};

fn repo_request() -> CreateSessionRequest {
    CreateSessionRequest {
        repo: Some("acme/proj".into()),
        branch: None,
        path: Some("README.md".into()),
        chat_id: "u1".into(),
        ttl_seconds: 600,
        s3_key: None,
    }
}

fn seed_session_params(token: &str, path: &str, expires_in: Duration) -> CreateSessionParams {
    CreateSessionParams {
        chat_id: "u1".into(),
        repo_url: "https://github.com/acme/proj".into(),
        repo_owner: Some("acme".into()),
        repo_name: Some("proj".into()),
        branch: Some("main".into()),
        path: path.into(),
        workspace_id: "ws-9".into(),
        session_url: EDITOR_URL.into(),
        one_time_token: token.into(),
        expires_at: Some(Utc::now() + expires_in),
    }
}

#[tokio::test]
async fn create_stages_the_file_and_mints_a_one_shot_url() {
    let fx = fixture(gateway_settings());
    let user_id = fx.store.seed_user("u1");
    fx.store.seed_token(user_id, "gh-token");
    fx.source_host.add_repo("https://github.com/acme/proj");
    fx.source_host
        .add_file("acme/proj", "README.md", b"# hello", Some(7));

    let before = Utc::now();
    let response = fx.editor.create_editor_session(repo_request()).await.unwrap();

    assert!(
        response
            .one_time_url
            .starts_with(&format!("{PROXY_BASE}/edit/")),
        "unexpected url: {}",
        response.one_time_url
    );
    let ttl = response.expires_at - before;
    assert!(ttl >= Duration::seconds(599) && ttl <= Duration::seconds(601));

    // The workspace got a sanitized name and the file bytes.
    assert_eq!(
        fx.workspace.created.lock().unwrap().as_slice(),
        ["edit-acme-proj"]
    );
    assert_eq!(
        fx.workspace.uploaded("ws-1", "README.md").as_deref(),
        Some(b"# hello".as_slice())
    );

    // Fresh session: neither consumed nor saved.
    let row = fx.store.session_row(response.session_id).unwrap();
    assert!(row.consumed_at.is_none());
    assert!(row.saved_at.is_none());
    let token = response
        .one_time_url
        .rsplit('/')
        .next()
        .unwrap()
        .to_string();
    assert_eq!(row.one_time_token.as_deref(), Some(token.as_str()));
}

#[tokio::test]
async fn create_rejects_bad_ttls_and_unknown_users() {
    let fx = fixture(gateway_settings());

    let mut req = repo_request();
    req.ttl_seconds = 0;
    assert!(matches!(
        fx.editor.create_editor_session(req).await,
        Err(ServiceError::InvalidRequest(_))
    ));

    // Valid request, but the user was never registered.
    assert!(matches!(
        fx.editor.create_editor_session(repo_request()).await,
        Err(ServiceError::UserNotFound)
    ));
}

#[tokio::test]
async fn create_requires_the_repo_to_exist_upstream() {
    let fx = fixture(gateway_settings());
    let user_id = fx.store.seed_user("u1");
    fx.store.seed_token(user_id, "gh-token");

    assert!(matches!(
        fx.editor.create_editor_session(repo_request()).await,
        Err(ServiceError::RepoNotFound)
    ));
}

#[tokio::test]
async fn create_rejects_oversize_files_before_upload() {
    let fx = fixture(gateway_settings());
    let user_id = fx.store.seed_user("u1");
    fx.store.seed_token(user_id, "gh-token");
    fx.source_host.add_repo("https://github.com/acme/proj");
    // Size hint far beyond the 1 MiB test ceiling.
    fx.source_host
        .add_file("acme/proj", "README.md", b"tiny", Some(1 << 29));

    assert!(matches!(
        fx.editor.create_editor_session(repo_request()).await,
        Err(ServiceError::SizeLimitExceeded)
    ));
    assert!(fx.workspace.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn direct_mode_stamps_the_credential_and_consumes_eagerly() {
    let fx = fixture(direct_settings());
    let user_id = fx.store.seed_user("u1");
    fx.store.seed_token(user_id, "gh-token");
    fx.source_host.add_repo("https://github.com/acme/proj");
    fx.source_host
        .add_file("acme/proj", "README.md", b"# hello", Some(7));

    let response = fx.editor.create_editor_session(repo_request()).await.unwrap();

    assert!(response.one_time_url.starts_with(EDITOR_URL));
    assert!(response.one_time_url.contains("session_token=provider-secret"));

    let row = fx.store.session_row(response.session_id).unwrap();
    assert!(row.consumed_at.is_some(), "direct mode consumes at creation");
}

#[tokio::test]
async fn direct_mode_requires_a_provider_credential() {
    let mut settings = direct_settings();
    settings.provider_access_token = String::new();
    let fx = fixture(settings);
    let user_id = fx.store.seed_user("u1");
    fx.store.seed_token(user_id, "gh-token");
    fx.source_host.add_repo("https://github.com/acme/proj");
    fx.source_host
        .add_file("acme/proj", "README.md", b"# hello", Some(7));

    assert!(matches!(
        fx.editor.create_editor_session(repo_request()).await,
        Err(ServiceError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn blob_sources_default_the_path_to_the_basename() {
    let fx = fixture(gateway_settings());
    fx.store.seed_user("u1");
    fx.blobs.put("drafts/u1/notes.txt", b"draft body");

    let response = fx
        .editor
        .create_editor_session(CreateSessionRequest {
            repo: None,
            branch: None,
            path: None,
            chat_id: "u1".into(),
            ttl_seconds: 300,
            s3_key: Some("drafts/u1/notes.txt".into()),
        })
        .await
        .unwrap();

    assert_eq!(
        fx.workspace.created.lock().unwrap().as_slice(),
        ["edit-s3-notes.txt"]
    );
    assert_eq!(
        fx.workspace.uploaded("ws-1", "notes.txt").as_deref(),
        Some(b"draft body".as_slice())
    );
    let row = fx.store.session_row(response.session_id).unwrap();
    assert!(row.saved_at.is_none());
}

#[tokio::test]
async fn save_is_provisional_then_lands_and_notifies_once() {
    let fx = fixture(gateway_settings());
    fx.store.seed_user("u1");
    let record = fx
        .store
        .create_editor_session(seed_session_params("tok-save", "README.md", Duration::seconds(600)))
        .await
        .unwrap();
    fx.workspace.put_file("ws-9", "README.md", b"edited body");

    let response = fx.editor.save_editor_session(record.id).await.unwrap();

    // Provisional reply: the claimed saved_at is the creation time.
    assert_eq!(response.saved_at, record.created_at);
    assert_eq!(
        response.storage_key,
        format!("edited/acme/proj/{}/README.md", record.id)
    );

    let store = fx.store.clone();
    let session_id = record.id;
    wait_for(
        || store.session_row(session_id).unwrap().saved_at.is_some(),
        "detached save to land",
    )
    .await;

    // The blob holds the workspace bytes, the session is force-expired,
    // and exactly one file-edited notification went out.
    assert_eq!(
        fx.blobs.get(&response.storage_key).as_deref(),
        Some(b"edited body".as_slice())
    );
    let row = fx.store.session_row(session_id).unwrap();
    assert!(row.expires_at.unwrap() <= Utc::now());
    let notifications = fx.notifier.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].0, record.file.id);

    // A repeated save answers synchronously with the durable receipt.
    let again = fx.editor.save_editor_session(session_id).await.unwrap();
    assert_eq!(again.storage_key, response.storage_key);
    assert_eq!(Some(again.saved_at), row.saved_at);
    assert_eq!(fx.notifier.notifications().len(), 1);
}

#[tokio::test]
async fn save_rejects_unknown_sessions() {
    let fx = fixture(gateway_settings());
    assert!(matches!(
        fx.editor.save_editor_session(999).await,
        Err(ServiceError::SessionNotFound)
    ));
}

#[tokio::test]
async fn expired_sweep_saves_and_notifies_exactly_once() {
    let fx = fixture(gateway_settings());
    fx.store.seed_user("u1");
    let record = fx
        .store
        .create_editor_session(seed_session_params(
            "tok-expired",
            "README.md",
            Duration::seconds(-1),
        ))
        .await
        .unwrap();
    fx.workspace.put_file("ws-9", "README.md", b"final body");

    fx.editor
        .handle_expired_sessions(Utc::now(), 10)
        .await
        .unwrap();

    let key = format!("edited/acme/proj/{}/README.md", record.id);
    assert_eq!(fx.blobs.get(&key).as_deref(), Some(b"final body".as_slice()));
    let row = fx.store.session_row(record.id).unwrap();
    assert!(row.saved_at.is_some());
    assert_eq!(fx.notifier.notifications().len(), 1);

    // A second sweep finds nothing unsaved.
    fx.editor
        .handle_expired_sessions(Utc::now(), 10)
        .await
        .unwrap();
    assert_eq!(fx.notifier.notifications().len(), 1);
}

#[tokio::test]
async fn saves_of_the_same_file_reuse_the_storage_key() {
    let fx = fixture(gateway_settings());
    fx.store.seed_user("u1");

    let first = fx
        .store
        .create_editor_session(seed_session_params(
            "tok-one",
            "README.md",
            Duration::seconds(-1),
        ))
        .await
        .unwrap();
    fx.workspace.put_file("ws-9", "README.md", b"version one");
    fx.editor
        .handle_expired_sessions(Utc::now(), 10)
        .await
        .unwrap();

    let key = format!("edited/acme/proj/{}/README.md", first.id);
    assert_eq!(fx.store.file_storage_key(first.file.id).as_deref(), Some(key.as_str()));

    // A later session over the same file overwrites in place.
    let second = fx
        .store
        .create_editor_session(seed_session_params(
            "tok-two",
            "README.md",
            Duration::seconds(-1),
        ))
        .await
        .unwrap();
    fx.workspace.put_file("ws-9", "README.md", b"version two");
    fx.editor
        .handle_expired_sessions(Utc::now(), 10)
        .await
        .unwrap();

    assert_eq!(second.file.id, first.file.id);
    assert_eq!(fx.blobs.get(&key).as_deref(), Some(b"version two".as_slice()));
    assert_eq!(fx.store.file_storage_key(first.file.id).as_deref(), Some(key.as_str()));
}

#[tokio::test]
async fn active_sweep_snapshots_without_forcing_expiry() {
    let fx = fixture(gateway_settings());
    fx.store.seed_user("u1");
    let record = fx
        .store
        .create_editor_session(seed_session_params(
            "tok-active",
            "README.md",
            Duration::seconds(600),
        ))
        .await
        .unwrap();
    let original_expiry = record.expires_at.unwrap();
    fx.workspace.put_file("ws-9", "README.md", b"mid-flight");

    fx.editor
        .handle_active_sessions(Utc::now(), 10)
        .await
        .unwrap();

    let row = fx.store.session_row(record.id).unwrap();
    assert!(row.saved_at.is_some());
    assert_eq!(row.expires_at, Some(original_expiry));
    assert_eq!(fx.notifier.notifications().len(), 1);
}

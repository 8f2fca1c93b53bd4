use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use common::BlobStore;
use common::storage::s3::S3BlobStore;
use mq::{ChangeBus, KafkaChangeBus};
use store::{SeaStore, Store};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use server::bootstrap;
use server::config::AppConfig;
use server::editor::{EditorService, EditorSettings};
use server::notify::{FileEditNotifier, WebhookNotifier};
use server::provider::ProviderApi;
use server::source_host::{GithubClient, SourceHost};
use server::state::AppState;
use server::tasks::{Poller, run_scheduler};
use server::tracking::TrackingService;
use server::workspace::{ProviderWorkspaceClient, WorkspaceClient, WorkspaceSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = AppConfig::load().context("Failed to load config")?;

    let db = store::database::init_db(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    let store: Arc<dyn Store> = Arc::new(SeaStore::new(db));

    let api = ProviderApi::new(&config.provider.url)
        .context("Failed to construct provider client")?;
    let boot = bootstrap::ensure(&api, &config.provider, &config.bootstrap, true)
        .await
        .context("Provider bootstrap failed")?;
    if boot.access_token.is_empty() {
        anyhow::bail!("provider bootstrap produced no access token");
    }
    api.set_session_token(&boot.access_token);

    let workspace: Arc<dyn WorkspaceClient> = Arc::new(ProviderWorkspaceClient::new(
        api,
        WorkspaceSettings {
            user: config.provider.user.clone(),
            template_id: boot.template_id,
            template_version_id: boot.template_version_id,
            template_version_preset_id: boot.template_version_preset_id,
            editor_app_slug: config.provider.editor_app_slug.clone(),
            agent_name: config.provider.agent_name.clone(),
            ready_timeout: Duration::from_secs(config.provider.ready_timeout_secs),
            poll_interval: Duration::from_secs(2),
        },
    ));

    let blobs: Arc<dyn BlobStore> = Arc::new(
        S3BlobStore::new(config.storage.clone().into())
            .await
            .context("Failed to initialize blob storage")?,
    );
    let bus: Arc<dyn ChangeBus> = Arc::new(
        KafkaChangeBus::new(config.bus.clone()).context("Failed to initialize change bus")?,
    );
    let notifier: Arc<dyn FileEditNotifier> = Arc::new(
        WebhookNotifier::new(
            &config.notify.webhook_url,
            Duration::from_secs(config.notify.timeout_secs),
        )
        .context("Failed to initialize webhook notifier")?,
    );
    let source_host: Arc<dyn SourceHost> = Arc::new(GithubClient::new());

    let editor = Arc::new(EditorService::new(
        store.clone(),
        workspace,
        blobs,
        source_host.clone(),
        notifier,
        EditorSettings {
            proxy_base_url: config.editor.proxy_base_url.clone(),
            provider_access_token: boot.access_token.clone(),
            token_query_param: config.editor.token_query_param.clone(),
            max_file_size: config.storage.max_size_bytes,
        },
    ));
    let tracking = Arc::new(TrackingService::new(store.clone(), source_host.clone()));

    let shutdown = CancellationToken::new();
    spawn_signal_watcher(shutdown.clone());

    let poller = Poller::new(
        store.clone(),
        source_host,
        bus,
        config.scheduler.poll_batch_size,
    );
    tokio::spawn(run_scheduler(
        "poller",
        Duration::from_secs(config.scheduler.poll_period_secs),
        shutdown.clone(),
        move || {
            let poller = poller.clone();
            async move { poller.tick().await }
        },
    ));

    let expired_editor = editor.clone();
    let expired_limit = config.scheduler.expired_limit;
    tokio::spawn(run_scheduler(
        "expired-session-saver",
        Duration::from_secs(config.scheduler.expired_period_secs),
        shutdown.clone(),
        move || {
            let editor = expired_editor.clone();
            async move {
                if let Err(e) = editor.handle_expired_sessions(Utc::now(), expired_limit).await {
                    warn!(error = %e, "expired session sweep failed");
                }
            }
        },
    ));

    let active_editor = editor.clone();
    let active_limit = config.scheduler.active_limit;
    tokio::spawn(run_scheduler(
        "active-session-saver",
        Duration::from_secs(config.scheduler.active_period_secs),
        shutdown.clone(),
        move || {
            let editor = active_editor.clone();
            async move {
                if let Err(e) = editor.handle_active_sessions(Utc::now(), active_limit).await {
                    warn!(error = %e, "active session sweep failed");
                }
            }
        },
    ));

    let state = AppState { editor, tracking };
    let app = server::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    shutdown.cancel();
    Ok(())
}

fn spawn_signal_watcher(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(_) => {
                    let _ = ctrl_c.await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        shutdown.cancel();
    });
}

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use store::SeaStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use gateway::config::GatewayConfig;
use gateway::handler::GatewayState;
use gateway::rewrite::{ChainRewriter, QueryTokenRewriter, UrlRewriter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = GatewayConfig::load().context("Failed to load config")?;
    if config.provider_access_token.trim().is_empty() {
        anyhow::bail!("provider access token is required");
    }

    let db = store::database::init_db(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    let gate = Arc::new(SeaStore::new(db));

    let rewriter: Arc<dyn UrlRewriter> = Arc::new(ChainRewriter(vec![Box::new(
        QueryTokenRewriter {
            param: config.token_query_param.clone(),
            token: config.provider_access_token.clone(),
        },
    )]));

    let state = GatewayState {
        gate: Some(gate),
        rewriter: Some(rewriter),
    };
    let app = gateway::build_router(&config.path_prefix, state);

    let shutdown = CancellationToken::new();
    spawn_signal_watcher(shutdown.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Redirect gateway running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

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

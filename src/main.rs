use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubely::app::auth::TokenService;
use tubely::config::AppConfig;
use tubely::http;
use tubely::infra::{db::Db, media::Ffmpeg, storage::ObjectStorage, storage::PublicUrls};
use tubely::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    db.migrate().await?;
    let storage = ObjectStorage::new(&config).await?;
    tracing::info!(bucket = storage.bucket(), "object storage configured");

    let state = AppState {
        videos: Arc::new(db),
        storage: Arc::new(storage),
        media: Arc::new(Ffmpeg::from_config(&config)),
        tokens: TokenService::new(config.token_secret, config.access_ttl_minutes),
        public_urls: PublicUrls::from_config(&config)?,
        upload_max_bytes: config.upload_max_bytes,
        upload_tmp_dir: config.upload_tmp_dir.clone(),
    };

    let app = http::router(state).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!("listening on {}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

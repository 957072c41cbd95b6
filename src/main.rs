use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use course_recommender::api::{create_router, AppState};
use course_recommender::config::{ArtifactBackend, Config, DatasetBackend};
use course_recommender::db::{self, CsvDatasetStore, DatasetStore, PgDatasetStore};
use course_recommender::persistence::{
    redis::create_redis_client, ArtifactStore, FileArtifactStore, RedisArtifactStore,
};
use course_recommender::services::RecommendationEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    let store: Arc<dyn DatasetStore> = match config.dataset_backend {
        DatasetBackend::Csv => Arc::new(CsvDatasetStore::new(&config.data_dir)),
        DatasetBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres dataset backend")?;
            let pool = db::create_pool(url).await?;
            db::postgres::run_migrations(&pool).await?;
            Arc::new(PgDatasetStore::new(pool))
        }
    };

    let artifacts: Arc<dyn ArtifactStore> = match config.artifact_backend {
        ArtifactBackend::File => Arc::new(FileArtifactStore::new(&config.model_dir)),
        ArtifactBackend::Redis => {
            Arc::new(RedisArtifactStore::new(create_redis_client(&config.redis_url)?))
        }
    };

    tracing::info!(
        dataset = store.name(),
        artifacts = artifacts.name(),
        "Starting course recommender"
    );

    let engine = Arc::new(RecommendationEngine::new(
        store,
        artifacts,
        config.engine_config(),
    ));
    engine
        .bootstrap()
        .await
        .context("failed to load the dataset")?;

    let app = create_router(AppState::new(engine));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(err) => tracing::error!(?err, "Failed to listen for shutdown signal"),
    }
}

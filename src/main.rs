use agri_diagnose::{
    app_state::AppState,
    config::AppConfig,
    routes::{self, metrics::describe_metrics},
    services::{queue::RedisJobQueue, storage::S3Storage, taxonomy::Taxonomy},
};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing agri-diagnose server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    describe_metrics();

    let taxonomy = Taxonomy::load(&config.taxonomy_path).expect("Failed to load taxonomy");

    tracing::info!(
        endpoint = %config.storage_endpoint,
        bucket = %config.storage_bucket,
        "Initializing object storage"
    );
    let storage = S3Storage::new(
        &config.storage_bucket,
        &config.storage_endpoint,
        &config.storage_region,
        &config.storage_access_key,
        &config.storage_secret_key,
        config.public_storage_url(),
    )
    .expect("Failed to initialize storage client");
    // Uploads report storage_unavailable until the bucket exists.
    if let Err(e) = storage.ensure_bucket().await {
        tracing::warn!(error = %e, "Could not ensure storage bucket");
    }

    tracing::info!("Connecting to Redis job queue");
    let queue = RedisJobQueue::new(&config.redis_url, config.job_ttl_secs)
        .expect("Failed to initialize job queue");

    let state = AppState::new(taxonomy, storage, queue, config.max_upload_bytes);

    let app = routes::build_router(state).route(
        "/metrics",
        get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

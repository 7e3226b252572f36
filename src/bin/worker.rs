use agri_diagnose::{
    config::AppConfig,
    services::{
        chroma::ChromaClient, classifier::MockClassifier, diagnosis::DiagnosisPipeline,
        fetch::HttpImageFetcher, llm::OpenAiClient, queue::RedisJobQueue, report::ReportWriter,
        retrieval::ChromaRetriever, taxonomy::Taxonomy,
    },
    routes::metrics::describe_metrics,
    worker,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting diagnosis worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    if let Some(addr) = &config.worker_metrics_addr {
        let addr: SocketAddr = addr.parse().expect("Invalid WORKER_METRICS_ADDR");
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .expect("Failed to install Prometheus exporter");
        describe_metrics();
        tracing::info!(%addr, "Worker metrics listener started");
    }

    let taxonomy =
        Arc::new(Taxonomy::load(&config.taxonomy_path).expect("Failed to load taxonomy"));

    let queue = RedisJobQueue::new(&config.redis_url, config.job_ttl_secs)
        .expect("Failed to initialize job queue");
    if let Err(e) = worker::report_stranded_jobs(&queue).await {
        tracing::warn!(error = %e, "Could not inspect the processing list");
    }

    let openai = Arc::new(
        OpenAiClient::new(
            &config.openai_base_url,
            &config.openai_api_key,
            &config.chat_model,
            &config.embedding_model,
            config.llm_temperature,
            config.llm_timeout(),
        )
        .expect("Failed to initialize model client"),
    );
    if config.openai_api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set; reports will fail with an auth error");
    }

    let chroma = ChromaClient::new(&config.chroma_url, &config.chroma_collection)
        .expect("Failed to initialize vector store client");
    if let Err(e) = chroma.heartbeat().await {
        tracing::warn!(
            error = %e,
            "Vector store unreachable; reports will record retrieval errors"
        );
    }
    let retriever = ChromaRetriever::new(chroma, openai.clone(), config.retrieval_cache_capacity);

    let fetcher = HttpImageFetcher::new(
        config.image_fetch_timeout(),
        config.max_image_bytes,
        config.allow_private_image_hosts,
    );
    if config.allow_private_image_hosts {
        tracing::warn!("Private image hosts are allowed");
    }

    let pipeline = DiagnosisPipeline::new(
        Arc::new(fetcher),
        Arc::new(MockClassifier::new()),
        taxonomy,
        Arc::new(retriever),
        ReportWriter::new(openai, config.llm_timeout()),
        config.retrieval_top_k,
    );

    let concurrency = config.worker_concurrency.max(1);
    let idle = config.worker_poll_interval();
    tracing::info!(concurrency, "Worker ready, starting job processing loops");

    let queue = Arc::new(queue);
    let pipeline = Arc::new(pipeline);
    let handles = (0..concurrency).map(|id| {
        let queue = queue.clone();
        let pipeline = pipeline.clone();
        tokio::spawn(async move { worker::run_loop(id, queue.as_ref(), &pipeline, idle).await })
    });
    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }
}

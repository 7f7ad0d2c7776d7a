use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use verity_analysis::EvidencePolicy;
use verity_common::Config;
use verity_runner::pipeline::StrategyContext;
use verity_runner::{
    ControlService, HealthTracker, HttpJobStore, PipelineRunner, QueueConfig, RunnerQueue,
    WebhookNotifier,
};

mod collaborators;
mod routes;

use collaborators::{HttpEvidenceSearcher, HttpTextAnalyst};

pub struct AppState {
    pub control: ControlService,
    pub queue: Arc<RunnerQueue>,
    pub config: Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("verity=info".parse()?))
        .init();

    let config = Config::from_env();

    let health = Arc::new(HealthTracker::new(config.failure_threshold));
    let store = Arc::new(HttpJobStore::new(
        config.job_store_url.clone(),
        config.job_store_token.clone(),
    ));
    let analyst = Arc::new(HttpTextAnalyst::new(&config.analysis_service_url));
    let searcher = Arc::new(HttpEvidenceSearcher::new(&config.search_service_url));

    let ctx = StrategyContext::new(
        analyst,
        searcher,
        Arc::clone(&health),
        EvidencePolicy::EvidenceOnly,
    );
    let runner = Arc::new(PipelineRunner::new(store.clone(), ctx));

    let queue = RunnerQueue::new(
        QueueConfig {
            max_concurrency: config.max_concurrency,
            queue_timeout_secs: config.queue_timeout_secs as i64,
        },
        store,
        Arc::clone(&health),
        runner,
    );

    let notifier = WebhookNotifier::new(&config.webhook_url, &config.webhook_secret);
    let control = ControlService::new(health, Arc::clone(&queue), notifier);

    let state = Arc::new(AppState {
        control,
        queue,
        config: config.clone(),
    });

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route(
            "/internal/provider-health",
            get(routes::provider_health).post(routes::provider_health_action),
        )
        .route("/internal/run-job", post(routes::run_job))
        .with_state(state)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!(addr = %addr, max_concurrency = config.max_concurrency, "Verity analysis harness listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

mod app_state;
mod config;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::{
    browser::ChromeProvider,
    fetcher::{HttpFetcher, Resolver},
    orchestrator::Orchestrator,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing image-harvester server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("scrape_jobs_total", "Total scrape jobs submitted");
    metrics::describe_counter!("scrape_jobs_completed", "Total scrape jobs finished");
    metrics::describe_counter!("scrape_jobs_failed", "Total scrape jobs that failed");
    metrics::describe_counter!(
        "scrape_images_downloaded_total",
        "Total images downloaded across all jobs"
    );
    metrics::describe_histogram!(
        "scrape_duration_seconds",
        "Wall time of one scrape job from worker start to terminal state"
    );
    metrics::describe_gauge!("scrape_jobs_active", "Workers currently holding a browser session");

    // Initialize the browser provider
    tracing::info!(chrome_bin = %config.chrome_bin, "Initializing headless browser provider");
    let browser = Arc::new(ChromeProvider::new(
        &config.chrome_bin,
        Duration::from_secs(config.page_load_timeout_secs),
    ));

    // Initialize the image fetcher
    let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch_timeout_secs))
        .expect("Failed to initialize HTTP fetcher");
    let resolver = Resolver::new(Arc::new(fetcher));

    // Create the job orchestrator
    let orchestrator = Arc::new(Orchestrator::new(browser, resolver, config.scrape_tuning()));

    // Periodic expiry sweep for terminal jobs
    let sweeper = Arc::clone(&orchestrator);
    let job_ttl = Duration::from_secs(config.job_ttl_secs);
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            let removed = sweeper.sweep_expired(job_ttl, chrono::Utc::now());
            if removed > 0 {
                tracing::info!(removed, "Swept expired jobs");
            }
        }
    });

    // Create shared application state
    let state = AppState::new(orchestrator, &config.chrome_bin, config.output_dir.clone());

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/start_scrape", post(routes::scrape::start_scrape))
        .route("/job_status", get(routes::scrape::job_status))
        .route("/download_result", get(routes::scrape::download_result))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting image-harvester on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

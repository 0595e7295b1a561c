use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use dotenvy::dotenv;
use tokio::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

mod handlers {
    pub mod donation_handlers;
}
mod utils {
    pub mod abandon;
    pub mod local_cache;
}
mod api {
    pub mod emailjs;
    pub mod firebase;
}
mod jobs {
    pub mod notification_scheduler;
}
mod models {
    pub mod donation_models;
}
mod donation_flow;
mod error;
mod progress;
mod sync_core;

use api::emailjs::EmailJsClient;
use api::firebase::FirebaseCounterClient;
use donation_flow::DonationFlow;
use handlers::donation_handlers;
use jobs::notification_scheduler::NotificationScheduler;
use sync_core::SyncCore;
use utils::local_cache::LocalCache;

pub struct AppState {
    pub sync_core: Arc<SyncCore>,
    pub donation_flow: Arc<DonationFlow>,
}

async fn health_check() -> &'static str {
    "OK"
}

pub fn validate_env() {
    let required_vars = [
        "FIREBASE_DATABASE_URL",
        "EMAILJS_SERVICE_ID",
        "EMAILJS_TEMPLATE_ID",
        "EMAILJS_PUBLIC_KEY",
    ];
    for var in required_vars.iter() {
        std::env::var(var).expect(&format!("{} must be set", var));
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,donation_backend=debug"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    validate_env();

    let data_dir = PathBuf::from(
        std::env::var("DONATION_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
    );
    let cache = Arc::new(LocalCache::new(&data_dir));

    // The page shows the cached figure until the remote store answers.
    let sync_core = Arc::new(SyncCore::new(progress::GOAL_AMOUNT, cache.load_total()));

    let database_url =
        std::env::var("FIREBASE_DATABASE_URL").expect("FIREBASE_DATABASE_URL must be set");
    url::Url::parse(&database_url).expect("Invalid FIREBASE_DATABASE_URL");
    let counter_client = Arc::new(FirebaseCounterClient::new(
        &database_url,
        sync_core.clone(),
        cache.clone(),
    ));

    let emailer = Arc::new(EmailJsClient::from_env());
    let scheduler = NotificationScheduler::new(&data_dir, emailer, sync_core.clone());
    scheduler.resume_if_pending();

    let redirect_url = std::env::var("PAYMENT_REDIRECT_URL")
        .unwrap_or_else(|_| "https://gl.me/u/rMzMm2QtQTML".to_string());
    let thank_you_delay = Duration::from_secs(
        std::env::var("THANK_YOU_DELAY_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(60),
    );
    let donation_flow = Arc::new(DonationFlow::new(
        counter_client.clone(),
        Arc::new(scheduler),
        &redirect_url,
        thank_you_delay,
    ));

    let state = Arc::new(AppState {
        sync_core: sync_core.clone(),
        donation_flow,
    });

    {
        let counter_client = counter_client.clone();
        tokio::spawn(async move {
            counter_client.connect().await;
        });
    }
    {
        let sync_core = sync_core.clone();
        tokio::spawn(async move {
            sync_core.ready().await;
            tracing::info!("remote counter ready, live total is now authoritative");
        });
    }

    let api_routes = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/progress", get(donation_handlers::get_progress))
        .route(
            "/api/progress/stream",
            get(donation_handlers::stream_progress),
        )
        .route("/api/donate", post(donation_handlers::create_donation));

    let app = Router::new()
        .merge(api_routes)
        // The landing page itself: modal, stepper, scroll and snow effects
        // all live in these static assets.
        .fallback_service(ServeDir::new("static"))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_origin(AllowOrigin::exact(
                    std::env::var("FRONTEND_URL")
                        .unwrap_or_else(|_| "http://localhost:8080".to_string())
                        .parse()
                        .expect("Invalid FRONTEND_URL"),
                ))
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::ACCEPT,
                    axum::http::header::ORIGIN,
                ]),
        )
        .with_state(state);

    use tokio::net::TcpListener;
    let port = match std::env::var("ENVIRONMENT").as_deref() {
        Ok("staging") => 3100,
        _ => 3000,
    };
    tracing::info!("Starting server on port {}", port);
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await.unwrap();
    axum::serve(listener, app.into_make_service()).await.unwrap();
}

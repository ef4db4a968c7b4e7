use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use anyhow::Context;
use dotenvy as dotenv;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod attendance;
mod auth;
mod config;
mod db;
mod error;
mod funding;
mod geo;
mod middleware;
mod mpesa;
mod payout;
mod rules;

use attendance::AttendanceService;
use config::Config;
use funding::FundingService;
use middleware::{RateLimitConfig, RateLimitLayer};
use mpesa::MpesaClient;
use payout::PayoutRates;
use rules::RulesService;

pub struct AppState {
    pub db_pool: PgPool,
    pub attendance: Arc<AttendanceService>,
    pub funding: Arc<FundingService>,
    pub rules: Arc<RulesService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // trying multiple .env locations since working directory differs between dev and prod
    let _ = dotenv::from_filename_override(".env");
    let _ = dotenv::from_filename_override(concat!(env!("CARGO_MANIFEST_DIR"), "/.env"));
    let _ = dotenv::dotenv_override();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,volaplace_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting VolaPlace Settlement Backend");

    let config = Config::from_env().context("error with configuration")?;
    tracing::info!("Configuration loaded successfully");

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected successfully");

    let mpesa_client = Arc::new(MpesaClient::new(&config));

    let default_rates = PayoutRates {
        base_hourly_rate: config.default_hourly_rate_cents,
        bonus_per_beneficiary: config.default_beneficiary_bonus_cents,
    };

    let attendance_service = Arc::new(AttendanceService::new(db_pool.clone()));
    let funding_service = Arc::new(FundingService::new(db_pool.clone(), mpesa_client));
    let rules_service = Arc::new(RulesService::new(db_pool.clone(), default_rates));

    let rate_limit_read = Arc::new(RateLimitLayer::new(RateLimitConfig::read_heavy()));
    let rate_limit_write = Arc::new(RateLimitLayer::new(RateLimitConfig::write_heavy()));
    let rate_limit_default = Arc::new(RateLimitLayer::new(RateLimitConfig::default()));

    let app_state = Arc::new(AppState {
        db_pool: db_pool.clone(),
        attendance: attendance_service,
        funding: funding_service,
        rules: rules_service,
    });

    // grouping routes by rate limit tier to avoid repeating the middleware closure pattern everywhere
    let app = Router::new()
        .route("/health", get(api::health::health_check))

        .route("/attendance/register", post(api::attendance::register))
        .route("/attendance/check-in", post(api::attendance::check_in))
        .route("/attendance/check-out", post(api::attendance::check_out))
        .route("/funding/shift/:shift_id", post(api::funding::fund_shift))
        .route_layer({
            let limiter = rate_limit_write.clone();
            axum_middleware::from_fn(move |headers: axum::http::HeaderMap, req: axum::extract::Request, next: axum_middleware::Next| {
                let limiter = limiter.clone();
                async move { limiter.middleware(headers, req, next).await }
            })
        })

        .route("/attendance/shift/:shift_id", get(api::attendance::get_shift_attendance))
        .route("/funding/shift/:shift_id/status", get(api::funding::get_funding_status))
        .route("/payments/pending", get(api::payments::get_pending_payments))
        .route("/payments/history", get(api::payments::get_payment_history))
        .route("/admin/dashboard-stats", get(api::admin::get_dashboard_stats))
        .route_layer({
            let limiter = rate_limit_read.clone();
            axum_middleware::from_fn(move |headers: axum::http::HeaderMap, req: axum::extract::Request, next: axum_middleware::Next| {
                let limiter = limiter.clone();
                async move { limiter.middleware(headers, req, next).await }
            })
        })

        .route("/rules", get(api::rules::get_rules))
        .route("/rules", put(api::rules::update_rules))
        .route_layer({
            let limiter = rate_limit_default.clone();
            axum_middleware::from_fn(move |headers: axum::http::HeaderMap, req: axum::extract::Request, next: axum_middleware::Next| {
                let limiter = limiter.clone();
                async move { limiter.middleware(headers, req, next).await }
            })
        })

        // the gateway posts here; no rate limit so callbacks are never dropped
        .route("/payments/mpesa/callback", post(api::payments::mpesa_callback))

        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // in case the configured port is taken, try a few more before giving up
    let mut port = config.port;
    let mut listener = None;

    for _ in 0..10u16 {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => {
                listener = Some((addr, l));
                break;
            }
            Err(e) => {
                tracing::warn!("Failed to bind to {}: {} (trying next port)", addr, e);
                port = port.saturating_add(1);
            }
        }
    }

    let (addr, listener) = listener.ok_or_else(|| anyhow::anyhow!(
        "Failed to bind to any port in range {}..{}",
        config.port,
        config.port.saturating_add(9)
    ))?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

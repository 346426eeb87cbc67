use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use random_backend::{
    AppState,
    bars::places::GooglePlacesClient,
    config::Config,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit},
    notify::HttpNotifier,
    reaper, routes,
    store::PgGroupStore,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'random_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");

    let store = Arc::new(PgGroupStore::new(pool, config.max_search_radius));
    let places = Arc::new(GooglePlacesClient::new(
        config.google_places_api_key.clone(),
    ));
    let notifier = Arc::new(HttpNotifier::new(config.notify_url.clone()));

    let state = AppState {
        config: config.clone(),
        store: store.clone(),
        places,
        notifier,
    };

    let rate_limiter = Arc::new(RateLimiter::new(redis_client, config.clone()));

    // Background sweep for stale waiting groups.
    tokio::spawn(reaper::run_periodic(store, config.clone()));

    let public_routes = Router::new().route("/health", get(routes::health));

    let protected_routes = Router::new()
        .route("/groups/create-or-join", post(routes::group::create_or_join))
        .route("/groups/leave", post(routes::group::leave_group))
        .route("/groups/heartbeat", post(routes::group::heartbeat))
        .route("/groups/assign-bar", post(routes::group::assign_bar))
        .route("/groups/current", get(routes::group::current_group))
        .route("/groups/reap", post(routes::group::reap_stale))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let router = Router::new().merge(public_routes).merge(protected_routes);

    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    let app = router.with_state(state.clone());

    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}

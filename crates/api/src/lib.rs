//! HTTP API server with observability for the supply coordination system.
//!
//! Provides REST endpoints for the order lifecycle, credential issuance
//! and verification, inventory and evidence, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use engine::{LoggingNotificationGateway, NotificationGateway, OrderLifecycleEngine};
use metrics_exporter_prometheus::PrometheusHandle;
use store::SupplyStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, N>(state: Arc<AppState<S, N>>, metrics_handle: PrometheusHandle) -> Router
where
    S: SupplyStore + Clone + 'static,
    N: NotificationGateway + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S, N>))
        .route("/orders", get(routes::orders::list::<S, N>))
        .route("/orders/{id}", get(routes::orders::get::<S, N>))
        .route(
            "/orders/number/{number}",
            get(routes::orders::get_by_number::<S, N>),
        )
        .route("/orders/{id}/assign", post(routes::orders::assign::<S, N>))
        .route(
            "/orders/{id}/approval-code",
            post(routes::orders::approval_code::<S, N>),
        )
        .route(
            "/orders/{id}/approval-code/resend",
            post(routes::orders::approval_code_resend::<S, N>),
        )
        .route(
            "/orders/{id}/approve",
            post(routes::orders::approve::<S, N>),
        )
        .route(
            "/orders/{id}/prepare",
            post(routes::orders::prepare::<S, N>),
        )
        .route("/orders/{id}/ready", post(routes::orders::ready::<S, N>))
        .route(
            "/orders/{id}/dispatch",
            post(routes::orders::dispatch::<S, N>),
        )
        .route(
            "/orders/{id}/delivery-code",
            post(routes::orders::delivery_code::<S, N>),
        )
        .route(
            "/orders/{id}/delivery-code/resend",
            post(routes::orders::delivery_code_resend::<S, N>),
        )
        .route(
            "/orders/{id}/deliver",
            post(routes::orders::deliver::<S, N>),
        )
        .route(
            "/orders/{id}/return",
            post(routes::orders::mark_returned::<S, N>),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S, N>))
        .route(
            "/orders/{id}/photos",
            post(routes::orders::attach_photo::<S, N>),
        )
        .route("/orders/{id}/photos", get(routes::orders::photos::<S, N>))
        .route(
            "/orders/{id}/confirmations",
            get(routes::orders::confirmations::<S, N>),
        )
        .route("/auth/code", post(routes::auth::request_code::<S, N>))
        .route("/auth/verify", post(routes::auth::verify::<S, N>))
        .route("/inventory", get(routes::inventory::list::<S, N>))
        .route(
            "/inventory/{product_id}",
            put(routes::inventory::set::<S, N>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state over a store and a notification gateway.
pub fn create_state<S, N>(store: S, gateway: N) -> Arc<AppState<S, N>>
where
    S: SupplyStore + Clone + 'static,
    N: NotificationGateway + Clone + 'static,
{
    Arc::new(AppState {
        engine: OrderLifecycleEngine::new(store, gateway),
    })
}

/// Creates application state with the logging gateway; used by the server
/// binary when no messaging provider is wired in.
pub fn create_default_state<S>(store: S) -> Arc<AppState<S, LoggingNotificationGateway>>
where
    S: SupplyStore + Clone + 'static,
{
    create_state(store, LoggingNotificationGateway::new())
}

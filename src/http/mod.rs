//! HTTP surface: `AppState`, router assembly, and handlers.
//!
//! Routing and state-sharing follow the axum idiom the teacher's own
//! reconciler-status server uses (a cloneable `AppState` carried through
//! `Router::with_state`), generalized here to the much larger `/api/v1`
//! surface this service exposes.

pub mod authz_middleware;
pub mod dto;
pub mod handlers;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::observability::metrics;
use crate::service::KavachService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<KavachService>,
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<KavachService> {
    fn from_ref(state: &AppState) -> Self {
        state.service.clone()
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_endpoint() -> Result<(StatusCode, String), StatusCode> {
    let families = metrics::gather();
    let encoder = prometheus::TextEncoder::new();
    encoder
        .encode_to_string(&families)
        .map(|body| (StatusCode::OK, body))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/organizations",
            post(handlers::organizations::create).get(handlers::organizations::list),
        )
        .route("/organizations/my", get(handlers::organizations::list_mine))
        .route(
            "/organizations/by-name/{name}",
            get(handlers::organizations::get_by_name),
        )
        .route(
            "/organizations/{id}",
            delete(handlers::organizations::delete),
        )
        .route(
            "/organizations/{id}/secret-groups",
            post(handlers::secret_groups::create).get(handlers::secret_groups::list),
        )
        .route(
            "/organizations/{id}/user-groups",
            post(handlers::user_groups::create).get(handlers::user_groups::list),
        )
        .route(
            "/secret-groups/accessible",
            get(handlers::secret_groups::list_accessible),
        )
        .route(
            "/secret-groups/{id}",
            delete(handlers::secret_groups::delete),
        )
        .route(
            "/secret-groups/{id}/environments",
            post(handlers::environments::create).get(handlers::environments::list),
        )
        .route(
            "/environments/accessible",
            get(handlers::environments::list_accessible),
        )
        .route(
            "/environments/{id}",
            delete(handlers::environments::delete),
        )
        .route(
            "/environments/{id}/secrets/versions",
            post(handlers::secrets::create_version).get(handlers::secrets::list_versions),
        )
        .route(
            "/environments/{id}/secrets/versions/{version_id}",
            get(handlers::secrets::get_version),
        )
        .route(
            "/environments/{id}/secrets/versions/{version_id}/rollback",
            post(handlers::secrets::rollback),
        )
        .route("/environments/{id}/secrets/diff", get(handlers::secrets::diff))
        .route(
            "/environments/{id}/providers",
            post(handlers::providers::register),
        )
        .route(
            "/environments/{id}/providers/sync",
            post(handlers::providers::sync),
        )
        .route(
            "/user-groups/{id}/members",
            post(handlers::user_groups::add_member),
        )
        .route(
            "/user-groups/{id}/members/{user_id}",
            delete(handlers::user_groups::remove_member),
        )
        .route("/permissions/grant", post(handlers::permissions::grant))
        .route("/permissions/revoke", post(handlers::permissions::revoke))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            authz_middleware::authorize,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

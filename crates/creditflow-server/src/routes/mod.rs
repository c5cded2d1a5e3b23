pub mod activities;
pub mod applications;
pub mod attachments;
pub mod health;
pub mod participants;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::{middleware, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use creditflow_service::{ActivityService, ServiceError};

use crate::identity::require_identity;

pub struct InnerAppState {
    pub service: ActivityService,
}

pub type AppState = Arc<InnerAppState>;

/// Uploads are capped by the service layer; this only keeps axum from
/// rejecting a legal single upload before it gets there.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub fn build_router(service: ActivityService) -> Router {
    let state: AppState = Arc::new(InnerAppState { service });

    let public = Router::new().merge(health::routes());

    let protected = Router::new()
        .merge(activities::routes())
        .merge(participants::routes())
        .merge(applications::routes())
        .merge(attachments::routes())
        .route_layer(middleware::from_fn(require_identity));

    public
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub(crate) fn to_error(e: ServiceError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::StateConflict(_) => StatusCode::CONFLICT,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
        ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({ "error": e.to_string(), "kind": e.kind() })),
    )
}

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use creditflow_core::application::{ApplicationFilter, ApplicationStatus};
use creditflow_core::identity::Identity;

use super::{to_error, AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/applications", get(list_applications))
}

#[derive(Deserialize)]
struct ListQuery {
    activity_id: Option<String>,
    user_id: Option<String>,
    status: Option<ApplicationStatus>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_applications(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let filter = ApplicationFilter {
        activity_id: query.activity_id,
        user_id: query.user_id,
        status: query.status,
        limit: query.limit,
        offset: query.offset,
    };
    state
        .service
        .list_applications(&identity, &filter)
        .map(|a| Json(json!(a)))
        .map_err(to_error)
}

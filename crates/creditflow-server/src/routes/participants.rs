use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use creditflow_core::identity::Identity;
use creditflow_core::participant::{AddParticipants, CreditAssignment};

use super::{to_error, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/activities/{id}/participants",
            get(list_participants).post(add_participants),
        )
        .route(
            "/api/activities/{id}/participants/credits",
            put(set_many_credits),
        )
        .route(
            "/api/activities/{id}/participants/{user_id}",
            put(set_credits).delete(remove_participant),
        )
}

#[derive(Deserialize)]
struct SetCreditsRequest {
    credits: f64,
}

async fn list_participants(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .service
        .list_participants(&identity, &id)
        .await
        .map(|p| Json(json!(p)))
        .map_err(to_error)
}

async fn add_participants(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(input): Json<AddParticipants>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    state
        .service
        .add_participants(&identity, &id, &input)
        .await
        .map(|p| (StatusCode::CREATED, Json(json!(p))))
        .map_err(to_error)
}

async fn set_credits(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, user_id)): Path<(String, String)>,
    Json(input): Json<SetCreditsRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .service
        .set_participant_credits(&identity, &id, &user_id, input.credits)
        .map(|p| Json(json!(p)))
        .map_err(to_error)
}

async fn set_many_credits(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(assignments): Json<Vec<CreditAssignment>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .service
        .set_many_participant_credits(&identity, &id, &assignments)
        .map(|p| Json(json!(p)))
        .map_err(to_error)
}

async fn remove_participant(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    state
        .service
        .remove_participant(&identity, &id, &user_id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(to_error)
}

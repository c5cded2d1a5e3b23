use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use creditflow_core::activity::{
    ActivityFilter, ActivityStatus, Category, CreateActivity, ReviewDecision, UpdateActivity,
};
use creditflow_core::identity::Identity;

use super::{to_error, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/activities", get(list_activities).post(create_activity))
        .route(
            "/api/activities/batch",
            post(batch_create).put(batch_update).delete(batch_delete),
        )
        .route(
            "/api/activities/{id}",
            get(get_activity).put(update_activity).delete(delete_activity),
        )
        .route("/api/activities/{id}/submit", post(submit_activity))
        .route("/api/activities/{id}/review", post(review_activity))
        .route("/api/activities/{id}/withdraw", post(withdraw_activity))
}

#[derive(Deserialize)]
struct ListQuery {
    status: Option<ActivityStatus>,
    category: Option<Category>,
    owner_id: Option<String>,
    starts_after: Option<DateTime<Utc>>,
    ends_before: Option<DateTime<Utc>>,
    search: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl From<ListQuery> for ActivityFilter {
    fn from(q: ListQuery) -> Self {
        ActivityFilter {
            status: q.status,
            category: q.category,
            owner_id: q.owner_id,
            starts_after: q.starts_after,
            ends_before: q.ends_before,
            search: q.search,
            // Visibility scoping is decided by the service from the
            // caller's identity, never by the query string.
            visible_to: None,
            limit: q.limit,
            offset: q.offset,
        }
    }
}

#[derive(Deserialize)]
struct ReviewRequest {
    decision: ReviewDecision,
    #[serde(default)]
    comment: String,
}

#[derive(Deserialize)]
struct BatchUpdateItem {
    id: String,
    #[serde(flatten)]
    update: UpdateActivity,
}

#[derive(Deserialize)]
struct BatchDeleteRequest {
    ids: Vec<String>,
}

async fn list_activities(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .service
        .list(&identity, &query.into())
        .map(|a| Json(json!(a)))
        .map_err(to_error)
}

async fn get_activity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .service
        .get(&identity, &id)
        .map(|a| Json(json!(a)))
        .map_err(to_error)
}

async fn create_activity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(input): Json<CreateActivity>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    state
        .service
        .create(&identity, &input)
        .map(|a| (StatusCode::CREATED, Json(json!(a))))
        .map_err(to_error)
}

async fn update_activity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(input): Json<UpdateActivity>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .service
        .update(&identity, &id, &input)
        .map(|a| Json(json!(a)))
        .map_err(to_error)
}

async fn delete_activity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    state
        .service
        .delete(&identity, &id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(to_error)
}

async fn submit_activity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .service
        .submit(&identity, &id)
        .map(|a| Json(json!(a)))
        .map_err(to_error)
}

async fn review_activity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(input): Json<ReviewRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .service
        .review(&identity, &id, input.decision, &input.comment)
        .map(|a| Json(json!(a)))
        .map_err(to_error)
}

async fn withdraw_activity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .service
        .withdraw(&identity, &id)
        .map(|a| Json(json!(a)))
        .map_err(to_error)
}

async fn batch_create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(inputs): Json<Vec<CreateActivity>>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    state
        .service
        .batch_create(&identity, &inputs)
        .map(|a| (StatusCode::CREATED, Json(json!(a))))
        .map_err(to_error)
}

async fn batch_update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(items): Json<Vec<BatchUpdateItem>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let items: Vec<(String, UpdateActivity)> =
        items.into_iter().map(|i| (i.id, i.update)).collect();
    state
        .service
        .batch_update(&identity, &items)
        .map(|a| Json(json!(a)))
        .map_err(to_error)
}

async fn batch_delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(input): Json<BatchDeleteRequest>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    state
        .service
        .batch_delete(&identity, &input.ids)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(to_error)
}

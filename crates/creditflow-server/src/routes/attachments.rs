use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use creditflow_core::attachment::{AttachmentFilter, FileKind, UploadFile};
use creditflow_core::identity::Identity;
use creditflow_service::FileContent;

use super::{to_error, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/activities/{id}/attachments",
            get(list_attachments).post(upload_attachment),
        )
        .route(
            "/api/activities/{id}/attachments/batch",
            post(batch_upload),
        )
        .route(
            "/api/attachments/{id}",
            put(update_description).delete(delete_attachment),
        )
        .route("/api/attachments/{id}/download", get(download_attachment))
        .route("/api/attachments/{id}/preview", get(preview_attachment))
}

#[derive(Deserialize)]
struct UploadQuery {
    file_name: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct ListQuery {
    kind: Option<FileKind>,
    file_type: Option<String>,
    uploaded_by: Option<String>,
}

#[derive(Deserialize)]
struct BatchUploadRequest {
    files: Vec<BatchFile>,
}

/// One file of a batch upload; `data` is base64-encoded content.
#[derive(Deserialize)]
struct BatchFile {
    file_name: String,
    #[serde(default)]
    description: String,
    data: String,
}

#[derive(Deserialize)]
struct DescriptionRequest {
    description: String,
}

async fn upload_attachment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    state
        .service
        .upload_attachment(&identity, &id, &query.file_name, &query.description, body)
        .await
        .map(|a| (StatusCode::CREATED, Json(json!(a))))
        .map_err(to_error)
}

async fn batch_upload(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(input): Json<BatchUploadRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut files = Vec::with_capacity(input.files.len());
    for file in input.files {
        let data = base64::engine::general_purpose::STANDARD
            .decode(&file.data)
            .map_err(|_| {
                to_error(creditflow_service::ServiceError::Validation(format!(
                    "file {}: data is not valid base64",
                    file.file_name
                )))
            })?;
        files.push(UploadFile {
            original_name: file.file_name,
            description: file.description,
            data,
        });
    }

    state
        .service
        .batch_upload_attachments(&identity, &id, files)
        .await
        .map(|outcomes| Json(json!(outcomes)))
        .map_err(to_error)
}

async fn list_attachments(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let filter = AttachmentFilter {
        kind: query.kind,
        file_type: query.file_type,
        uploaded_by: query.uploaded_by,
    };
    state
        .service
        .list_attachments(&identity, &id, &filter)
        .await
        .map(|listing| Json(json!(listing)))
        .map_err(to_error)
}

async fn update_description(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(input): Json<DescriptionRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .service
        .update_attachment_description(&identity, &id, &input.description)
        .map(|a| Json(json!(a)))
        .map_err(to_error)
}

async fn delete_attachment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    state
        .service
        .delete_attachment(&identity, &id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(to_error)
}

async fn download_attachment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Response, (StatusCode, Json<Value>)> {
    state
        .service
        .download_attachment(&identity, &id)
        .await
        .map(|file| file_response(file, "attachment"))
        .map_err(to_error)
}

async fn preview_attachment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Response, (StatusCode, Json<Value>)> {
    state
        .service
        .preview_attachment(&identity, &id)
        .await
        .map(|file| file_response(file, "inline"))
        .map_err(to_error)
}

fn file_response(file: FileContent, disposition: &str) -> Response {
    let name = file.file_name.replace(['"', '\r', '\n'], "");
    let disposition_value = HeaderValue::from_str(&format!("{disposition}; filename=\"{name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(file.content_type)),
            (header::CONTENT_DISPOSITION, disposition_value),
        ],
        file.data,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::Engine;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::routes::test_helpers::{body_json, request, test_router};

    async fn create_activity(app: &axum::Router) -> String {
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/activities",
                ("s1", "student"),
                Some(json!({ "title": "Entry", "category": "innovation" })),
            ))
            .await
            .unwrap();
        let created = body_json(response).await;
        created["id"].as_str().unwrap().to_string()
    }

    fn raw_upload(uri: &str, data: &'static [u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(crate::identity::USER_ID_HEADER, "s1")
            .header(crate::identity::USER_TYPE_HEADER, "student")
            .body(Body::from(data))
            .unwrap()
    }

    #[tokio::test]
    async fn upload_list_download_roundtrip() {
        let app = test_router();
        let id = create_activity(&app).await;

        let response = app
            .clone()
            .oneshot(raw_upload(
                &format!("/api/activities/{id}/attachments?file_name=notes.txt"),
                b"hello attachment",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let uploaded = body_json(response).await;
        assert_eq!(uploaded["file_kind"], "document");
        let attachment_id = uploaded["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(request(
                "GET",
                &format!("/api/activities/{id}/attachments"),
                ("s1", "student"),
                None,
            ))
            .await
            .unwrap();
        let listing = body_json(response).await;
        assert_eq!(listing["stats"]["count"], 1);

        let response = app
            .oneshot(request(
                "GET",
                &format!("/api/attachments/{attachment_id}/download"),
                ("s1", "student"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"hello attachment");
    }

    #[tokio::test]
    async fn duplicate_upload_conflicts() {
        let app = test_router();
        let id = create_activity(&app).await;
        let uri = format!("/api/activities/{id}/attachments?file_name=notes.txt");

        let response = app
            .clone()
            .oneshot(raw_upload(&uri, b"same bytes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app.oneshot(raw_upload(&uri, b"same bytes")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn batch_upload_reports_per_file_outcomes() {
        let app = test_router();
        let id = create_activity(&app).await;
        let encode =
            |data: &[u8]| base64::engine::general_purpose::STANDARD.encode(data);

        let response = app
            .oneshot(request(
                "POST",
                &format!("/api/activities/{id}/attachments/batch"),
                ("s1", "student"),
                Some(json!({ "files": [
                    { "file_name": "one.pdf", "data": encode(b"pdf bytes") },
                    { "file_name": "clip.mp4", "data": encode(b"video bytes") }
                ] })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let outcomes = body_json(response).await;
        assert_eq!(outcomes.as_array().unwrap().len(), 2);
        assert!(outcomes[0]["attachment"].is_object());
        assert!(outcomes[1]["error"].is_string());
    }

    #[tokio::test]
    async fn preview_rejects_archives() {
        let app = test_router();
        let id = create_activity(&app).await;
        let response = app
            .clone()
            .oneshot(raw_upload(
                &format!("/api/activities/{id}/attachments?file_name=bundle.zip"),
                b"zip bytes",
            ))
            .await
            .unwrap();
        let attachment_id = body_json(response).await["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .oneshot(request(
                "GET",
                &format!("/api/attachments/{attachment_id}/preview"),
                ("s1", "student"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use creditflow_core::identity::{Identity, UserType};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_TYPE_HEADER: &str = "x-user-type";

/// Axum middleware that turns the gateway's identity headers into an
/// `Identity` request extension. The headers are trusted verbatim; the
/// upstream gateway has already authenticated the caller.
pub async fn require_identity(mut request: Request, next: Next) -> Response {
    match identity_from_headers(request.headers()) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(msg) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": msg, "kind": "unauthorized" })),
        )
            .into_response(),
    }
}

fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, String> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing {USER_ID_HEADER} header"))?;

    let raw_type = headers
        .get(USER_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| format!("missing {USER_TYPE_HEADER} header"))?;
    let user_type = UserType::parse_str(raw_type.trim())
        .ok_or_else(|| format!("unknown user type {raw_type:?}"))?;

    Ok(Identity::new(user_id, user_type))
}

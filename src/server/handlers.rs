//! HTTP handlers of the mounting wrapper.
//!
//! # Endpoints
//!
//! - `GET {prefix}/status` - Health check
//! - `GET {prefix}/custom-docs` - Swagger UI page
//! - `GET {prefix}/openapi.json` - OpenAPI document

use axum::extract::{OriginalUri, State};
use axum::http::Uri;
use axum::response::Html;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use super::docs::{openapi_document, swagger_ui_html};
use crate::bridge::script_name;

/// Path of the OpenAPI document, relative to the mount prefix.
pub const OPENAPI_PATH: &str = "/openapi.json";

/// State shared by the documentation handlers.
#[derive(Debug, Clone)]
pub struct DocsState {
    pub title: String,
    pub docs_path: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// Handle health check requests.
///
/// Answers independently of the tile proxy.
///
/// # Response
///
/// ```json
/// { "status": "operational" }
/// ```
pub async fn status_handler() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "operational",
    })
}

/// Serve the Swagger UI page.
pub async fn docs_handler(
    State(state): State<DocsState>,
    OriginalUri(original): OriginalUri,
    uri: Uri,
) -> Html<String> {
    let prefix = script_name(original.path(), uri.path());
    Html(swagger_ui_html(
        &state.title,
        &format!("{}{}", prefix, OPENAPI_PATH),
    ))
}

/// Serve the OpenAPI document.
pub async fn openapi_handler(
    State(state): State<DocsState>,
    OriginalUri(original): OriginalUri,
    uri: Uri,
) -> Json<Value> {
    let prefix = script_name(original.path(), uri.path());
    Json(openapi_document(&state.title, &prefix, &state.docs_path))
}

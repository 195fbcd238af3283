use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::error::AirVinylError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

impl AirVinylError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AirVinylError::NotFound(_) => StatusCode::NOT_FOUND,
            AirVinylError::Conflict(_)
            | AirVinylError::ValidationFailed(_)
            | AirVinylError::InvalidReference(_) => StatusCode::BAD_REQUEST,
            AirVinylError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AirVinylError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AirVinylError::Store(e) => log::error!("Request failed: {:#}", e),
            other => log::debug!("Request rejected ({}): {}", status, other),
        }
        (status, Json(ErrorResponse::new(&self.to_string()))).into_response()
    }
}

pub type ApiResult<T = Response> = Result<T, AirVinylError>;

/// Single value payload: `{"@odata.context": ..., "value": ...}`.
#[derive(Debug, Serialize)]
pub struct ODataValue<T> {
    #[serde(rename = "@odata.context")]
    pub context: String,
    pub value: T,
}

/// Entity set payload with optional count and server-driven paging link.
#[derive(Debug, Serialize)]
pub struct ODataCollection<T> {
    #[serde(rename = "@odata.context")]
    pub context: String,
    #[serde(rename = "@odata.count", skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink", skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

impl<T> ODataCollection<T> {
    pub fn new(context: String, value: Vec<T>) -> Self {
        Self {
            context,
            count: None,
            value,
            next_link: None,
        }
    }
}

/// A single entity with its context annotation written inline.
#[derive(Debug, Serialize)]
pub struct ODataEntity<T> {
    #[serde(rename = "@odata.context")]
    pub context: String,
    #[serde(flatten)]
    pub entity: T,
}

/// `{"@odata.id": ...}` entry of a reference collection.
#[derive(Debug, Serialize)]
pub struct ODataReference {
    #[serde(rename = "@odata.id")]
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceDocumentEntry {
    pub name: &'static str,
    pub kind: &'static str,
    pub url: &'static str,
}

pub fn json<T: Serialize>(payload: T) -> Response {
    Json(payload).into_response()
}

pub fn created<T: Serialize>(location: String, payload: T) -> Response {
    (
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(payload),
    )
        .into_response()
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Raw `$value` response
pub fn plain_text(value: String) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        value,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            AirVinylError::not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AirVinylError::Conflict("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AirVinylError::InvalidReference("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AirVinylError::from(anyhow::anyhow!("db down")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_collection_omits_absent_annotations() {
        let payload = ODataCollection::new("ctx".to_string(), vec![1, 2]);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value, serde_json::json!({"@odata.context": "ctx", "value": [1, 2]}));
    }
}

//! REST error type. Every failure renders as `{ "message": ... }`.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Store(StoreError::MissingReference(_) | StoreError::Invalid(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Store(StoreError::Corrupt(_) | StoreError::Database(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Don't expose backend details to clients
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn status_codes() {
        assert_eq!(status(ApiError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(ApiError::not_found("Product")), StatusCode::NOT_FOUND);
        assert_eq!(
            status(StoreError::Conflict("dup".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(StoreError::MissingReference("gone".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(StoreError::Invalid("bad".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(StoreError::Database(sqlx::Error::RowNotFound).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(StoreError::Corrupt("bad row".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn server_errors_hide_details() {
        let response = ApiError::from(StoreError::Corrupt("price column".into())).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "message": "Internal server error" }));
    }

    #[test]
    fn messages_pass_through_for_client_errors() {
        assert_eq!(ApiError::not_found("Category").to_string(), "Category not found");
        assert_eq!(
            ApiError::from(StoreError::Conflict("taken".into())).to_string(),
            "taken"
        );
    }
}

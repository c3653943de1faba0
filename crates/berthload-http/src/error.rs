//! Error to response mapping

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use berthload_api::ErrorInfo;
use berthload_util::BerthError;
use tracing::error;

/// A [`BerthError`] on its way out as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub BerthError);

/// Status code for each error kind
pub fn status_for(err: &BerthError) -> StatusCode {
    match err {
        BerthError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        BerthError::Forbidden(_) => StatusCode::FORBIDDEN,
        BerthError::NotFound(_) => StatusCode::NOT_FOUND,
        BerthError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        BerthError::Conflict(_) => StatusCode::CONFLICT,
        BerthError::PreconditionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BerthError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        BerthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(ErrorInfo::from(&self.0))).into_response()
    }
}

impl From<BerthError> for ApiError {
    fn from(err: BerthError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(BerthError::invalid(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(BerthError::invalid(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(BerthError::invalid(rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&BerthError::precondition("request_not_draft", "x")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(&BerthError::conflict("x")), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&BerthError::unauthenticated("x")),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&BerthError::unavailable("x")),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

//! HTTP error responses for domain errors

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // 416 responses name the size the client should have asked within
        let unsatisfied_range = match &self {
            Error::RangeNotSatisfiable { total, .. } => {
                HeaderValue::from_str(&format!("bytes */{}", total)).ok()
            }
            _ => None,
        };

        let api_error: ApiError = self.into();
        let mut response = (status_code, Json(api_error)).into_response();
        if let Some(value) = unsatisfied_range {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // errors with a known cause go through Error::into_response instead
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

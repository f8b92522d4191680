//! HTTP response building helpers
//!
//! The request layer turns service results into responses with these
//! helpers so every handler reports errors the same way.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::error::StorageError;

fn build(status: StatusCode, content_type: Option<&'static str>, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    build(status, Some("application/json"), Bytes::from(json))
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 201 Created status
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

/// Build an empty response with 204 No Content status
pub fn no_content() -> Response<Full<Bytes>> {
    build(StatusCode::NO_CONTENT, None, Bytes::new())
}

/// Status code a request layer reports for an error
pub fn status_for(error: &StorageError) -> StatusCode {
    match error {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::Forbidden(_) => StatusCode::FORBIDDEN,
        StorageError::InvalidInput(_) | StorageError::Json(_) => StatusCode::BAD_REQUEST,
        StorageError::Conflict(_) => StatusCode::CONFLICT,
        StorageError::Auth(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a StorageError to an appropriate HTTP response
pub fn error_response(error: StorageError) -> Response<Full<Bytes>> {
    let status = status_for(&error);
    let message = match &error {
        StorageError::NotFound(msg)
        | StorageError::Forbidden(msg)
        | StorageError::InvalidInput(msg)
        | StorageError::Conflict(msg)
        | StorageError::Auth(msg) => msg.clone(),
        StorageError::Json(e) => format!("JSON error: {}", e),
        _ => {
            tracing::error!(error = %error, "Request failed");
            "internal error".to_string()
        }
    };

    json_response(status, &serde_json::json!({ "error": message }))
}

/// Wrap a service result into an HTTP response
pub fn from_result<T: Serialize>(result: Result<T, StorageError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

/// Wrap a create result into an HTTP response with 201 Created
pub fn from_create_result<T: Serialize>(result: Result<T, StorageError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => created(&value),
        Err(e) => error_response(e),
    }
}

/// Wrap a delete result into an HTTP response with 204 No Content
pub fn from_delete_result(result: Result<(), StorageError>) -> Response<Full<Bytes>> {
    match result {
        Ok(()) => no_content(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_ok_response() {
        let resp = ok(&serde_json::json!({"test": true}));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_error_statuses() {
        let cases = [
            (StorageError::NotFound("card c1".into()), StatusCode::NOT_FOUND),
            (StorageError::Forbidden("owner only".into()), StatusCode::FORBIDDEN),
            (StorageError::InvalidInput("bad field".into()), StatusCode::BAD_REQUEST),
            (StorageError::Conflict("duplicate".into()), StatusCode::CONFLICT),
            (StorageError::Auth("unknown user".into()), StatusCode::UNAUTHORIZED),
            (StorageError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error_response(error).status(), status);
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let resp = error_response(StorageError::Conflict("card c1 already has a map location".into()));
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "card c1 already has a map location");
    }

    #[tokio::test]
    async fn test_internal_errors_are_not_echoed() {
        let resp = error_response(StorageError::Internal("disk path /secret".into()));
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "internal error");
    }

    #[test]
    fn test_result_wrappers() {
        let value = serde_json::json!({"id": "b1"});
        assert_eq!(from_result(Ok(value.clone())).status(), StatusCode::OK);
        assert_eq!(from_create_result(Ok(value)).status(), StatusCode::CREATED);
        assert_eq!(
            from_result::<()>(Err(StorageError::not_found("board", "b1"))).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_delete_result_no_content() {
        assert_eq!(from_delete_result(Ok(())).status(), StatusCode::NO_CONTENT);
    }
}

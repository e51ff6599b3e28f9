//! Request extractors shared by the API handlers.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::{header, HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::status::AppError;

/// JSON body extractor that ignores `Content-Type` and turns every decoding
/// problem (empty body, bad syntax, wrong shape) into a 400. A body over
/// the configured limit is a 413.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            debug!(error = %rejection, "could not read request body");
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                AppError::PayloadTooLarge("Request body too large".into())
            } else {
                AppError::BadRequest("Could not read request body".into())
            }
        })?;

        if bytes.is_empty() {
            return Err(AppError::BadRequest("No data received".into()));
        }

        serde_json::from_slice(&bytes).map(ApiJson).map_err(|e| {
            debug!(error = %e, "rejecting malformed JSON body");
            AppError::BadRequest("Invalid JSON".into())
        })
    }
}

/// The token from an `Authorization: Bearer <token>` header, if any.
///
/// A header with another scheme, or an empty token, counts as absent.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }
}

//! Custom Axum extractors.
//!
//! - [`ApiJson`]: `Json` whose rejections become [`AppError`] bodies
//! - [`OptionalJson`]: like [`ApiJson`], but an empty body is `None`
//! - [`CorrelationId`]: the request's correlation id
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     correlation_id: CorrelationId,
//!     ApiJson(request): ApiJson<RideRequest>,
//! ) -> Result<Json<Ride>, AppError> {
//!     tracing::info!(correlation_id = %correlation_id.0, "Creating ride");
//!     ...
//! }
//! ```

use axum::{
    Json, async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use tower_http::request_id::RequestId;

/// JSON body extractor that answers malformed input with an [`AppError`].
#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Optional JSON body.
///
/// An absent or blank body yields `None`. Any other body must parse as `T`; a
/// malformed one is rejected exactly as [`ApiJson`] would reject it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionalJson<T>(pub Option<T>);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(None));
        }
        let Json(value) = Json::<T>::from_bytes(&bytes)?;
        Ok(Self(Some(value)))
    }
}

/// Correlation ID for request tracing.
///
/// Prefers the [`RequestId`] the correlation layers stored in the request
/// extensions, then the `x-correlation-id` header, and generates a new UUID v4
/// otherwise.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .extensions
            .get::<RequestId>()
            .map(RequestId::header_value)
            .or_else(|| parts.headers.get(CORRELATION_ID_HEADER))
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};

    #[tokio::test]
    async fn test_correlation_id_from_header() {
        let uuid = Uuid::new_v4();
        let req = Request::builder()
            .header(CORRELATION_ID_HEADER, uuid.to_string())
            .body(Body::empty())
            .unwrap();

        let (mut parts, _) = req.into_parts();
        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .unwrap();

        assert_eq!(correlation_id.0, uuid);
    }

    #[tokio::test]
    async fn test_correlation_id_generated() {
        let req = Request::builder().body(Body::empty()).unwrap();

        let (mut parts, _) = req.into_parts();
        let first = CorrelationId::from_request_parts(&mut parts, &()).await.unwrap();
        let mut other = Request::builder().body(Body::empty()).unwrap().into_parts().0;
        let second = CorrelationId::from_request_parts(&mut other, &()).await.unwrap();

        assert_ne!(first.0, second.0);
    }

    #[derive(Debug, serde::Deserialize)]
    struct Minutes {
        minutes: u32,
    }

    async fn optional(body: &'static str) -> Result<Option<u32>, AppError> {
        let req = Request::builder().body(Body::from(body)).unwrap();
        let OptionalJson(value) = OptionalJson::<Minutes>::from_request(req, &()).await?;
        Ok(value.map(|m| m.minutes))
    }

    #[tokio::test]
    async fn optional_json_reads_blank_bodies_as_none() {
        assert_eq!(optional("").await.unwrap(), None);
        assert_eq!(optional("  \n").await.unwrap(), None);
        assert_eq!(optional(r#"{"minutes": 9}"#).await.unwrap(), Some(9));
    }

    #[tokio::test]
    async fn optional_json_rejects_bodies_it_cannot_use() {
        let wrong_type = optional(r#"{"minutes": "nine"}"#).await.unwrap_err();
        assert_eq!(wrong_type.code(), "validation_error");

        let garbage = optional("{minutes").await.unwrap_err();
        assert_eq!(garbage.code(), "bad_request");
    }
}

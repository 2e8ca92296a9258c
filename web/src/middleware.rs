//! Correlation ids and request tracing.
//!
//! Built from tower-http's request-id and trace layers. A request keeps the UUID in
//! its `x-correlation-id` header; a missing or non-UUID value is replaced with a fresh
//! v4. The id is recorded on the `http_request` span, stored in the request
//! extensions for [`crate::extractors::CorrelationId`], and echoed on the response.

use axum::{
    Router,
    body::Body,
    extract::Request,
    http::HeaderName,
    middleware::map_request,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};
use uuid::Uuid;

/// Header carrying the correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Wrap `router` so every request is tagged, traced and answered with its id.
pub fn with_correlation<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let header = HeaderName::from_static(CORRELATION_ID_HEADER);

    // Layers run bottom to top on the way in.
    router
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(PropagateRequestIdLayer::new(header.clone()))
        .layer(SetRequestIdLayer::new(header, MakeRequestUuid))
        .layer(map_request(drop_malformed_id))
}

/// Parse the correlation id a request carries, if it is a UUID.
#[must_use]
pub fn correlation_id_of<B>(request: &axum::http::Request<B>) -> Option<Uuid> {
    request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
}

/// Strip a correlation id that is not a UUID so a fresh one is generated.
async fn drop_malformed_id(mut request: Request) -> Request {
    if correlation_id_of(&request).is_none() {
        request.headers_mut().remove(CORRELATION_ID_HEADER);
    }
    request
}

fn request_span(request: &axum::http::Request<Body>) -> Span {
    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id,
        method = %request.method(),
        uri = %request.uri(),
    )
}

//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: the request's correlation id
//! - [`ClientIp`]: client address, proxy headers first
//! - [`BearerToken`]: the `Authorization: Bearer <token>` credential
//! - [`JsonBody`] / [`QueryParams`]: `Json` and `Query` whose rejections
//!   use the error envelope

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    Json, async_trait,
    extract::{ConnectInfo, FromRequest, FromRequestParts, Query, Request},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use serde::de::DeserializeOwned;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use uuid::Uuid;

/// Correlation ID for request tracing.
///
/// Reads the id stored by the correlation middleware, then the
/// `X-Correlation-ID` header, and generates a fresh UUID v4 otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(*id);
        }

        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// Client IP address.
///
/// # Priority
///
/// 1. `X-Forwarded-For` (first IP in the list)
/// 2. `X-Real-IP`
/// 3. Peer address from `ConnectInfo`, when the server records it
/// 4. `127.0.0.1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(Self(client_ip(&parts.headers, peer)))
    }
}

/// Resolves the client address from proxy headers, then the peer address.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> IpAddr {
    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());

    let real_ip = || {
        headers
            .get("X-Real-IP")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    forwarded
        .or_else(real_ip)
        .or(peer)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Bearer token from `Authorization: Bearer <token>`.
///
/// Rejects with 401 when the header is missing, uses another scheme or
/// carries an empty token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Authentication required"))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or_else(|| {
                AppError::unauthorized("Invalid authorization format. Expected 'Bearer <token>'")
            })?;

        if token.is_empty() {
            return Err(AppError::unauthorized("Empty bearer token"));
        }

        Ok(Self(token.to_string()))
    }
}

/// JSON body. Malformed or mistyped bodies are rejected with a 400
/// `VALIDATION_ERROR` envelope instead of axum's plain-text rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Query string, rejected like [`JsonBody`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request, StatusCode};
    use serde::Deserialize;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_correlation_id_from_header() {
        let id = Uuid::new_v4();
        let text = id.to_string();
        let mut parts = parts(&[(CORRELATION_ID_HEADER, text.as_str())]);
        let extracted = CorrelationId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(extracted.0, id);
    }

    #[tokio::test]
    async fn test_correlation_id_prefers_extension() {
        let stored = CorrelationId(Uuid::new_v4());
        let other = Uuid::new_v4().to_string();
        let mut parts = parts(&[(CORRELATION_ID_HEADER, other.as_str())]);
        parts.extensions.insert(stored);
        let extracted = CorrelationId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(extracted, stored);
    }

    #[test]
    fn test_client_ip_priority() {
        let mut headers = HeaderMap::new();
        let peer: IpAddr = "10.1.1.1".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), peer);
        assert_eq!(client_ip(&headers, None), IpAddr::V4(Ipv4Addr::LOCALHOST));

        headers.insert("X-Real-IP", HeaderValue::from_static("192.0.2.7"));
        assert_eq!(client_ip(&headers, Some(peer)).to_string(), "192.0.2.7");

        headers.insert(
            "X-Forwarded-For",
            HeaderValue::from_static("203.0.113.5, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, Some(peer)).to_string(), "203.0.113.5");
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let mut ok = parts(&[("authorization", "Bearer s3ss10n")]);
        let token = BearerToken::from_request_parts(&mut ok, &()).await.unwrap();
        assert_eq!(token.0, "s3ss10n");

        let mut missing = parts(&[]);
        let err = BearerToken::from_request_parts(&mut missing, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let mut basic = parts(&[("authorization", "Basic dXNlcjpwdw==")]);
        assert!(BearerToken::from_request_parts(&mut basic, &()).await.is_err());

        let mut empty = parts(&[("authorization", "Bearer ")]);
        assert!(BearerToken::from_request_parts(&mut empty, &()).await.is_err());
    }

    #[derive(Debug, Deserialize)]
    struct Listing {
        page: Option<u32>,
    }

    #[tokio::test]
    async fn test_query_params_rejection_uses_envelope() {
        let mut ok = Request::builder()
            .uri("/flags?page=2")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        let QueryParams(listing) = QueryParams::<Listing>::from_request_parts(&mut ok, &())
            .await
            .unwrap();
        assert_eq!(listing.page, Some(2));

        let mut bad = Request::builder()
            .uri("/flags?page=two")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        let err = QueryParams::<Listing>::from_request_parts(&mut bad, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_json_body_rejection_uses_envelope() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        let err = JsonBody::<serde_json::Value>::from_request(request, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}

//! Axum extractors and request parsing helpers
//!
//! - [`Actor`] resolves the caller's [`AuthContext`] through the configured
//!   [`AuthProvider`]
//! - [`parse_uuid`] and [`json_body`] turn raw path segments and bodies into
//!   typed values with [`MartError`] rejections

use crate::core::auth::{AuthContext, AuthProvider};
use crate::core::error::{MartError, Result, ValidationError};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use std::sync::Arc;
use uuid::Uuid;

/// The identity a request acts under
///
/// Any state that can hand out an `Arc<dyn AuthProvider>` supports it.
#[derive(Debug, Clone)]
pub struct Actor(pub AuthContext);

impl<S> FromRequestParts<S> for Actor
where
    Arc<dyn AuthProvider>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = MartError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let provider = <Arc<dyn AuthProvider> as FromRef<S>>::from_ref(state);
        provider.extract_context(&parts.headers).await.map(Actor)
    }
}

/// Parse a path segment as a UUID
pub fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim()).map_err(|_| {
        MartError::Validation(ValidationError::InvalidUuid {
            value: value.to_string(),
        })
    })
}

/// Unwrap a JSON body, reporting rejections in the crate's error format
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T> {
    payload.map(|Json(body)| body).map_err(MartError::from)
}

/// Parse an optional JSON body; an empty body yields `T::default()`
pub fn optional_json<T>(bytes: &[u8]) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::{HeaderAuthProvider, USER_ID_HEADER, USER_ROLE_HEADER};
    use axum::http::Request;
    use serde::Deserialize;

    #[derive(Clone)]
    struct TestState {
        auth: Arc<dyn AuthProvider>,
    }

    impl FromRef<TestState> for Arc<dyn AuthProvider> {
        fn from_ref(state: &TestState) -> Self {
            state.auth.clone()
        }
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Reason {
        reason: Option<String>,
    }

    #[tokio::test]
    async fn test_actor_from_headers() {
        let state = TestState {
            auth: Arc::new(HeaderAuthProvider),
        };
        let id = Uuid::new_v4();
        let (mut parts, _) = Request::builder()
            .header(USER_ID_HEADER, id.to_string())
            .header(USER_ROLE_HEADER, "buyer")
            .body(())
            .unwrap()
            .into_parts();

        let Actor(ctx) = Actor::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(ctx, AuthContext::buyer(id));
    }

    #[tokio::test]
    async fn test_actor_rejects_bad_identity() {
        let state = TestState {
            auth: Arc::new(HeaderAuthProvider),
        };
        let (mut parts, _) = Request::builder()
            .header(USER_ID_HEADER, "not-a-uuid")
            .header(USER_ROLE_HEADER, "buyer")
            .body(())
            .unwrap()
            .into_parts();

        let err = Actor::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_parse_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_uuid(&id.to_string()).unwrap(), id);
        assert_eq!(parse_uuid("abc").unwrap_err().error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_optional_json() {
        assert_eq!(optional_json::<Reason>(b"").unwrap(), Reason::default());
        assert_eq!(
            optional_json::<Reason>(br#"{"reason":"late"}"#).unwrap().reason.as_deref(),
            Some("late")
        );
        assert!(optional_json::<Reason>(b"{oops").is_err());
    }
}

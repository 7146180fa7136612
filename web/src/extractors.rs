//! Custom Axum extractors.
//!
//! - [`Caller`]: the authenticated actor, from trusted identity headers
//!
//! Authentication happens upstream; the identity provider in front of this
//! service sets `X-Actor-Id` and `X-Actor-Operator` and strips them from client
//! requests.
//!
//! # Example
//!
//! ```ignore
//! async fn handler(Caller(actor): Caller, State(state): State<AppState>) -> ... {
//!     state.engine.tickets_for_actor(&actor).await?;
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use raffle_core::types::{Actor, ActorId};
use uuid::Uuid;

/// Header carrying the actor's UUID.
pub const ACTOR_ID_HEADER: &str = "X-Actor-Id";

/// Header carrying `true` for operators.
pub const ACTOR_OPERATOR_HEADER: &str = "X-Actor-Operator";

/// The actor performing the request.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers).map(Self)
    }
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, AppError> {
    let id = headers
        .get(ACTOR_ID_HEADER)
        .ok_or_else(|| AppError::unauthorized("missing X-Actor-Id header"))?
        .to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| AppError::unauthorized("X-Actor-Id is not a UUID"))?;

    let is_operator = match headers.get(ACTOR_OPERATOR_HEADER) {
        None => false,
        Some(value) => match value.to_str().map(str::trim) {
            Ok(s) if s.eq_ignore_ascii_case("true") => true,
            Ok(s) if s.eq_ignore_ascii_case("false") => false,
            _ => return Err(AppError::bad_request("X-Actor-Operator must be true or false")),
        },
    };

    Ok(Actor {
        id: ActorId::from_uuid(id),
        is_operator,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    async fn extract(headers: &[(&str, &str)]) -> Result<Caller, AppError> {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, ()) = builder.body(()).expect("Valid request").into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn buyer_by_default() {
        let id = Uuid::new_v4();
        let Caller(actor) = extract(&[(ACTOR_ID_HEADER, &id.to_string())]).await.unwrap();
        assert_eq!(*actor.id.as_uuid(), id);
        assert!(!actor.is_operator);
    }

    #[tokio::test]
    async fn operator_flag_is_read() {
        let id = Uuid::new_v4().to_string();
        let Caller(actor) = extract(&[(ACTOR_ID_HEADER, &id), (ACTOR_OPERATOR_HEADER, "TRUE")])
            .await
            .unwrap();
        assert!(actor.is_operator);
    }

    #[tokio::test]
    async fn missing_or_malformed_identity_is_unauthorized() {
        let missing = extract(&[]).await.unwrap_err();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let malformed = extract(&[(ACTOR_ID_HEADER, "42")]).await.unwrap_err();
        assert_eq!(malformed.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_operator_flag_is_rejected() {
        let id = Uuid::new_v4().to_string();
        let err = extract(&[(ACTOR_ID_HEADER, &id), (ACTOR_OPERATOR_HEADER, "yes")])
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}

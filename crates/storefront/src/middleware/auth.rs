//! Session identity extractors.
//!
//! Identity comes only from the signed `orchard_session` cookie. A missing,
//! tampered, or expired cookie means an anonymous request, never an error.

use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::services::auth::{SessionClaims, SessionTokens, email_hash};

/// The verified session, if any.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(CurrentSession(session): CurrentSession) -> impl IntoResponse {
///     match session {
///         Some(claims) => format!("Signed in as {}", claims.email),
///         None => "Guest".to_string(),
///     }
/// }
/// ```
pub struct CurrentSession(pub Option<SessionClaims>);

impl<S> FromRequestParts<S> for CurrentSession
where
    SessionTokens: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = SessionTokens::from_ref(state).read(&parts.headers);
        if let Some(claims) = &claims {
            set_sentry_user(claims);
        }
        Ok(Self(claims))
    }
}

/// Associate Sentry events with the shopper, by email hash only.
fn set_sentry_user(claims: &SessionClaims) {
    let id = claims
        .customer_id
        .as_ref()
        .map_or_else(|| email_hash(&claims.email), ToString::to_string);
    crate::error::set_sentry_user(id);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{Request, header};
    use secrecy::SecretString;

    use orchard_core::Email;

    use super::*;

    #[derive(Clone)]
    struct TestState(SessionTokens);

    impl FromRef<TestState> for SessionTokens {
        fn from_ref(state: &TestState) -> Self {
            state.0.clone()
        }
    }

    fn state() -> TestState {
        TestState(SessionTokens::new(
            SecretString::from("k7Qp2vXz9LmN4rTb8WcYh3JdF6sGa1Ue"),
            false,
        ))
    }

    fn parts(cookie: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/auth/session");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_valid_cookie_yields_claims() {
        let state = state();
        let email = Email::parse("shopper@example.com").unwrap();
        let token = state.0.issue(&email, None).unwrap();
        let mut parts = parts(Some(&format!("theme=dark; orchard_session={token}")));

        let CurrentSession(claims) = CurrentSession::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(claims.unwrap().email, email);
    }

    #[tokio::test]
    async fn test_tampered_cookie_is_anonymous() {
        let state = state();
        let mut parts = parts(Some("orchard_session=v1.e30.bm90LWEtc2lnbmF0dXJl"));

        let CurrentSession(claims) = CurrentSession::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert!(claims.is_none());
    }
}

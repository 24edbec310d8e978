//! Passwordless sign-in route handlers.
//!
//! A shopper asks for a code, types it back, and receives the signed
//! `orchard_session` cookie. The login transition (cart association and
//! wishlist merge) runs right after the cookie is issued.

use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::{AppendHeaders, IntoResponse},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;
use tracing::instrument;

use orchard_core::{CustomerId, Email, VerificationCode};

use crate::error::{Result, add_breadcrumb, clear_sentry_user};
use crate::middleware::{CurrentSession, clear_shopify_customer_token};
use crate::routes::wishlist::customer_profile;
use crate::services::auth::codes::CODE_TTL;
use crate::services::auth::{AuthError, SessionClaims, VerificationCodes, email_hash};
use crate::services::cart::{CartSession, SessionCartStore, resolve_buyer_identity};
use crate::services::email::deliver_code;
use crate::services::login::{LoginTransition, complete_login, post_verify_redirect};
use crate::services::wishlist::{SessionGuestWishlist, Wishlist, customer_owner};
use crate::shopify::CustomerAccessToken;
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

/// `POST /auth/send-code` body.
#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub email: String,
}

/// `POST /auth/verify-code` body.
#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
}

/// `POST /auth/verify-code` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

/// `GET /auth/session` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

impl From<Option<SessionClaims>> for SessionResponse {
    fn from(claims: Option<SessionClaims>) -> Self {
        match claims {
            Some(claims) => Self {
                authenticated: true,
                email: Some(claims.email.into_inner()),
                customer_id: claims.customer_id.map(CustomerId::into_inner),
            },
            None => Self {
                authenticated: false,
                email: None,
                customer_id: None,
            },
        }
    }
}

/// `GET /auth/code-status` query.
#[derive(Debug, Deserialize)]
pub struct CodeStatusQuery {
    pub email: String,
}

/// `GET /auth/code-status` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeStatusResponse {
    pub active: bool,
    pub seconds_remaining: u64,
}

// =============================================================================
// Handlers
// =============================================================================

/// Issue a code and send it to the shopper.
///
/// # Route
///
/// `POST /auth/send-code`
#[instrument(skip_all)]
pub async fn send_code(
    State(state): State<AppState>,
    Json(body): Json<SendCodeRequest>,
) -> Result<impl IntoResponse> {
    let email = Email::parse(&body.email).map_err(AuthError::from)?;

    let issued = VerificationCodes::new(state.kv()).issue_code(&email).await?;
    deliver_code(
        state.email(),
        state.config().environment,
        &email,
        &issued.code,
        CODE_TTL.as_secs() / 60,
    )
    .await;

    add_breadcrumb("auth", "Verification code issued", None);
    Ok(Json(json!({})))
}

/// Check a code and sign the shopper in.
///
/// A Customer Account token left in the browser by an earlier login belongs
/// to that login, so it is dropped before the transition runs.
///
/// # Route
///
/// `POST /auth/verify-code`
#[instrument(skip_all)]
pub async fn verify_code(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<VerifyCodeRequest>,
) -> Result<impl IntoResponse> {
    let email = Email::parse(&body.email).map_err(AuthError::from)?;
    let code = VerificationCode::parse(&body.code).map_err(AuthError::from)?;

    VerificationCodes::new(state.kv())
        .validate_code(&email, &code)
        .await?;

    let tokens = state.tokens();
    let token = tokens.issue(&email, None).map_err(AuthError::from)?;
    let claims = tokens.verify(&token).map_err(AuthError::from)?;
    let cookie = tokens.session_cookie(token);

    tracing::info!(email_hash = %email_hash(&email), "Signed in with verification code");
    clear_shopify_customer_token(&session).await?;
    finish_login(&state, &session, &claims, None).await;

    let response = VerifyCodeResponse {
        redirect_url: post_verify_redirect(&state.config().shopify, &email),
    };
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie.to_string())]),
        Json(response),
    ))
}

/// Sign the shopper out.
///
/// Drops the Customer Account token too; when it carried an ID token the
/// response points at Shopify's logout so that session ends as well.
///
/// # Route
///
/// `POST /auth/logout`
pub async fn logout(State(state): State<AppState>, session: Session) -> impl IntoResponse {
    let customer_token: Option<CustomerAccessToken> = session
        .get(crate::models::keys::SHOPIFY_CUSTOMER_TOKEN)
        .await
        .ok()
        .flatten();
    if let Err(e) = clear_shopify_customer_token(&session).await {
        tracing::warn!(error = %e, "Failed to clear customer token on logout");
    }
    clear_sentry_user();

    let redirect_url = customer_token.and_then(|token| token.id_token).map(|id_token| {
        let post_logout_uri = format!("{}/", state.config().base_url);
        state.customer().logout_url(&id_token, &post_logout_uri)
    });

    (
        AppendHeaders([(
            header::SET_COOKIE,
            state.tokens().removal_cookie().to_string(),
        )]),
        Json(VerifyCodeResponse { redirect_url }),
    )
}

/// Who is signed in. Never fails for anonymous requests.
///
/// # Route
///
/// `GET /auth/session`
pub async fn session(CurrentSession(claims): CurrentSession) -> Json<SessionResponse> {
    Json(claims.into())
}

/// Whether a code is outstanding, for the resend cooldown.
///
/// # Route
///
/// `GET /auth/code-status?email=`
pub async fn code_status(
    State(state): State<AppState>,
    Query(query): Query<CodeStatusQuery>,
) -> Result<Json<CodeStatusResponse>> {
    let email = Email::parse(&query.email).map_err(AuthError::from)?;
    let codes = VerificationCodes::new(state.kv());
    let seconds_remaining = codes.time_remaining(&email).await?;

    Ok(Json(CodeStatusResponse {
        active: seconds_remaining > 0,
        seconds_remaining,
    }))
}

// =============================================================================
// Login transition
// =============================================================================

/// Run the login transition for a freshly issued session.
pub(crate) async fn finish_login(
    state: &AppState,
    session: &Session,
    claims: &SessionClaims,
    customer_token: Option<&CustomerAccessToken>,
) -> LoginTransition {
    let cart_store = SessionCartStore::new(session.clone());
    let carts = CartSession::new(
        state.storefront(),
        &cart_store,
        resolve_buyer_identity(Some(claims), customer_token),
    );

    let guest = SessionGuestWishlist::new(session.clone());
    let profile = customer_profile(state, Some(claims), customer_token);
    let wishlist = profile.as_ref().map(|(profile, customer_id)| {
        Wishlist::authenticated(
            profile,
            &guest,
            state.wishlist_locks(),
            customer_owner(customer_id),
        )
    });

    complete_login(&carts, wishlist.as_ref()).await
}

//! Shopify Customer Account OAuth route handlers.
//!
//! Handles the OAuth flow for Shopify Customer Account authentication:
//! - Login: stores a PKCE verifier under a fresh `state`, binds that state
//!   to the browser session, and redirects to Shopify's authorization page
//! - Callback: checks the state against the browser session, consumes the
//!   verifier, exchanges the code for tokens, signs the shopper in with their
//!   customer ID, and runs the login transition

use axum::{
    extract::{Query, State},
    http::header,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tower_sessions::cookie::Cookie;

use orchard_core::Email;

use crate::error::AppError;
use crate::middleware::set_shopify_customer_token;
use crate::routes::auth::finish_login;
use crate::services::auth::oauth::{
    PendingLogin, bind_state, claim_state, store_pending, take_pending,
};
use crate::services::auth::{AuthError, email_hash};
use crate::shopify::ShopifyError;
use crate::shopify::customer::{PkceChallenge, random_token};
use crate::state::AppState;

const STATE_LENGTH: usize = 32;

/// Query parameters for starting a login.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    /// Email to pre-fill on Shopify's login page.
    pub login_hint: Option<String>,
    /// Local path to land on afterwards.
    pub return_to: Option<String>,
}

/// Query parameters from Shopify OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code to exchange for tokens.
    pub code: Option<String>,
    /// State parameter for CSRF protection.
    pub state: Option<String>,
    /// Error code if authorization failed.
    pub error: Option<String>,
    /// Error description.
    pub error_description: Option<String>,
}

fn redirect_uri(state: &AppState) -> String {
    format!("{}/auth/shopify/callback", state.config().base_url)
}

/// Keep only same-site paths.
fn local_path(path: Option<String>) -> Option<String> {
    path.filter(|p| p.starts_with('/') && !p.starts_with("//") && !p.contains('\\'))
}

/// Initiate Shopify Customer Account OAuth login.
///
/// # Route
///
/// `GET /auth/shopify/login`
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<LoginQuery>,
) -> Result<Response, AppError> {
    if !state.config().shopify.has_customer_accounts() {
        return Err(AppError::NotFound("Customer Account login".to_string()));
    }

    let oauth_state = random_token(STATE_LENGTH);
    let nonce = random_token(STATE_LENGTH);
    let pkce = PkceChallenge::generate();

    let pending = PendingLogin::new(
        pkce.verifier().to_owned(),
        nonce.clone(),
        local_path(query.return_to),
    );
    store_pending(state.kv(), &oauth_state, &pending).await?;
    bind_state(&session, &oauth_state).await?;

    let auth_url = state.customer().authorization_url(
        &redirect_uri(&state),
        &oauth_state,
        &nonce,
        &pkce,
        query.login_hint.as_deref(),
    );

    Ok(Redirect::to(&auth_url).into_response())
}

/// Handle Shopify OAuth callback.
///
/// Failures redirect home with an `auth_error` code rather than rendering
/// an error body, since this is a browser navigation.
///
/// # Route
///
/// `GET /auth/shopify/callback`
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Response {
    match complete(&state, &session, query).await {
        Ok((cookie, destination)) => (
            AppendHeaders([(header::SET_COOKIE, cookie.to_string())]),
            Redirect::to(&destination),
        )
            .into_response(),
        Err(e) => {
            let reason = match &e {
                AppError::Auth(AuthError::OAuthDenied(_)) => "denied",
                AppError::Auth(AuthError::InvalidOAuthState) => "expired",
                _ => "failed",
            };
            if e.status().is_server_error() {
                tracing::error!(error = %e, "Customer Account login failed");
            } else {
                tracing::warn!(error = %e, "Customer Account login rejected");
            }
            Redirect::to(&format!("/?auth_error={reason}")).into_response()
        }
    }
}

async fn complete(
    state: &AppState,
    session: &Session,
    query: CallbackQuery,
) -> Result<(Cookie<'static>, String), AppError> {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        return Err(AuthError::OAuthDenied(format!("{error}: {description}")).into());
    }
    let (Some(code), Some(returned_state)) = (query.code, query.state) else {
        return Err(AuthError::InvalidOAuthState.into());
    };

    claim_state(session, &returned_state).await?;
    let pending = take_pending(state.kv(), &returned_state).await?;

    let customer = state.customer();
    let token = customer
        .exchange_code(&code, &redirect_uri(state), &pending.code_verifier)
        .await
        .map_err(AuthError::from)?;
    let identity = customer
        .get_customer(&token.access_token)
        .await
        .map_err(AuthError::from)?;

    let raw_email = identity.email.ok_or_else(|| {
        AuthError::Shopify(ShopifyError::OAuth(
            "customer account has no email address".to_string(),
        ))
    })?;
    let email = Email::parse(&raw_email).map_err(AuthError::from)?;

    let tokens = state.tokens();
    let session_token = tokens
        .issue(&email, Some(&identity.id))
        .map_err(AuthError::from)?;
    let claims = tokens.verify(&session_token).map_err(AuthError::from)?;

    set_shopify_customer_token(session, &token).await?;
    tracing::info!(
        email_hash = %email_hash(&email),
        customer_id = %identity.id,
        "Signed in with Customer Account"
    );

    finish_login(state, session, &claims, Some(&token)).await;

    let destination = pending.return_to.unwrap_or_else(|| "/".to_string());
    Ok((tokens.session_cookie(session_token), destination))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_path_rejects_offsite_targets() {
        assert_eq!(local_path(Some("/cart".into())).as_deref(), Some("/cart"));
        assert_eq!(local_path(Some("//evil.example".into())), None);
        assert_eq!(local_path(Some("https://evil.example".into())), None);
        assert_eq!(local_path(Some("/\\evil.example".into())), None);
        assert_eq!(local_path(None), None);
    }
}

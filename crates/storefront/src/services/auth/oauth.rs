//! Pending Customer Account logins.
//!
//! Between redirecting the shopper to Shopify and receiving the callback, the
//! PKCE verifier and OIDC nonce live in KV under `pkce:<state>`. The record is
//! consumed on first read so a callback URL cannot be replayed. The `state`
//! is also kept in the browser session that started the login, and a
//! callback is only accepted from that browser.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::warn;

use super::error::AuthError;
use crate::kv::{KvError, KvStore, PKCE_PREFIX};
use crate::models::keys;

/// How long a login may stay pending.
pub const PENDING_LOGIN_TTL: Duration = Duration::from_secs(10 * 60);

/// Secrets needed to finish an OAuth login.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingLogin {
    /// PKCE code verifier sent with the token exchange.
    pub code_verifier: String,
    /// Nonce echoed in the ID token.
    pub nonce: String,
    /// Where to send the shopper once signed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
    expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin")
            .field("code_verifier", &"[REDACTED]")
            .field("nonce", &"[REDACTED]")
            .field("return_to", &self.return_to)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl PendingLogin {
    /// A pending login expiring [`PENDING_LOGIN_TTL`] from now.
    #[must_use]
    pub fn new(code_verifier: String, nonce: String, return_to: Option<String>) -> Self {
        let lifetime = TimeDelta::from_std(PENDING_LOGIN_TTL).unwrap_or(TimeDelta::minutes(10));
        Self {
            code_verifier,
            nonce,
            return_to,
            expires_at: Utc::now() + lifetime,
        }
    }
}

fn pending_key(state: &str) -> String {
    format!("{PKCE_PREFIX}{state}")
}

/// Store `login` under `state`.
///
/// # Errors
///
/// Returns `Storage` if the KV store fails.
pub async fn store_pending<K: KvStore>(
    kv: &K,
    state: &str,
    login: &PendingLogin,
) -> Result<(), AuthError> {
    let value = serde_json::to_string(login).map_err(KvError::Encoding)?;
    kv.set(&pending_key(state), &value, PENDING_LOGIN_TTL).await?;
    Ok(())
}

/// Remember `state` in the browser session starting the login.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn bind_state(
    session: &Session,
    state: &str,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(keys::OAUTH_STATE, state).await
}

/// Accept `returned` only if this browser started the login; the bound
/// state is consumed either way.
///
/// # Errors
///
/// Returns `InvalidOAuthState` if no state is bound to this session or it
/// differs from `returned`.
pub async fn claim_state(session: &Session, returned: &str) -> Result<(), AuthError> {
    let bound: Option<String> = session.remove(keys::OAUTH_STATE).await.map_err(|e| {
        warn!(error = %e, "Failed to read OAuth state from session");
        AuthError::InvalidOAuthState
    })?;
    if bound.as_deref() != Some(returned) {
        warn!(bound = bound.is_some(), "OAuth state does not belong to this browser");
        return Err(AuthError::InvalidOAuthState);
    }
    Ok(())
}

/// Consume the pending login for `state`.
///
/// # Errors
///
/// Returns `InvalidOAuthState` if nothing live is stored under `state`, or
/// `Storage` if the KV store fails.
pub async fn take_pending<K: KvStore>(kv: &K, state: &str) -> Result<PendingLogin, AuthError> {
    let key = pending_key(state);
    let Some(raw) = kv.get(&key).await? else {
        return Err(AuthError::InvalidOAuthState);
    };
    kv.delete(&key).await?;

    let login: PendingLogin = serde_json::from_str(&raw).map_err(|e| {
        warn!(error = %e, "Discarding unreadable pending login");
        AuthError::InvalidOAuthState
    })?;

    if Utc::now() > login.expires_at {
        return Err(AuthError::InvalidOAuthState);
    }
    Ok(login)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;
    use crate::kv::MemoryKvStore;

    fn browser(store: &Arc<MemoryStore>) -> Session {
        Session::new(None, store.clone(), None)
    }

    #[tokio::test]
    async fn test_pending_login_is_single_use() {
        let kv = MemoryKvStore::new();
        let login = PendingLogin::new("verifier".into(), "nonce".into(), Some("/cart".into()));
        store_pending(&kv, "state-1", &login).await.unwrap();

        let taken = take_pending(&kv, "state-1").await.unwrap();
        assert_eq!(taken.code_verifier, "verifier");
        assert_eq!(taken.nonce, "nonce");
        assert_eq!(taken.return_to.as_deref(), Some("/cart"));

        assert!(matches!(
            take_pending(&kv, "state-1").await,
            Err(AuthError::InvalidOAuthState)
        ));
    }

    #[tokio::test]
    async fn test_unknown_state_is_rejected() {
        let kv = MemoryKvStore::new();
        assert!(matches!(
            take_pending(&kv, "never-issued").await,
            Err(AuthError::InvalidOAuthState)
        ));
    }

    #[tokio::test]
    async fn test_callback_only_accepted_from_starting_browser() {
        let kv = MemoryKvStore::new();
        let store = Arc::new(MemoryStore::default());
        let starter = browser(&store);
        let other = browser(&store);

        let login = PendingLogin::new("verifier".into(), "nonce".into(), None);
        store_pending(&kv, "state-a", &login).await.unwrap();
        bind_state(&starter, "state-a").await.unwrap();

        assert!(matches!(
            claim_state(&other, "state-a").await,
            Err(AuthError::InvalidOAuthState)
        ));

        claim_state(&starter, "state-a").await.unwrap();
        let taken = take_pending(&kv, "state-a").await.unwrap();
        assert_eq!(taken.code_verifier, "verifier");
    }

    #[tokio::test]
    async fn test_mismatched_state_consumes_binding() {
        let store = Arc::new(MemoryStore::default());
        let session = browser(&store);
        bind_state(&session, "state-a").await.unwrap();

        assert!(claim_state(&session, "state-b").await.is_err());
        assert!(claim_state(&session, "state-a").await.is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let login = PendingLogin::new("verifier-secret".into(), "nonce-secret".into(), None);
        let debug = format!("{login:?}");
        assert!(!debug.contains("verifier-secret"));
        assert!(!debug.contains("nonce-secret"));
    }
}

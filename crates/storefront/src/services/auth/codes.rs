//! Verification code engine.
//!
//! One live code per email, stored under `verify:<email>` as JSON with an
//! embedded `expiresAt` and a KV TTL matching it. Expiry is checked at read
//! time: a validation that finds an expired record deletes it.
//!
//! Every issue and validate call counts against a per-email hourly window
//! (`attempts:issue:<email>` / `attempts:verify:<email>`), using the store's
//! atomic increment.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use orchard_core::{Email, VerificationCode};

use super::email_hash;
use super::error::CodeError;
use crate::kv::{ATTEMPTS_PREFIX, KvError, KvStore, VERIFY_PREFIX};

/// Lifetime of an issued code.
pub const CODE_TTL: Duration = Duration::from_secs(10 * 60);

/// Length of the attempt-counting window.
pub const ATTEMPT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Codes that may be issued per email per window.
pub const MAX_ISSUES_PER_WINDOW: i64 = 5;

/// Validations that may be attempted per email per window.
pub const MAX_VALIDATIONS_PER_WINDOW: i64 = 10;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCode {
    email: Email,
    code: VerificationCode,
    expires_at: DateTime<Utc>,
}

/// A freshly issued code, to be handed to the delivery channel.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    /// The code itself.
    pub code: VerificationCode,
    /// When the code stops validating.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
enum Attempt {
    Issue,
    Validate,
}

impl Attempt {
    const fn key_segment(self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Validate => "verify",
        }
    }

    const fn limit(self) -> i64 {
        match self {
            Self::Issue => MAX_ISSUES_PER_WINDOW,
            Self::Validate => MAX_VALIDATIONS_PER_WINDOW,
        }
    }
}

/// Issues and validates single-use codes bound to an email address.
pub struct VerificationCodes<'a, K> {
    kv: &'a K,
    clock: &'a dyn Clock,
}

impl<'a, K: KvStore> VerificationCodes<'a, K> {
    /// Create an engine over the given store using wall-clock time.
    #[must_use]
    pub fn new(kv: &'a K) -> Self {
        Self::with_clock(kv, &SystemClock)
    }

    /// Create an engine with an explicit clock.
    #[must_use]
    pub fn with_clock(kv: &'a K, clock: &'a dyn Clock) -> Self {
        Self { kv, clock }
    }

    /// Generate and store a new code for `email`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `TooManyAttempts` past the issue cap, `StorageUnavailable` if
    /// the KV store fails.
    #[instrument(skip(self, email), fields(email_hash = %email_hash(email)))]
    pub async fn issue_code(&self, email: &Email) -> Result<IssuedCode, CodeError> {
        self.count_attempt(Attempt::Issue, email).await?;

        let code = VerificationCode::generate();
        let expires_at = self.clock.now() + code_lifetime();
        let record = StoredCode {
            email: email.clone(),
            code: code.clone(),
            expires_at,
        };
        let value = serde_json::to_string(&record).map_err(KvError::Encoding)?;

        self.kv.set(&code_key(email), &value, CODE_TTL).await?;

        info!(%expires_at, "Verification code issued");
        Ok(IssuedCode { code, expires_at })
    }

    /// Check `submitted` against the live code for `email`.
    ///
    /// A match consumes the code. A mismatch keeps it so the shopper can retry
    /// within its lifetime. An expired record is deleted.
    ///
    /// # Errors
    ///
    /// Returns the [`CodeError`] describing why the code was not accepted.
    #[instrument(skip(self, email, submitted), fields(email_hash = %email_hash(email)))]
    pub async fn validate_code(
        &self,
        email: &Email,
        submitted: &VerificationCode,
    ) -> Result<(), CodeError> {
        self.count_attempt(Attempt::Validate, email).await?;

        let key = code_key(email);
        let Some(raw) = self.kv.get(&key).await? else {
            return Err(CodeError::CodeNotFound);
        };

        let record: StoredCode = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable verification code record");
                self.kv.delete(&key).await?;
                return Err(CodeError::CodeNotFound);
            }
        };

        if self.clock.now() > record.expires_at {
            self.kv.delete(&key).await?;
            return Err(CodeError::CodeExpired);
        }

        if !record.code.matches(submitted) {
            return Err(CodeError::CodeMismatch);
        }

        self.kv.delete(&key).await?;
        info!("Verification code accepted");
        Ok(())
    }

    /// Whether `email` currently has a live code. Read-only.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the KV store fails.
    pub async fn has_active_code(&self, email: &Email) -> Result<bool, CodeError> {
        Ok(self.live_record(email).await?.is_some())
    }

    /// Whole seconds until the live code for `email` expires, 0 if none.
    /// Read-only.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the KV store fails.
    pub async fn time_remaining(&self, email: &Email) -> Result<u64, CodeError> {
        let Some(record) = self.live_record(email).await? else {
            return Ok(0);
        };
        let remaining = (record.expires_at - self.clock.now()).num_seconds();
        Ok(u64::try_from(remaining).unwrap_or(0))
    }

    async fn live_record(&self, email: &Email) -> Result<Option<StoredCode>, CodeError> {
        let Some(raw) = self.kv.get(&code_key(email)).await? else {
            return Ok(None);
        };
        let now = self.clock.now();
        Ok(serde_json::from_str::<StoredCode>(&raw)
            .ok()
            .filter(|record| now <= record.expires_at))
    }

    async fn count_attempt(&self, attempt: Attempt, email: &Email) -> Result<(), CodeError> {
        let key = format!("{ATTEMPTS_PREFIX}{}:{email}", attempt.key_segment());
        let count = self.kv.increment(&key, ATTEMPT_WINDOW).await?;
        if count > attempt.limit() {
            warn!(
                attempt = attempt.key_segment(),
                count, "Verification attempt cap exceeded"
            );
            return Err(CodeError::TooManyAttempts);
        }
        Ok(())
    }
}

fn code_key(email: &Email) -> String {
    format!("{VERIFY_PREFIX}{email}")
}

fn code_lifetime() -> TimeDelta {
    TimeDelta::minutes(10)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::kv::MemoryKvStore;

    /// A clock that only moves when told to.
    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Mutex::new(Utc::now()))
        }

        fn advance(&self, by: TimeDelta) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    /// A store whose every operation fails.
    struct DownKv;

    impl KvStore for DownKv {
        async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
            Err(KvError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), KvError> {
            Err(KvError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn delete(&self, _key: &str) -> Result<(), KvError> {
            Err(KvError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn increment(&self, _key: &str, _ttl: Duration) -> Result<i64, KvError> {
            Err(KvError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    fn wrong_code(issued: &VerificationCode) -> VerificationCode {
        let other = if issued.as_str() == "000000" { "111111" } else { "000000" };
        VerificationCode::parse(other).unwrap()
    }

    #[tokio::test]
    async fn test_scenario_wrong_then_right_then_reused() {
        let kv = MemoryKvStore::new();
        let codes = VerificationCodes::new(&kv);
        let a = email("a@b.com");

        let issued = codes.issue_code(&a).await.unwrap();

        let err = codes.validate_code(&a, &wrong_code(&issued.code)).await.unwrap_err();
        assert!(matches!(err, CodeError::CodeMismatch));
        assert!(err.user_message().starts_with("Invalid code"));

        codes.validate_code(&a, &issued.code).await.unwrap();

        let err = codes.validate_code(&a, &issued.code).await.unwrap_err();
        assert!(matches!(err, CodeError::CodeNotFound));
        assert!(err.user_message().starts_with("No verification code found"));
    }

    #[tokio::test]
    async fn test_only_latest_code_validates() {
        let kv = MemoryKvStore::new();
        let codes = VerificationCodes::new(&kv);
        let a = email("a@b.com");

        let first = codes.issue_code(&a).await.unwrap();
        let second = codes.issue_code(&a).await.unwrap();
        let third = codes.issue_code(&a).await.unwrap();

        for stale in [&first.code, &second.code] {
            if stale.matches(&third.code) {
                continue;
            }
            let err = codes.validate_code(&a, stale).await.unwrap_err();
            assert!(matches!(err, CodeError::CodeMismatch));
        }
        codes.validate_code(&a, &third.code).await.unwrap();
    }

    #[tokio::test]
    async fn test_email_is_normalized_for_lookup() {
        let kv = MemoryKvStore::new();
        let codes = VerificationCodes::new(&kv);

        let issued = codes.issue_code(&email(" A@B.com ")).await.unwrap();
        codes
            .validate_code(&email("a@b.com"), &issued.code)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_code_is_swept() {
        let kv = MemoryKvStore::new();
        let clock = ManualClock::new();
        let codes = VerificationCodes::with_clock(&kv, &clock);
        let a = email("a@b.com");

        let issued = codes.issue_code(&a).await.unwrap();
        clock.advance(code_lifetime() + TimeDelta::milliseconds(1));

        let err = codes.validate_code(&a, &issued.code).await.unwrap_err();
        assert!(matches!(err, CodeError::CodeExpired));

        let err = codes.validate_code(&a, &issued.code).await.unwrap_err();
        assert!(matches!(err, CodeError::CodeNotFound));
    }

    #[tokio::test]
    async fn test_code_valid_at_exact_expiry() {
        let kv = MemoryKvStore::new();
        let clock = ManualClock::new();
        let codes = VerificationCodes::with_clock(&kv, &clock);
        let a = email("a@b.com");

        let issued = codes.issue_code(&a).await.unwrap();
        clock.advance(code_lifetime());
        codes.validate_code(&a, &issued.code).await.unwrap();
    }

    #[tokio::test]
    async fn test_active_code_helpers_do_not_mutate() {
        let kv = MemoryKvStore::new();
        let clock = ManualClock::new();
        let codes = VerificationCodes::with_clock(&kv, &clock);
        let a = email("a@b.com");

        assert!(!codes.has_active_code(&a).await.unwrap());
        assert_eq!(codes.time_remaining(&a).await.unwrap(), 0);

        let issued = codes.issue_code(&a).await.unwrap();
        assert!(codes.has_active_code(&a).await.unwrap());
        assert_eq!(codes.time_remaining(&a).await.unwrap(), 600);

        clock.advance(TimeDelta::seconds(90));
        assert_eq!(codes.time_remaining(&a).await.unwrap(), 510);

        // Past expiry the helpers report nothing, but leave the record for
        // validation to sweep.
        clock.advance(TimeDelta::minutes(9));
        assert!(!codes.has_active_code(&a).await.unwrap());
        assert_eq!(codes.time_remaining(&a).await.unwrap(), 0);
        let err = codes.validate_code(&a, &issued.code).await.unwrap_err();
        assert!(matches!(err, CodeError::CodeExpired));
    }

    #[tokio::test]
    async fn test_issue_cap() {
        let kv = MemoryKvStore::new();
        let codes = VerificationCodes::new(&kv);
        let a = email("a@b.com");

        for _ in 0..MAX_ISSUES_PER_WINDOW {
            codes.issue_code(&a).await.unwrap();
        }
        let err = codes.issue_code(&a).await.unwrap_err();
        assert!(matches!(err, CodeError::TooManyAttempts));

        // Other addresses are unaffected.
        codes.issue_code(&email("c@d.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_validation_cap() {
        let kv = MemoryKvStore::new();
        let codes = VerificationCodes::new(&kv);
        let a = email("a@b.com");
        let issued = codes.issue_code(&a).await.unwrap();
        let wrong = wrong_code(&issued.code);

        for _ in 0..MAX_VALIDATIONS_PER_WINDOW {
            let err = codes.validate_code(&a, &wrong).await.unwrap_err();
            assert!(matches!(err, CodeError::CodeMismatch));
        }
        let err = codes.validate_code(&a, &issued.code).await.unwrap_err();
        assert!(matches!(err, CodeError::TooManyAttempts));
    }

    #[tokio::test]
    async fn test_storage_failure_is_distinct() {
        let codes = VerificationCodes::new(&DownKv);
        let a = email("a@b.com");

        let err = codes.issue_code(&a).await.unwrap_err();
        assert!(matches!(err, CodeError::StorageUnavailable(_)));

        let code = VerificationCode::parse("123456").unwrap();
        let err = codes.validate_code(&a, &code).await.unwrap_err();
        assert!(matches!(err, CodeError::StorageUnavailable(_)));
        assert!(err.user_message().contains("couldn't reach"));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_discarded() {
        let kv = MemoryKvStore::new();
        let codes = VerificationCodes::new(&kv);
        let a = email("a@b.com");
        kv.set("verify:a@b.com", "{not json", CODE_TTL).await.unwrap();

        let code = VerificationCode::parse("123456").unwrap();
        let err = codes.validate_code(&a, &code).await.unwrap_err();
        assert!(matches!(err, CodeError::CodeNotFound));
        assert!(kv.get("verify:a@b.com").await.unwrap().is_none());
    }
}

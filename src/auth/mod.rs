//! Session credentials and the refresh coordinator.
//!
//! A [`Credential`] is immutable once built: refresh produces a whole new
//! value, so concurrent readers only ever observe the old credential or the
//! new one, never a half-updated token pair. [`SessionRefresher`] owns the
//! current credential and serializes refresh exchanges so that any number
//! of concurrent expired-reads collapse into a single wire call.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::client::{ApiClient, ApiError};
use crate::api::{AuthResponse, AuthUser, TokenData};

/// Margin subtracted from the server-reported expiry so that "expired"
/// checks never race a server-side rejection.
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 60;

/// Access/refresh token pair plus the margin-adjusted expiry instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from an auth endpoint's token payload. The safety
    /// margin is applied here, once, so every later expiry check is plain.
    pub fn from_token_data(token: &TokenData) -> Self {
        let reported = DateTime::<Utc>::from_timestamp(token.expired_at, 0)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: reported - Duration::seconds(EXPIRY_SAFETY_MARGIN_SECS),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Terminal session failure marker. Call sites observing it must force a
/// sign-out; the refresher never retries on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    RefreshFailed,
}

/// Snapshot returned by [`SessionRefresher::read`]: the credential that was
/// current when the read completed, plus the error marker if the session
/// has failed terminally.
#[derive(Debug, Clone)]
pub struct Session {
    pub credential: Credential,
    pub error: Option<SessionError>,
}

impl Session {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Seam over the refresh exchange so the coordinator can be tested without
/// a live auth endpoint.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<AuthResponse, ApiError>;
}

#[async_trait]
impl TokenExchanger for ApiClient {
    async fn exchange(&self, refresh_token: &str) -> Result<AuthResponse, ApiError> {
        self.refresh(refresh_token).await
    }
}

struct RefresherState {
    credential: Credential,
    error: Option<SessionError>,
    generation: u64,
}

/// Owns the session credential and performs lazy, serialized refresh.
///
/// Every read goes through one async mutex: the first reader to observe an
/// expired credential performs the exchange while later readers wait and
/// then see the replacement, so a burst of expired-reads costs exactly one
/// wire call. A failed exchange is terminal; subsequent reads return the
/// error marker without touching the network again.
pub struct SessionRefresher<E: TokenExchanger> {
    exchanger: E,
    state: Mutex<RefresherState>,
}

impl<E: TokenExchanger> SessionRefresher<E> {
    pub fn new(exchanger: E, credential: Credential) -> Self {
        Self {
            exchanger,
            state: Mutex::new(RefresherState {
                credential,
                error: None,
                generation: 0,
            }),
        }
    }

    /// Read the current session, refreshing first if the credential has
    /// expired. Returns rather than propagates the failure: an unrefreshable
    /// session comes back as a [`Session`] carrying [`SessionError`].
    pub async fn read(&self) -> Session {
        let mut state = self.state.lock().await;

        if state.error.is_none() && state.credential.is_expired() {
            debug!(generation = state.generation, "credential expired, refreshing");
            match self.exchanger.exchange(&state.credential.refresh_token).await {
                Ok(response) => {
                    state.credential = Credential::from_token_data(&response.token);
                    state.generation += 1;
                    debug!(generation = state.generation, "credential refreshed");
                }
                Err(error) => {
                    warn!("refresh exchange failed: {error}");
                    state.error = Some(SessionError::RefreshFailed);
                }
            }
        }

        Session {
            credential: state.credential.clone(),
            error: state.error,
        }
    }

    /// Replace the session after a fresh login or registration. Clears any
    /// terminal error and starts a new credential generation.
    pub async fn install(&self, credential: Credential) {
        let mut state = self.state.lock().await;
        state.credential = credential;
        state.error = None;
        state.generation += 1;
    }

    /// Generation of the current credential; bumps on every replacement.
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }
}

/// Password login. Constructs a fresh valid credential directly from the
/// auth endpoint's response, bypassing the refresh path entirely.
pub async fn sign_in(
    api: &ApiClient,
    email: &str,
    password: &str,
) -> Result<(AuthUser, Credential), ApiError> {
    let response = api.login(email, password).await?;
    Ok((
        response.user.clone(),
        Credential::from_token_data(&response.token),
    ))
}

/// Federated login with a Google id token.
pub async fn sign_in_with_google(
    api: &ApiClient,
    id_token: &str,
) -> Result<(AuthUser, Credential), ApiError> {
    let response = api.login_google(id_token).await?;
    Ok((
        response.user.clone(),
        Credential::from_token_data(&response.token),
    ))
}

/// Account registration; like login, yields a ready credential.
pub async fn register(
    api: &ApiClient,
    name: &str,
    email: &str,
    password: &str,
) -> Result<(AuthUser, Credential), ApiError> {
    let response = api.register(name, email, password).await?;
    Ok((
        response.user.clone(),
        Credential::from_token_data(&response.token),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn token_data(suffix: &str, expired_at: i64) -> TokenData {
        TokenData {
            access_token: format!("access-{suffix}"),
            refresh_token: format!("refresh-{suffix}"),
            expired_at,
        }
    }

    fn expired_credential() -> Credential {
        Credential {
            access_token: "access-old".to_string(),
            refresh_token: "refresh-old".to_string(),
            expires_at: Utc::now() - Duration::seconds(10),
        }
    }

    fn auth_response(suffix: &str, expired_at: i64) -> AuthResponse {
        AuthResponse {
            user: AuthUser {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                image_url: None,
            },
            token: token_data(suffix, expired_at),
        }
    }

    struct CountingExchanger {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingExchanger {
        fn succeeding() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenExchanger for CountingExchanger {
        async fn exchange(&self, _refresh_token: &str) -> Result<AuthResponse, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ApiError::Unauthorized)
            } else {
                Ok(auth_response("new", Utc::now().timestamp() + 3_600))
            }
        }
    }

    #[test]
    fn expiry_margin_is_applied_at_construction() {
        let reported = 1_700_000_000;
        let credential = Credential::from_token_data(&token_data("a", reported));
        let expected = DateTime::<Utc>::from_timestamp(reported - EXPIRY_SAFETY_MARGIN_SECS, 0)
            .expect("timestamp in range");
        assert_eq!(credential.expires_at, expected);
    }

    #[test]
    fn expiry_check_is_against_the_adjusted_instant() {
        let credential = Credential::from_token_data(&token_data("a", 1_700_000_000));
        let just_before = credential.expires_at - Duration::seconds(1);
        let at_boundary = credential.expires_at;
        assert!(!credential.is_expired_at(just_before));
        assert!(credential.is_expired_at(at_boundary));
    }

    #[tokio::test]
    async fn expired_read_refreshes_exactly_once() {
        let refresher = SessionRefresher::new(CountingExchanger::succeeding(), expired_credential());

        let session = refresher.read().await;
        assert!(session.error.is_none());
        assert_eq!(session.credential.access_token, "access-new");
        assert!(!session.credential.is_expired());
        assert_eq!(refresher.exchanger.count(), 1);
        assert_eq!(refresher.generation().await, 1);
    }

    #[tokio::test]
    async fn valid_read_never_exchanges() {
        let credential = Credential::from_token_data(&token_data(
            "a",
            Utc::now().timestamp() + 3_600,
        ));
        let refresher = SessionRefresher::new(CountingExchanger::succeeding(), credential.clone());

        let session = refresher.read().await;
        assert_eq!(session.credential, credential);
        assert_eq!(refresher.exchanger.count(), 0);
    }

    #[tokio::test]
    async fn concurrent_expired_reads_collapse_into_one_exchange() {
        let refresher = SessionRefresher::new(CountingExchanger::succeeding(), expired_credential());

        let (first, second) = tokio::join!(refresher.read(), refresher.read());
        assert_eq!(first.credential.access_token, "access-new");
        assert_eq!(second.credential.access_token, "access-new");
        assert_eq!(refresher.exchanger.count(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_marks_the_session_and_never_retries() {
        let refresher = SessionRefresher::new(CountingExchanger::failing(), expired_credential());

        let session = refresher.read().await;
        assert_eq!(session.error, Some(SessionError::RefreshFailed));
        assert!(session.is_failed());

        // Terminal: later reads surface the marker without another exchange.
        let session = refresher.read().await;
        assert_eq!(session.error, Some(SessionError::RefreshFailed));
        assert_eq!(refresher.exchanger.count(), 1);
    }

    #[tokio::test]
    async fn install_clears_the_error_and_bumps_the_generation() {
        let refresher = SessionRefresher::new(CountingExchanger::failing(), expired_credential());
        let _ = refresher.read().await;
        assert!(refresher.read().await.is_failed());

        let fresh = Credential::from_token_data(&token_data("fresh", Utc::now().timestamp() + 3_600));
        refresher.install(fresh.clone()).await;

        let session = refresher.read().await;
        assert!(!session.is_failed());
        assert_eq!(session.credential, fresh);
        assert_eq!(refresher.generation().await, 1);
    }
}

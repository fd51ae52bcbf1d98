use std::{fmt, sync::Arc, time::Duration};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use charger_monitor_domain::config::MonitorConfig;
use chrono::{DateTime, Utc};
use metrics::counter;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT},
    Client, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    error::{AuthError, FetchError},
    types::{ApiErrorBody, LoginRequest, LoginResponse},
    version::check_response_headers,
};

/// Credentials are refreshed this many seconds before their stated expiry.
pub const EXPIRY_SKEW_SECS: i64 = 30;

const LOGIN_PATH: &str = "/client/auth/login";

const APP_USER_AGENT: &str = "GrizzlEConnect/115 CFNetwork/3826.500.131 Darwin/24.5.0";
const APP_CLIENT: &str = "Apple, iPad14,3, iPadOS 18.5";
const APP_VERSION_LABEL: &str = "v0.9.2 (115)";
const APP_NAME: &str = "Grizzl-E Connect";

/// True when `expiry` is less than [`EXPIRY_SKEW_SECS`] after `now`.
pub fn is_expired(expiry: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expiry - now < chrono::Duration::seconds(EXPIRY_SKEW_SECS)
}

/// Claims carried in the payload of a session token. The signature is never
/// checked; the token is only read to learn when it expires.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub iat: Option<DateTime<Utc>>,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
    #[serde(default, rename = "userSessionId")]
    pub user_session_id: Option<String>,
}

#[derive(Clone)]
pub struct Credential {
    token: String,
    claims: TokenClaims,
}

impl Credential {
    pub fn from_token(token: impl Into<String>) -> Result<Self, AuthError> {
        let token = token.into();
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_header), Some(payload), Some(_signature)) => payload,
            _ => {
                return Err(AuthError::MalformedToken(
                    "expected three dot separated segments".to_string(),
                ))
            }
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|err| AuthError::MalformedToken(err.to_string()))?;
        let claims: TokenClaims = serde_json::from_slice(&bytes)
            .map_err(|err| AuthError::MalformedToken(err.to_string()))?;

        Ok(Self { token, claims })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.claims.exp
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        is_expired(self.claims.exp, now)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Owns the HTTP client and the current session credential.
///
/// Readers share the credential through a read lock. A refresh holds the write
/// lock for the whole login exchange, so concurrent callers queue behind a
/// single login and then observe its result.
pub struct SessionClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    credential: RwLock<Option<Arc<Credential>>>,
}

impl SessionClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .default_headers(app_headers())
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::Client(err.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            base_url,
            username: username.into(),
            password: password.into(),
            credential: RwLock::new(None),
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, FetchError> {
        Self::new(
            config.api_base_url(),
            config.username(),
            config.password(),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchanges `username` and `password` for a credential. The result is not
    /// stored; see [`SessionClient::ensure_valid_session`].
    pub async fn login(&self, username: &str, password: &str) -> Result<Credential, AuthError> {
        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest {
                email_or_phone: username,
                password,
            })
            .send()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .map(|error| error.message.text().to_string())
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(AuthError::InvalidCredentials { message });
        }

        check_response_headers(response.headers())?;
        let body: LoginResponse = response
            .json()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;
        let credential = Credential::from_token(body.token)?;
        debug!(
            user = %body.user.id,
            expires_at = %credential.expires_at(),
            "logged in to connect api"
        );

        Ok(credential)
    }

    /// Returns a credential valid for at least [`EXPIRY_SKEW_SECS`], logging in
    /// when none is stored or the stored one is about to expire.
    pub async fn ensure_valid_session(&self) -> Result<Arc<Credential>, AuthError> {
        {
            let current = self.credential.read().await;
            if let Some(credential) = current.as_ref() {
                if !credential.is_expired_at(Utc::now()) {
                    return Ok(Arc::clone(credential));
                }
            }
        }

        let mut slot = self.credential.write().await;
        if let Some(credential) = slot.as_ref() {
            if !credential.is_expired_at(Utc::now()) {
                return Ok(Arc::clone(credential));
            }
        }

        match self.login(&self.username, &self.password).await {
            Ok(credential) => {
                counter!("monitor_logins_total", "result" => "ok").increment(1);
                info!(expires_at = %credential.expires_at(), "connect session established");
                let credential = Arc::new(credential);
                *slot = Some(Arc::clone(&credential));
                Ok(credential)
            }
            Err(err) => {
                counter!("monitor_logins_total", "result" => "error").increment(1);
                *slot = None;
                Err(err)
            }
        }
    }

    /// Drops the stored credential if it is still `stale`, forcing the next
    /// request to log in again.
    pub async fn invalidate(&self, stale: &Credential) {
        let mut slot = self.credential.write().await;
        if slot
            .as_ref()
            .is_some_and(|current| current.token() == stale.token())
        {
            *slot = None;
        }
    }

    pub async fn logout(&self) {
        self.credential.write().await.take();
    }

    pub async fn current_credential(&self) -> Option<Arc<Credential>> {
        self.credential.read().await.clone()
    }

    /// Authenticated GET. A 401 invalidates the session and retries once with
    /// a fresh login.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let mut retried = false;
        loop {
            let credential = self.ensure_valid_session().await?;
            let response = self
                .http
                .get(self.url(path))
                .query(query)
                .bearer_auth(credential.token())
                .send()
                .await
                .map_err(|err| FetchError::Transport {
                    path: path.to_string(),
                    message: err.to_string(),
                })?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !retried {
                warn!(path, "session rejected by connect api, logging in again");
                self.invalidate(&credential).await;
                retried = true;
                continue;
            }
            if !status.is_success() {
                return Err(FetchError::Status {
                    path: path.to_string(),
                    status: status.as_u16(),
                });
            }

            check_response_headers(response.headers())?;
            return response.json::<T>().await.map_err(|err| FetchError::Decode {
                path: path.to_string(),
                message: err.to_string(),
            });
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn app_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(APP_USER_AGENT));
    headers.insert(
        HeaderName::from_static("x-app-client"),
        HeaderValue::from_static(APP_CLIENT),
    );
    headers.insert(
        HeaderName::from_static("x-app-version"),
        HeaderValue::from_static(APP_VERSION_LABEL),
    );
    headers.insert(
        HeaderName::from_static("x-application-name"),
        HeaderValue::from_static(APP_NAME),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{jwt_expiring_in, spawn_stub, StubResponse};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session(base_url: String) -> SessionClient {
        SessionClient::new(base_url, "driver@example.com", "secret", Duration::from_secs(5))
            .expect("client builds")
    }

    #[test]
    fn expiry_honours_skew() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(is_expired(now - chrono::Duration::seconds(1), now));
        assert!(is_expired(now + chrono::Duration::seconds(29), now));
        assert!(!is_expired(now + chrono::Duration::seconds(30), now));
        assert!(!is_expired(now + chrono::Duration::minutes(10), now));
    }

    #[test]
    fn decodes_token_claims() {
        let credential = Credential::from_token(jwt_expiring_in(3600)).expect("token decodes");
        assert_eq!(credential.claims().user_id.as_deref(), Some("user-1"));
        assert_eq!(
            credential.claims().user_session_id.as_deref(),
            Some("session-1")
        );
        assert!(!credential.is_expired_at(Utc::now()));
        assert!(!format!("{credential:?}").contains(credential.token()));
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(matches!(
            Credential::from_token("not-a-jwt"),
            Err(AuthError::MalformedToken(_))
        ));
        assert!(matches!(
            Credential::from_token("a.%%%.c"),
            Err(AuthError::MalformedToken(_))
        ));
        let no_exp = format!("e30.{}.c2ln", URL_SAFE_NO_PAD.encode(r#"{"userId":"u"}"#));
        assert!(matches!(
            Credential::from_token(no_exp),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_login() {
        let logins = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&logins);
        let base_url = spawn_stub(move |request| {
            assert_eq!(request.path, LOGIN_PATH);
            counter.fetch_add(1, Ordering::SeqCst);
            StubResponse::json(200, format!(r#"{{"token":"{}"}}"#, jwt_expiring_in(3600)))
                .delayed(Duration::from_millis(50))
        })
        .await;
        let client = Arc::new(session(base_url));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let client = Arc::clone(&client);
            handles.push(tokio::spawn(async move {
                client.ensure_valid_session().await.map(|c| c.token().to_string())
            }));
        }
        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.expect("task joins").expect("session"));
        }

        assert_eq!(logins.load(Ordering::SeqCst), 1);
        assert!(tokens.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn nearly_expired_credential_is_refreshed() {
        let logins = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&logins);
        let base_url = spawn_stub(move |_request| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            let lifetime = if attempt == 0 { 10 } else { 3600 };
            StubResponse::json(200, format!(r#"{{"token":"{}"}}"#, jwt_expiring_in(lifetime)))
        })
        .await;
        let client = session(base_url);

        client.ensure_valid_session().await.expect("first login");
        let refreshed = client.ensure_valid_session().await.expect("second login");

        assert_eq!(logins.load(Ordering::SeqCst), 2);
        assert!(!refreshed.is_expired_at(Utc::now()));

        client.ensure_valid_session().await.expect("cached session");
        assert_eq!(logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejected_login_reports_server_message() {
        let base_url = spawn_stub(|request| {
            assert!(request.body.contains(r#""emailOrPhone":"driver@example.com""#));
            StubResponse::json(
                401,
                r#"{"statusCode":401,"message":{"statusCode":401,"message":"Invalid credentials","error":"Unauthorized"}}"#,
            )
        })
        .await;
        let client = session(base_url);

        match client.ensure_valid_session().await {
            Err(AuthError::InvalidCredentials { message }) => {
                assert_eq!(message, "Invalid credentials")
            }
            other => panic!("unexpected login outcome: {other:?}"),
        }
        assert!(client.current_credential().await.is_none());
    }

    #[tokio::test]
    async fn login_without_version_header_fails() {
        let base_url = spawn_stub(|_request| {
            StubResponse::json(200, format!(r#"{{"token":"{}"}}"#, jwt_expiring_in(3600)))
                .without_version_header()
        })
        .await;
        let client = session(base_url);

        assert!(matches!(
            client.ensure_valid_session().await,
            Err(AuthError::Version(crate::error::VersionError::MissingHeader))
        ));
    }

    #[tokio::test]
    async fn sends_app_identification_headers() {
        let base_url = spawn_stub(|request| {
            assert_eq!(request.header("user-agent"), Some(APP_USER_AGENT));
            assert_eq!(request.header("x-application-name"), Some(APP_NAME));
            assert_eq!(request.header("x-app-version"), Some(APP_VERSION_LABEL));
            StubResponse::json(200, format!(r#"{{"token":"{}"}}"#, jwt_expiring_in(3600)))
        })
        .await;
        let client = session(base_url);

        client.ensure_valid_session().await.expect("login succeeds");
        client.logout().await;
        assert!(client.current_credential().await.is_none());
    }
}

//! Session login for the legacy protocol.

use std::future::Future;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Login rejected with status {0}")]
    Rejected(u16),
    #[error("Login response carried no session cookie")]
    MissingCookie,
    #[error("Malformed session cookie: {0}")]
    MalformedCookie(String),
}

/// Cookie obtained from the login endpoint, valid until `expires`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// `name=value` pair, sent back verbatim in the `Cookie` header.
    pub cookie: String,
    pub expires: DateTime<Utc>,
}

impl Session {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires
    }
}

/// Parse a `Set-Cookie` header value into a session.
///
/// `Max-Age` wins over `Expires` when both are present.
pub fn parse_session_cookie(header: &str, now: DateTime<Utc>) -> Result<Session, AuthError> {
    let mut parts = header.split(';').map(str::trim);
    let cookie = parts
        .next()
        .filter(|pair| pair.split_once('=').is_some_and(|(name, _)| !name.is_empty()))
        .ok_or_else(|| AuthError::MalformedCookie(header.to_string()))?;

    let mut expires = None;
    let mut max_age = None;
    for attr in parts {
        let (key, value) = attr.split_once('=').unwrap_or((attr, ""));
        match key.trim().to_ascii_lowercase().as_str() {
            "expires" => expires = parse_http_date(value.trim()),
            "max-age" => {
                let Ok(secs) = value.trim().parse::<i64>() else {
                    continue;
                };
                let at = Duration::try_seconds(secs).and_then(|age| now.checked_add_signed(age));
                max_age = Some(at.ok_or_else(|| {
                    AuthError::MalformedCookie(format!("Max-Age {} out of range", secs))
                })?);
            }
            _ => {}
        }
    }

    let expires = max_age
        .or(expires)
        .ok_or_else(|| AuthError::MalformedCookie(format!("no expiration in '{}'", header)))?;

    Ok(Session {
        cookie: cookie.to_string(),
        expires,
    })
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Obtains a session from the server.
pub trait Authenticator: Send {
    fn authenticate(
        &self,
        address: &str,
        secret: &str,
    ) -> impl Future<Output = Result<Session, AuthError>> + Send;
}

/// Form login against `http://{address}/admin/login`.
#[derive(Debug, Clone)]
pub struct HttpAuthenticator {
    client: reqwest::Client,
}

impl HttpAuthenticator {
    pub fn new() -> Result<Self, AuthError> {
        // The session cookie arrives on the redirect itself.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

impl Authenticator for HttpAuthenticator {
    async fn authenticate(&self, address: &str, secret: &str) -> Result<Session, AuthError> {
        let url = format!("http://{}/admin/login", address);
        tracing::info!("Logging in at {}", url);

        let response = self
            .client
            .post(&url)
            .form(&[("user", "admin"), ("password", secret)])
            .send()
            .await?;

        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(AuthError::Rejected(status.as_u16()));
        }

        let now = Utc::now();
        let mut last_err = AuthError::MissingCookie;
        for value in response.headers().get_all(reqwest::header::SET_COOKIE) {
            let Ok(text) = value.to_str() else {
                continue;
            };
            match parse_session_cookie(text, now) {
                Ok(session) => {
                    tracing::debug!("Session valid until {}", session.expires);
                    return Ok(session);
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

/// Holds the current session and refreshes it when stale.
#[derive(Debug)]
pub struct SessionCache<A> {
    auth: A,
    session: Option<Session>,
}

impl<A: Authenticator> SessionCache<A> {
    pub fn new(auth: A) -> Self {
        Self {
            auth,
            session: None,
        }
    }

    pub fn invalidate(&mut self) {
        self.session = None;
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_fresh(now))
    }

    /// Current session, logging in again first if it is absent or expired.
    pub async fn session(
        &mut self,
        address: &str,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        if let Some(session) = self.session.as_ref().filter(|s| s.is_fresh(now)) {
            return Ok(session.clone());
        }
        let session = self.auth.authenticate(address, secret).await?;
        if !session.is_fresh(now) {
            tracing::warn!("Server issued an already-expired session ({})", session.expires);
        }
        self.session = Some(session.clone());
        Ok(session)
    }
}

//! Credential acquisition for the Search Console API.
//!
//! Two sources, both explicit:
//! - a service account key file, exchanged for a token with a signed
//!   RS256 assertion (optionally impersonating a delegated user)
//! - an OAuth client-secret file, authorized interactively through a
//!   loopback redirect on 127.0.0.1
//!
//! Nothing is picked up from ambient environment state.

use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use kwreport_config::{AuthSettings, HttpSettings};

use super::common::{google_error_message, FetchClient};

// ── Constants ───────────────────────────────────────────────────────

pub const SCOPE: &str = "https://www.googleapis.com/auth/webmasters.readonly";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_TOKEN_GRANT: &str = "refresh_token";

/// Renew this long before the reported expiry.
const RENEWAL_MARGIN: Duration = Duration::from_secs(120);

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no credentials supplied")]
    NoCredentials,
    #[error("credentials file not found: {}", path.display())]
    MissingFile { path: PathBuf },
    #[error("cannot read credentials file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid credentials file {}: {message}", path.display())]
    InvalidFile { path: PathBuf, message: String },
    #[error("unusable service account private key: {0}")]
    Key(String),
    #[error("token exchange failed ({status}): {message}")]
    Exchange { status: u16, message: String },
    #[error("token request failed: {0}")]
    Transport(String),
    #[error("authorization failed: {0}")]
    Consent(String),
    #[error("access token cannot be renewed: {0}")]
    NotRenewable(String),
}

impl AuthError {
    /// Credentials absent or unreadable, as opposed to rejected.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            Self::NoCredentials | Self::MissingFile { .. } | Self::Read { .. } | Self::InvalidFile { .. }
        )
    }
}

// ── Token ───────────────────────────────────────────────────────────

/// Bearer token for API calls. Debug output is redacted.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// What it takes to mint the next token without user interaction.
#[derive(Clone)]
enum Renewal {
    /// Sign a fresh assertion with the key.
    ServiceAccount {
        key: ServiceAccountKey,
        subject: Option<String>,
    },
    /// Redeem the refresh token from the consent flow.
    RefreshToken {
        secret: OAuthClientSecret,
        refresh_token: String,
    },
    Unavailable,
}

/// An access token with its expiry and the means to renew it.
pub struct TokenGrant {
    pub token: AccessToken,
    expires_at: Option<Instant>,
    renewal: Renewal,
}

impl TokenGrant {
    fn from_response(response: TokenResponse, renewal: Renewal, issued_at: Instant) -> Self {
        Self {
            token: AccessToken::new(response.access_token),
            expires_at: response.expires_in.map(|secs| issued_at + Duration::from_secs(secs)),
            renewal,
        }
    }

    fn expires_soon(&self, now: Instant) -> bool {
        self.expires_at
            .is_some_and(|at| at.saturating_duration_since(now) <= RENEWAL_MARGIN)
    }

    pub fn is_renewable(&self) -> bool {
        !matches!(self.renewal, Renewal::Unavailable)
    }
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("token", &self.token)
            .field("expires_at", &self.expires_at)
            .field("renewable", &self.is_renewable())
            .finish()
    }
}

/// Hands out bearer tokens for API calls, renewing the grant shortly
/// before it expires or when the API rejects it.
pub struct TokenSource {
    authenticator: Option<Authenticator>,
    grant: RefCell<TokenGrant>,
}

impl TokenSource {
    pub fn new(authenticator: Authenticator, grant: TokenGrant) -> Self {
        Self {
            authenticator: Some(authenticator),
            grant: RefCell::new(grant),
        }
    }

    /// A token used as-is and never renewed.
    pub fn fixed(token: AccessToken) -> Self {
        Self {
            authenticator: None,
            grant: RefCell::new(TokenGrant {
                token,
                expires_at: None,
                renewal: Renewal::Unavailable,
            }),
        }
    }

    pub fn can_renew(&self) -> bool {
        self.authenticator.is_some() && self.grant.borrow().is_renewable()
    }

    /// Current token, renewed first when it is about to expire.
    pub fn bearer(&self) -> Result<AccessToken, AuthError> {
        if self.grant.borrow().expires_soon(Instant::now()) && self.can_renew() {
            tracing::info!("access token about to expire, renewing");
            return self.renew();
        }
        Ok(self.grant.borrow().token.clone())
    }

    /// Replace the grant with a freshly minted one.
    pub fn renew(&self) -> Result<AccessToken, AuthError> {
        let authenticator = self
            .authenticator
            .as_ref()
            .ok_or_else(|| AuthError::NotRenewable("no credentials to renew from".into()))?;
        let next = authenticator.renew(&self.grant.borrow())?;
        let token = next.token.clone();
        *self.grant.borrow_mut() = next;
        Ok(token)
    }
}

// ── Credential selection ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    ServiceAccount { path: PathBuf, subject: Option<String> },
    OAuthClient { path: PathBuf },
}

/// Pick the credential source: service account first, then OAuth client.
/// A named file that does not exist is an error, not a fall-through.
pub fn select_credentials(auth: &AuthSettings) -> Result<CredentialSource, AuthError> {
    if let Some(path) = &auth.service_account {
        ensure_exists(path)?;
        if auth.oauth_client.is_some() {
            tracing::debug!("both credential kinds supplied, using the service account");
        }
        return Ok(CredentialSource::ServiceAccount {
            path: path.clone(),
            subject: auth.delegated_user.clone(),
        });
    }

    if let Some(path) = &auth.oauth_client {
        ensure_exists(path)?;
        if auth.delegated_user.is_some() {
            tracing::warn!("delegated user only applies to service accounts, ignoring it");
        }
        return Ok(CredentialSource::OAuthClient { path: path.clone() });
    }

    Err(AuthError::NoCredentials)
}

fn ensure_exists(path: &Path) -> Result<(), AuthError> {
    if path.exists() {
        Ok(())
    } else {
        Err(AuthError::MissingFile {
            path: path.to_path_buf(),
        })
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, AuthError> {
    let content = std::fs::read_to_string(path).map_err(|source| AuthError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = std::fs::metadata(path) {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                tracing::warn!(
                    path = %path.display(),
                    mode = %format!("{:o}", mode & 0o777),
                    "credentials file is accessible by others, consider chmod 600"
                );
            }
        }
    }

    serde_json::from_str(&content).map_err(|e| AuthError::InvalidFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

// ── Service account ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    pub client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let key: Self = load_json(path)?;
        match key.kind.as_deref() {
            None | Some("service_account") => Ok(key),
            Some(other) => Err(AuthError::InvalidFile {
                path: path.to_path_buf(),
                message: format!("expected a service_account key, found type \"{}\"", other),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
}

/// Signed RS256 assertion for the JWT-bearer grant.
fn build_assertion(
    key: &ServiceAccountKey,
    audience: &str,
    subject: Option<&str>,
    issued_at: i64,
) -> Result<String, AuthError> {
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: SCOPE,
        aud: audience,
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
        sub: subject,
    };
    let signing_key =
        EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| AuthError::Key(e.to_string()))?;

    encode(&Header::new(Algorithm::RS256), &claims, &signing_key).map_err(|e| AuthError::Key(e.to_string()))
}

// ── OAuth client (installed app) ────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OAuthClientFile {
    installed: Option<OAuthClientSecret>,
    web: Option<OAuthClientSecret>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClientSecret {
    pub client_id: String,
    client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl OAuthClientSecret {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let file: OAuthClientFile = load_json(path)?;
        file.installed.or(file.web).ok_or_else(|| AuthError::InvalidFile {
            path: path.to_path_buf(),
            message: "expected an \"installed\" or \"web\" client object".into(),
        })
    }
}

fn consent_url(secret: &OAuthClientSecret, redirect_uri: &str, state: &str) -> Result<String, AuthError> {
    let url = url::Url::parse_with_params(
        &secret.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secret.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", SCOPE),
            ("access_type", "offline"),
            ("state", state),
        ],
    )
    .map_err(|e| AuthError::Consent(format!("invalid auth_uri {:?}: {}", secret.auth_uri, e)))?;
    Ok(url.to_string())
}

/// Extract the authorization code from the redirect's request line
/// (`GET /?state=..&code=.. HTTP/1.1`).
fn parse_redirect(request_line: &str, expected_state: &str) -> Result<String, AuthError> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| AuthError::Consent("malformed redirect request".into()))?;
    let url = url::Url::parse(&format!("http://127.0.0.1{}", target))
        .map_err(|e| AuthError::Consent(format!("malformed redirect target: {}", e)))?;

    let mut code = None;
    let mut state = None;
    for (name, value) in url.query_pairs() {
        match name.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(AuthError::Consent(format!("consent denied: {}", value))),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(AuthError::Consent("state mismatch in redirect".into()));
    }
    code.ok_or_else(|| AuthError::Consent("redirect carried no authorization code".into()))
}

/// Serve redirects on `listener` until one carries a result.
fn await_redirect(listener: &TcpListener, expected_state: &str) -> Result<String, AuthError> {
    loop {
        let (mut stream, _) = listener
            .accept()
            .map_err(|e| AuthError::Consent(format!("loopback listener failed: {}", e)))?;

        let request_line = read_request_head(&stream)
            .map_err(|e| AuthError::Consent(format!("failed to read redirect: {}", e)))?;

        if request_line.split_whitespace().nth(1).is_some_and(|t| t.starts_with("/favicon")) {
            let _ = respond(&mut stream, "404 Not Found", "");
            continue;
        }

        let result = parse_redirect(&request_line, expected_state);
        let body = match &result {
            Ok(_) => "Authorization received. You can close this window.".to_string(),
            Err(e) => format!("kwreport: {}", e),
        };
        let _ = respond(&mut stream, "200 OK", &body);
        return result;
    }
}

/// Read the request line and drain the headers.
fn read_request_head(stream: &TcpStream) -> std::io::Result<String> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }
    Ok(request_line)
}

fn respond(stream: &mut impl Write, status: &str, body: &str) -> std::io::Result<()> {
    write!(
        stream,
        "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body,
    )?;
    stream.flush()
}

// ── Authenticator ───────────────────────────────────────────────────

/// Turns a [`CredentialSource`] into a [`TokenGrant`].
pub struct Authenticator {
    http: reqwest::blocking::Client,
    token_uri_override: Option<String>,
}

impl Authenticator {
    pub fn new(settings: &HttpSettings) -> Result<Self, AuthError> {
        let client = FetchClient::new(settings.timeout()).map_err(|e| AuthError::Transport(e.to_string()))?;
        Ok(Self {
            http: client.http,
            token_uri_override: settings.token_uri_override.clone(),
        })
    }

    pub fn authenticate(&self, source: &CredentialSource) -> Result<TokenGrant, AuthError> {
        match source {
            CredentialSource::ServiceAccount { path, subject } => {
                self.service_account(path, subject.as_deref())
            }
            CredentialSource::OAuthClient { path } => self.oauth_client(path),
        }
    }

    fn token_uri<'a>(&'a self, from_file: &'a str) -> &'a str {
        self.token_uri_override.as_deref().unwrap_or(from_file)
    }

    fn service_account(&self, path: &Path, subject: Option<&str>) -> Result<TokenGrant, AuthError> {
        let key = ServiceAccountKey::load(path)?;
        tracing::info!(
            client_email = %key.client_email,
            subject = subject.unwrap_or("-"),
            "authenticating with service account"
        );
        self.service_account_grant(key, subject.map(str::to_string))
    }

    fn service_account_grant(
        &self,
        key: ServiceAccountKey,
        subject: Option<String>,
    ) -> Result<TokenGrant, AuthError> {
        // The assertion audience is the token URI named in the key file
        let assertion = build_assertion(
            &key,
            &key.token_uri,
            subject.as_deref(),
            chrono::Utc::now().timestamp(),
        )?;
        let issued_at = Instant::now();
        let response = self.exchange(
            self.token_uri(&key.token_uri),
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
        )?;
        Ok(TokenGrant::from_response(
            response,
            Renewal::ServiceAccount { key, subject },
            issued_at,
        ))
    }

    fn oauth_client(&self, path: &Path) -> Result<TokenGrant, AuthError> {
        let secret = OAuthClientSecret::load(path)?;

        let listener = TcpListener::bind("127.0.0.1:0")
            .map_err(|e| AuthError::Consent(format!("cannot open loopback listener: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Consent(e.to_string()))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{}", port);
        let state = uuid::Uuid::new_v4().simple().to_string();

        let url = consent_url(&secret, &redirect_uri, &state)?;
        eprintln!("Open this URL in a browser to authorize read-only Search Console access:");
        eprintln!();
        eprintln!("  {}", url);
        eprintln!();
        tracing::info!(port, "waiting for authorization redirect");

        let code = await_redirect(&listener, &state)?;
        let issued_at = Instant::now();
        let response = self.exchange(
            self.token_uri(&secret.token_uri),
            &[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("client_id", secret.client_id.as_str()),
                ("client_secret", secret.client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ],
        )?;
        let renewal = match response.refresh_token.clone() {
            Some(refresh_token) => Renewal::RefreshToken { secret, refresh_token },
            None => {
                tracing::warn!("no refresh token issued, the access token cannot be renewed");
                Renewal::Unavailable
            }
        };
        Ok(TokenGrant::from_response(response, renewal, issued_at))
    }

    /// Mint a replacement for `grant` from the same credentials.
    pub fn renew(&self, grant: &TokenGrant) -> Result<TokenGrant, AuthError> {
        match &grant.renewal {
            Renewal::ServiceAccount { key, subject } => {
                tracing::debug!(client_email = %key.client_email, "renewing service account token");
                self.service_account_grant(key.clone(), subject.clone())
            }
            Renewal::RefreshToken { secret, refresh_token } => {
                tracing::debug!("redeeming refresh token");
                let issued_at = Instant::now();
                let response = self.exchange(
                    self.token_uri(&secret.token_uri),
                    &[
                        ("grant_type", REFRESH_TOKEN_GRANT),
                        ("refresh_token", refresh_token.as_str()),
                        ("client_id", secret.client_id.as_str()),
                        ("client_secret", secret.client_secret.as_str()),
                    ],
                )?;
                // Google usually omits the refresh token on renewal
                let refresh_token = response
                    .refresh_token
                    .clone()
                    .unwrap_or_else(|| refresh_token.clone());
                Ok(TokenGrant::from_response(
                    response,
                    Renewal::RefreshToken {
                        secret: secret.clone(),
                        refresh_token,
                    },
                    issued_at,
                ))
            }
            Renewal::Unavailable => Err(AuthError::NotRenewable(
                "the grant carries no renewal credentials".into(),
            )),
        }
    }

    fn exchange(&self, token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let resp = self
            .http
            .post(token_uri)
            .form(form)
            .send()
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let text = resp.text().map_err(|e| AuthError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            let body: serde_json::Value = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
            return Err(AuthError::Exchange {
                status,
                message: google_error_message(&body, status),
            });
        }

        let token: TokenResponse = serde_json::from_str(text.trim_start_matches('\u{feff}')).map_err(|e| {
            AuthError::Exchange {
                status,
                message: format!("invalid token response: {}", e),
            }
        })?;
        tracing::debug!(expires_in = token.expires_in, "access token obtained");
        Ok(token)
    }
}

//! Access gate for the read endpoint
//!
//! Callers present a Google ID token. The token is verified through the
//! tokeninfo endpoint, then the returned claims are checked against the
//! configured OAuth client id and an allow-list of email addresses.

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Google's tokeninfo endpoint
pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Issuers Google uses for ID tokens
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Why a caller was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,

    /// No client id or an empty allow-list is configured
    #[error("missing configuration")]
    MissingConfig,

    #[error("token verification failed")]
    VerificationFailed,

    #[error("invalid issuer")]
    InvalidIssuer,

    #[error("invalid audience")]
    InvalidAudience,

    /// `exp` is missing, not numeric, or not in the future
    #[error("token expired")]
    Expired,

    #[error("email not verified")]
    EmailNotVerified,

    #[error("missing email")]
    MissingEmail,

    /// A valid token whose email is not on the allow-list
    #[error("forbidden email")]
    ForbiddenEmail,

    /// The verifier answered with something other than a claims object
    #[error("unauthorized")]
    Unauthorized,
}

impl AuthError {
    /// HTTP status for this refusal: 403 for allow-list rejection, 401 otherwise
    pub fn status(&self) -> u16 {
        match self {
            AuthError::ForbiddenEmail => 403,
            _ => 401,
        }
    }
}

/// Errors from the token verification call itself
#[derive(Debug, Error)]
pub enum VerifyCallError {
    /// The request could not be sent or its body not decoded
    #[error("tokeninfo request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The verifier rejected the token
    #[error("tokeninfo returned status {0}")]
    Rejected(u16),
}

/// The verified caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub subject: String,
}

/// Exchanges an ID token for its claims
pub trait TokenInfoSource: Send + Sync {
    fn token_info<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Value, VerifyCallError>>;
}

/// [`TokenInfoSource`] backed by Google's tokeninfo endpoint
#[derive(Debug, Clone)]
pub struct GoogleTokenInfo {
    http: reqwest::Client,
    endpoint: String,
}

impl GoogleTokenInfo {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_endpoint(http, GOOGLE_TOKENINFO_URL)
    }

    /// Creates a GoogleTokenInfo that queries a different endpoint
    pub fn with_endpoint(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

impl TokenInfoSource for GoogleTokenInfo {
    fn token_info<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Value, VerifyCallError>> {
        Box::pin(async move {
            let response = self
                .http
                .get(&self.endpoint)
                .query(&[("id_token", token)])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(VerifyCallError::Rejected(status.as_u16()));
            }

            Ok(response.json::<Value>().await?)
        })
    }
}

/// Parses a comma-separated allow-list into trimmed, lower-cased addresses
pub fn parse_allowed_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|email| email.trim().to_lowercase())
        .filter(|email| !email.is_empty())
        .collect()
}

/// Verifies ID tokens and enforces the email allow-list
#[derive(Clone)]
pub struct AccessGate {
    client_id: Option<String>,
    allowed_emails: Vec<String>,
    tokens: Arc<dyn TokenInfoSource>,
}

impl AccessGate {
    /// Creates an AccessGate
    ///
    /// # Arguments
    /// * `client_id` - OAuth client id the token audience must equal
    /// * `allowed_emails` - Allow-list, as parsed by [`parse_allowed_emails`]
    /// * `tokens` - Verifier used to exchange tokens for claims
    pub fn new(
        client_id: Option<String>,
        allowed_emails: Vec<String>,
        tokens: Arc<dyn TokenInfoSource>,
    ) -> Self {
        Self {
            client_id: client_id.filter(|id| !id.trim().is_empty()),
            allowed_emails,
            tokens,
        }
    }

    /// Verifies `token` and returns the caller's identity
    ///
    /// # Returns
    /// * `Ok(Identity)` - The token is valid and its email is allowed
    /// * `Err(AuthError)` - The first failed check
    pub async fn verify(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let client_id = self.client_id.as_deref().ok_or(AuthError::MissingConfig)?;
        if self.allowed_emails.is_empty() {
            return Err(AuthError::MissingConfig);
        }

        let claims = match self.tokens.token_info(token).await {
            Ok(Value::Object(claims)) => claims,
            Ok(other) => {
                warn!(kind = value_kind(&other), "tokeninfo returned a non-object body");
                return Err(AuthError::Unauthorized);
            }
            Err(err) => {
                warn!(error = %err, "token verification call failed");
                return Err(AuthError::VerificationFailed);
            }
        };

        let identity = check_claims(
            &claims,
            client_id,
            &self.allowed_emails,
            chrono::Utc::now().timestamp(),
        )?;
        debug!(email = %identity.email, "caller verified");
        Ok(identity)
    }
}

/// Checks verified token claims
///
/// Checks run in a fixed order and the first failure is returned: issuer,
/// audience, expiry, email verification, email presence, then allow-list
/// membership.
///
/// # Arguments
/// * `claims` - Claims returned by the verifier
/// * `client_id` - Expected audience
/// * `allowed_emails` - Lower-cased allow-list
/// * `now` - Current time in Unix seconds
pub fn check_claims(
    claims: &Map<String, Value>,
    client_id: &str,
    allowed_emails: &[String],
    now: i64,
) -> Result<Identity, AuthError> {
    let issuer = claims.get("iss").and_then(Value::as_str).unwrap_or_default();
    if !GOOGLE_ISSUERS.contains(&issuer) {
        return Err(AuthError::InvalidIssuer);
    }

    if claims.get("aud").and_then(Value::as_str) != Some(client_id) {
        return Err(AuthError::InvalidAudience);
    }

    match claims.get("exp").and_then(unix_seconds) {
        Some(exp) if exp > now => {}
        _ => return Err(AuthError::Expired),
    }

    if !is_true(claims.get("email_verified")) {
        return Err(AuthError::EmailNotVerified);
    }

    let email = claims
        .get("email")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .ok_or(AuthError::MissingEmail)?;

    if !allowed_emails.contains(&email.to_lowercase()) {
        return Err(AuthError::ForbiddenEmail);
    }

    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(Identity {
        email: email.to_string(),
        subject: subject.to_string(),
    })
}

/// tokeninfo encodes numbers as strings; accept either form
fn unix_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_true(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

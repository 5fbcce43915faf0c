//! Request routing
//!
//! One endpoint serves everything; the query parameters pick the action. Every
//! action except the cache rebuild sits behind the [`AccessGate`] unless the
//! service runs in debug mode.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::{AccessGate, AuthError};
use crate::cache::PartitionedCache;
use crate::snapshot::{self, Snapshot};
use crate::source::DataSource;

/// Query parameter carrying the credential when no Authorization header is sent
pub const ID_TOKEN_PARAM: &str = "id_token";

/// What a request asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `f=preCacheAll`: rebuild the cache
    PreCacheAll,
    /// `t=<name>`: one dataset's records
    Dataset(String),
    /// No parameters: every dataset plus the feed transactions
    All,
    /// `f=list`: the dataset names
    List,
    /// Anything else: acknowledged and ignored
    Acknowledge,
}

impl Action {
    /// Picks the action for a set of query parameters
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let function = params.get("f").map(String::as_str);

        if function == Some("preCacheAll") {
            return Action::PreCacheAll;
        }
        if let Some(name) = params.get("t").filter(|name| !name.is_empty()) {
            return Action::Dataset(name.clone());
        }
        if params.keys().all(|key| key == ID_TOKEN_PARAM) {
            return Action::All;
        }
        if function == Some("list") {
            return Action::List;
        }
        Action::Acknowledge
    }

    /// Whether the action requires a verified caller
    pub fn is_gated(&self) -> bool {
        !matches!(self, Action::PreCacheAll)
    }
}

/// An inbound request, reduced to what routing needs
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub params: HashMap<String, String>,
    /// Raw `Authorization` header value
    pub authorization: Option<String>,
}

impl ApiRequest {
    pub fn new(params: HashMap<String, String>) -> Self {
        Self {
            params,
            authorization: None,
        }
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    /// The credential the request carries
    ///
    /// A non-blank Authorization header is authoritative: its Bearer token
    /// (scheme matched case-insensitively) or nothing. The `id_token`
    /// parameter is only consulted when no such header was sent.
    pub fn credential(&self) -> Option<&str> {
        match self.authorization.as_deref().map(str::trim) {
            Some(header) if !header.is_empty() => bearer_token(header),
            _ => self.params.get(ID_TOKEN_PARAM).map(String::as_str),
        }
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(char::is_whitespace)?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// A JSON response with its HTTP status
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    /// `{status: <code>, error: <message>}` with the same HTTP status
    pub fn failure(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "status": status, "error": message.into() }),
        }
    }

    fn refused(err: &AuthError) -> Self {
        Self::failure(err.status(), err.to_string())
    }
}

/// Routes requests to the cache, the source and the access gate
#[derive(Clone)]
pub struct Service {
    source: Arc<dyn DataSource>,
    cache: Arc<PartitionedCache>,
    gate: AccessGate,
    /// Skips the access gate
    debug: bool,
}

impl Service {
    pub fn new(
        source: Arc<dyn DataSource>,
        cache: Arc<PartitionedCache>,
        gate: AccessGate,
        debug: bool,
    ) -> Self {
        Self {
            source,
            cache,
            gate,
            debug,
        }
    }

    /// Handles one request
    ///
    /// Storage and cache access block, so the work runs on tokio's blocking
    /// pool once the caller has been admitted.
    pub async fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let action = Action::from_params(&request.params);

        if action.is_gated() && !self.debug {
            if let Err(err) = self.gate.verify(request.credential()).await {
                warn!(action = ?action, reason = %err, "request refused");
                return ApiResponse::refused(&err);
            }
        }

        let service = self.clone();
        match tokio::task::spawn_blocking(move || service.respond(&action)).await {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, "request handler panicked");
                ApiResponse::failure(500, "internal error")
            }
        }
    }

    /// Produces the response for an admitted request
    pub fn respond(&self, action: &Action) -> ApiResponse {
        match action {
            Action::PreCacheAll => self.pre_cache_all(),
            Action::Dataset(name) => self.dataset(name),
            Action::All => self.all(),
            Action::List => match self.source.list_datasets() {
                Ok(names) => ApiResponse::ok(json!(names)),
                Err(err) => source_failure(&err),
            },
            Action::Acknowledge => ApiResponse::ok(json!({ "status": true })),
        }
    }

    fn pre_cache_all(&self) -> ApiResponse {
        match self.cache.rebuild(self.source.as_ref()) {
            Ok(keys) => {
                info!(keys = keys.len(), "pre-cache complete");
                ApiResponse::ok(json!({ "status": true, "cachedKeys": keys }))
            }
            Err(err) => {
                error!(error = %err, "pre-cache failed");
                ApiResponse {
                    status: 500,
                    body: json!({ "status": false, "error": err.to_string() }),
                }
            }
        }
    }

    fn dataset(&self, name: &str) -> ApiResponse {
        if let Some(cached) = self.cache.read_dataset(name) {
            return ApiResponse::ok(cached);
        }

        match snapshot::load_dataset(self.source.as_ref(), name) {
            Ok(Some((_, records))) => ApiResponse::ok(snapshot::records_value(&records)),
            Ok(None) => ApiResponse::ok(json!({ "error": format!("File not found: {}", name) })),
            Err(err) => source_failure(&err),
        }
    }

    fn all(&self) -> ApiResponse {
        if let Some(cached) = self.cache.read_all() {
            return ApiResponse::ok(cached);
        }

        match Snapshot::load(self.source.as_ref()) {
            Ok(snapshot) => ApiResponse::ok(snapshot.to_response()),
            Err(err) => source_failure(&err),
        }
    }
}

fn source_failure(err: &dyn std::error::Error) -> ApiResponse {
    error!(error = %err, "reading source failed");
    ApiResponse::failure(500, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_params_pre_cache_wins() {
        let action = Action::from_params(&params(&[("f", "preCacheAll"), ("t", "other")]));
        assert_eq!(action, Action::PreCacheAll);
        assert!(!action.is_gated());
    }

    #[test]
    fn test_from_params_dataset() {
        assert_eq!(
            Action::from_params(&params(&[("t", "assetClassRatio"), ("id_token", "x")])),
            Action::Dataset("assetClassRatio".to_string())
        );
    }

    #[test]
    fn test_from_params_empty_means_all() {
        assert_eq!(Action::from_params(&params(&[])), Action::All);
        assert_eq!(Action::from_params(&params(&[("id_token", "x")])), Action::All);
    }

    #[test]
    fn test_from_params_list_and_unknown() {
        assert_eq!(Action::from_params(&params(&[("f", "list")])), Action::List);
        assert_eq!(Action::from_params(&params(&[("f", "other")])), Action::Acknowledge);
        assert_eq!(Action::from_params(&params(&[("t", "")])), Action::Acknowledge);
        assert!(Action::Acknowledge.is_gated());
    }

    #[test]
    fn test_credential_prefers_bearer_header() {
        let request =
            ApiRequest::new(params(&[("id_token", "from-param")])).with_authorization("Bearer abc");
        assert_eq!(request.credential(), Some("abc"));
    }

    #[test]
    fn test_credential_falls_back_to_param() {
        let request = ApiRequest::new(params(&[("id_token", "from-param")]));
        assert_eq!(request.credential(), Some("from-param"));

        let blank = ApiRequest::new(params(&[("id_token", "from-param")])).with_authorization("  ");
        assert_eq!(blank.credential(), Some("from-param"));
    }

    #[test]
    fn test_credential_non_bearer_header_does_not_fall_back() {
        let basic = ApiRequest::new(params(&[("id_token", "from-param")]))
            .with_authorization("Basic dXNlcjpwYXNz");
        assert_eq!(basic.credential(), None);

        let empty_bearer =
            ApiRequest::new(params(&[("id_token", "from-param")])).with_authorization("Bearer ");
        assert_eq!(empty_bearer.credential(), None);
    }

    #[test]
    fn test_credential_scheme_is_case_insensitive() {
        assert_eq!(ApiRequest::default().with_authorization("BEARER abc").credential(), Some("abc"));
        assert_eq!(ApiRequest::default().with_authorization("bEaReR  abc ").credential(), Some("abc"));
    }

    #[test]
    fn test_credential_absent() {
        assert_eq!(ApiRequest::default().credential(), None);
    }

    #[test]
    fn test_failure_body_mirrors_status() {
        let response = ApiResponse::failure(403, "forbidden email");
        assert_eq!(response.status, 403);
        assert_eq!(response.body, json!({"status": 403, "error": "forbidden email"}));
    }
}

//! Bearer token sources.

use std::cell::RefCell;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::Secret;
use crate::config::WaitConfig;
use crate::error::{Result, WaitError};
use crate::lookup::http::{build_http_client, classify_status, classify_transport};
use crate::lookup::{LookupError, RemoteErrorKind};

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth scope requested for service account tokens.
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Lifetime of a signed service account assertion.
const ASSERTION_TTL_SECS: i64 = 3_600;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Produces bearer tokens for API requests.
///
/// Failures are reported as [`LookupError`]s so that a token endpoint that
/// is briefly unavailable is retried like any other transient failure.
pub trait TokenSource {
    fn token(&self) -> std::result::Result<String, LookupError>;
}

/// A fixed, pre-issued token.
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: Secret,
}

impl StaticToken {
    pub fn new(token: Secret) -> Self {
        Self { token }
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> std::result::Result<String, LookupError> {
        Ok(self.token.expose().to_string())
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: Secret,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Utc::now() + TimeDelta::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3_600
}

/// Exchanges an OAuth refresh token for access tokens.
pub struct RefreshTokenSource {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: Secret,
    refresh_token: Secret,
    cached: RefCell<Option<CachedToken>>,
}

impl RefreshTokenSource {
    pub fn new(
        config: &WaitConfig,
        client_id: String,
        client_secret: Secret,
        refresh_token: Secret,
    ) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            token_url: config.token_url.clone(),
            client_id,
            client_secret,
            refresh_token,
            cached: RefCell::new(None),
        })
    }
}

impl TokenSource for RefreshTokenSource {
    fn token(&self) -> std::result::Result<String, LookupError> {
        cached_or_fetch(&self.cached, || {
            debug!("Refreshing OAuth access token");
            Ok(self.client.post(&self.token_url).json(&json!({
                "grant_type": "refresh_token",
                "client_id": self.client_id,
                "client_secret": self.client_secret.expose(),
                "refresh_token": self.refresh_token.expose(),
            })))
        })
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Exchanges an RS256-signed service account assertion for access tokens
/// (JWT bearer grant).
pub struct ServiceAccountTokenSource {
    client: Client,
    token_url: String,
    client_email: String,
    key: EncodingKey,
    key_id: Option<String>,
    cached: RefCell<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    /// # Errors
    ///
    /// Returns [`WaitError::Credential`] if `private_key` is not an RSA PEM
    /// key. The key itself is never part of the message.
    pub fn new(
        config: &WaitConfig,
        client_email: String,
        private_key: &Secret,
        key_id: Option<String>,
    ) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(private_key.expose().as_bytes()).map_err(|_| {
            WaitError::credential(format!(
                "Invalid credential: private_key of '{}' is not an RSA PEM key",
                client_email
            ))
        })?;

        Ok(Self {
            client: build_http_client(config)?,
            token_url: config.token_url.clone(),
            client_email,
            key,
            key_id,
            cached: RefCell::new(None),
        })
    }

    /// Signed assertion valid from `now` for one hour.
    fn assertion(&self, now: DateTime<Utc>) -> std::result::Result<String, LookupError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();

        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: BIGQUERY_SCOPE,
            aud: &self.token_url,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_TTL_SECS,
        };

        jsonwebtoken::encode(&header, &claims, &self.key).map_err(|e| {
            LookupError::new(
                RemoteErrorKind::Unauthenticated,
                format!("could not sign assertion for '{}': {}", self.client_email, e),
            )
        })
    }
}

impl TokenSource for ServiceAccountTokenSource {
    fn token(&self) -> std::result::Result<String, LookupError> {
        cached_or_fetch(&self.cached, || {
            debug!("Exchanging service account assertion for {}", self.client_email);
            let assertion = self.assertion(Utc::now())?;
            Ok(self.client.post(&self.token_url).json(&json!({
                "grant_type": JWT_BEARER_GRANT,
                "assertion": assertion,
            })))
        })
    }
}

/// Fetches tokens for the instance's default service account.
pub struct MetadataTokenSource {
    client: Client,
    url: String,
    cached: RefCell<Option<CachedToken>>,
}

impl MetadataTokenSource {
    pub fn new(config: &WaitConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            url: config.metadata_token_url.clone(),
            cached: RefCell::new(None),
        })
    }
}

impl TokenSource for MetadataTokenSource {
    fn token(&self) -> std::result::Result<String, LookupError> {
        cached_or_fetch(&self.cached, || {
            debug!("Requesting access token from metadata server");
            Ok(self.client.get(&self.url).header("Metadata-Flavor", "Google"))
        })
    }
}

fn cached_or_fetch<F>(
    cache: &RefCell<Option<CachedToken>>,
    request: F,
) -> std::result::Result<String, LookupError>
where
    F: FnOnce() -> std::result::Result<RequestBuilder, LookupError>,
{
    if let Some(token) = cache.borrow().as_ref().filter(|t| t.is_fresh()) {
        return Ok(token.value.expose().to_string());
    }

    let token = exchange(request()?)?;
    let value = token.value.expose().to_string();
    *cache.borrow_mut() = Some(token);
    Ok(value)
}

fn exchange(request: RequestBuilder) -> std::result::Result<CachedToken, LookupError> {
    let response = request.send().map_err(|e| classify_transport(&e))?;
    let status = response.status();

    if !status.is_success() {
        let kind = match classify_status(status, None) {
            RemoteErrorKind::BadRequest | RemoteErrorKind::PermissionDenied | RemoteErrorKind::Other => {
                RemoteErrorKind::Unauthenticated
            }
            kind => kind,
        };
        return Err(LookupError::new(
            kind,
            format!("token endpoint returned HTTP {}", status),
        ));
    }

    let body: TokenResponse = response.json().map_err(|e| {
        LookupError::new(
            RemoteErrorKind::Unauthenticated,
            format!("malformed token response: {}", e),
        )
    })?;

    let expires_at = TimeDelta::try_seconds(body.expires_in)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| {
            LookupError::new(
                RemoteErrorKind::Unauthenticated,
                format!("token response has out-of-range expires_in {}", body.expires_in),
            )
        })?;

    Ok(CachedToken {
        value: Secret::new(body.access_token),
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn config_for(server: &MockServer) -> WaitConfig {
        WaitConfig {
            token_url: server.url("/token"),
            metadata_token_url: server.url("/metadata/token"),
            ..Default::default()
        }
    }

    #[test]
    fn static_token_is_returned_verbatim() {
        let source = StaticToken::new(Secret::new("abc"));
        assert_eq!(source.token().unwrap(), "abc");
    }

    #[test]
    fn refresh_token_source_exchanges_and_caches() {
        let server = MockServer::start();
        let mut mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200)
                .json_body(json!({"access_token": "fresh", "expires_in": 3600}));
        });

        let source = RefreshTokenSource::new(
            &config_for(&server),
            "cid".into(),
            Secret::new("cs"),
            Secret::new("rt"),
        )
        .unwrap();

        assert_eq!(source.token().unwrap(), "fresh");

        // Served from cache once the endpoint is gone
        mock.delete();
        assert_eq!(source.token().unwrap(), "fresh");
    }

    #[test]
    fn rejected_refresh_is_unauthenticated() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(400).json_body(json!({"error": "invalid_grant"}));
        });

        let source = RefreshTokenSource::new(
            &config_for(&server),
            "cid".into(),
            Secret::new("cs"),
            Secret::new("rt"),
        )
        .unwrap();

        let err = source.token().unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Unauthenticated);
    }

    #[test]
    fn metadata_server_outage_is_retryable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/metadata/token")
                .header("Metadata-Flavor", "Google");
            then.status(503);
        });

        let source = MetadataTokenSource::new(&config_for(&server)).unwrap();
        let err = source.token().unwrap_err();
        assert!(crate::lookup::is_retryable(&err));
    }

    #[test]
    fn out_of_range_expiry_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200)
                .json_body(json!({"access_token": "forever", "expires_in": i64::MAX}));
        });

        let source = RefreshTokenSource::new(
            &config_for(&server),
            "cid".into(),
            Secret::new("cs"),
            Secret::new("rt"),
        )
        .unwrap();

        let err = source.token().unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Unauthenticated);
        assert!(err.message.contains("expires_in"));
    }

    fn service_account(server: &MockServer) -> ServiceAccountTokenSource {
        ServiceAccountTokenSource::new(
            &config_for(server),
            "sa@p.iam.gserviceaccount.com".into(),
            &Secret::new(include_str!("../../tests/fixtures/sa_key.pem")),
            Some("kid-1".into()),
        )
        .unwrap()
    }

    #[test]
    fn service_account_assertion_is_signed_for_token_endpoint() {
        use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};

        let server = MockServer::start();
        let source = service_account(&server);
        let now = Utc::now();

        let assertion = source.assertion(now).unwrap();

        let header = decode_header(&assertion).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("kid-1"));

        let public = DecodingKey::from_rsa_pem(include_bytes!("../../tests/fixtures/sa_key.pub.pem"))
            .unwrap();
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[server.url("/token")]);
        let claims = decode::<serde_json::Value>(&assertion, &public, &validation)
            .unwrap()
            .claims;

        assert_eq!(claims["iss"], "sa@p.iam.gserviceaccount.com");
        assert_eq!(claims["scope"], BIGQUERY_SCOPE);
        assert_eq!(claims["iat"], now.timestamp());
        assert_eq!(claims["exp"], now.timestamp() + ASSERTION_TTL_SECS);
    }

    #[test]
    fn service_account_exchanges_and_caches() {
        let server = MockServer::start();
        let mut mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200)
                .json_body(json!({"access_token": "sa-token", "expires_in": 3600}));
        });

        let source = service_account(&server);
        assert_eq!(source.token().unwrap(), "sa-token");

        mock.delete();
        assert_eq!(source.token().unwrap(), "sa-token");
    }

    #[test]
    fn rejected_assertion_is_unauthenticated() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(400).json_body(json!({"error": "invalid_grant"}));
        });

        let err = service_account(&server).token().unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Unauthenticated);
    }

    #[test]
    fn metadata_server_token() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/metadata/token")
                .header("Metadata-Flavor", "Google");
            then.status(200)
                .json_body(json!({"access_token": "meta", "expires_in": 1800, "token_type": "Bearer"}));
        });

        let source = MetadataTokenSource::new(&config_for(&server)).unwrap();
        assert_eq!(source.token().unwrap(), "meta");
    }
}

//! REST table metadata client.
//!
//! Issues `GET {base}/projects/{project}/datasets/{dataset}/tables/{table}`
//! with a bearer token and maps the response onto [`TableSnapshot`] or a
//! classified [`LookupError`].

use anyhow::Context;
use chrono::DateTime;
use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use super::{LookupClient, LookupError, RemoteErrorKind, TableSnapshot};
use crate::config::WaitConfig;
use crate::credential::TokenSource;
use crate::error::Result;
use crate::resource::ResourceIdentifier;

/// Error reasons the API documents as safe to retry regardless of status.
const RETRYABLE_REASONS: &[&str] = &["backendError", "internalError", "rateLimitExceeded"];

/// Build the blocking HTTP client shared by the lookup and token sources.
pub(crate) fn build_http_client(config: &WaitConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    Ok(client)
}

/// Map an HTTP status (and optional API error reason) to an error kind.
pub(crate) fn classify_status(status: StatusCode, reason: Option<&str>) -> RemoteErrorKind {
    if reason.is_some_and(|r| r == "rateLimitExceeded") || status == StatusCode::TOO_MANY_REQUESTS {
        return RemoteErrorKind::RateLimited;
    }
    if reason.is_some_and(|r| RETRYABLE_REASONS.contains(&r)) {
        return RemoteErrorKind::ServerError;
    }
    match status {
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => RemoteErrorKind::ServerError,
        StatusCode::REQUEST_TIMEOUT => RemoteErrorKind::Timeout,
        StatusCode::UNAUTHORIZED => RemoteErrorKind::Unauthenticated,
        StatusCode::FORBIDDEN => RemoteErrorKind::PermissionDenied,
        StatusCode::BAD_REQUEST => RemoteErrorKind::BadRequest,
        _ => RemoteErrorKind::Other,
    }
}

/// Map a transport-level failure to an error kind.
pub(crate) fn classify_transport(error: &reqwest::Error) -> LookupError {
    let kind = if error.is_timeout() {
        RemoteErrorKind::Timeout
    } else if error.is_connect() || error.is_request() {
        RemoteErrorKind::Connection
    } else {
        RemoteErrorKind::Other
    };
    LookupError::new(kind, error.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    table_reference: Option<TableReference>,
    friendly_name: Option<String>,
    num_rows: Option<String>,
    last_modified_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

/// Table metadata client over the REST API.
pub struct HttpLookupClient {
    client: Client,
    base_url: String,
    tokens: Box<dyn TokenSource>,
    default_project: Option<String>,
}

impl HttpLookupClient {
    /// Create a client using `tokens` for authentication.
    ///
    /// `default_project` is used for identifiers without a project component.
    pub fn new(
        config: &WaitConfig,
        tokens: Box<dyn TokenSource>,
        default_project: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            base_url: config.api_base_url.clone(),
            tokens,
            default_project,
        })
    }

    fn table_url(&self, id: &ResourceIdentifier) -> std::result::Result<Url, LookupError> {
        let project = id
            .project()
            .or(self.default_project.as_deref())
            .ok_or_else(|| {
                LookupError::new(
                    RemoteErrorKind::BadRequest,
                    format!("no project given for '{}' and no default project is configured", id),
                )
            })?;

        let mut url = Url::parse(&self.base_url).map_err(|e| {
            LookupError::new(
                RemoteErrorKind::BadRequest,
                format!("invalid API base URL '{}': {}", self.base_url, e),
            )
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                LookupError::new(
                    RemoteErrorKind::BadRequest,
                    format!("API base URL cannot carry a path: {}", self.base_url),
                )
            })?
            .pop_if_empty()
            .extend(["projects", project, "datasets", id.dataset(), "tables", id.table()]);
        Ok(url)
    }
}

impl LookupClient for HttpLookupClient {
    fn get_table(&self, id: &ResourceIdentifier) -> std::result::Result<Option<TableSnapshot>, LookupError> {
        let url = self.table_url(id)?;
        let token = self.tokens.token()?;

        debug!("Fetching table metadata for {}", id);
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .map_err(|e| classify_transport(&e))?;

        match response.status() {
            status if status.is_success() => parse_table(id, response).map(Some),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(parse_error(response)),
        }
    }
}

fn parse_table(id: &ResourceIdentifier, response: Response) -> std::result::Result<TableSnapshot, LookupError> {
    let malformed = |detail: String| {
        LookupError::new(
            RemoteErrorKind::Other,
            format!("malformed table metadata for '{}': {}", id, detail),
        )
    };

    let table: TableResource = response.json().map_err(|e| malformed(e.to_string()))?;

    let num_rows = match table.num_rows.as_deref() {
        Some(rows) => rows
            .parse::<u64>()
            .map_err(|_| malformed(format!("numRows '{}'", rows)))?,
        None => 0,
    };

    let millis = table
        .last_modified_time
        .as_deref()
        .ok_or_else(|| malformed("missing lastModifiedTime".to_string()))?;
    let last_modified = millis
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| malformed(format!("lastModifiedTime '{}'", millis)))?;

    let display_name = table
        .friendly_name
        .or(table.table_reference.map(|r| r.table_id))
        .unwrap_or_else(|| id.table().to_string());

    Ok(TableSnapshot {
        display_name,
        num_rows,
        last_modified,
    })
}

fn parse_error(response: Response) -> LookupError {
    let status = response.status();
    let body = response.text().unwrap_or_default();

    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => {
            let reason = envelope.error.errors.iter().find_map(|e| e.reason.as_deref());
            let mut message = format!("HTTP {}", status);
            if let Some(reason) = reason {
                message.push_str(&format!(" ({})", reason));
            }
            if !envelope.error.message.is_empty() {
                message.push_str(&format!(": {}", envelope.error.message));
            }
            LookupError::new(classify_status(status, reason), message)
        }
        Err(_) => LookupError::new(classify_status(status, None), format!("HTTP {}", status)),
    }
}

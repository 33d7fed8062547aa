//! ICRT image-catalog API client
//!
//! The catalog exposes a JWT-guarded GraphQL endpoint. Images are attached to
//! projects, so a lookup derives the project code from the identifier, pulls
//! the project's media list once, and matches the identifier against media
//! filenames. The media list is cached per project for the lifetime of the
//! client, which keeps duplicate identifiers and same-project rows from
//! re-querying the API; observable lookup results are unaffected.

use crate::error::{Error, Result};
use crate::retry::IsRetryable;
use crate::types::ImageReference;
use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

/// Error classification for a single catalog call
///
/// The orchestrator turns these into per-row outcomes; only
/// [`ClientError::Auth`] escalates to a whole-run failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The catalog has no image for the identifier
    #[error("no image in the catalog matches {identifier}")]
    NotFound {
        /// The identifier that had no match
        identifier: String,
        /// Variants of the same base product that do exist
        alternatives: Vec<String>,
    },

    /// Recoverable failure (timeout, connect error, 5xx, rate-limit response)
    #[error("transient API failure: {0}")]
    Transient(String),

    /// Credentials or token rejected; no call can succeed
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Non-recoverable failure that only affects this call
    #[error("permanent API failure: {0}")]
    Permanent(String),
}

impl IsRetryable for ClientError {
    fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }
}

/// Abstract catalog interface: lookup by identifier and binary image fetch
///
/// Both operations are idempotent and safe to retry. Implementations must
/// not retry internally; the orchestrator applies the configured retry
/// policy uniformly around every call.
#[async_trait]
pub trait IcrtClient: Send + Sync {
    /// Resolve an identifier to a catalog image reference
    async fn lookup(&self, identifier: &str) -> std::result::Result<ImageReference, ClientError>;

    /// Download the image binary, returning its bytes and content type
    async fn fetch(
        &self,
        reference: &ImageReference,
    ) -> std::result::Result<(Vec<u8>, String), ClientError>;
}

/// GraphQL query pulling a project's media list
const PROJECT_MEDIA_QUERY: &str = "\
query GetProjectMedia($icrtcode: String!) {
    project(icrtcode: $icrtcode) {
        name
        media {
            filename
            image
        }
    }
}";

#[derive(Debug, Clone, Deserialize)]
struct MediaEntry {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    image: String,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<GraphqlData>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GraphqlData {
    #[serde(default)]
    project: Option<ProjectData>,
}

#[derive(Debug, Deserialize)]
struct ProjectData {
    #[serde(default)]
    media: Option<Vec<MediaEntry>>,
}

/// HTTP implementation of [`IcrtClient`] against the real ICRT API
#[derive(Debug)]
pub struct HttpIcrtClient {
    http: reqwest::Client,
    base_url: Url,
    jwt_token: String,
    media_cache: Mutex<HashMap<String, Arc<Vec<MediaEntry>>>>,
}

impl HttpIcrtClient {
    /// Create a client with a ready-to-use JWT token
    ///
    /// The token is supplied by the (external) auth collaborator; this crate
    /// never stores credentials.
    pub fn new(
        base_url: &str,
        jwt_token: impl Into<String>,
        per_call_timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid base URL: {e}"), "base_url"))?;
        let http = reqwest::Client::builder()
            .timeout(per_call_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            jwt_token: jwt_token.into(),
            media_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Exchange client credentials for a JWT token and build a client
    ///
    /// The auth endpoint answers a plain-text token on success and a body
    /// containing `Failed` when the credentials are rejected.
    pub async fn authenticate(
        base_url: &str,
        client_id: &str,
        client_key: &str,
        per_call_timeout: Duration,
    ) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid base URL: {e}"), "base_url"))?;
        let auth_url = join_endpoint(&parsed, "auth")?;

        let http = reqwest::Client::builder()
            .timeout(per_call_timeout)
            .build()?;
        let response = http
            .post(auth_url)
            .json(&serde_json::json!({
                "client_id": client_id,
                "client_key": client_key,
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() || body.contains("Failed") {
            return Err(Error::FatalClient(format!(
                "ICRT authentication rejected (status {status})"
            )));
        }

        tracing::info!("authenticated against ICRT API");
        Self::new(base_url, body.trim(), per_call_timeout)
    }

    /// Fetch (or reuse) the media list for a project
    async fn project_media(
        &self,
        project_code: &str,
    ) -> std::result::Result<Arc<Vec<MediaEntry>>, ClientError> {
        {
            let cache = self.media_cache.lock().await;
            if let Some(media) = cache.get(project_code) {
                return Ok(Arc::clone(media));
            }
        }

        let graphql_url = join_endpoint(&self.base_url, "graphql")
            .map_err(|e| ClientError::Permanent(e.to_string()))?;
        let response = self
            .http
            .post(graphql_url)
            .bearer_auth(&self.jwt_token)
            .json(&serde_json::json!({
                "query": PROJECT_MEDIA_QUERY,
                "variables": { "icrtcode": project_code },
            }))
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if let Some(err) = classify_status(status) {
            return Err(err);
        }

        let parsed: GraphqlResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Permanent(format!("malformed GraphQL response: {e}")))?;

        if let Some(errors) = parsed.errors {
            return Err(ClientError::Permanent(format!("GraphQL errors: {errors}")));
        }

        let media: Vec<MediaEntry> = parsed
            .data
            .and_then(|d| d.project)
            .and_then(|p| p.media)
            .unwrap_or_default()
            .into_iter()
            .filter(|m| !m.filename.is_empty() && !m.image.is_empty())
            .collect();

        if media.is_empty() {
            tracing::debug!(project_code, "project has no media");
        } else {
            tracing::debug!(project_code, count = media.len(), "cached project media");
        }

        let media = Arc::new(media);
        self.media_cache
            .lock()
            .await
            .insert(project_code.to_string(), Arc::clone(&media));
        Ok(media)
    }
}

#[async_trait]
impl IcrtClient for HttpIcrtClient {
    async fn lookup(&self, identifier: &str) -> std::result::Result<ImageReference, ClientError> {
        let Some(project_code) = extract_project_code(identifier) else {
            return Err(ClientError::NotFound {
                identifier: identifier.to_string(),
                alternatives: Vec::new(),
            });
        };

        let media = self.project_media(&project_code).await?;
        let target = identifier.to_lowercase();

        let mut matches: Vec<&MediaEntry> = media
            .iter()
            .filter(|m| extract_product_code(&m.filename) == target)
            .collect();
        matches.sort_by(|a, b| a.filename.cmp(&b.filename));

        if let Some(entry) = matches.first() {
            return Ok(ImageReference {
                identifier: identifier.to_string(),
                filename: entry.filename.clone(),
                url: entry.image.clone(),
            });
        }

        // No direct match: look for other variants of the same base product
        let alternatives = match base_product(&target) {
            Some(base) => {
                let mut found: BTreeSet<String> = BTreeSet::new();
                for entry in media.iter() {
                    let code = extract_product_code(&entry.filename);
                    if code != target && base_product(&code).as_deref() == Some(base.as_str()) {
                        found.insert(code);
                    }
                }
                found.into_iter().collect()
            }
            None => Vec::new(),
        };

        Err(ClientError::NotFound {
            identifier: identifier.to_string(),
            alternatives,
        })
    }

    async fn fetch(
        &self,
        reference: &ImageReference,
    ) -> std::result::Result<(Vec<u8>, String), ClientError> {
        let response = self
            .http
            .get(&reference.url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if let Some(err) = classify_status(status) {
            return Err(err);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "image/jpeg".to_string());

        let bytes = response.bytes().await.map_err(classify_reqwest_error)?;
        Ok((bytes.to_vec(), content_type))
    }
}

/// Map an HTTP status to a client error, or `None` for success
fn classify_status(status: StatusCode) -> Option<ClientError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ClientError::Auth(format!("API answered {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            ClientError::Transient(format!("rate limited by the API ({status})"))
        }
        s if s.is_server_error() => ClientError::Transient(format!("API answered {status}")),
        _ => ClientError::Permanent(format!("API answered {status}")),
    })
}

fn classify_reqwest_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() || e.is_connect() {
        ClientError::Transient(e.to_string())
    } else if e.is_decode() {
        ClientError::Permanent(e.to_string())
    } else {
        ClientError::Transient(e.to_string())
    }
}

fn join_endpoint(base: &Url, endpoint: &str) -> Result<Url> {
    base.join(endpoint)
        .map_err(|e| Error::config(format!("invalid endpoint URL: {e}"), "base_url"))
}

/// Extract the project code prefix from an identifier
///
/// Identifiers look like `IC23022-0072-00`: two letters and five digits of
/// project code, then product and variant segments. Some projects use a bare
/// five-digit code.
pub fn extract_project_code(identifier: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        #[allow(clippy::expect_used)]
        let re = Regex::new(r"^([A-Z]{2}\d{5}|\d{5})").expect("static regex must compile");
        re
    });
    re.captures(identifier.trim())
        .map(|caps| caps[1].to_string())
}

/// Extract the lowercased product code from a media filename
///
/// Catalog filenames are `<product-code>_<suffix>` or `<product-code>(note)`;
/// bare filenames are the product code itself.
fn extract_product_code(filename: &str) -> String {
    let code = match (filename.find('_'), filename.find('(')) {
        (Some(u), Some(p)) => &filename[..u.min(p)],
        (Some(u), None) => &filename[..u],
        (None, Some(p)) => &filename[..p],
        (None, None) => filename,
    };
    code.trim().to_lowercase()
}

/// Strip the trailing variant segment (`-DD`) from a product code
fn base_product(code: &str) -> Option<String> {
    let parts: Vec<&str> = code.split('-').collect();
    if parts.len() >= 3 {
        Some(parts[..parts.len() - 1].join("-"))
    } else {
        None
    }
}

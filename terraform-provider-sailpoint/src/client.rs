//! SailPoint Identity Security Cloud API Client for Terraform Provider

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

/// Items requested per page when listing
pub const PAGE_SIZE: usize = 250;

/// Upper bound on items collected by a paginated listing
pub const MAX_ITEMS: usize = 100_000;

const EXPERIMENTAL_HEADER: &str = "x-sailpoint-experimental";

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// Raw response body returned by the API, if any
    pub fn response_body(&self) -> Option<&str> {
        match self {
            ClientError::Api { message, .. } => Some(message.as_str()),
            ClientError::AuthFailed(body) | ClientError::NotFound(body) => Some(body.as_str()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Settings needed to reach a tenant
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub experimental: bool,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Tokens are refreshed a minute before they lapse
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > ChronoDuration::seconds(60)
    }
}

/// SailPoint API Client
#[derive(Clone)]
pub struct SailPointClient {
    client: reqwest::Client,
    base_url: Url,
    client_id: String,
    client_secret: String,
    experimental: bool,
    page_size: usize,
    max_items: usize,
    token: Arc<Mutex<Option<AccessToken>>>,
}

impl SailPointClient {
    /// Create a new client. No request is made until the first API call.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = parse_base_url(&config.base_url)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url,
            client_id: config.client_id,
            client_secret: config.client_secret,
            experimental: config.experimental,
            page_size: PAGE_SIZE,
            max_items: MAX_ITEMS,
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// Override the listing page size and item cap
    pub fn with_pagination(mut self, page_size: usize, max_items: usize) -> Self {
        self.page_size = page_size.max(1);
        self.max_items = max_items;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn experimental(&self) -> bool {
        self.experimental
    }

    /// Build an absolute URL from path segments, escaping each one
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidConfig(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Return a cached access token or fetch a new one with the client-credentials grant
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        #[derive(Serialize)]
        struct TokenRequest<'a> {
            grant_type: &'a str,
            client_id: &'a str,
            client_secret: &'a str,
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            #[serde(default = "default_expires_in")]
            expires_in: i64,
        }

        let url = self.endpoint(&["oauth", "token"])?;
        tracing::debug!(token_url = %url, "Requesting SailPoint access token");

        let response = self
            .client
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .form(&TokenRequest {
                grant_type: "client_credentials",
                client_id: &self.client_id,
                client_secret: &self.client_secret,
            })
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 400 || status.as_u16() == 401 {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::AuthFailed(message));
        }
        let token: TokenResponse = Self::handle_response(response).await?;

        let value = token.access_token.clone();
        *cached = Some(AccessToken {
            value: token.access_token,
            expires_at: token_expiry(Utc::now(), token.expires_in),
        });

        Ok(value)
    }

    /// Build headers for API requests
    fn headers(&self, token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            headers.insert(AUTHORIZATION, value);
        }

        if self.experimental {
            headers.insert(
                HeaderName::from_static(EXPERIMENTAL_HEADER),
                HeaderValue::from_static("true"),
            );
        }

        headers
    }

    /// GET request
    pub async fn get<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<T> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(url)
            .headers(self.headers(&token))
            .query(query)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Handle API response
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else if status.as_u16() == 401 {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::AuthFailed(message))
        } else if status.as_u16() == 404 {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::NotFound(message))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn default_expires_in() -> i64 {
    300
}

/// Expiry instant for a token issued at `now`. Lifetimes chrono cannot
/// represent fall back to the default lifetime.
fn token_expiry(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    ChronoDuration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or_else(|| {
            tracing::warn!(expires_in, "Token lifetime out of range, using default");
            now + ChronoDuration::seconds(default_expires_in())
        })
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ClientError::InvalidConfig(format!("invalid base URL {:?}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(ClientError::InvalidConfig(format!(
            "base URL must be an absolute http(s) URL, got {:?}",
            raw
        ))),
    }
}

// ============================================================================
// API Data Types
// ============================================================================

/// Managed cluster as returned by the v2025 API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedCluster {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pod: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(rename = "type", default)]
    pub cluster_type: Option<String>,
    #[serde(default)]
    pub configuration: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub key_pair: Option<ManagedClusterKeyPair>,
    #[serde(default)]
    pub attributes: Option<ManagedClusterAttributes>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub redis: Option<ManagedClusterRedis>,
    #[serde(default)]
    pub client_type: Option<String>,
    #[serde(default)]
    pub ccg_version: Option<String>,
    #[serde(default)]
    pub pinned_config: Option<bool>,
    #[serde(default)]
    pub operational: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub public_key_certificate: Option<String>,
    #[serde(default)]
    pub public_key_thumbprint: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub alert_key: Option<String>,
    #[serde(default)]
    pub client_ids: Option<Vec<String>>,
    #[serde(default)]
    pub service_count: Option<i32>,
    #[serde(default)]
    pub cc_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub encryption_configuration: Option<ManagedClusterEncryptionConfig>,
}

/// Key pair the cluster uses for credential encryption
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterKeyPair {
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub public_key_thumbprint: Option<String>,
    #[serde(default)]
    pub public_key_certificate: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterAttributes {
    #[serde(default)]
    pub queue: Option<ManagedClusterQueue>,
    #[serde(default)]
    pub keystore: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagedClusterQueue {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterRedis {
    #[serde(default)]
    pub redis_host: Option<String>,
    #[serde(default)]
    pub redis_port: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagedClusterEncryptionConfig {
    #[serde(default)]
    pub format: Option<String>,
}

// ============================================================================
// API Methods
// ============================================================================

impl SailPointClient {
    pub async fn get_managed_cluster(&self, id: &str) -> Result<ManagedCluster> {
        let url = self.endpoint(&["v2025", "managed-clusters", id])?;
        self.get(url, &[]).await
    }

    /// List managed clusters matching `filters`, following pages until a
    /// short page is returned or the item cap is reached.
    pub async fn list_managed_clusters(&self, filters: Option<&str>) -> Result<Vec<ManagedCluster>> {
        let url = self.endpoint(&["v2025", "managed-clusters"])?;
        let mut clusters = Vec::new();
        let mut offset = 0;

        loop {
            let mut query = vec![
                ("limit", self.page_size.to_string()),
                ("offset", offset.to_string()),
            ];
            if let Some(filters) = filters.filter(|f| !f.is_empty()) {
                query.push(("filters", filters.to_string()));
            }

            let page: Vec<ManagedCluster> = self.get(url.clone(), &query).await?;
            let count = page.len();
            tracing::debug!(offset, count, "Fetched managed cluster page");

            clusters.extend(page);
            if count < self.page_size || clusters.len() >= self.max_items {
                break;
            }
            offset += self.page_size;
        }

        clusters.truncate(self.max_items);
        Ok(clusters)
    }
}

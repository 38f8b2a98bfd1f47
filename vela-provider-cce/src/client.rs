//! Typed HTTP clients for the cloud's REST services
//!
//! One [`ServiceClient`] per `(service, region)` is built lazily and memoised
//! for the lifetime of the provider; clients are immutable once built and
//! shared across controller operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{CloudConfig, Service};

/// Body-message sentinel the cloud uses when a child mutation arrives before
/// the CCE service is authorised against the parent cluster. Recovered
/// exactly once via re-gate-and-retry; see `gate`.
pub const CCE_AUTH_SENTINEL: &str = "CCE is not authorized";

/// Error type for REST calls
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ApiError {
    /// True when the resource addressed by the call does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Http { status: 404, .. })
    }

    /// True when the cloud rejected the call because CCE is not yet
    /// authorised against the parent cluster
    pub fn is_auth_pending(&self) -> bool {
        match self {
            ApiError::Http { status, body, .. } => {
                (400..500).contains(status) && body.contains(CCE_AUTH_SENTINEL)
            }
            _ => false,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// A typed client for one cloud service
pub struct ServiceClient {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl ServiceClient {
    fn new(http: reqwest::Client, base: String, token: String) -> Self {
        Self { http, base, token }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send(reqwest::Method::GET, path, None::<&()>).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        self.send(reqwest::Method::POST, path, Some(body)).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        self.send(reqwest::Method::PUT, path, Some(body)).await
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        self.send(reqwest::Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> ApiResult<()> {
        let url = self.url(path);
        let response = self
            .http
            .delete(&url)
            .header("X-Auth-Token", &self.token)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::Http {
                status: status.as_u16(),
                url,
                body,
            })
        }
    }

    async fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
    ) -> ApiResult<T> {
        let url = self.url(path);
        let mut request = self
            .http
            .request(method, &url)
            .header("X-Auth-Token", &self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                url,
                body: text,
            });
        }

        // Some verbs (bind/unbind, tag actions) answer with an empty body.
        let text = if text.trim().is_empty() {
            "null".to_string()
        } else {
            text
        };
        serde_json::from_str(&text).map_err(|e| ApiError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

/// Builds and memoises one client per `(service, region)`
pub struct ClientFactory {
    config: CloudConfig,
    http: reqwest::Client,
    cache: Mutex<HashMap<(Service, String), Arc<ServiceClient>>>,
}

impl ClientFactory {
    pub fn new(config: CloudConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    /// Client for a service in the configured region
    pub fn service(&self, service: Service) -> Arc<ServiceClient> {
        let key = (service, self.config.region.clone());
        let mut cache = self.cache.lock().expect("client cache poisoned");
        cache
            .entry(key)
            .or_insert_with(|| {
                Arc::new(ServiceClient::new(
                    self.http.clone(),
                    self.config.endpoint(service),
                    self.config.token.clone(),
                ))
            })
            .clone()
    }
}

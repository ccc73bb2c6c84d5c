use super::types::{EventPage, SearchResult, Tag, TagResult};
use crate::config::{ServiceConfig, TimeWindow};
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("undecodable response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, RequestError>;

/// The three read endpoints of the remote log service.
#[async_trait]
pub trait LogService: Send + Sync {
    /// Run a wildcard search over the window. Diagnostic only.
    async fn search(&self, window: &TimeWindow) -> Result<SearchResult>;

    /// Tags with at least one event in the window, in service order.
    async fn list_tags(&self, window: &TimeWindow) -> Result<Vec<Tag>>;

    /// Fetch one page of a tag's event stream. `cursor` is the previous page's
    /// `next`; `None` requests the first page.
    async fn iterate_events(
        &self,
        tag: &str,
        window: &TimeWindow,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<EventPage>;
}

/// HTTP client for the remote log service. Never retries.
pub struct LogServiceClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for LogServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogServiceClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl LogServiceClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(RequestError::Build)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, path);
        Url::parse_with_params(&raw, params).map_err(|e| RequestError::InvalidUrl {
            url: raw,
            reason: e.to_string(),
        })
    }

    fn same_origin(&self, url: &Url) -> Result<bool> {
        let base = Url::parse(&self.base_url).map_err(|e| RequestError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(base.origin() == url.origin())
    }

    fn window_params(query: &str, window: &TimeWindow) -> Vec<(&'static str, String)> {
        vec![
            ("q", query.to_string()),
            ("from", window.from_param()),
            ("until", window.until_param()),
        ]
    }

    /// URL for one page of a tag's stream.
    ///
    /// The service hands back `next` as an absolute http(s) URL, which must share
    /// the base URL's origin so the bearer token never leaves the service.
    /// Anything else is a bare token and goes to the iterate endpoint as `next=`.
    pub fn events_url(
        &self,
        tag: &str,
        window: &TimeWindow,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<Url> {
        match cursor {
            None => {
                let mut params = Self::window_params(&format!("tag:{}", tag), window);
                params.push(("size", page_size.to_string()));
                self.endpoint("events/iterate", &params)
            }
            Some(cursor) => match Url::parse(cursor) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {
                    if !self.same_origin(&url)? {
                        return Err(RequestError::InvalidUrl {
                            url: cursor.to_string(),
                            reason: format!("cursor leaves the service at {}", self.base_url),
                        });
                    }
                    Ok(url)
                }
                _ => self.endpoint("events/iterate", &[("next", cursor.to_string())]),
            },
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let url_text = url.to_string();
        tracing::debug!(url = %url_text, "request");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| RequestError::Transport {
                url: url_text.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::Status {
                url: url_text,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| RequestError::Transport {
                url: url_text.clone(),
                source,
            })?;

        serde_json::from_slice(&body).map_err(|source| RequestError::Decode {
            url: url_text,
            source,
        })
    }
}

#[async_trait]
impl LogService for LogServiceClient {
    async fn search(&self, window: &TimeWindow) -> Result<SearchResult> {
        let url = self.endpoint("search", &Self::window_params("*", window))?;
        self.get_json(url).await
    }

    async fn list_tags(&self, window: &TimeWindow) -> Result<Vec<Tag>> {
        let url = self.endpoint("fields/tag", &Self::window_params("*", window))?;
        let result: TagResult = self.get_json(url).await?;
        Ok(result.tag)
    }

    async fn iterate_events(
        &self,
        tag: &str,
        window: &TimeWindow,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<EventPage> {
        let url = self.events_url(tag, window, page_size, cursor)?;
        self.get_json(url).await
    }
}

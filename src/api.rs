//! Photo service client seam.
//!
//! The coordinator and fetcher only see [`SearchApi`] and [`ImageSource`];
//! [`FlickrClient`] is the HTTP implementation used by the binary.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::ApiError;

/// String parameters for one API call.
pub type Params = BTreeMap<String, String>;

/// Something that can run a named search method and hand back decoded JSON.
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn call(&self, method: &str, params: &Params) -> Result<Value, ApiError>;
}

/// Something that can download the bytes behind an image URL.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError>;
}

/// REST client for the Flickr-style `?method=...` API.
#[derive(Debug, Clone)]
pub struct FlickrClient {
    client: Client,
    config: ApiConfig,
}

impl FlickrClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("photo-finder/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Full query for `method`: the fixed defaults, then `params` on top.
    fn query(&self, method: &str, params: &Params) -> Params {
        let mut query = Params::new();
        query.insert("api_key".into(), self.config.api_key.clone());
        query.insert("format".into(), "json".into());
        query.insert("nojsoncallback".into(), "1".into());
        query.insert("extras".into(), self.config.extras.clone());
        if let Some(per_page) = self.config.per_page {
            query.insert("per_page".into(), per_page.to_string());
        }
        query.insert("method".into(), method.to_string());
        for (key, value) in params {
            query.insert(key.clone(), value.clone());
        }
        query
    }
}

#[async_trait]
impl SearchApi for FlickrClient {
    async fn call(&self, method: &str, params: &Params) -> Result<Value, ApiError> {
        let query = self.query(method, params);
        debug!(method, page = ?params.get("page"), "api request");

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|err| ApiError::Parse(err.to_string()))
    }
}

#[async_trait]
impl ImageSource for FlickrClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

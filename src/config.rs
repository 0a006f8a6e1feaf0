use std::path::Path;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

/// Environment variable that overrides `api.api-key` from the file.
pub const API_KEY_ENV: &str = "PHOTO_FINDER_API_KEY";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ApiConfig {
    /// REST endpoint of the photo service.
    pub base_url: String,
    pub api_key: String,
    /// Method name sent with every page request.
    pub search_method: String,
    /// Comma-separated extra fields to request per photo; must include the
    /// image URL field.
    pub extras: String,
    /// Page size hint. The service default is used when absent.
    pub per_page: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl ApiConfig {
    fn default_base_url() -> String {
        "https://api.flickr.com/services/rest/".to_string()
    }

    fn default_search_method() -> String {
        "flickr.photos.search".to_string()
    }

    fn default_extras() -> String {
        "url_m".to_string()
    }

    const fn default_request_timeout() -> Duration {
        Duration::from_secs(15)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            !self.base_url.trim().is_empty(),
            "api.base-url must not be empty"
        );
        ensure!(
            !self.search_method.trim().is_empty(),
            "api.search-method must not be empty"
        );
        ensure!(
            self.per_page.is_none_or(|n| n > 0),
            "api.per-page must be greater than zero"
        );
        ensure!(
            self.request_timeout > Duration::ZERO,
            "api.request-timeout must be positive"
        );
        Ok(())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            api_key: String::new(),
            search_method: Self::default_search_method(),
            extras: Self::default_extras(),
            per_page: None,
            request_timeout: Self::default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    pub api: ApiConfig,
    /// How many keyword-search results are held at once.
    pub text_capacity: usize,
    /// How many geo-search results are held at once.
    pub geo_capacity: usize,
    /// Reshuffle the buffers after every page.
    pub auto_randomize: bool,
    /// Optional deterministic seed for buffer shuffles.
    pub shuffle_seed: Option<u64>,
    /// Half-size of the geo search box, in minutes of arc.
    pub bounding_box_arcmin: f64,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Apply the API key from the environment, if set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => self.api.api_key = key,
            _ => {}
        }
        self
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.text_capacity > 0,
            "text-capacity must be greater than zero"
        );
        ensure!(
            self.geo_capacity > 0,
            "geo-capacity must be greater than zero"
        );
        ensure!(
            self.bounding_box_arcmin.is_finite() && self.bounding_box_arcmin > 0.0,
            "bounding-box-arcmin must be a positive number"
        );
        self.api.validate()?;
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            text_capacity: 100,
            geo_capacity: 100,
            auto_randomize: true,
            shuffle_seed: None,
            bounding_box_arcmin: 5.0,
        }
    }
}

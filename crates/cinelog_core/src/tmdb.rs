use std::env;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::Client;
use serde_json::Value;

pub const DEFAULT_SEARCH_URL: &str = "https://api.themoviedb.org/3/search/movie";
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p";

const DEFAULT_USER_AGENT: &str = "cinelog/0.1";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

// Ok(None) means the search ran but found no usable poster.
pub trait PosterApi {
    fn poster_url(&mut self, title: &str) -> Result<Option<String>>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct TmdbClientConfig {
    pub search_url: String,
    pub image_base_url: String,
    pub api_key: String,
    pub image_size: String,
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl TmdbClientConfig {
    pub fn from_env(api_key: &str, image_size: &str) -> Self {
        Self {
            search_url: env_value("CINELOG_TMDB_API_URL", DEFAULT_SEARCH_URL),
            image_base_url: env_value("CINELOG_TMDB_IMAGE_URL", DEFAULT_IMAGE_BASE_URL),
            api_key: api_key.to_string(),
            image_size: image_size.to_string(),
            user_agent: env_value("CINELOG_USER_AGENT", DEFAULT_USER_AGENT),
            timeout_ms: env_value_u64("CINELOG_HTTP_TIMEOUT_MS", DEFAULT_TIMEOUT_MS),
        }
    }

    fn poster_reference(&self, poster_path: &str) -> String {
        let base = self.image_base_url.trim_end_matches('/');
        let separator = if poster_path.starts_with('/') { "" } else { "/" };
        format!("{base}/{}{separator}{poster_path}", self.image_size)
    }
}

pub struct TmdbClient {
    client: Client,
    config: TmdbClientConfig,
    request_count: usize,
}

impl TmdbClient {
    pub fn new(config: TmdbClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build TMDB HTTP client")?;

        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }
}

impl PosterApi for TmdbClient {
    fn poster_url(&mut self, title: &str) -> Result<Option<String>> {
        let url = Url::parse(&self.config.search_url)
            .with_context(|| format!("invalid TMDB search URL: {}", self.config.search_url))?;

        self.request_count += 1;
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("User-Agent", self.config.user_agent.clone())
            .query(&[("api_key", self.config.api_key.as_str()), ("query", title)])
            .send()
            .with_context(|| format!("TMDB search request failed for {title}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("TMDB search failed with HTTP {status}");
        }

        let payload: Value = response
            .json()
            .context("failed to decode TMDB search response")?;
        Ok(extract_poster_path(&payload).map(|path| self.config.poster_reference(path)))
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn extract_poster_path(payload: &Value) -> Option<&str> {
    payload
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .and_then(|result| result.get("poster_path"))
        .and_then(Value::as_str)
        .filter(|path| !path.is_empty())
}

fn env_value(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

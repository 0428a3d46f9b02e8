use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const APP_DIR: &str = "news-digest";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Overridden by the NEWS_API_KEY environment variable when set.
    pub news_api_key: Option<String>,

    #[serde(default = "default_news_api_url")]
    pub news_api_url: String,

    #[serde(default = "default_news_language")]
    pub news_language: String,

    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,

    /// Articles per topic when a user asks to see their news.
    #[serde(default = "default_view_limit")]
    pub view_limit: usize,

    /// Local hour (0-23) of the daily digest.
    #[serde(default = "default_digest_hour")]
    pub digest_hour: u32,

    #[serde(default = "default_digest_limit")]
    pub digest_limit: usize,

    pub summary_channel_id: Option<u64>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Topic name to RSS/Atom feed url. The keys are the topics users can follow.
    #[serde(default = "default_feeds")]
    pub feeds: BTreeMap<String, String>,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    data_dir.join("news.db").to_string_lossy().to_string()
}

fn default_news_api_url() -> String {
    "https://newsapi.org/v2".to_string()
}

fn default_news_language() -> String {
    "en".to_string()
}

fn default_feeds() -> BTreeMap<String, String> {
    [
        ("tecnologia", "http://feeds.bbci.co.uk/news/technology/rss.xml"),
        ("games", "https://www.engadget.com/rss.xml"),
        ("ciberseguranca", "https://www.darkreading.com/rss.xml"),
    ]
    .into_iter()
    .map(|(topic, url)| (topic.to_string(), url.to_string()))
    .collect()
}

fn default_fetch_limit() -> usize {
    5
}

fn default_view_limit() -> usize {
    2
}

fn default_digest_hour() -> u32 {
    8
}

fn default_digest_limit() -> usize {
    3
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            news_api_key: None,
            news_api_url: default_news_api_url(),
            news_language: default_news_language(),
            fetch_limit: default_fetch_limit(),
            view_limit: default_view_limit(),
            digest_hour: default_digest_hour(),
            digest_limit: default_digest_limit(),
            summary_channel_id: None,
            request_timeout_secs: default_request_timeout(),
            feeds: default_feeds(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(std::env::var("NEWS_API_KEY").ok());
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            tracing::info!("Wrote default configuration to {:?}", path);
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    fn apply_env(&mut self, api_key: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.news_api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.digest_hour > 23 {
            return Err(AppError::Config(format!(
                "digest_hour must be between 0 and 23, got {}",
                self.digest_hour
            )));
        }
        if self.fetch_limit == 0 {
            return Err(AppError::Config("fetch_limit must be positive".to_string()));
        }
        if self.feeds.is_empty() {
            return Err(AppError::Config("at least one topic feed is required".to_string()));
        }
        Ok(())
    }

    /// The topics users can subscribe to.
    pub fn topics(&self) -> Vec<String> {
        self.feeds.keys().cloned().collect()
    }

    /// The configured key, treating a blank value as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.news_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

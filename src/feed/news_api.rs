use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::NewArticle;

use super::ArticleSource;

/// The search endpoint refuses larger pages.
const MAX_PAGE_SIZE: usize = 100;

/// Title and url the API substitutes for articles taken down by the publisher.
const REMOVED_MARKER: &str = "[Removed]";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<ApiArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiArticle {
    title: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    code: Option<String>,
    message: Option<String>,
}

/// Client for a newsapi.org style `/everything` search endpoint.
pub struct NewsApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    language: String,
}

impl NewsApiClient {
    pub fn new(base_url: &str, api_key: String, language: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("news-digest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            language,
        })
    }

    fn search_url(&self, topic: &str, limit: usize) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/everything", self.base_url))
            .map_err(|e| AppError::Config(format!("invalid news_api_url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("q", topic)
            .append_pair("language", &self.language)
            .append_pair("sortBy", "publishedAt")
            .append_pair("pageSize", &limit.clamp(1, MAX_PAGE_SIZE).to_string());
        Ok(url)
    }

    pub async fn search(&self, topic: &str, limit: usize) -> Result<Vec<NewArticle>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let url = self.search_url(topic, limit)?;
        let response = self
            .client
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.code.unwrap_or_default(),
                        e.message.unwrap_or_default()
                    )
                })
                .unwrap_or(body);
            return Err(AppError::NewsApi(format!("HTTP {} ({})", status, detail)));
        }

        let articles = parse_response(&body, topic, limit)?;
        tracing::info!("Fetched {} API articles for topic {}", articles.len(), topic);
        Ok(articles)
    }
}

#[async_trait]
impl ArticleSource for NewsApiClient {
    fn name(&self) -> &str {
        "news-api"
    }

    async fn fetch(&self, topic: &str, limit: usize) -> Result<Vec<NewArticle>> {
        self.search(topic, limit).await
    }
}

fn parse_response(body: &str, topic: &str, limit: usize) -> Result<Vec<NewArticle>> {
    let response: SearchResponse = serde_json::from_str(body)?;

    let articles = response
        .articles
        .into_iter()
        .filter_map(|article| {
            let title = article.title?;
            let url = article.url?;
            if title == REMOVED_MARKER || url.trim().is_empty() {
                return None;
            }
            Some(NewArticle {
                title,
                url,
                topic: topic.to_string(),
                published_at: article
                    .published_at
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
            })
        })
        .take(limit)
        .collect();

    Ok(articles)
}

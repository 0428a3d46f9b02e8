use std::collections::HashSet;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::models::NewArticle;

use super::{ArticleSource, FeedFetcher, NewsApiClient};

/// Merges the search API and the topic feed into one bounded, url-unique list.
///
/// Either source may fail on its own; a failure is logged and counts as an
/// empty answer from that source, so `fetch` itself never errors.
pub struct Aggregator {
    api: Option<Box<dyn ArticleSource>>,
    feeds: Box<dyn ArticleSource>,
}

impl Aggregator {
    pub fn new(api: Option<Box<dyn ArticleSource>>, feeds: Box<dyn ArticleSource>) -> Self {
        Self { api, feeds }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let api: Option<Box<dyn ArticleSource>> = match config.api_key() {
            Some(key) => Some(Box::new(NewsApiClient::new(
                &config.news_api_url,
                key.to_string(),
                config.news_language.clone(),
                timeout,
            )?)),
            None => {
                tracing::info!("No news API key configured, using feeds only");
                None
            }
        };
        let feeds = Box::new(FeedFetcher::new(config.feeds.clone(), timeout)?);

        Ok(Self::new(api, feeds))
    }

    pub async fn fetch(&self, topic: &str, limit: usize) -> Vec<NewArticle> {
        if limit == 0 {
            return Vec::new();
        }

        let mut articles = match &self.api {
            Some(api) => dedupe_by_url(fetch_or_empty(api.as_ref(), topic, limit).await, limit),
            None => Vec::new(),
        };

        // Feed items may repeat API urls; at most `limit - articles.len()` new ones are kept.
        if articles.len() < limit {
            articles.extend(fetch_or_empty(self.feeds.as_ref(), topic, limit).await);
        }

        let merged = dedupe_by_url(articles, limit);
        tracing::debug!("Aggregated {} articles for topic {}", merged.len(), topic);
        merged
    }
}

async fn fetch_or_empty(source: &dyn ArticleSource, topic: &str, limit: usize) -> Vec<NewArticle> {
    match source.fetch(topic, limit).await {
        Ok(articles) => articles,
        Err(e) => {
            tracing::warn!("Source {} failed for topic {}: {}", source.name(), topic, e);
            Vec::new()
        }
    }
}

/// Keeps the first article seen for each url, in order, up to `limit`.
pub fn dedupe_by_url(articles: Vec<NewArticle>, limit: usize) -> Vec<NewArticle> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|article| seen.insert(article.url.clone()))
        .take(limit)
        .collect()
}

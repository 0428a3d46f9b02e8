use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use reqwest::Client;

use crate::error::Result;
use crate::models::NewArticle;

use super::ArticleSource;

/// Reads the RSS/Atom feed configured for each topic.
pub struct FeedFetcher {
    client: Client,
    feeds: BTreeMap<String, String>,
}

impl FeedFetcher {
    pub fn new(feeds: BTreeMap<String, String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("news-digest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, feeds })
    }

    pub fn feed_url(&self, topic: &str) -> Option<&str> {
        self.feeds.get(topic).map(String::as_str)
    }

    pub async fn fetch_topic(&self, topic: &str, limit: usize) -> Result<Vec<NewArticle>> {
        let Some(url) = self.feed_url(topic) else {
            tracing::warn!("No feed configured for topic {}", topic);
            return Ok(Vec::new());
        };

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed {}: HTTP {}", url, response.status()).into());
        }

        let bytes = response.bytes().await?;
        let articles = parse_feed(&bytes, topic, limit)?;
        tracing::info!("Fetched {} feed articles for topic {}", articles.len(), topic);
        Ok(articles)
    }
}

#[async_trait]
impl ArticleSource for FeedFetcher {
    fn name(&self) -> &str {
        "rss"
    }

    async fn fetch(&self, topic: &str, limit: usize) -> Result<Vec<NewArticle>> {
        self.fetch_topic(topic, limit).await
    }
}

/// Turns a feed document into at most `limit` articles. Entries without a
/// link are dropped, since the url is what identifies an article.
pub fn parse_feed(bytes: &[u8], topic: &str, limit: usize) -> Result<Vec<NewArticle>> {
    let feed = parser::parse(bytes)?;

    let articles = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry.links.first().map(|l| l.href.trim().to_string())?;
            if url.is_empty() {
                return None;
            }
            Some(NewArticle {
                title: entry
                    .title
                    .map(|t| t.content.trim().to_string())
                    .unwrap_or_else(|| "Untitled".to_string()),
                url,
                topic: topic.to_string(),
                published_at: entry.published.or(entry.updated),
            })
        })
        .take(limit)
        .collect();

    Ok(articles)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::error::AppError;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Tech</title>
    <link>https://news.example</link>
    <description>Tech news</description>
    <item>
      <title>Chips get faster</title>
      <link>https://news.example/chips</link>
      <pubDate>Wed, 01 May 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>No link here</title>
      <description>dropped</description>
    </item>
    <item>
      <title>Undated story</title>
      <link>https://news.example/undated</link>
    </item>
    <item>
      <title>Third</title>
      <link>https://news.example/third</link>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Games</title>
  <id>urn:games</id>
  <updated>2024-05-02T09:00:00Z</updated>
  <entry>
    <title>Patch notes</title>
    <id>urn:games:1</id>
    <link href="https://games.example/patch"/>
    <updated>2024-05-02T09:00:00Z</updated>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_items_with_links() {
        let articles = parse_feed(RSS.as_bytes(), "tecnologia", 10).unwrap();

        let urls: Vec<&str> = articles.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://news.example/chips",
                "https://news.example/undated",
                "https://news.example/third"
            ]
        );
        assert_eq!(articles[0].title, "Chips get faster");
        assert_eq!(articles[0].topic, "tecnologia");
        assert_eq!(
            articles[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(articles[1].published_at, None);
    }

    #[test]
    fn respects_limit() {
        let articles = parse_feed(RSS.as_bytes(), "tecnologia", 1).unwrap();
        assert_eq!(articles.len(), 1);
        assert!(parse_feed(RSS.as_bytes(), "tecnologia", 0).unwrap().is_empty());
    }

    #[test]
    fn atom_entries_fall_back_to_updated() {
        let articles = parse_feed(ATOM.as_bytes(), "games", 5).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].url, "https://games.example/patch");
        assert_eq!(
            articles[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_feed(b"<html>not a feed</html>", "games", 5).unwrap_err();
        assert!(matches!(err, AppError::FeedParse(_)));
    }

    #[test]
    fn unknown_topic_yields_nothing() {
        let fetcher = FeedFetcher::new(BTreeMap::new(), Duration::from_secs(1)).unwrap();
        let articles = tokio_test::block_on(fetcher.fetch_topic("culinaria", 5)).unwrap();
        assert!(articles.is_empty());
    }
}

mod aggregator;
mod fetcher;
mod import;
mod news_api;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::NewArticle;

pub use aggregator::Aggregator;
pub use fetcher::FeedFetcher;
pub use import::parse_opml_file;
pub use news_api::NewsApiClient;

/// Somewhere articles for a topic can be fetched from.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `limit` articles for `topic`, newest first where the source allows.
    async fn fetch(&self, topic: &str, limit: usize) -> Result<Vec<NewArticle>>;
}

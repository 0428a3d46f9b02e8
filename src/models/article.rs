use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An article as produced by a source, before it has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub url: String,
    pub topic: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub topic: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Chat message the article was posted in, once delivered.
    pub message_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedArticle {
    pub article: Article,
    pub vote_count: i64,
}

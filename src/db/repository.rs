use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{Article, NewArticle, RankedArticle, User, Vote, VoteKind};
use crate::ranking;

use super::schema::{INDEXES, MERGE_DUPLICATE_URLS, SCHEMA};

/// SQLite-backed store. Every operation runs as one closure on the
/// connection's own thread, so operations never interleave mid-statement.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path).await?;

        let merged = conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                let merged = merge_duplicate_urls(conn)?;
                conn.execute_batch(INDEXES)?;
                Ok(merged)
            })
            .await?;

        if merged > 0 {
            tracing::warn!("Merged {} duplicate article rows in {}", merged, db_path);
        }
        tracing::info!("Database ready at {}", db_path);
        Ok(Self { conn })
    }

    // User operations

    pub async fn upsert_user(&self, user_id: i64, name: &str) -> Result<()> {
        let name = name.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO users (user_id, username) VALUES (?1, ?2)
                       ON CONFLICT(user_id) DO UPDATE SET username = excluded.username"#,
                    params![user_id, name],
                )?;
                Ok(())
            })
            .await?;
        tracing::debug!("User {} upserted", user_id);
        Ok(())
    }

    // Subscription operations

    /// Fails with `ConstraintViolation` when the user already follows `topic`
    /// and with `NotFound` when the user was never recorded.
    pub async fn add_subscription(&self, user_id: i64, topic: &str) -> Result<()> {
        let owned = topic.to_string();
        let inserted = self
            .conn
            .call(move |conn| {
                let user_exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE user_id = ?1)",
                    params![user_id],
                    |row| row.get(0),
                )?;
                if !user_exists {
                    return Ok(None);
                }
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO subscriptions (user_id, topic) VALUES (?1, ?2)",
                    params![user_id, owned],
                )?;
                Ok(Some(changed > 0))
            })
            .await?;

        let Some(inserted) = inserted else {
            tracing::warn!("Subscription to {} rejected: user {} does not exist", topic, user_id);
            return Err(AppError::NotFound(format!("user {}", user_id)));
        };
        if !inserted {
            return Err(AppError::ConstraintViolation(format!(
                "user {} is already subscribed to '{}'",
                user_id, topic
            )));
        }
        tracing::info!("User {} subscribed to {}", user_id, topic);
        Ok(())
    }

    pub async fn remove_subscription(&self, user_id: i64, topic: &str) -> Result<()> {
        let owned = topic.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "DELETE FROM subscriptions WHERE user_id = ?1 AND topic = ?2",
                    params![user_id, owned],
                )?;
                Ok(changed)
            })
            .await?;
        if removed > 0 {
            tracing::info!("User {} unsubscribed from {}", user_id, topic);
        }
        Ok(())
    }

    pub async fn list_subscriptions(&self, user_id: i64) -> Result<Vec<String>> {
        let topics = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT topic FROM subscriptions WHERE user_id = ?1")?;
                let topics = stmt
                    .query_map(params![user_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(topics)
            })
            .await?;
        Ok(topics)
    }

    /// Users following at least one topic.
    pub async fn subscribed_users(&self) -> Result<Vec<User>> {
        let users = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT DISTINCT s.user_id, COALESCE(u.username, '')
                       FROM subscriptions s
                       LEFT JOIN users u ON u.user_id = s.user_id
                       ORDER BY s.user_id"#,
                )?;
                let users = stmt
                    .query_map([], |row| {
                        Ok(User {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(users)
            })
            .await?;
        Ok(users)
    }

    // Article operations

    /// Stores the batch in one transaction and returns the ids of the rows
    /// that did not exist yet. Known urls are skipped without allocating an id.
    pub async fn save_articles(&self, articles: Vec<NewArticle>) -> Result<Vec<i64>> {
        let total = articles.len();
        let ids = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut ids = Vec::new();
                {
                    let mut stmt = tx.prepare(
                        r#"INSERT INTO news (title, url, topic, published_at)
                           VALUES (?1, ?2, ?3, ?4)
                           ON CONFLICT(url) DO NOTHING
                           RETURNING news_id"#,
                    )?;
                    for article in &articles {
                        let id: Option<i64> = stmt
                            .query_row(
                                params![
                                    article.title,
                                    article.url,
                                    article.topic,
                                    article.published_at.map(format_datetime),
                                ],
                                |row| row.get(0),
                            )
                            .optional()?;
                        ids.extend(id);
                    }
                }
                tx.commit()?;
                Ok(ids)
            })
            .await?;

        tracing::info!("Saved {} new of {} articles, ids: {:?}", ids.len(), total, ids);
        Ok(ids)
    }

    pub async fn get_article(&self, article_id: i64) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| {
                let article = conn
                    .query_row(
                        "SELECT news_id, title, url, topic, published_at, message_id FROM news WHERE news_id = ?1",
                        params![article_id],
                        article_from_row,
                    )
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    /// Delivery tracking is best effort: an unknown id only logs a warning.
    pub async fn set_delivery_message(&self, article_id: i64, message_id: i64) -> Result<bool> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE news SET message_id = ?1 WHERE news_id = ?2",
                    params![message_id, article_id],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            tracing::warn!(
                "{}",
                AppError::NotFound(format!("article {} for message {}", article_id, message_id))
            );
            return Ok(false);
        }
        tracing::info!("Message {} recorded for article {}", message_id, article_id);
        Ok(true)
    }

    pub async fn find_article_by_message(&self, message_id: i64) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| {
                let article = conn
                    .query_row(
                        r#"SELECT news_id, title, url, topic, published_at, message_id
                           FROM news WHERE message_id = ?1
                           ORDER BY news_id DESC LIMIT 1"#,
                        params![message_id],
                        article_from_row,
                    )
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    // Vote operations

    /// Replaces any earlier vote by the same user on the same article.
    pub async fn add_vote(&self, article_id: i64, user_id: i64, kind: VoteKind) -> Result<()> {
        let missing = self
            .conn
            .call(move |conn| {
                let article_exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM news WHERE news_id = ?1)",
                    params![article_id],
                    |row| row.get(0),
                )?;
                if !article_exists {
                    return Ok(Some(format!("article {}", article_id)));
                }
                let user_exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE user_id = ?1)",
                    params![user_id],
                    |row| row.get(0),
                )?;
                if !user_exists {
                    return Ok(Some(format!("user {}", user_id)));
                }

                conn.execute(
                    r#"INSERT INTO votes (news_id, user_id, vote_type) VALUES (?1, ?2, ?3)
                       ON CONFLICT(news_id, user_id) DO UPDATE SET vote_type = excluded.vote_type"#,
                    params![article_id, user_id, kind.as_str()],
                )?;
                Ok(None)
            })
            .await?;

        if let Some(what) = missing {
            tracing::warn!("Vote by user {} rejected: {} does not exist", user_id, what);
            return Err(AppError::NotFound(what));
        }
        tracing::info!("Vote {} on article {} by user {}", kind, article_id, user_id);
        Ok(())
    }

    pub async fn votes_for(&self, article_id: i64) -> Result<Vec<Vote>> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT news_id, user_id, vote_type FROM votes WHERE news_id = ?1 ORDER BY user_id",
                )?;
                let rows = stmt
                    .query_map(params![article_id], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(article_id, user_id, kind)| -> Result<Vote> {
                Ok(Vote {
                    article_id,
                    user_id,
                    kind: kind.parse()?,
                })
            })
            .collect()
    }

    // Ranking

    /// Top articles across `topics` by vote count, newest first on ties.
    pub async fn top_voted(&self, topics: &[String], limit: usize) -> Result<Vec<RankedArticle>> {
        if topics.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let topics = topics.to_vec();
        let placeholders = vec!["?"; topics.len()].join(",");
        let sql = format!(
            r#"SELECT n.news_id, n.title, n.url, n.topic, n.published_at, n.message_id,
                      COUNT(v.user_id) AS vote_count
               FROM news n
               LEFT JOIN votes v ON n.news_id = v.news_id
               WHERE n.topic IN ({})
               GROUP BY n.news_id"#,
            placeholders
        );

        let tallies = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let tallies = stmt
                    .query_map(params_from_iter(topics.iter()), |row| {
                        Ok(RankedArticle {
                            article: article_from_row(row)?,
                            vote_count: row.get(6)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(tallies)
            })
            .await?;

        Ok(ranking::rank(tallies, limit))
    }
}

/// Collapses rows sharing a url, returning how many were removed.
fn merge_duplicate_urls(conn: &mut rusqlite::Connection) -> rusqlite::Result<usize> {
    let duplicates: i64 = conn.query_row(
        "SELECT COUNT(*) - COUNT(DISTINCT url) FROM news",
        [],
        |row| row.get(0),
    )?;
    if duplicates <= 0 {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    tx.execute_batch(MERGE_DUPLICATE_URLS)?;
    tx.commit()?;
    Ok(duplicates as usize)
}

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // RFC3339, as written by this crate and by the news API
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // RFC2822, as found in older rows copied straight from RSS
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        topic: row.get(3)?,
        published_at: row
            .get::<_, Option<String>>(4)?
            .and_then(|s| parse_datetime(&s)),
        message_id: row.get(5)?,
    })
}

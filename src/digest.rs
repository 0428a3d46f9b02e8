//! Daily per-user digest of the most voted articles.
//!
//! The scheduler only decides *what* each user gets. Getting it to them is
//! the job of a [`DigestSink`], which the chat layer provides.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::models::{RankedArticle, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryTarget {
    Channel(u64),
    DirectMessage(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub user: User,
    pub target: DeliveryTarget,
    pub entries: Vec<RankedArticle>,
}

impl Digest {
    pub fn render(&self) -> String {
        let header = match self.target {
            DeliveryTarget::Channel(_) => format!("Daily digest for {}:", self.user.name),
            DeliveryTarget::DirectMessage(_) => "Daily digest:".to_string(),
        };
        let lines: Vec<String> = self
            .entries
            .iter()
            .map(|entry| {
                format!(
                    "- {} ({}) [{} {}]",
                    entry.article.title,
                    entry.article.url,
                    entry.vote_count,
                    if entry.vote_count == 1 { "vote" } else { "votes" }
                )
            })
            .collect();
        format!("{}\n{}", header, lines.join("\n"))
    }
}

/// Delivers a digest to its target.
#[async_trait]
pub trait DigestSink: Send + Sync {
    async fn deliver(&self, digest: &Digest) -> Result<()>;
}

/// Prints digests instead of sending them, for headless runs.
pub struct StdoutSink;

#[async_trait]
impl DigestSink for StdoutSink {
    async fn deliver(&self, digest: &Digest) -> Result<()> {
        println!("[{:?}]\n{}\n", digest.target, digest.render());
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DigestReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct DigestScheduler {
    repository: Arc<Repository>,
    hour: u32,
    limit: usize,
    channel_id: Option<u64>,
}

impl DigestScheduler {
    pub fn new(repository: Arc<Repository>, config: &Config) -> Self {
        Self {
            repository,
            hour: config.digest_hour,
            limit: config.digest_limit,
            channel_id: config.summary_channel_id,
        }
    }

    /// The digest for `user`, or `None` when nothing in their topics qualifies.
    pub async fn compose(&self, user: &User) -> Result<Option<Digest>> {
        let topics = self.repository.list_subscriptions(user.id).await?;
        if topics.is_empty() {
            return Ok(None);
        }

        let entries = self.repository.top_voted(&topics, self.limit).await?;
        if entries.is_empty() {
            return Ok(None);
        }

        let target = match self.channel_id {
            Some(channel) => DeliveryTarget::Channel(channel),
            None => DeliveryTarget::DirectMessage(user.id),
        };
        Ok(Some(Digest {
            user: user.clone(),
            target,
            entries,
        }))
    }

    /// One pass over every subscribed user. A failure for one user is logged
    /// and counted; it never stops the others.
    pub async fn run_once(&self, sink: &dyn DigestSink) -> Result<DigestReport> {
        let users = self.repository.subscribed_users().await?;
        let mut report = DigestReport::default();

        if users.is_empty() {
            tracing::info!("No subscribed users, skipping digest");
            return Ok(report);
        }

        for user in &users {
            let digest = match self.compose(user).await {
                Ok(Some(digest)) => digest,
                Ok(None) => {
                    tracing::debug!("Nothing to send to user {}", user.id);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!("Failed to compose digest for user {}: {}", user.id, e);
                    report.failed += 1;
                    continue;
                }
            };

            match sink.deliver(&digest).await {
                Ok(()) => {
                    tracing::info!("Digest sent to user {}", user.id);
                    report.sent += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to deliver digest to user {}: {}", user.id, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Digest pass done: {} sent, {} skipped, {} failed",
            report.sent,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// Runs a pass every day at the configured local hour until `shutdown`
    /// resolves.
    pub async fn run<F>(&self, sink: &dyn DigestSink, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let now = Local::now();
            let next = next_run_after(&now, self.hour);
            let wait = (next.clone() - now).to_std().unwrap_or(Duration::ZERO);
            tracing::info!("Next digest at {}", next);

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Digest scheduler stopping");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            if let Err(e) = self.run_once(sink).await {
                tracing::error!("Digest pass failed: {}", e);
            }
        }
    }
}

/// The first moment strictly after `now` at `hour`:00 local to `now`'s zone.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> DateTime<Tz> {
    let tz = now.timezone();
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
    let today = now.date_naive();

    let mut day = today;
    loop {
        // A missing local time (DST gap) skips to the next day.
        if let Some(candidate) = tz.from_local_datetime(&day.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
        day = match day.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => return now.clone(),
        };
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{Article, NewArticle, VoteKind};

    async fn scheduler(channel: Option<u64>) -> (tempfile::TempDir, Arc<Repository>, DigestScheduler) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.db");
        let repository = Arc::new(Repository::new(path.to_str().unwrap()).await.unwrap());
        let config = Config {
            summary_channel_id: channel,
            ..Config::default()
        };
        let scheduler = DigestScheduler::new(Arc::clone(&repository), &config);
        (dir, repository, scheduler)
    }

    struct RecordingSink {
        delivered: tokio::sync::Mutex<Vec<Digest>>,
        fail_for: Option<i64>,
    }

    #[async_trait]
    impl DigestSink for RecordingSink {
        async fn deliver(&self, digest: &Digest) -> Result<()> {
            if self.fail_for == Some(digest.user.id) {
                return Err(anyhow::anyhow!("Cannot send messages to this user").into());
            }
            self.delivered.lock().await.push(digest.clone());
            Ok(())
        }
    }

    fn new_article(url: &str, topic: &str) -> NewArticle {
        NewArticle {
            title: format!("About {}", url),
            url: url.to_string(),
            topic: topic.to_string(),
            published_at: None,
        }
    }

    #[tokio::test]
    async fn user_without_matching_articles_is_skipped() {
        let (_dir, repo, scheduler) = scheduler(None).await;
        repo.upsert_user(1, "ana").await.unwrap();
        repo.add_subscription(1, "tecnologia").await.unwrap();
        repo.add_subscription(1, "games").await.unwrap();
        repo.save_articles(vec![new_article("https://x.example/sec", "ciberseguranca")])
            .await
            .unwrap();

        let sink = RecordingSink {
            delivered: Default::default(),
            fail_for: None,
        };
        let report = scheduler.run_once(&sink).await.unwrap();

        assert_eq!(report, DigestReport { sent: 0, skipped: 1, failed: 0 });
        assert!(sink.delivered.lock().await.is_empty());
    }

    #[tokio::test]
    async fn digest_uses_only_the_users_own_topics() {
        let (_dir, repo, scheduler) = scheduler(None).await;
        repo.upsert_user(1, "ana").await.unwrap();
        repo.upsert_user(2, "bruno").await.unwrap();
        repo.add_subscription(1, "games").await.unwrap();
        repo.add_subscription(2, "tecnologia").await.unwrap();
        let ids = repo
            .save_articles(vec![
                new_article("https://x.example/g1", "games"),
                new_article("https://x.example/g2", "games"),
                new_article("https://x.example/t1", "tecnologia"),
            ])
            .await
            .unwrap();
        repo.add_vote(ids[1], 2, VoteKind::Star).await.unwrap();

        let digest = scheduler
            .compose(&User { id: 1, name: "ana".to_string() })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(digest.target, DeliveryTarget::DirectMessage(1));
        let urls: Vec<&str> = digest.entries.iter().map(|e| e.article.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.example/g2", "https://x.example/g1"]);
    }

    #[tokio::test]
    async fn one_failed_delivery_does_not_stop_the_rest() {
        let (_dir, repo, scheduler) = scheduler(Some(42)).await;
        for (id, name) in [(1, "ana"), (2, "bruno"), (3, "carla")] {
            repo.upsert_user(id, name).await.unwrap();
            repo.add_subscription(id, "games").await.unwrap();
        }
        repo.save_articles(vec![new_article("https://x.example/g1", "games")])
            .await
            .unwrap();

        let sink = RecordingSink {
            delivered: Default::default(),
            fail_for: Some(2),
        };
        let report = scheduler.run_once(&sink).await.unwrap();

        assert_eq!(report, DigestReport { sent: 2, skipped: 0, failed: 1 });
        let delivered = sink.delivered.lock().await;
        let users: Vec<i64> = delivered.iter().map(|d| d.user.id).collect();
        assert_eq!(users, vec![1, 3]);
        assert_eq!(delivered[0].target, DeliveryTarget::Channel(42));
    }

    #[test]
    fn renders_one_line_per_article() {
        let digest = Digest {
            user: User { id: 1, name: "ana".to_string() },
            target: DeliveryTarget::Channel(9),
            entries: vec![
                RankedArticle {
                    article: Article {
                        id: 1,
                        title: "Patch notes".to_string(),
                        url: "https://g.example/p".to_string(),
                        topic: "games".to_string(),
                        published_at: None,
                        message_id: None,
                    },
                    vote_count: 1,
                },
                RankedArticle {
                    article: Article {
                        id: 2,
                        title: "Review".to_string(),
                        url: "https://g.example/r".to_string(),
                        topic: "games".to_string(),
                        published_at: None,
                        message_id: Some(3),
                    },
                    vote_count: 0,
                },
            ],
        };

        assert_eq!(
            digest.render(),
            "Daily digest for ana:\n- Patch notes (https://g.example/p) [1 vote]\n- Review (https://g.example/r) [0 votes]"
        );
    }

    #[test]
    fn next_run_is_today_or_tomorrow() {
        let morning = Utc.with_ymd_and_hms(2024, 5, 1, 6, 30, 0).unwrap();
        assert_eq!(
            next_run_after(&morning, 8),
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
        );

        let exactly = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        assert_eq!(
            next_run_after(&exactly, 8),
            Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap()
        );

        let evening = Utc.with_ymd_and_hms(2024, 12, 31, 21, 0, 0).unwrap();
        assert_eq!(
            next_run_after(&evening, 8),
            Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (_dir, _repo, scheduler) = scheduler(None).await;
        let sink = StdoutSink;
        tokio::time::timeout(Duration::from_secs(5), scheduler.run(&sink, async {}))
            .await
            .unwrap();
    }
}

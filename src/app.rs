use std::sync::Arc;

use futures::future::join_all;

use crate::config::Config;
use crate::db::Repository;
use crate::digest::DigestScheduler;
use crate::error::{AppError, Result};
use crate::feed::Aggregator;
use crate::models::{NewArticle, RankedArticle, SubscriptionChange, VoteKind};

/// Entry points for the chat layer: menus, subscriptions, fetching, votes.
pub struct App {
    repository: Arc<Repository>,
    aggregator: Aggregator,
    digest: DigestScheduler,
    topics: Vec<String>,
    fetch_limit: usize,
    view_limit: usize,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Arc::new(Repository::new(&config.db_path).await?);
        let aggregator = Aggregator::from_config(config)?;
        Ok(Self::with_parts(repository, aggregator, config))
    }

    pub fn with_parts(repository: Arc<Repository>, aggregator: Aggregator, config: &Config) -> Self {
        let digest = DigestScheduler::new(Arc::clone(&repository), config);
        Self {
            repository,
            aggregator,
            digest,
            topics: config.topics(),
            fetch_limit: config.fetch_limit,
            view_limit: config.view_limit,
        }
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn digest(&self) -> &DigestScheduler {
        &self.digest
    }

    fn ensure_topic(&self, topic: &str) -> Result<()> {
        if self.topics.iter().any(|t| t == topic) {
            Ok(())
        } else {
            Err(AppError::UnknownTopic(topic.to_string()))
        }
    }

    /// First contact from a user; records or refreshes their display name.
    pub async fn open_menu(&self, user_id: i64, name: &str) -> Result<()> {
        self.repository.upsert_user(user_id, name).await
    }

    /// Follows `topic` if the user does not yet, otherwise stops following it.
    pub async fn toggle_subscription(&self, user_id: i64, topic: &str) -> Result<SubscriptionChange> {
        self.ensure_topic(topic)?;

        let current = self.repository.list_subscriptions(user_id).await?;
        if current.iter().any(|t| t == topic) {
            self.repository.remove_subscription(user_id, topic).await?;
            Ok(SubscriptionChange::Unsubscribed)
        } else {
            self.repository.add_subscription(user_id, topic).await?;
            Ok(SubscriptionChange::Subscribed)
        }
    }

    /// Fetches a topic and stores what came back. Returns the fetched
    /// articles and the ids of those that were new.
    pub async fn fetch_and_save(&self, topic: &str) -> Result<(Vec<NewArticle>, Vec<i64>)> {
        self.ensure_topic(topic)?;

        let articles = self.aggregator.fetch(topic, self.fetch_limit).await;
        if articles.is_empty() {
            return Ok((articles, Vec::new()));
        }
        let ids = self.repository.save_articles(articles.clone()).await?;
        Ok((articles, ids))
    }

    /// A few fresh articles for each of the user's topics, saved on the way.
    pub async fn news_for_user(&self, user_id: i64) -> Result<Vec<NewArticle>> {
        let topics = self.repository.list_subscriptions(user_id).await?;
        if topics.is_empty() {
            return Ok(Vec::new());
        }

        let fetches = topics
            .iter()
            .map(|topic| self.aggregator.fetch(topic, self.view_limit));
        let articles: Vec<NewArticle> = join_all(fetches).await.into_iter().flatten().collect();

        if !articles.is_empty() {
            self.repository.save_articles(articles.clone()).await?;
        }
        tracing::info!("Showing {} articles to user {}", articles.len(), user_id);
        Ok(articles)
    }

    pub async fn record_delivery(&self, article_id: i64, message_id: i64) -> Result<()> {
        self.repository.set_delivery_message(article_id, message_id).await?;
        Ok(())
    }

    pub async fn vote(&self, article_id: i64, user_id: i64, kind: VoteKind) -> Result<()> {
        self.repository.add_vote(article_id, user_id, kind).await
    }

    /// A reaction on a delivered message. Returns the article voted on, or
    /// `None` when the message is not one of ours.
    pub async fn vote_on_message(
        &self,
        message_id: i64,
        user_id: i64,
        kind: VoteKind,
    ) -> Result<Option<i64>> {
        let Some(article) = self.repository.find_article_by_message(message_id).await? else {
            tracing::debug!("Reaction on unknown message {}", message_id);
            return Ok(None);
        };
        self.repository.add_vote(article.id, user_id, kind).await?;
        Ok(Some(article.id))
    }

    pub async fn top_articles(&self, topics: &[String], limit: usize) -> Result<Vec<RankedArticle>> {
        self.repository.top_voted(topics, limit).await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::feed::ArticleSource;

    /// Returns one article per topic, urls derived from the topic name.
    struct TopicSource;

    #[async_trait]
    impl ArticleSource for TopicSource {
        fn name(&self) -> &str {
            "topic"
        }

        async fn fetch(&self, topic: &str, limit: usize) -> Result<Vec<NewArticle>> {
            Ok((0..limit)
                .map(|i| NewArticle {
                    title: format!("{} #{}", topic, i),
                    url: format!("https://{}.example/{}", topic, i),
                    topic: topic.to_string(),
                    published_at: None,
                })
                .collect())
        }
    }

    async fn app() -> (tempfile::TempDir, App) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().join("news.db").to_string_lossy().to_string(),
            ..Config::default()
        };
        let repository = Arc::new(Repository::new(&config.db_path).await.unwrap());
        let aggregator = Aggregator::new(None, Box::new(TopicSource));
        (dir, App::with_parts(repository, aggregator, &config))
    }

    #[tokio::test]
    async fn toggle_subscribes_then_unsubscribes() {
        let (_dir, app) = app().await;
        app.open_menu(1, "ana").await.unwrap();

        assert_eq!(
            app.toggle_subscription(1, "games").await.unwrap(),
            SubscriptionChange::Subscribed
        );
        assert_eq!(
            app.toggle_subscription(1, "games").await.unwrap(),
            SubscriptionChange::Unsubscribed
        );
        assert!(app.repository().list_subscriptions(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_topics_are_rejected() {
        let (_dir, app) = app().await;
        app.open_menu(1, "ana").await.unwrap();

        let err = app.toggle_subscription(1, "culinaria").await.unwrap_err();
        assert!(matches!(err, AppError::UnknownTopic(_)));
        assert!(app.fetch_and_save("culinaria").await.is_err());
    }

    #[tokio::test]
    async fn fetching_twice_only_saves_once() {
        let (_dir, app) = app().await;

        let (articles, first) = app.fetch_and_save("games").await.unwrap();
        assert_eq!(articles.len(), 5);
        assert_eq!(first.len(), 5);

        let (_, second) = app.fetch_and_save("games").await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn news_for_user_covers_each_subscription() {
        let (_dir, app) = app().await;
        app.open_menu(1, "ana").await.unwrap();
        assert!(app.news_for_user(1).await.unwrap().is_empty());

        app.toggle_subscription(1, "games").await.unwrap();
        app.toggle_subscription(1, "tecnologia").await.unwrap();

        let articles = app.news_for_user(1).await.unwrap();
        assert_eq!(articles.len(), 4);
        let top = app
            .top_articles(&["games".to_string(), "tecnologia".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(top.len(), 4);
    }

    #[tokio::test]
    async fn reactions_on_delivered_messages_become_votes() {
        let (_dir, app) = app().await;
        app.open_menu(1, "ana").await.unwrap();
        let (_, ids) = app.fetch_and_save("games").await.unwrap();

        tokio_test::assert_ok!(app.record_delivery(ids[2], 777).await);
        // unknown article: logged, not an error
        tokio_test::assert_ok!(app.record_delivery(9999, 778).await);

        assert_eq!(
            app.vote_on_message(777, 1, VoteKind::Star).await.unwrap(),
            Some(ids[2])
        );
        assert_eq!(app.vote_on_message(778, 1, VoteKind::Star).await.unwrap(), None);

        let top = app.top_articles(&["games".to_string()], 1).await.unwrap();
        assert_eq!(top[0].article.id, ids[2]);
        assert_eq!(top[0].vote_count, 1);
    }
}

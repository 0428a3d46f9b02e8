pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- users table
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    username TEXT NOT NULL
);

-- subscriptions table
CREATE TABLE IF NOT EXISTS subscriptions (
    user_id INTEGER,
    topic TEXT NOT NULL,
    PRIMARY KEY (user_id, topic),
    FOREIGN KEY (user_id) REFERENCES users(user_id)
);

-- news table (one row per unique url)
CREATE TABLE IF NOT EXISTS news (
    news_id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    topic TEXT NOT NULL,
    published_at TEXT,
    message_id INTEGER
);

-- votes table ('upvote' or 'star', one per user and article)
CREATE TABLE IF NOT EXISTS votes (
    news_id INTEGER,
    user_id INTEGER,
    vote_type TEXT NOT NULL,
    PRIMARY KEY (news_id, user_id),
    FOREIGN KEY (news_id) REFERENCES news(news_id),
    FOREIGN KEY (user_id) REFERENCES users(user_id)
);
"#;

/// Created after legacy duplicate urls have been merged.
pub const INDEXES: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_news_url ON news(url);
CREATE INDEX IF NOT EXISTS idx_news_topic ON news(topic);
CREATE INDEX IF NOT EXISTS idx_news_message_id ON news(message_id);
CREATE INDEX IF NOT EXISTS idx_votes_news_id ON votes(news_id);
"#;

/// Older databases could hold several rows per url. Keeps the lowest
/// `news_id` of each url, moving votes and the delivery message onto it.
/// A user who voted on two copies keeps the vote on the kept row.
pub const MERGE_DUPLICATE_URLS: &str = r#"
CREATE TEMP TABLE news_keep AS
    SELECT n.news_id AS news_id, k.keep_id AS keep_id
    FROM news n
    JOIN (SELECT url, MIN(news_id) AS keep_id FROM news GROUP BY url) k ON k.url = n.url
    WHERE n.news_id <> k.keep_id;

UPDATE OR IGNORE votes
    SET news_id = (SELECT keep_id FROM news_keep WHERE news_keep.news_id = votes.news_id)
    WHERE news_id IN (SELECT news_id FROM news_keep);
DELETE FROM votes WHERE news_id IN (SELECT news_id FROM news_keep);

UPDATE news
    SET message_id = (
        SELECT d.message_id FROM news d
        JOIN news_keep nk ON nk.news_id = d.news_id
        WHERE nk.keep_id = news.news_id AND d.message_id IS NOT NULL
        ORDER BY d.news_id DESC LIMIT 1
    )
    WHERE message_id IS NULL
      AND news_id IN (SELECT keep_id FROM news_keep);

DELETE FROM news WHERE news_id IN (SELECT news_id FROM news_keep);
DROP TABLE news_keep;
"#;

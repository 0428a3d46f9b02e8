use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database connection error: {0}")]
    DatabaseCall(#[from] tokio_rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("News API error: {0}")]
    NewsApi(String),

    #[error("Feed parse error: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("OPML error: {0}")]
    Opml(#[from] opml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Persistence failures the caller should not retry blindly.
    pub fn is_storage(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::DatabaseCall(_))
    }

    /// Fetch-side failures; these degrade to "no articles" rather than an error.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::Http(_) | AppError::NewsApi(_) | AppError::FeedParse(_) | AppError::Json(_)
        )
    }

    /// Text safe to show to a chat user. Details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            e if e.is_transport() => "No articles found for your topics.".to_string(),
            AppError::ConstraintViolation(msg) => format!("Already done: {}", msg),
            AppError::UnknownTopic(topic) => format!("Unknown topic '{}'.", topic),
            AppError::NotFound(what) => format!("Could not find {}.", what),
            AppError::InvalidInput(what) => format!("Invalid {}.", what),
            _ => "Something went wrong, please try again later.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

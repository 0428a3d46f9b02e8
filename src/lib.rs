//! News aggregation, persistence and ranking for a topic-subscription chat bot.
//!
//! The chat layer drives everything through [`app::App`] and delivers digests
//! by implementing [`digest::DigestSink`].

pub mod app;
pub mod config;
pub mod db;
pub mod digest;
pub mod error;
pub mod feed;
pub mod models;
pub mod ranking;

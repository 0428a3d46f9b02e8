use std::path::PathBuf;

use news_digest::app::App;
use news_digest::config::Config;
use news_digest::digest::StdoutSink;
use news_digest::error::{AppError, Result};
use news_digest::feed::parse_opml_file;
use news_digest::models::{SubscriptionChange, VoteKind};

#[derive(Debug, PartialEq)]
enum Command {
    /// Run the daily digest until interrupted.
    Serve,
    Digest,
    Fetch(String),
    Top(Vec<String>),
    Subscribe { user_id: i64, name: String, topic: String },
    Vote { article_id: i64, user_id: i64, kind: VoteKind },
    ImportFeeds(PathBuf),
}

const USAGE: &str = "usage: news-digest [--digest | --fetch <topic> | --top [topic...] | \
--subscribe <user_id> <name> <topic> | --vote <article_id> <user_id> <upvote|star> | \
--import-feeds <file.opml>]";

fn parse_id(value: &str, what: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {} '{}': {}", what, value, e).into())
}

fn parse_args(args: &[String]) -> Result<Command> {
    let rest = args.get(1..).unwrap_or_default();
    let usage = || AppError::Config(USAGE.to_string());

    match rest {
        [] => Ok(Command::Serve),
        [flag] if flag == "--digest" => Ok(Command::Digest),
        [flag, topic] if flag == "--fetch" => Ok(Command::Fetch(topic.clone())),
        [flag, topics @ ..] if flag == "--top" => Ok(Command::Top(topics.to_vec())),
        [flag, user_id, name, topic] if flag == "--subscribe" => Ok(Command::Subscribe {
            user_id: parse_id(user_id, "user id")?,
            name: name.clone(),
            topic: topic.clone(),
        }),
        [flag, article_id, user_id, kind] if flag == "--vote" => Ok(Command::Vote {
            article_id: parse_id(article_id, "article id")?,
            user_id: parse_id(user_id, "user id")?,
            kind: kind.parse()?,
        }),
        [flag, path] if flag == "--import-feeds" => Ok(Command::ImportFeeds(PathBuf::from(path))),
        _ => Err(usage()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging (info by default, RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            return Err(e);
        }
    };

    let mut config = Config::load()?;

    // Importing only touches the configuration
    if let Command::ImportFeeds(path) = &command {
        let feeds = parse_opml_file(path)?;
        let count = feeds.len();
        config.feeds.extend(feeds);
        config.save()?;
        println!("Imported {} topic feeds from {:?}", count, path);
        return Ok(());
    }

    let app = App::new(&config).await?;

    if let Err(e) = run(command, &app).await {
        if e.is_storage() {
            tracing::error!("Storage failure: {}", e);
        } else {
            tracing::error!("{}", e);
        }
        eprintln!("{}", e.user_message());
        return Err(e);
    }
    Ok(())
}

async fn run(command: Command, app: &App) -> Result<()> {
    match command {
        Command::Serve => {
            tracing::info!("Serving digests for topics {:?}", app.topics());
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                }
            };
            app.digest().run(&StdoutSink, shutdown).await;
        }

        Command::Digest => {
            let report = app.digest().run_once(&StdoutSink).await?;
            println!(
                "Digest: {} sent, {} skipped, {} failed",
                report.sent, report.skipped, report.failed
            );
        }

        Command::Fetch(topic) => {
            let (articles, ids) = app.fetch_and_save(&topic).await?;
            if articles.is_empty() {
                println!("No articles found for {}", topic);
            }
            for article in &articles {
                println!("- {} ({})", article.title, article.url);
            }
            println!("Saved {} new articles", ids.len());
        }

        Command::Top(topics) => {
            let topics = if topics.is_empty() {
                app.topics().to_vec()
            } else {
                topics
            };
            for entry in app.top_articles(&topics, 10).await? {
                println!(
                    "#{} [{}] {} ({}) {} votes",
                    entry.article.id,
                    entry.article.topic,
                    entry.article.title,
                    entry.article.url,
                    entry.vote_count
                );
            }
        }

        Command::Subscribe { user_id, name, topic } => {
            app.open_menu(user_id, &name).await?;
            match app.toggle_subscription(user_id, &topic).await? {
                SubscriptionChange::Subscribed => println!("{} subscribed to {}", name, topic),
                SubscriptionChange::Unsubscribed => println!("{} unsubscribed from {}", name, topic),
            }
        }

        Command::Vote { article_id, user_id, kind } => {
            app.vote(article_id, user_id, kind).await?;
            println!("Recorded {} on article {}", kind, article_id);
        }

        Command::ImportFeeds(_) => {}
    }

    Ok(())
}

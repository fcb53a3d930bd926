use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use headlines::api::NewsApi;
use headlines::config::Config;
use headlines::feeds::{BookmarksFeed, SearchFeed};
use headlines::repository::{NewsRepository, RepositorySettings};
use headlines::resource::Resource;
use headlines::storage::{Article, Database, DatabaseError};
use headlines::sync::MediatorResult;

/// Get the config directory path (~/.config/headlines/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("headlines");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(
    name = "headlines",
    about = "Offline-first news reader: breaking news, search and bookmarks"
)]
struct Args {
    /// Database file (defaults to the config directory)
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long, global = true)]
    reset_db: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show breaking news, refreshing when the cache is stale
    Breaking {
        /// Refresh even if the cache is fresh
        #[arg(long)]
        force: bool,
    },
    /// Search articles and show the first page
    Search { query: String },
    /// Load the next page of the last search
    More,
    /// List bookmarked articles
    Bookmarks,
    /// Toggle the bookmark of a stored article
    Bookmark { url: String },
    /// Remove every bookmark
    ClearBookmarks,
    /// Delete non-bookmarked articles older than the retention window
    Cleanup {
        /// Override the retention window in days
        #[arg(long)]
        days: Option<u64>,
    },
}

fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    // User-only access on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }
    Ok(())
}

/// Remove the database and its WAL side files.
fn reset_database(db_path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        let path = PathBuf::from(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete '{}'", path.display()))?;
        }
    }
    Ok(())
}

async fn open_database(db_path: &Path) -> Result<Database> {
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(db_path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of headlines appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

fn print_articles(articles: &[Article]) {
    if articles.is_empty() {
        println!("(no articles)");
        return;
    }
    for (i, article) in articles.iter().enumerate() {
        let marker = if article.is_bookmarked { "*" } else { " " };
        let title = article.title.as_deref().unwrap_or("(untitled)");
        println!("{:>4} {} {}", i + 1, marker, title);
        println!("        {}", article.url);
    }
}

fn report_page(result: &MediatorResult) {
    match result {
        MediatorResult::Success {
            end_of_pagination_reached: true,
        } => println!("End of results."),
        MediatorResult::Success { .. } => {}
        MediatorResult::Error(e) => eprintln!("Failed to load results: {}", e),
    }
}

async fn show_breaking(repo: &NewsRepository, force: bool) -> Result<()> {
    repo.cleanup_expired()
        .await
        .context("Failed to clean up expired articles")?;

    let mut updates = repo.breaking_news(force, None);
    while let Some(update) = updates.next().await {
        match update.context("Breaking news sync failed")? {
            Resource::Loading(_) => continue,
            Resource::Success(articles) => {
                print_articles(&articles);
                return Ok(());
            }
            Resource::Error { error, data } => {
                eprintln!("Couldn't refresh breaking news: {}", error);
                print_articles(&data);
                return Ok(());
            }
        }
    }
    Ok(())
}

async fn show_search(repo: &NewsRepository, query: &str) -> Result<()> {
    let feed = SearchFeed::new(repo.clone());
    match feed.submit_query(query).await.context("Search failed")? {
        Some(result) => report_page(&result),
        None => anyhow::bail!("Search query is empty"),
    }
    let articles = repo
        .db()
        .search_articles(query.trim())
        .await
        .context("Failed to read search results")?;
    print_articles(&articles);
    Ok(())
}

async fn show_more(repo: &NewsRepository) -> Result<()> {
    let feed = SearchFeed::restore(repo.clone())
        .await
        .context("Failed to restore last search")?;
    let Some(query) = feed.current_query() else {
        anyhow::bail!("No previous search. Run `headlines search <query>` first.");
    };
    if let Some(result) = feed.load_more().await.context("Loading more failed")? {
        report_page(&result);
    }
    let articles = repo
        .db()
        .search_articles(&query)
        .await
        .context("Failed to read search results")?;
    println!("Results for \"{}\":", query);
    print_articles(&articles);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    ensure_config_dir(&config_dir)?;

    let config = Config::load(&config_dir.join("config.toml")).context("Failed to load config")?;
    if config.api_key().is_none() {
        tracing::warn!("No API key configured, requests will likely be rejected");
    }

    let db_path = args
        .db
        .clone()
        .or_else(|| config.database_path.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| config_dir.join("headlines.db"));

    if args.reset_db {
        reset_database(&db_path)?;
        println!("Database reset.");
    }

    let db = open_database(&db_path).await?;

    let http_client = reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;
    let api = NewsApi::from_config(http_client, &config).context("Invalid API configuration")?;
    let repo = NewsRepository::new(db.clone(), api, RepositorySettings::from_config(&config));

    match args.command {
        Command::Breaking { force } => show_breaking(&repo, force).await?,
        Command::Search { query } => show_search(&repo, &query).await?,
        Command::More => show_more(&repo).await?,
        Command::Bookmarks => {
            let feed = BookmarksFeed::new(repo.clone());
            let mut bookmarks = feed.bookmarks();
            if let Some(articles) = bookmarks.next().await {
                print_articles(&articles.context("Failed to read bookmarks")?);
            }
        }
        Command::Bookmark { url } => {
            let article = repo
                .article(&url)
                .await
                .context("Failed to look up article")?
                .ok_or_else(|| anyhow::anyhow!("No stored article with URL {}", url))?;
            match repo.toggle_bookmark(&article).await? {
                Some(true) => println!("Bookmarked {}", url),
                Some(false) => println!("Removed bookmark from {}", url),
                None => println!("Article {} is no longer stored", url),
            }
        }
        Command::ClearBookmarks => {
            let cleared = BookmarksFeed::new(repo.clone())
                .clear_all()
                .await
                .context("Failed to clear bookmarks")?;
            println!("Cleared {} bookmarks.", cleared);
        }
        Command::Cleanup { days } => {
            let deleted = match days {
                Some(days) => {
                    let window = (days as i64).saturating_mul(24 * 60 * 60 * 1000);
                    let cutoff = chrono::Utc::now().timestamp_millis().saturating_sub(window);
                    repo.delete_non_bookmarked_articles_older_than(cutoff).await?
                }
                None => repo.cleanup_expired().await?,
            };
            println!("Deleted {} articles.", deleted);
        }
    }

    db.close().await;
    Ok(())
}

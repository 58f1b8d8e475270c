//! TrendSpotter - cached social activity analytics
//!
//! Main entry point for the TrendSpotter CLI.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use trendspotter::aggregator::{Aggregator, TopUser};
use trendspotter::config::{validate_config_result, TrendSpotterConfig};
use trendspotter::scheduler::{Scheduler, SchedulerConfig, SchedulerEvent};
use trendspotter::{Post, TrendSpotterError};

/// TrendSpotter - top commenters and trending posts from the evaluation service
#[derive(Parser, Debug)]
#[command(name = "trendspotter")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/trendspotter/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the evaluation service base URL
    #[arg(long, env = "TRENDSPOTTER_BASE_URL")]
    base_url: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// List users
    Users,

    /// List posts for a user
    Posts {
        /// User ID
        user_id: String,
    },

    /// List comments for a post
    Comments {
        /// Post ID
        post_id: u64,
    },

    /// Show the users whose posts draw the most comments
    TopUsers,

    /// Show the posts with the most comments
    Trending,

    /// Show the newest posts across users
    Feed {
        /// Maximum posts to print
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Keep all views refreshed and print updates until interrupted
    Watch,

    /// Print Prometheus metrics after an initial load
    Metrics,
}

#[tokio::main]
async fn main() {
    if let Err(e) = trendspotter::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> trendspotter::Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(TrendSpotterConfig::default_path);

    if let Commands::Init { force } = cli.command {
        return init_config(&config_path, force);
    }

    let mut config = TrendSpotterConfig::load_or_default(&config_path)?;
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    validate_config_result(&config)?;

    let aggregator = Arc::new(Aggregator::from_config(&config)?);
    let json = cli.json;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Users => {
            let users = aggregator.users().await.ok_or_else(|| unavailable("users"))?;
            if json {
                print_json(&users.iter().collect::<Vec<_>>())?;
            } else {
                for user in users.iter() {
                    println!("{:>6}  {}", user.id, user.name);
                }
            }
        }

        Commands::Posts { user_id } => {
            let posts = aggregator
                .user_posts(&user_id)
                .await
                .ok_or_else(|| unavailable(&format!("posts for user {}", user_id)))?;
            print_posts(&posts, json)?;
        }

        Commands::Comments { post_id } => {
            let comments = aggregator
                .post_comments(post_id)
                .await
                .ok_or_else(|| unavailable(&format!("comments for post {}", post_id)))?;
            if json {
                print_json(comments.as_slice())?;
            } else {
                println!("{} comment(s) on post {}", comments.len(), post_id);
                for comment in comments.iter() {
                    println!("  #{}  {}", comment.id, comment.content);
                }
            }
        }

        Commands::TopUsers => {
            initialize(&aggregator).await?;
            let top = aggregator.refresh_top_users().await?;
            print_top_users(&top, json)?;
        }

        Commands::Trending => {
            initialize(&aggregator).await?;
            let trending = aggregator.refresh_trending_posts();
            if !json {
                match trending.first().and_then(|p| p.comment_count) {
                    Some(count) => println!("Posts with the most comments ({} comments)", count),
                    None => println!("No trending posts yet"),
                }
            }
            print_posts(&trending, json)?;
        }

        Commands::Feed { limit } => {
            initialize(&aggregator).await?;
            let posts = aggregator.unified_posts();
            let shown: Vec<Post> = posts.iter().take(limit).cloned().collect();
            print_posts(&shown, json)?;
        }

        Commands::Watch => {
            initialize(&aggregator).await?;
            print_top_users(&aggregator.top_users(), json)?;

            let mut scheduler =
                Scheduler::new(Arc::clone(&aggregator), SchedulerConfig::from_refresh(&config.refresh));
            let mut events = scheduler.subscribe();
            let printer = tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    print_event(&event);
                    if event == SchedulerEvent::Stopped {
                        break;
                    }
                }
            });

            scheduler.run().await?;
            if let Err(e) = printer.await {
                tracing::warn!(error = %e, "Event printer ended abnormally");
            }
        }

        Commands::Metrics => {
            initialize(&aggregator).await?;
            print!("{}", trendspotter::metrics::gather_metrics());
        }
    }

    Ok(())
}

fn init_config(path: &PathBuf, force: bool) -> trendspotter::Result<()> {
    if path.exists() && !force {
        return Err(TrendSpotterError::Config(format!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        )));
    }
    TrendSpotterConfig::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Initial load; partial data is still shown when it fails
async fn initialize(aggregator: &Aggregator) -> trendspotter::Result<()> {
    match aggregator.initialize().await {
        Ok(summary) => {
            tracing::info!(?summary, "Initial load complete");
            Ok(())
        }
        Err(e) if e.is_unavailable() => {
            eprintln!("Failed to fetch data. Please try again. ({})", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn unavailable(what: &str) -> TrendSpotterError {
    TrendSpotterError::Unavailable(what.to_string())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> trendspotter::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_posts(posts: &[Post], json: bool) -> trendspotter::Result<()> {
    if json {
        return print_json(posts);
    }
    if posts.is_empty() {
        println!("No posts to show");
        return Ok(());
    }
    for post in posts {
        let comments = post
            .comment_count
            .map(|c| format!("  [{} comments]", c))
            .unwrap_or_default();
        println!(
            "#{:<6} user {:<6} {}  {}{}",
            post.id,
            post.user_id,
            post.timestamp.format("%Y-%m-%d %H:%M"),
            post.content,
            comments
        );
    }
    Ok(())
}

fn print_top_users(top: &[TopUser], json: bool) -> trendspotter::Result<()> {
    if json {
        return print_json(top);
    }
    if top.is_empty() {
        println!("No user activity yet");
        return Ok(());
    }
    for (rank, user) in top.iter().enumerate() {
        println!(
            "{}. {} (id {}) - {} comments",
            rank + 1,
            user.user_name,
            user.user_id,
            user.comment_count
        );
    }
    Ok(())
}

fn print_event(event: &SchedulerEvent) {
    match event {
        SchedulerEvent::Started => println!("Watching for updates (Ctrl-C to stop)"),
        SchedulerEvent::Stopped => println!("Stopped"),
        SchedulerEvent::TopUsersRefreshed { count } => println!("Top users refreshed: {}", count),
        SchedulerEvent::TrendingRefreshed { count } => {
            println!("Trending posts refreshed: {}", count)
        }
        SchedulerEvent::FeedRefreshed { users, posts } => {
            println!("Feed refreshed from {} user(s): {} posts", users, posts)
        }
        SchedulerEvent::ViewStopped(view) => println!("View stopped: {}", view),
        SchedulerEvent::Error { view, message } => eprintln!("{} refresh failed: {}", view, message),
    }
}

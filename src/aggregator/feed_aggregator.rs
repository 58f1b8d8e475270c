//! Feed aggregator implementation

use crate::cache::CacheStore;
use crate::config::{AggregationConfig, TrendSpotterConfig};
use crate::metrics;
use crate::source::RemoteSource;
use crate::{Result, TrendSpotterError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use social_api::{compare_user_ids, Comment, Post, UserDirectory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// One row of the top users list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopUser {
    pub user_id: String,
    pub user_name: String,
    pub comment_count: usize,
}

/// What `initialize` managed to load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitSummary {
    /// Users whose posts were requested
    pub users: usize,
    /// Users whose posts were actually loaded
    pub users_loaded: usize,
    /// Posts in the unified list afterwards
    pub posts: usize,
    /// Posts whose comments were loaded
    pub comments_loaded: usize,
    pub top_users: usize,
    pub trending: usize,
}

/// Result of a feed refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRefresh {
    /// Users sampled for this refresh
    pub sampled: Vec<String>,
    /// Sampled users whose posts were loaded
    pub users_loaded: usize,
    /// Posts in the unified list afterwards
    pub posts: usize,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Cache-backed aggregation context
///
/// Owns the [`CacheStore`] and every derived view: the unified post list, the
/// per-post comment count index, the top users list and the trending posts.
/// Views are published as whole `Arc` snapshots, so readers never see a list
/// that is half rebuilt. Construct one and share it (`Arc<Aggregator>`) with
/// every consumer.
pub struct Aggregator {
    store: CacheStore,
    config: AggregationConfig,
    unified_posts: RwLock<Arc<Vec<Post>>>,
    comment_counts: RwLock<HashMap<u64, usize>>,
    top_users: RwLock<Arc<Vec<TopUser>>>,
    trending: RwLock<Arc<Vec<Post>>>,
    sampler: Mutex<StdRng>,
}

impl Aggregator {
    /// Create an aggregator over any remote source
    pub fn new(source: Arc<dyn RemoteSource>, config: &TrendSpotterConfig) -> Self {
        Self {
            store: CacheStore::new(source, &config.cache),
            config: config.aggregation.clone(),
            unified_posts: RwLock::new(Arc::new(Vec::new())),
            comment_counts: RwLock::new(HashMap::new()),
            top_users: RwLock::new(Arc::new(Vec::new())),
            trending: RwLock::new(Arc::new(Vec::new())),
            sampler: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Create an aggregator talking to the configured evaluation service
    pub fn from_config(config: &TrendSpotterConfig) -> Result<Self> {
        let client = config.api_client()?;
        Ok(Self::new(Arc::new(client), config))
    }

    /// Make feed sampling reproducible
    pub fn with_sample_seed(self, seed: u64) -> Self {
        *self.sampler.lock().unwrap_or_else(PoisonError::into_inner) = StdRng::seed_from_u64(seed);
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    // --- Presentation surface -------------------------------------------

    /// Cached user directory
    pub async fn users(&self) -> Option<Arc<UserDirectory>> {
        self.store.users().await
    }

    /// Cached posts for a user; folds them into the unified post list
    pub async fn user_posts(&self, user_id: &str) -> Option<Arc<Vec<Post>>> {
        match self.store.user_posts(user_id).await {
            Some(posts) => {
                self.replace_user_posts(user_id, &posts);
                Some(posts)
            }
            None => {
                tracing::debug!(user_id, "Posts unavailable, keeping previous posts");
                None
            }
        }
    }

    /// Cached comments for a post; records the count in the index
    pub async fn post_comments(&self, post_id: u64) -> Option<Arc<Vec<Comment>>> {
        let comments = self.store.post_comments(post_id).await?;
        write(&self.comment_counts).insert(post_id, comments.len());
        self.recompute_trending_posts();
        Some(comments)
    }

    /// Snapshot of the unified post list (newest first)
    pub fn unified_posts(&self) -> Arc<Vec<Post>> {
        Arc::clone(&read(&self.unified_posts))
    }

    /// Snapshot of the top users list
    pub fn top_users(&self) -> Arc<Vec<TopUser>> {
        Arc::clone(&read(&self.top_users))
    }

    /// Snapshot of the trending posts list
    pub fn trending_posts(&self) -> Arc<Vec<Post>> {
        Arc::clone(&read(&self.trending))
    }

    /// Copy of the comment count index
    pub fn comment_counts(&self) -> HashMap<u64, usize> {
        read(&self.comment_counts).clone()
    }

    pub fn comment_count(&self, post_id: u64) -> Option<usize> {
        read(&self.comment_counts).get(&post_id).copied()
    }

    /// Recompute the top users list, timing the pass
    pub async fn refresh_top_users(&self) -> Result<Arc<Vec<TopUser>>> {
        let started = Instant::now();
        let result = self.recompute_top_users().await;
        metrics::record_refresh_duration("top_users", started.elapsed().as_secs_f64());
        result
    }

    /// Recompute the trending posts list, timing the pass
    pub fn refresh_trending_posts(&self) -> Arc<Vec<Post>> {
        let started = Instant::now();
        let trending = self.recompute_trending_posts();
        metrics::record_refresh_duration("trending", started.elapsed().as_secs_f64());
        trending
    }

    // --- Aggregation passes ---------------------------------------------

    /// Refresh posts for each user and merge them into the unified list
    ///
    /// Returns how many users' posts were available. Unavailable users keep
    /// whatever posts they already had in the list.
    pub async fn refresh_unified_posts<S: AsRef<str>>(&self, user_ids: &[S]) -> usize {
        let mut loaded = 0;
        for user_id in user_ids {
            if self.user_posts(user_id.as_ref()).await.is_some() {
                loaded += 1;
            }
        }
        loaded
    }

    /// Fill in comment counts for posts missing from the index
    ///
    /// Unavailable comments leave the count absent (read as 0). Returns the
    /// number of counts recorded.
    pub async fn backfill_comment_counts(&self, posts: &[Post]) -> usize {
        let mut filled = 0;
        for post in posts {
            if self.comment_count(post.id).is_some() {
                continue;
            }
            match self.post_comments(post.id).await {
                Some(_) => filled += 1,
                None => tracing::debug!(post_id = post.id, "Comments unavailable, count left empty"),
            }
        }
        filled
    }

    /// Rank users by total comments across their posts in the unified list
    ///
    /// Backfills missing comment counts first. Ties are broken by natural
    /// user id order. Fails with [`TrendSpotterError::Unavailable`] when the
    /// user directory cannot be loaded; the previous list is kept.
    pub async fn recompute_top_users(&self) -> Result<Arc<Vec<TopUser>>> {
        let users = self
            .store
            .users()
            .await
            .ok_or_else(|| TrendSpotterError::Unavailable("user directory".to_string()))?;

        let snapshot = self.unified_posts();
        self.backfill_comment_counts(&snapshot).await;

        let posts = self.unified_posts();
        let ranked = {
            let counts = read(&self.comment_counts);
            rank_users(&posts, &counts, &users, self.config.top_users_limit)
        };

        let ranked = Arc::new(ranked);
        *write(&self.top_users) = Arc::clone(&ranked);
        metrics::set_derived_items("top_users", ranked.len());
        tracing::debug!(count = ranked.len(), "Top users recomputed");
        Ok(ranked)
    }

    /// Posts sharing the highest positive comment count, newest first
    ///
    /// Uses only the current comment count index; never fetches.
    pub fn recompute_trending_posts(&self) -> Arc<Vec<Post>> {
        let posts = self.unified_posts();
        let trending = {
            let counts = read(&self.comment_counts);
            select_trending(&posts, &counts)
        };

        let trending = Arc::new(trending);
        *write(&self.trending) = Arc::clone(&trending);
        metrics::set_derived_items("trending", trending.len());
        trending
    }

    /// Initial population: users, their posts, early comments, then both rankings
    ///
    /// Loads posts for the first `initial_users` users (natural id order) and
    /// comments for the first `initial_posts` posts of the unified list.
    pub async fn initialize(&self) -> Result<InitSummary> {
        tracing::info!("Initializing feed data");

        let users = self
            .store
            .users()
            .await
            .ok_or_else(|| TrendSpotterError::Unavailable("user directory".to_string()))?;

        let user_ids: Vec<String> = users
            .ids()
            .take(self.config.initial_users)
            .map(str::to_string)
            .collect();
        let users_loaded = self.refresh_unified_posts(&user_ids).await;

        let initial: Vec<u64> = self
            .unified_posts()
            .iter()
            .take(self.config.initial_posts)
            .map(|p| p.id)
            .collect();
        let mut comments_loaded = 0;
        for post_id in initial {
            if self.post_comments(post_id).await.is_some() {
                comments_loaded += 1;
            }
        }

        let top_users = self.recompute_top_users().await?;
        let trending = self.recompute_trending_posts();

        let summary = InitSummary {
            users: user_ids.len(),
            users_loaded,
            posts: self.unified_posts().len(),
            comments_loaded,
            top_users: top_users.len(),
            trending: trending.len(),
        };
        tracing::info!(
            users = summary.users_loaded,
            posts = summary.posts,
            comments = summary.comments_loaded,
            "Feed data initialized"
        );
        Ok(summary)
    }

    /// Refresh posts for a random sample of users
    pub async fn refresh_random_feed(&self, sample_size: usize) -> Result<FeedRefresh> {
        let started = Instant::now();
        let users = self
            .store
            .users()
            .await
            .ok_or_else(|| TrendSpotterError::Unavailable("user directory".to_string()))?;

        let mut sampled: Vec<String> = users.ids().map(str::to_string).collect();
        {
            let mut rng = self.sampler.lock().unwrap_or_else(PoisonError::into_inner);
            sampled.shuffle(&mut *rng);
        }
        sampled.truncate(sample_size);

        let users_loaded = self.refresh_unified_posts(&sampled).await;
        let posts = self.unified_posts().len();
        metrics::record_refresh_duration("feed", started.elapsed().as_secs_f64());

        Ok(FeedRefresh {
            sampled,
            users_loaded,
            posts,
        })
    }

    /// Replace all posts owned by `user_id` with `posts` and re-sort
    fn replace_user_posts(&self, user_id: &str, posts: &[Post]) {
        let mut unified = write(&self.unified_posts);
        let mut next: Vec<Post> = unified
            .iter()
            .filter(|p| p.user_id != user_id)
            .cloned()
            .collect();
        next.extend(posts.iter().cloned());
        sort_by_recency(&mut next);

        metrics::set_derived_items("unified_posts", next.len());
        *unified = Arc::new(next);
    }
}

fn sort_by_recency(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Sum comment counts per post owner, highest first, truncated to `limit`
fn rank_users(
    posts: &[Post],
    counts: &HashMap<u64, usize>,
    users: &UserDirectory,
    limit: usize,
) -> Vec<TopUser> {
    let mut totals: HashMap<&str, usize> = HashMap::new();
    for post in posts {
        *totals.entry(post.user_id.as_str()).or_default() +=
            counts.get(&post.id).copied().unwrap_or(0);
    }

    let mut ranked: Vec<TopUser> = totals
        .into_iter()
        .map(|(user_id, comment_count)| TopUser {
            user_id: user_id.to_string(),
            user_name: users
                .name_of(user_id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("User {}", user_id)),
            comment_count,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.comment_count
            .cmp(&a.comment_count)
            .then_with(|| compare_user_ids(&a.user_id, &b.user_id))
    });
    ranked.truncate(limit);
    ranked
}

/// Posts whose count equals the maximum, provided the maximum is positive
fn select_trending(posts: &[Post], counts: &HashMap<u64, usize>) -> Vec<Post> {
    let count_of = |post: &Post| counts.get(&post.id).copied().unwrap_or(0);

    let max = posts.iter().map(count_of).max().unwrap_or(0);
    if max == 0 {
        return Vec::new();
    }

    let mut trending: Vec<Post> = posts
        .iter()
        .filter(|p| count_of(p) == max)
        .map(|p| Post {
            comment_count: Some(max),
            ..p.clone()
        })
        .collect();
    sort_by_recency(&mut trending);
    trending
}

//! The three cache partitions over a remote source

use super::ExpiringCache;
use crate::config::CacheTtlConfig;
use crate::source::RemoteSource;
use social_api::{Comment, Post, UserDirectory};
use std::sync::Arc;

/// Users, posts and comments caches sharing one remote source
pub struct CacheStore {
    source: Arc<dyn RemoteSource>,
    users: ExpiringCache<(), UserDirectory>,
    posts: ExpiringCache<String, Vec<Post>>,
    comments: ExpiringCache<u64, Vec<Comment>>,
}

impl CacheStore {
    pub fn new(source: Arc<dyn RemoteSource>, ttls: &CacheTtlConfig) -> Self {
        Self {
            source,
            users: ExpiringCache::new("users", ttls.users_ttl()),
            posts: ExpiringCache::new("posts", ttls.posts_ttl()),
            comments: ExpiringCache::new("comments", ttls.comments_ttl()),
        }
    }

    /// User directory, or `None` if unavailable
    pub async fn users(&self) -> Option<Arc<UserDirectory>> {
        let source = Arc::clone(&self.source);
        self.users
            .get((), move || async move { source.fetch_users().await })
            .await
    }

    /// Posts for one user, or `None` if unavailable
    pub async fn user_posts(&self, user_id: &str) -> Option<Arc<Vec<Post>>> {
        let source = Arc::clone(&self.source);
        let owned_id = user_id.to_string();
        self.posts
            .get(user_id.to_string(), move || async move {
                source.fetch_posts(&owned_id).await
            })
            .await
    }

    /// Comments for one post, or `None` if unavailable
    pub async fn post_comments(&self, post_id: u64) -> Option<Arc<Vec<Comment>>> {
        let source = Arc::clone(&self.source);
        self.comments
            .get(post_id, move || async move { source.fetch_comments(post_id).await })
            .await
    }

    pub fn users_cache(&self) -> &ExpiringCache<(), UserDirectory> {
        &self.users
    }

    pub fn posts_cache(&self) -> &ExpiringCache<String, Vec<Post>> {
        &self.posts
    }

    pub fn comments_cache(&self) -> &ExpiringCache<u64, Vec<Comment>> {
        &self.comments
    }

    /// Drop every cached entry in all partitions
    pub fn clear(&self) {
        self.users.clear();
        self.posts.clear();
        self.comments.clear();
        tracing::info!("Cleared all cache partitions");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::{post, FakeSource};
    use std::time::Duration;

    fn store_with(source: Arc<FakeSource>) -> CacheStore {
        CacheStore::new(source, &CacheTtlConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_partition_ttls() {
        let source = Arc::new(
            FakeSource::new()
                .with_users(&[("1", "Alice")])
                .with_posts("1", vec![post(10, "1", 0)])
                .with_comments(10, 2),
        );
        let store = store_with(Arc::clone(&source));

        store.users().await.unwrap();
        store.user_posts("1").await.unwrap();
        store.post_comments(10).await.unwrap();

        // 45s: posts stale (30s), comments (60s) and users (300s) still fresh
        tokio::time::advance(Duration::from_secs(45)).await;
        store.users().await.unwrap();
        store.user_posts("1").await.unwrap();
        store.post_comments(10).await.unwrap();

        assert_eq!(source.user_calls(), 1);
        assert_eq!(source.post_calls("1"), 2);
        assert_eq!(source.comment_calls(10), 1);

        // 105s: comments stale too
        tokio::time::advance(Duration::from_secs(60)).await;
        store.post_comments(10).await.unwrap();
        assert_eq!(source.comment_calls(10), 2);

        // 301s: users stale
        tokio::time::advance(Duration::from_secs(200)).await;
        store.users().await.unwrap();
        assert_eq!(source.user_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let source = Arc::new(
            FakeSource::new()
                .with_posts("1", vec![post(10, "1", 0)])
                .with_posts("2", vec![post(20, "2", 0), post(21, "2", 5)]),
        );
        let store = store_with(Arc::clone(&source));

        assert_eq!(store.user_posts("1").await.unwrap().len(), 1);
        assert_eq!(store.user_posts("2").await.unwrap().len(), 2);
        assert_eq!(store.posts_cache().len(), 2);
        assert!(store.user_posts("3").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_forces_refetch() {
        let source = Arc::new(FakeSource::new().with_users(&[("1", "Alice")]));
        let store = store_with(Arc::clone(&source));

        store.users().await.unwrap();
        store.clear();
        store.users().await.unwrap();
        assert_eq!(source.user_calls(), 2);
    }
}

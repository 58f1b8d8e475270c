//! Remote data source seam
//!
//! The cache layer talks to the network only through [`RemoteSource`], so the
//! evaluation service client can be swapped for an in-memory source in tests.

use crate::Result;
use async_trait::async_trait;
use social_api::{ApiClient, Comment, Post, UserDirectory};

/// The three read operations of the evaluation service
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// List all users
    async fn fetch_users(&self) -> Result<UserDirectory>;

    /// List posts for one user
    async fn fetch_posts(&self, user_id: &str) -> Result<Vec<Post>>;

    /// List comments for one post
    async fn fetch_comments(&self, post_id: u64) -> Result<Vec<Comment>>;
}

#[async_trait]
impl RemoteSource for ApiClient {
    async fn fetch_users(&self) -> Result<UserDirectory> {
        Ok(ApiClient::fetch_users(self).await?)
    }

    async fn fetch_posts(&self, user_id: &str) -> Result<Vec<Post>> {
        Ok(ApiClient::fetch_posts(self, user_id).await?)
    }

    async fn fetch_comments(&self, post_id: u64) -> Result<Vec<Comment>> {
        Ok(ApiClient::fetch_comments(self, post_id).await?)
    }
}

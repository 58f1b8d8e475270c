//! Social evaluation service client for Rust
//!
//! A type-safe async interface to the read-only social evaluation API:
//!
//! - `GET /users` - user directory (`{ users: { id: name } }`)
//! - `GET /users/{id}/posts` - posts for one user
//! - `GET /posts/{id}/comments` - comments for one post
//!
//! Posts are decorated on the way in: each one gets an image from a fixed
//! palette (chosen by `post_id mod 10`) and a synthetic recency timestamp.
//! The timestamp is NOT provided by the server; see [`RecencyStamper`].
//!
//! # Example
//!
//! ```no_run
//! use social_api::ApiClient;
//!
//! # async fn demo() -> social_api::Result<()> {
//! let client = ApiClient::new("http://localhost:8080/evaluation-service")?;
//!
//! let users = client.fetch_users().await?;
//! for user in users.iter() {
//!     let posts = client.fetch_posts(&user.id).await?;
//!     println!("{}: {} posts", user.name, posts.len());
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Default base URL of the evaluation service
pub const DEFAULT_BASE_URL: &str = "http://20.244.56.144/evaluation-service";

/// Default upper bound for the synthetic recency offset (10,000,000 ms)
pub const DEFAULT_MAX_RECENCY_OFFSET: Duration = Duration::from_millis(10_000_000);

/// Decorative images, indexed by `post_id mod 10`
pub const IMAGE_PALETTE: [&str; 10] = [
    "https://images.unsplash.com/photo-1579546929518-9e396f3cc809",
    "https://images.unsplash.com/photo-1557682250-23c9d28b9219",
    "https://images.unsplash.com/photo-1561736778-92e52a7769ef",
    "https://images.unsplash.com/photo-1512314889357-e157c22f938d",
    "https://images.unsplash.com/photo-1591485423011-123ed3dbf1e4",
    "https://images.unsplash.com/photo-1568992687947-868a62a9f521",
    "https://images.unsplash.com/photo-1527689368864-4dbcb132065c",
    "https://images.unsplash.com/photo-1581235720704-06d3acfcb36f",
    "https://images.unsplash.com/photo-1529156069898-49953e39b3ac",
    "https://images.unsplash.com/photo-1554177255-61502b352de3",
];

/// Errors that can occur when talking to the evaluation service
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },
}

/// Result type for evaluation service operations
pub type Result<T> = std::result::Result<T, Error>;

/// A user as listed by `GET /users`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

/// The user directory, in natural id order
///
/// Numeric ids come first in numeric order, then any non-numeric ids in
/// lexicographic order. This is the stable iteration order used when only
/// the first N users are wanted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserDirectory {
    users: Vec<User>,
}

impl UserDirectory {
    /// Build a directory from an id -> name map
    pub fn from_map<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut users: Vec<User> = entries
            .into_iter()
            .map(|(id, name)| User { id, name })
            .collect();
        users.sort_by(|a, b| compare_user_ids(&a.id, &b.id));
        users.dedup_by(|a, b| a.id == b.id);
        Self { users }
    }

    /// Display name for a user id
    pub fn name_of(&self, user_id: &str) -> Option<&str> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.name.as_str())
    }

    /// User ids in natural order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(|u| u.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.iter()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Natural ordering for user ids: numeric ids ascending, then the rest lexicographically
pub fn compare_user_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// A post, decorated with image and synthetic timestamp at fetch time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub user_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Client-side recency stamp (not a server value)
    pub timestamp: DateTime<Utc>,
    /// Filled in by aggregation, never by the fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<usize>,
}

/// A comment on a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(rename = "postid")]
    pub post_id: u64,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct UsersEnvelope {
    users: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PostsEnvelope {
    posts: Vec<RawPost>,
}

#[derive(Debug, Deserialize)]
struct CommentsEnvelope {
    comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: u64,
    userid: IdValue,
    content: String,
}

/// The service sends `userid` as a number; tolerate strings too
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Number(u64),
    Text(String),
}

impl From<IdValue> for String {
    fn from(value: IdValue) -> Self {
        match value {
            IdValue::Number(n) => n.to_string(),
            IdValue::Text(s) => s,
        }
    }
}

/// Decorative image for a post (`post_id mod 10` over [`IMAGE_PALETTE`])
pub fn image_for_post(post_id: u64) -> &'static str {
    IMAGE_PALETTE[(post_id % IMAGE_PALETTE.len() as u64) as usize]
}

/// How synthetic recency timestamps are derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecencyMode {
    /// Fresh random offset on every fetch, so the same post moves around
    #[default]
    Randomized,

    /// Offset derived from the post id; stable across fetches
    Stable,
}

/// Assigns `now - offset` timestamps to freshly fetched posts
///
/// The evaluation service has no timestamps. In [`RecencyMode::Randomized`]
/// mode the offset is drawn uniformly from `[0, max_offset)` on each call, so
/// repeated fetches of one post are NOT guaranteed to produce the same value.
/// Seeding the stamper makes the sequence reproducible.
#[derive(Debug)]
pub struct RecencyStamper {
    max_offset: Duration,
    mode: RecencyMode,
    rng: Mutex<StdRng>,
}

impl RecencyStamper {
    pub fn new(max_offset: Duration, mode: RecencyMode, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            max_offset,
            mode,
            rng: Mutex::new(rng),
        }
    }

    pub fn mode(&self) -> RecencyMode {
        self.mode
    }

    pub fn max_offset(&self) -> Duration {
        self.max_offset
    }

    /// Timestamp for `post_id` relative to `now`
    pub fn stamp(&self, post_id: u64, now: DateTime<Utc>) -> DateTime<Utc> {
        let max_ms = self.max_offset.as_millis().min(i64::MAX as u128) as u64;
        if max_ms == 0 {
            return now;
        }

        let offset_ms = match self.mode {
            RecencyMode::Randomized => {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                rng.random_range(0..max_ms)
            }
            RecencyMode::Stable => mix64(post_id) % max_ms,
        };

        now - ChronoDuration::milliseconds(offset_ms as i64)
    }
}

impl Default for RecencyStamper {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECENCY_OFFSET, RecencyMode::default(), None)
    }
}

// splitmix64 finalizer
fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Async client for the evaluation service
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    client: reqwest::Client,
    stamper: Arc<RecencyStamper>,
}

/// Builder for [`ApiClient`]
#[derive(Debug)]
pub struct ApiClientBuilder {
    base_url: String,
    timeout: Option<Duration>,
    stamper: Option<RecencyStamper>,
}

impl ApiClientBuilder {
    /// Per-request timeout (none by default)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stamper(mut self, stamper: RecencyStamper) -> Self {
        self.stamper = Some(stamper);
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let base_url = parse_base_url(&self.base_url)?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|source| Error::Transport {
            url: base_url.to_string(),
            source,
        })?;

        Ok(ApiClient {
            base_url,
            client,
            stamper: Arc::new(self.stamper.unwrap_or_default()),
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidBaseUrl(raw.to_string()));
    }
    let url = Url::parse(trimmed).map_err(|e| Error::InvalidBaseUrl(format!("{raw}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(Error::InvalidBaseUrl(raw.to_string()));
    }
    Ok(url)
}

impl ApiClient {
    /// Create a client with default settings
    pub fn new(base_url: &str) -> Result<Self> {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            timeout: None,
            stamper: None,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// List all users
    pub async fn fetch_users(&self) -> Result<UserDirectory> {
        let envelope: UsersEnvelope = self.get_json(&["users"]).await?;
        Ok(UserDirectory::from_map(envelope.users))
    }

    /// List posts for a user, decorated with image and recency stamp
    pub async fn fetch_posts(&self, user_id: &str) -> Result<Vec<Post>> {
        let envelope: PostsEnvelope = self.get_json(&["users", user_id, "posts"]).await?;
        let now = Utc::now();

        let posts = envelope
            .posts
            .into_iter()
            .map(|raw| Post {
                id: raw.id,
                user_id: raw.userid.into(),
                content: raw.content,
                image: Some(image_for_post(raw.id).to_string()),
                timestamp: self.stamper.stamp(raw.id, now),
                comment_count: None,
            })
            .collect();
        Ok(posts)
    }

    /// List comments for a post
    pub async fn fetch_comments(&self, post_id: u64) -> Result<Vec<Comment>> {
        let post_id = post_id.to_string();
        let envelope: CommentsEnvelope = self.get_json(&["posts", &post_id, "comments"]).await?;
        Ok(envelope.comments)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint(segments)?;
        tracing::debug!(url = %url, "GET");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| Error::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await.map_err(|source| Error::Transport {
            url: url.to_string(),
            source,
        })?;

        serde_json::from_slice(&body).map_err(|e| Error::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

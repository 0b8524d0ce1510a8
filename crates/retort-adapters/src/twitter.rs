//! X (Twitter) API v2 adapter.
//!
//! Implements both sides of the platform for the poll cycle:
//! [`CommentSource`] (reads, authenticated with the app bearer token) and
//! [`ReplyDispatcher`] (writes, authenticated with OAuth 1.0a user context).
//!
//! Every response is checked for HTTP 429 before anything else so that rate
//! limits reach the kernel as [`AdapterError::RateLimited`] with the
//! provider's retry hint attached.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use retort_kernel::{
    AccountHandle, AccountId, Comment, CommentId, CommentSource, Post, PostId, ReplyDispatcher,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AdapterError, Result};
use crate::oauth::{OAuth1Credentials, percent_encode};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

/// Per-request timeout, connect to last byte.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Warn when fewer requests than this remain in the current window.
const LOW_RATE_LIMIT_THRESHOLD: u64 = 5;

/// `max_results` bounds for `GET /2/users/:id/tweets`.
const TIMELINE_PAGE_BOUNDS: (u32, u32) = (5, 100);

/// `max_results` bounds for `GET /2/tweets/search/recent`.
const SEARCH_PAGE_BOUNDS: (u32, u32) = (10, 100);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    errors: Vec<Problem>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct ApiTweet {
    id: String,
    #[serde(default)]
    text: String,
    author_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Problem {
    detail: Option<String>,
    message: Option<String>,
    title: Option<String>,
}

impl Problem {
    fn describe(&self) -> Option<&str> {
        self.detail
            .as_deref()
            .or(self.message.as_deref())
            .or(self.title.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Talks to the X API v2 on behalf of one monitored account.
pub struct TwitterAdapter {
    bearer_token: String,
    oauth: OAuth1Credentials,
    base_url: String,
    http: reqwest::Client,
    /// Resolved on first use and kept for the life of the adapter.
    account: OnceCell<(AccountHandle, AccountId)>,
}

impl TwitterAdapter {
    /// Create an adapter against the production API.
    pub fn new(bearer_token: impl Into<String>, oauth: OAuth1Credentials) -> Result<Self> {
        let bearer_token = bearer_token.into();
        if bearer_token.is_empty() {
            return Err(AdapterError::ConfigError("bearer token is empty".into()));
        }
        if oauth.consumer_key.is_empty() || oauth.access_token.is_empty() {
            return Err(AdapterError::ConfigError(
                "OAuth consumer key and access token are required".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .user_agent("retort/0.1")
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AdapterError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            bearer_token,
            oauth,
            base_url: DEFAULT_BASE_URL.to_owned(),
            http,
            account: OnceCell::new(),
        })
    }

    /// Point the adapter at a different API root (e.g. a local test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    fn api_url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| AdapterError::ConfigError(format!("invalid API URL: {e}")))
    }

    /// Send a request and fail unless the status is 2xx.
    async fn send_request(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout {
                    seconds: REQUEST_TIMEOUT_SECS,
                    reason: format!("X API request to `{endpoint}` timed out: {e}"),
                }
            } else {
                AdapterError::RequestFailed {
                    endpoint: endpoint.to_owned(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let headers = response.headers();

        if let Some(remaining) = header_u64(headers, "x-rate-limit-remaining")
            && remaining < LOW_RATE_LIMIT_THRESHOLD
        {
            warn!(remaining, endpoint, "X API rate limit is low");
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_from_headers(headers, Utc::now().timestamp());
            warn!(endpoint, retry_after_secs = retry_after.map(|d| d.as_secs()), "X API rate limit hit");
            return Err(AdapterError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AdapterError::Api {
                endpoint: endpoint.to_owned(),
                status: status.as_u16(),
                message: error_message(&body_text),
            });
        }

        Ok(response)
    }

    async fn get(&self, url: Url, endpoint: &str) -> Result<Value> {
        debug!(url = %url, "GET");
        let request = self.http.get(url).bearer_auth(&self.bearer_token);
        let response = self.send_request(request, endpoint).await?;
        read_json(response, endpoint).await
    }

    async fn post(&self, url: Url, endpoint: &str, body: &Value) -> Result<reqwest::Response> {
        debug!(url = %url, "POST");
        let auth = self.oauth.authorization_header("POST", &url)?;
        let request = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .json(body);
        self.send_request(request, endpoint).await
    }

    // -----------------------------------------------------------------------
    // Endpoints
    // -----------------------------------------------------------------------

    /// `GET /2/users/by/username/:handle`, uncached.
    pub async fn lookup_user_id(&self, handle: &AccountHandle) -> Result<AccountId> {
        let handle = handle.as_str().trim_start_matches('@');
        let url = self.api_url(&format!("/2/users/by/username/{}", percent_encode(handle)))?;
        let body = self.get(url, "users/by/username").await?;
        parse_user_id(body, handle)
    }

    /// `GET /2/users/:id/tweets`, newest first.
    pub async fn user_posts(&self, user_id: &AccountId, limit: u32) -> Result<Vec<Post>> {
        let mut url = self.api_url(&format!("/2/users/{user_id}/tweets"))?;
        url.query_pairs_mut()
            .append_pair("max_results", &clamp_page(limit, TIMELINE_PAGE_BOUNDS).to_string())
            .append_pair("tweet.fields", "created_at");
        let body = self.get(url, "users/tweets").await?;
        parse_posts(body, limit)
    }

    /// `GET /2/tweets/search/recent` for the post's conversation.
    pub async fn conversation_replies(&self, post_id: &PostId, limit: u32) -> Result<Vec<Comment>> {
        let mut url = self.api_url("/2/tweets/search/recent")?;
        url.query_pairs_mut()
            .append_pair("query", &format!("conversation_id:{post_id}"))
            .append_pair("max_results", &clamp_page(limit, SEARCH_PAGE_BOUNDS).to_string())
            .append_pair("expansions", "author_id")
            .append_pair("user.fields", "username")
            .append_pair("tweet.fields", "author_id,created_at,conversation_id");
        let body = self.get(url, "tweets/search/recent").await?;
        parse_comments(body, post_id, limit)
    }

    /// `POST /2/tweets` as a reply; returns the new post's id when the
    /// response carries one.
    ///
    /// Once the API has answered 2xx the reply exists, so an unreadable or
    /// unexpected body is logged and yields `Ok(None)`.
    pub async fn create_reply(&self, text: &str, in_reply_to: &CommentId) -> Result<Option<String>> {
        let url = self.api_url("/2/tweets")?;
        let body = json!({
            "text": text,
            "reply": { "in_reply_to_tweet_id": in_reply_to.as_str() },
        });
        let response = self.post(url, "tweets", &body).await?;

        match read_json(response, "tweets").await {
            Ok(created) => match created["data"]["id"].as_str() {
                Some(id) => Ok(Some(id.to_owned())),
                None => {
                    warn!(in_reply_to = %in_reply_to, "reply accepted without `data.id`");
                    Ok(None)
                }
            },
            Err(e) => {
                warn!(in_reply_to = %in_reply_to, error = %e, "reply accepted but response unreadable");
                Ok(None)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Kernel traits
// ---------------------------------------------------------------------------

#[async_trait]
impl CommentSource for TwitterAdapter {
    async fn resolve_account(&self, handle: &AccountHandle) -> retort_kernel::Result<AccountId> {
        if let Some((cached_handle, id)) = self.account.get() {
            if cached_handle == handle {
                return Ok(id.clone());
            }
            // A different handle than the one memoized: answer uncached.
            return self
                .lookup_user_id(handle)
                .await
                .map_err(|e| e.into_lookup_error(handle.as_str()));
        }

        let (_, id) = self
            .account
            .get_or_try_init(|| async {
                let id = self.lookup_user_id(handle).await?;
                info!(account = %handle, account_id = %id, "account resolved");
                Ok::<_, AdapterError>((handle.clone(), id))
            })
            .await
            .map_err(|e| e.into_lookup_error(handle.as_str()))?;
        Ok(id.clone())
    }

    async fn recent_posts(&self, account: &AccountId, limit: u32) -> retort_kernel::Result<Vec<Post>> {
        self.user_posts(account, limit)
            .await
            .map_err(AdapterError::into_fetch_error)
    }

    async fn candidate_comments(
        &self,
        post: &PostId,
        limit: u32,
    ) -> retort_kernel::Result<Vec<Comment>> {
        self.conversation_replies(post, limit)
            .await
            .map_err(AdapterError::into_fetch_error)
    }
}

#[async_trait]
impl ReplyDispatcher for TwitterAdapter {
    async fn post_reply(&self, reply_text: &str, in_reply_to: &CommentId) -> retort_kernel::Result<()> {
        let posted = self
            .create_reply(reply_text, in_reply_to)
            .await
            .map_err(|e| e.into_dispatch_error(in_reply_to.as_str()))?;
        debug!(in_reply_to = %in_reply_to, post_id = ?posted, "reply created");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Read a 2xx body as JSON.
async fn read_json(response: reqwest::Response, endpoint: &str) -> Result<Value> {
    let body_text = response
        .text()
        .await
        .map_err(|e| AdapterError::RequestFailed {
            endpoint: endpoint.to_owned(),
            reason: format!("failed to read response body: {e}"),
        })?;

    serde_json::from_str(&body_text).map_err(|e| AdapterError::InvalidResponse {
        endpoint: endpoint.to_owned(),
        reason: format!("body is not JSON: {e}"),
    })
}

/// Clamp a requested page size into the endpoint's accepted range.
fn clamp_page(limit: u32, (min, max): (u32, u32)) -> u32 {
    limit.clamp(min, max)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Retry hint from a 429: `retry-after` seconds, else `x-rate-limit-reset`
/// (epoch seconds) relative to `now`, never less than one second.
fn retry_after_from_headers(headers: &HeaderMap, now: i64) -> Option<Duration> {
    if let Some(secs) = header_u64(headers, "retry-after") {
        return Some(Duration::from_secs(secs));
    }
    let reset = header_u64(headers, "x-rate-limit-reset")?;
    let reset = i64::try_from(reset).ok()?;
    let secs = reset.saturating_sub(now).max(1);
    Some(Duration::from_secs(secs.unsigned_abs()))
}

/// Best human-readable message from an error body.
fn error_message(body: &str) -> String {
    let Ok(v) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_owned();
    };
    v["detail"]
        .as_str()
        .or_else(|| v["errors"][0]["message"].as_str())
        .or_else(|| v["title"].as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| body.trim().to_owned())
}

fn parse_user_id(body: Value, handle: &str) -> Result<AccountId> {
    let envelope: Envelope<ApiUser> = serde_json::from_value(body)?;
    match envelope.data {
        Some(user) => Ok(AccountId::new(user.id)),
        None => {
            let detail = envelope
                .errors
                .first()
                .and_then(Problem::describe)
                .unwrap_or("no such user");
            Err(AdapterError::NotFound(format!("@{handle}: {detail}")))
        }
    }
}

fn parse_posts(body: Value, limit: u32) -> Result<Vec<Post>> {
    let envelope: Envelope<Vec<ApiTweet>> = serde_json::from_value(body)?;
    Ok(envelope
        .data
        .unwrap_or_default()
        .into_iter()
        .take(limit as usize)
        .map(|t| Post {
            id: PostId::new(t.id),
            created_at: t.created_at,
        })
        .collect())
}

fn parse_comments(body: Value, post_id: &PostId, limit: u32) -> Result<Vec<Comment>> {
    let envelope: Envelope<Vec<ApiTweet>> = serde_json::from_value(body)?;
    let handles: HashMap<String, String> = envelope
        .includes
        .users
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect();

    Ok(envelope
        .data
        .unwrap_or_default()
        .into_iter()
        .filter(|t| t.id != post_id.as_str())
        .take(limit as usize)
        .map(|t| {
            let author_id = t.author_id.unwrap_or_default();
            Comment {
                id: CommentId::new(t.id),
                post_id: post_id.clone(),
                author_handle: handles.get(&author_id).cloned(),
                author_id,
                text: t.text,
                created_at: t.created_at,
            }
        })
        .collect())
}

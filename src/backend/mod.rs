//! Backend collaborators
//!
//! The inbox and discovery layers never store anything themselves. Every
//! accepted activity is turned into a request for one of these services:
//! - article ingestion (foreign posts)
//! - follow service (incoming follows, decisions on outgoing follows)
//! - user directory (local account lookup for WebFinger)

mod client;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::BackendConfig;
use crate::error::AppError;
use crate::metrics::BACKEND_CALLS_TOTAL;

pub use client::HttpBackend;

/// Collaborator failure
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not found")]
    NotFound,

    #[error("collaborator did not respond within {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Transport(err.to_string())
    }
}

/// Result of a collaborator call that completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOutcome {
    Accepted,
    /// The collaborator answered but refused the request
    Rejected(String),
}

/// A post created on a foreign server, addressed to a local user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewForeignArticle {
    /// Origin actor URI
    pub attributed_to: String,
    pub content: String,
    pub title: String,
    pub published: DateTime<Utc>,
    /// Local username the activity was delivered to
    pub recipient: String,
}

/// A follow request received from another server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedFollow {
    pub follower: String,
    pub followed: String,
}

/// Approval or denial of a follow request this server sent out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowDecision {
    pub follower: String,
    pub followed: String,
    pub accepted: bool,
}

/// Local account as known by the user directory
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserRecord {
    pub handle: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArticleIngest: Send + Sync {
    async fn receive_create(
        &self,
        article: NewForeignArticle,
    ) -> Result<BackendOutcome, BackendError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FollowService: Send + Sync {
    async fn receive_follow(&self, follow: ReceivedFollow)
    -> Result<BackendOutcome, BackendError>;

    async fn accept_follow(&self, decision: FollowDecision)
    -> Result<BackendOutcome, BackendError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns `BackendError::NotFound` when no such local user exists.
    async fn find_user(&self, handle: &str, host: &str) -> Result<UserRecord, BackendError>;
}

/// The set of collaborators a server instance talks to
#[derive(Clone)]
pub struct Backends {
    pub articles: Arc<dyn ArticleIngest>,
    pub follows: Arc<dyn FollowService>,
    pub users: Arc<dyn UserDirectory>,
}

impl Backends {
    /// Collaborators reached over HTTP at the configured service URLs.
    pub fn http(config: &BackendConfig) -> Result<Self, AppError> {
        let client = Arc::new(HttpBackend::new(config)?);
        Ok(Self {
            articles: client.clone(),
            follows: client.clone(),
            users: client,
        })
    }
}

/// Run a collaborator call under a deadline.
///
/// Expiry drops the call future, which cancels any request still in flight,
/// and is reported as `BackendError::Timeout`.
pub async fn with_deadline<T, F>(
    collaborator: &'static str,
    deadline: Duration,
    call: F,
) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    let result = match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(deadline)),
    };

    let outcome = match &result {
        Ok(_) => "ok",
        Err(BackendError::NotFound) => "not_found",
        Err(BackendError::Timeout(_)) => "timeout",
        Err(_) => "error",
    };
    BACKEND_CALLS_TOTAL
        .with_label_values(&[collaborator, outcome])
        .inc();

    result
}

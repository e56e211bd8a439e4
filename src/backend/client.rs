//! JSON-over-HTTP client for the backend collaborators

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::{
    ArticleIngest, BackendError, BackendOutcome, FollowDecision, FollowService, NewForeignArticle,
    ReceivedFollow, UserDirectory, UserRecord,
};
use crate::config::BackendConfig;
use crate::error::AppError;

/// Result type reported by the article and follow services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum ResultType {
    Ok,
    Denied,
    Error,
}

#[derive(Debug, Deserialize)]
struct ResultReply {
    result_type: ResultType,
    #[serde(default)]
    error: Option<String>,
}

impl From<ResultReply> for BackendOutcome {
    fn from(reply: ResultReply) -> Self {
        match reply.result_type {
            ResultType::Ok => BackendOutcome::Accepted,
            ResultType::Denied => {
                BackendOutcome::Rejected(reply.error.unwrap_or_else(|| "denied".to_string()))
            }
            ResultType::Error => {
                BackendOutcome::Rejected(reply.error.unwrap_or_else(|| "error".to_string()))
            }
        }
    }
}

/// Backend client talking to the article, follow and user services
pub struct HttpBackend {
    client: reqwest::Client,
    articles_url: Url,
    follows_url: Url,
    users_url: Url,
}

impl HttpBackend {
    /// Build a client for the configured service endpoints.
    ///
    /// Deadlines are applied per call by the inbox and resolver, so the
    /// client itself carries no timeout.
    pub fn new(config: &BackendConfig) -> Result<Self, AppError> {
        let parse = |key: &str, value: &str| {
            Url::parse(value).map_err(|e| AppError::Config(format!("{key}: {e}")))
        };

        let client = reqwest::Client::builder()
            .user_agent(concat!("Fedinbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            articles_url: parse("backend.articles_url", &config.articles_url)?,
            follows_url: parse("backend.follows_url", &config.follows_url)?,
            users_url: parse("backend.users_url", &config.users_url)?,
        })
    }

    async fn post_for_outcome<T: serde::Serialize + ?Sized>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<BackendOutcome, BackendError> {
        let response = self.client.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Protocol(format!("status {status}")));
        }

        let reply: ResultReply = response.json().await?;
        Ok(reply.into())
    }
}

/// Append path segments to a service base URL, percent-encoding each one.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, BackendError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| BackendError::Protocol(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait]
impl ArticleIngest for HttpBackend {
    async fn receive_create(
        &self,
        article: NewForeignArticle,
    ) -> Result<BackendOutcome, BackendError> {
        let url = endpoint(&self.articles_url, &["foreign_articles"])?;
        self.post_for_outcome(url, &article).await
    }
}

#[async_trait]
impl FollowService for HttpBackend {
    async fn receive_follow(
        &self,
        follow: ReceivedFollow,
    ) -> Result<BackendOutcome, BackendError> {
        let url = endpoint(&self.follows_url, &["follows", "received"])?;
        self.post_for_outcome(url, &follow).await
    }

    async fn accept_follow(
        &self,
        decision: FollowDecision,
    ) -> Result<BackendOutcome, BackendError> {
        let url = endpoint(&self.follows_url, &["follows", "decision"])?;
        self.post_for_outcome(url, &decision).await
    }
}

#[async_trait]
impl UserDirectory for HttpBackend {
    async fn find_user(&self, handle: &str, host: &str) -> Result<UserRecord, BackendError> {
        let url = endpoint(&self.users_url, &["users", handle])?;
        let response = self
            .client
            .get(url)
            .query(&[("host", host)])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(BackendError::NotFound),
            status if status.is_success() => Ok(response.json().await?),
            status => Err(BackendError::Protocol(format!("status {status}"))),
        }
    }
}

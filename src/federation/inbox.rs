//! Inbox dispatch
//!
//! Each inbound request walks `decode → authorize → classify → handle` and
//! may stop early with an [`InboxRejection`]. Nothing is kept between
//! requests; the routing table and trust list are built once and shared.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::activity::{ActivityEnvelope, non_empty};
use super::freshness::{FreshnessValidator, TimestampError};
use super::trust_list::TrustList;
use crate::backend::{
    ArticleIngest, BackendOutcome, FollowDecision, FollowService, NewForeignArticle,
    ReceivedFollow, with_deadline,
};
use crate::config::FederationConfig;
use crate::metrics::{ACTIVITIES_RECEIVED, INBOX_OUTCOMES_TOTAL};

/// Successful inbox outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxAck {
    /// Article handed to ingestion
    Created,
    /// Follow request handed to the follow service
    FollowReceived,
    /// Accept/Reject recorded by the follow service
    FollowDecided,
    /// Activity type this server does not act on
    Ignored,
}

impl InboxAck {
    fn label(self) -> &'static str {
        match self {
            InboxAck::Created => "created",
            InboxAck::FollowReceived => "follow_received",
            InboxAck::FollowDecided => "follow_decided",
            InboxAck::Ignored => "ignored",
        }
    }
}

impl IntoResponse for InboxAck {
    fn into_response(self) -> Response {
        match self {
            InboxAck::Created => (StatusCode::OK, "Article received").into_response(),
            InboxAck::FollowReceived => {
                (StatusCode::OK, Json(serde_json::json!({}))).into_response()
            }
            InboxAck::FollowDecided => (StatusCode::OK, "OK").into_response(),
            InboxAck::Ignored => StatusCode::OK.into_response(),
        }
    }
}

/// Early exit from the inbox pipeline
///
/// Messages are safe to show to the remote peer; collaborator details are
/// logged instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InboxRejection {
    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Forbidden")]
    Forbidden,

    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    #[error("{0}")]
    Malformed(&'static str),

    #[error("{0}")]
    Backend(&'static str),
}

impl InboxRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            InboxRejection::InvalidJson
            | InboxRejection::Timestamp(_)
            | InboxRejection::Malformed(_) => StatusCode::BAD_REQUEST,
            InboxRejection::Forbidden => StatusCode::FORBIDDEN,
            InboxRejection::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            InboxRejection::InvalidJson => "invalid_json",
            InboxRejection::Forbidden => "forbidden",
            InboxRejection::Timestamp(TimestampError::Invalid) => "invalid_timestamp",
            InboxRejection::Timestamp(TimestampError::Expired) => "stale_timestamp",
            InboxRejection::Malformed(_) => "malformed",
            InboxRejection::Backend(_) => "backend_error",
        }
    }
}

impl IntoResponse for InboxRejection {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Type-specific activity handling
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    /// Handle an authorized envelope addressed to the local user `recipient`.
    async fn handle(
        &self,
        recipient: &str,
        envelope: &ActivityEnvelope,
    ) -> Result<InboxAck, InboxRejection>;
}

/// Collaborators used by the inbox handlers
#[derive(Clone)]
pub struct InboxCollaborators {
    pub articles: Arc<dyn ArticleIngest>,
    pub follows: Arc<dyn FollowService>,
}

/// Tunables shared by the handlers
#[derive(Debug, Clone, Copy)]
pub struct InboxSettings {
    pub freshness: FreshnessValidator,
    /// Deadline for every collaborator call
    pub backend_timeout: Duration,
}

impl Default for InboxSettings {
    fn default() -> Self {
        Self {
            freshness: FreshnessValidator::default(),
            backend_timeout: Duration::from_secs(1),
        }
    }
}

impl InboxSettings {
    pub fn from_config(config: &FederationConfig) -> Self {
        Self {
            freshness: FreshnessValidator::new(config.freshness_window()),
            backend_timeout: config.backend_timeout(),
        }
    }
}

/// Routes authorized activities to their handlers
pub struct InboxDispatcher {
    trust_list: Arc<TrustList>,
    routes: HashMap<&'static str, Arc<dyn ActivityHandler>>,
    fallback: Arc<dyn ActivityHandler>,
}

impl InboxDispatcher {
    /// Build the dispatcher with the standard routing table.
    pub fn new(
        trust_list: Arc<TrustList>,
        collaborators: InboxCollaborators,
        settings: InboxSettings,
    ) -> Self {
        let decisions = |accepted| -> Arc<dyn ActivityHandler> {
            Arc::new(FollowDecisionHandler {
                follows: collaborators.follows.clone(),
                accepted,
                timeout: settings.backend_timeout,
            })
        };

        let mut routes: HashMap<&'static str, Arc<dyn ActivityHandler>> = HashMap::new();
        routes.insert(
            "create",
            Arc::new(CreateHandler {
                articles: collaborators.articles.clone(),
                freshness: settings.freshness,
                timeout: settings.backend_timeout,
            }),
        );
        routes.insert(
            "follow",
            Arc::new(FollowHandler {
                follows: collaborators.follows.clone(),
                timeout: settings.backend_timeout,
            }),
        );
        routes.insert("accept", decisions(true));
        routes.insert("reject", decisions(false));

        Self::with_routes(trust_list, routes, Arc::new(NoopHandler))
    }

    /// Build a dispatcher from an explicit routing table.
    ///
    /// `fallback` handles every type missing from `routes`.
    pub fn with_routes(
        trust_list: Arc<TrustList>,
        routes: HashMap<&'static str, Arc<dyn ActivityHandler>>,
        fallback: Arc<dyn ActivityHandler>,
    ) -> Self {
        Self {
            trust_list,
            routes,
            fallback,
        }
    }

    /// Whether `token` (already lower-cased) has a dedicated handler.
    pub fn is_routed(&self, token: &str) -> bool {
        self.routes.contains_key(token)
    }

    fn classify(&self, token: &str) -> &Arc<dyn ActivityHandler> {
        self.routes.get(token).unwrap_or(&self.fallback)
    }

    /// Process one inbox delivery for the local user `recipient`.
    pub async fn dispatch(
        &self,
        recipient: &str,
        body: &[u8],
    ) -> Result<InboxAck, InboxRejection> {
        let result = self.run(recipient, body).await;

        let outcome = match &result {
            Ok(ack) => ack.label(),
            Err(rejection) => rejection.label(),
        };
        INBOX_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();

        result
    }

    async fn run(&self, recipient: &str, body: &[u8]) -> Result<InboxAck, InboxRejection> {
        let envelope = ActivityEnvelope::from_slice(body).map_err(|error| {
            tracing::debug!(%error, recipient, "Rejected undecodable activity");
            InboxRejection::InvalidJson
        })?;

        self.trust_list
            .authorize(envelope.sender_refs())
            .map_err(|_| InboxRejection::Forbidden)?;

        let token = envelope.type_token();
        let routed = self.is_routed(&token);
        ACTIVITIES_RECEIVED
            .with_label_values(&[if routed { token.as_str() } else { "unknown" }])
            .inc();

        tracing::debug!(
            recipient,
            activity_type = %token,
            actor = ?envelope.actor_id(),
            routed,
            "Dispatching activity"
        );

        self.classify(&token).handle(recipient, &envelope).await
    }
}

/// Foreign article creation
struct CreateHandler {
    articles: Arc<dyn ArticleIngest>,
    freshness: FreshnessValidator,
    timeout: Duration,
}

#[async_trait]
impl ActivityHandler for CreateHandler {
    async fn handle(
        &self,
        recipient: &str,
        envelope: &ActivityEnvelope,
    ) -> Result<InboxAck, InboxRejection> {
        let object = envelope
            .embedded_object()
            .ok_or(InboxRejection::Timestamp(TimestampError::Invalid))?;
        let published = non_empty(object.published.as_deref())
            .ok_or(InboxRejection::Timestamp(TimestampError::Invalid))?;
        let published = self.freshness.parse_and_validate(published)?;

        let attributed_to = non_empty(object.attributed_to_id())
            .or_else(|| non_empty(envelope.actor_id()))
            .ok_or(InboxRejection::Malformed("Invalid create activity"))?;

        let article = NewForeignArticle {
            attributed_to: attributed_to.to_string(),
            content: ammonia::clean(object.content.as_deref().unwrap_or_default()),
            title: object.name.clone().unwrap_or_default(),
            published,
            recipient: recipient.to_string(),
        };

        let result = with_deadline(
            "articles",
            self.timeout,
            self.articles.receive_create(article),
        )
        .await;

        match result {
            Ok(BackendOutcome::Accepted) => {
                tracing::info!(recipient, attributed_to, "Foreign article received");
                Ok(InboxAck::Created)
            }
            Ok(BackendOutcome::Rejected(reason)) => {
                tracing::warn!(recipient, attributed_to, %reason, "Article ingestion refused");
                Err(InboxRejection::Backend("Could not create article"))
            }
            Err(error) => {
                tracing::error!(recipient, attributed_to, %error, "Article ingestion failed");
                Err(InboxRejection::Backend("Could not create article"))
            }
        }
    }
}

/// Incoming follow request
struct FollowHandler {
    follows: Arc<dyn FollowService>,
    timeout: Duration,
}

#[async_trait]
impl ActivityHandler for FollowHandler {
    async fn handle(
        &self,
        recipient: &str,
        envelope: &ActivityEnvelope,
    ) -> Result<InboxAck, InboxRejection> {
        let (Some(follower), Some(followed)) = (
            non_empty(envelope.actor_id()),
            non_empty(envelope.object_id()),
        ) else {
            return Err(InboxRejection::Malformed("Invalid follow activity"));
        };

        let follow = ReceivedFollow {
            follower: follower.to_string(),
            followed: followed.to_string(),
        };

        let result = with_deadline(
            "follows",
            self.timeout,
            self.follows.receive_follow(follow),
        )
        .await;

        match result {
            Ok(BackendOutcome::Accepted) => {
                tracing::info!(recipient, follower, followed, "Follow request received");
                Ok(InboxAck::FollowReceived)
            }
            Ok(BackendOutcome::Rejected(reason)) => {
                tracing::warn!(recipient, follower, %reason, "Follow service refused follow");
                Err(InboxRejection::Backend("Could not process follow"))
            }
            Err(error) => {
                tracing::error!(recipient, follower, %error, "Follow service call failed");
                Err(InboxRejection::Backend("Could not process follow"))
            }
        }
    }
}

/// Accept or Reject of a follow request sent by a local user.
///
/// The embedded object is the original Follow: its `actor` is the local
/// follower and its `object` the remote account that decided.
struct FollowDecisionHandler {
    follows: Arc<dyn FollowService>,
    accepted: bool,
    timeout: Duration,
}

#[async_trait]
impl ActivityHandler for FollowDecisionHandler {
    async fn handle(
        &self,
        recipient: &str,
        envelope: &ActivityEnvelope,
    ) -> Result<InboxAck, InboxRejection> {
        let follow = envelope.embedded_object();

        let follower = follow
            .and_then(|follow| non_empty(follow.actor_id()))
            .unwrap_or(recipient);
        let followed = non_empty(envelope.actor_id())
            .or_else(|| follow.and_then(|follow| non_empty(follow.object_id())))
            .ok_or(InboxRejection::Malformed("Invalid follow decision"))?;

        let decision = FollowDecision {
            follower: follower.to_string(),
            followed: followed.to_string(),
            accepted: self.accepted,
        };

        let result = with_deadline(
            "follows",
            self.timeout,
            self.follows.accept_follow(decision),
        )
        .await;

        match result {
            Ok(BackendOutcome::Accepted) => {
                tracing::info!(
                    recipient,
                    follower,
                    followed,
                    accepted = self.accepted,
                    "Follow decision recorded"
                );
                Ok(InboxAck::FollowDecided)
            }
            Ok(BackendOutcome::Rejected(reason)) => {
                tracing::warn!(recipient, followed, %reason, "Follow service refused decision");
                Err(InboxRejection::Backend("Could not process follow decision"))
            }
            Err(error) => {
                tracing::error!(recipient, followed, %error, "Follow service call failed");
                Err(InboxRejection::Backend("Could not process follow decision"))
            }
        }
    }
}

/// Default for unrouted types; every one gets the same empty 200.
struct NoopHandler;

#[async_trait]
impl ActivityHandler for NoopHandler {
    async fn handle(
        &self,
        _recipient: &str,
        envelope: &ActivityEnvelope,
    ) -> Result<InboxAck, InboxRejection> {
        tracing::debug!(activity_type = %envelope.kind, "Ignoring unsupported activity type");
        Ok(InboxAck::Ignored)
    }
}

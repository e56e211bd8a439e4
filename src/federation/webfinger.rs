//! WebFinger identity resolution
//!
//! Answers `acct:user@host` lookups for accounts on this server only.
//! Every kind of unknown account produces the same not-found result, so a
//! remote party cannot probe which handles exist.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{BackendError, UserDirectory, with_deadline};
use crate::config::ServerConfig;

pub const PROFILE_PAGE_REL: &str = "http://webfinger.net/rel/profile-page";
pub const SELF_REL: &str = "self";
pub const ACTIVITY_MEDIA_TYPE: &str = "application/activity+json";

#[derive(Debug, Error)]
pub enum WebFingerError {
    #[error("user not found")]
    NotFound,

    #[error("user directory failure: {0}")]
    Backend(BackendError),
}

impl WebFingerError {
    /// True when the lookup should be answered with the protocol's
    /// not-found response rather than a server error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, WebFingerError::NotFound)
    }
}

impl From<BackendError> for WebFingerError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound => WebFingerError::NotFound,
            other => WebFingerError::Backend(other),
        }
    }
}

/// WebFinger JRD response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WebFingerResponse {
    pub subject: String,
    pub links: Vec<WebFingerLink>,
}

/// WebFinger link
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WebFingerLink {
    pub rel: String,
    #[serde(rename = "type")]
    pub link_type: String,
    pub href: String,
}

/// Split an `acct:` resource into handle and host.
///
/// `acct:` is optional and a leading `@` on the handle is ignored. URLs and
/// handles or hosts carrying a path, scheme or query are not account names.
pub fn parse_acct(resource: &str) -> Option<(&str, &str)> {
    let acct = resource.strip_prefix("acct:").unwrap_or(resource);
    let (handle, host) = acct.trim_start_matches('@').split_once('@')?;

    let is_name = |part: &str| {
        !part.is_empty()
            && !part
                .chars()
                .any(|c| matches!(c, '@' | ':' | '/' | '?' | '#') || c.is_whitespace())
    };
    // a port is the only place a colon may appear
    let host_name = host.rsplit_once(':').map_or(host, |(name, port)| {
        if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
            name
        } else {
            host
        }
    });

    if !is_name(handle) || !is_name(host_name) {
        return None;
    }

    Some((handle, host))
}

/// Generate the JRD for a local account.
///
/// # Arguments
/// * `handle` - Local username
/// * `hostname` - Canonical hostname used in the subject
/// * `scheme` - `http` or `https`
/// * `link_host` - Host (with port) used in link targets
pub fn generate_webfinger_response(
    handle: &str,
    hostname: &str,
    scheme: &str,
    link_host: &str,
) -> WebFingerResponse {
    WebFingerResponse {
        subject: format!("acct:{}@{}", handle, hostname),
        links: vec![
            WebFingerLink {
                rel: PROFILE_PAGE_REL.to_string(),
                link_type: "text/html".to_string(),
                href: format!("{}://{}/#/@{}", scheme, link_host, handle),
            },
            WebFingerLink {
                rel: SELF_REL.to_string(),
                link_type: ACTIVITY_MEDIA_TYPE.to_string(),
                href: format!("{}://{}/ap/@{}", scheme, link_host, handle),
            },
        ],
    }
}

/// Resolves local identities against the user directory
pub struct IdentityResolver {
    hostname: String,
    debug_host: Option<String>,
    users: Arc<dyn UserDirectory>,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(server: &ServerConfig, users: Arc<dyn UserDirectory>, timeout: Duration) -> Self {
        Self {
            hostname: server.hostname.clone(),
            debug_host: server.debug_host.clone(),
            users,
            timeout,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Resolve `handle@host`, where the query arrived on `request_host`.
    ///
    /// Hosts other than this server's are never looked up.
    pub async fn resolve(
        &self,
        handle: &str,
        host: &str,
        request_host: &str,
    ) -> Result<WebFingerResponse, WebFingerError> {
        if !host.eq_ignore_ascii_case(&self.hostname) {
            tracing::debug!(handle, host, "WebFinger query for foreign host");
            return Err(WebFingerError::NotFound);
        }

        let user = with_deadline("users", self.timeout, self.users.find_user(handle, host))
            .await
            .map_err(|error| {
                if !matches!(error, BackendError::NotFound) {
                    tracing::error!(handle, %error, "User directory lookup failed");
                }
                WebFingerError::from(error)
            })?;

        let (scheme, link_host) = self.link_origin(request_host);
        Ok(generate_webfinger_response(
            &user.handle,
            &self.hostname,
            scheme,
            link_host,
        ))
    }

    /// Lookup path for resources that cannot name a local user.
    ///
    /// Answers exactly like a handle that does not exist.
    pub async fn dummy_user(&self, handle: &str) -> Result<WebFingerResponse, WebFingerError> {
        tracing::debug!(handle, "WebFinger query for unknown resource");
        Err(WebFingerError::NotFound)
    }

    /// Scheme and host for generated links.
    ///
    /// An undotted hostname marks a debug deployment served over plain HTTP
    /// on `debug_host` (or whatever host the query arrived on).
    fn link_origin<'a>(&'a self, request_host: &'a str) -> (&'static str, &'a str) {
        if self.hostname.contains('.') {
            return ("https", &self.hostname);
        }

        let host = self
            .debug_host
            .as_deref()
            .filter(|host| !host.is_empty())
            .unwrap_or(request_host);
        ("http", host)
    }
}

//! Untrusted host list
//!
//! Loaded once at startup from a line-oriented file:
//!
//! ```text
//! # spam farm
//! spam.example
//! bad.example   # inline comments are allowed
//! ```
//!
//! The list is immutable afterwards and shared read-only between requests.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use thiserror::Error;

use crate::error::AppError;

/// Sender authorization failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("host {0} is not trusted")]
    UntrustedHost(String),
}

/// Set of hosts this server refuses federation traffic from
#[derive(Debug, Clone, Default)]
pub struct TrustList {
    excluded: HashSet<String>,
}

impl TrustList {
    /// Parse a trust list from any buffered reader.
    ///
    /// # Errors
    /// Any I/O error while reading is returned as `AppError::Config`.
    pub fn load<R: BufRead>(reader: R) -> Result<Self, AppError> {
        let mut excluded = HashSet::new();

        for line in reader.lines() {
            let line =
                line.map_err(|e| AppError::Config(format!("failed to read trust list: {e}")))?;

            let entry = match line.find('#') {
                Some(index) => &line[..index],
                None => line.as_str(),
            }
            .trim();

            if !entry.is_empty() {
                excluded.insert(entry.to_ascii_lowercase());
            }
        }

        Ok(Self { excluded })
    }

    /// Load the trust list from a file path.
    ///
    /// A missing or unreadable file is fatal; the inbox must not serve
    /// traffic without it.
    pub fn load_file(path: &Path) -> Result<Self, AppError> {
        let file = std::fs::File::open(path).map_err(|e| {
            AppError::Config(format!(
                "failed to open trust list {}: {e}",
                path.display()
            ))
        })?;
        let list = Self::load(std::io::BufReader::new(file))?;

        tracing::info!(
            path = %path.display(),
            hosts = list.len(),
            "Trust list loaded"
        );

        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    /// Whether the exact (normalized) host is excluded.
    pub fn contains(&self, host: &str) -> bool {
        self.excluded.contains(&host.to_ascii_lowercase())
    }

    /// Check every actor reference against the exclusion set.
    ///
    /// Both `host:port` and bare `host` are checked. References without a
    /// recognizable host are skipped.
    pub fn authorize<'a, I>(&self, actor_refs: I) -> Result<(), AuthorizationError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for actor_ref in actor_refs {
            let Some(host) = extract_host(actor_ref) else {
                continue;
            };

            if self.excluded.contains(&host) || self.excluded.contains(strip_port(&host)) {
                tracing::warn!(actor = %actor_ref, host = %host, "Rejected untrusted sender");
                return Err(AuthorizationError::UntrustedHost(host));
            }
        }

        Ok(())
    }
}

impl FromIterator<String> for TrustList {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            excluded: iter
                .into_iter()
                .map(|host| host.trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }
}

fn default_port_for_scheme(scheme: &str) -> Option<u16> {
    if scheme.eq_ignore_ascii_case("http") {
        Some(80)
    } else if scheme.eq_ignore_ascii_case("https") {
        Some(443)
    } else {
        None
    }
}

fn format_host_key(host: &str, port: Option<u16>, scheme: &str) -> String {
    let normalized_host = host
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    let normalized_port = port.filter(|p| Some(*p) != default_port_for_scheme(scheme));

    match normalized_port {
        Some(port) if normalized_host.contains(':') => format!("[{}]:{}", normalized_host, port),
        Some(port) => format!("{}:{}", normalized_host, port),
        None => normalized_host,
    }
}

fn strip_port(host_key: &str) -> &str {
    if let Some(rest) = host_key.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    if host_key.matches(':').count() > 1 {
        // bare IPv6 literal
        return host_key;
    }
    host_key.split(':').next().unwrap_or(host_key)
}

/// Extract the host of an actor reference.
///
/// Accepted forms:
/// - `<scheme>://host[:port]/...`
/// - `acct:handle@host`
/// - `handle@host` (an optional leading `@` is ignored)
pub fn extract_host(actor_ref: &str) -> Option<String> {
    let trimmed = actor_ref.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.contains("://") {
        let parsed = url::Url::parse(trimmed).ok()?;
        let host = parsed.host_str()?;
        return Some(format_host_key(host, parsed.port(), parsed.scheme()));
    }

    let address = if trimmed
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("acct:"))
    {
        &trimmed[5..]
    } else {
        trimmed
    };

    let (_, authority) = address.trim_start_matches('@').rsplit_once('@')?;
    let parsed = url::Url::parse(&format!("https://{}", authority)).ok()?;
    let host = parsed.host_str()?;
    Some(format_host_key(host, parsed.port(), "https"))
}

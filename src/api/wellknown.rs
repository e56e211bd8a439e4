//! Well-known endpoints
//!
//! - /.well-known/webfinger
//! - /.well-known/nodeinfo
//! - /.well-known/host-meta

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::AppError;
use crate::federation::{WebFingerError, parse_acct};
use crate::metrics::WEBFINGER_LOOKUPS_TOTAL;

/// Create well-known router
///
/// Routes:
/// - GET /.well-known/webfinger
/// - GET /.well-known/nodeinfo
/// - GET /.well-known/host-meta
/// - GET /nodeinfo/2.0
pub fn wellknown_router() -> Router<AppState> {
    Router::new()
        .route("/.well-known/webfinger", get(webfinger))
        .route("/.well-known/nodeinfo", get(nodeinfo_links))
        .route("/.well-known/host-meta", get(host_meta))
        .route("/nodeinfo/2.0", get(nodeinfo))
}

/// WebFinger query parameters
#[derive(Debug, Deserialize)]
struct WebFingerQuery {
    #[serde(default)]
    resource: String,
}

/// GET /.well-known/webfinger
///
/// Responds to WebFinger queries for local accounts.
///
/// Query: ?resource=acct:user@domain
async fn webfinger(
    State(state): State<AppState>,
    Query(query): Query<WebFingerQuery>,
    headers: HeaderMap,
) -> Response {
    let request_host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_else(|| state.resolver.hostname())
        .to_string();

    let result = match parse_acct(&query.resource) {
        Some((handle, host)) => state.resolver.resolve(handle, host, &request_host).await,
        None => state.resolver.dummy_user(&query.resource).await,
    };

    match result {
        Ok(resource) => {
            WEBFINGER_LOOKUPS_TOTAL.with_label_values(&["found"]).inc();
            (
                [(header::CONTENT_TYPE, "application/jrd+json")],
                Json(resource),
            )
                .into_response()
        }
        Err(WebFingerError::NotFound) => {
            WEBFINGER_LOOKUPS_TOTAL.with_label_values(&["not_found"]).inc();
            AppError::NotFound.into_response()
        }
        Err(WebFingerError::Backend(error)) => {
            WEBFINGER_LOOKUPS_TOTAL.with_label_values(&["error"]).inc();
            tracing::error!(%error, resource = %query.resource, "WebFinger lookup failed");
            AppError::Backend(error).into_response()
        }
    }
}

const NODEINFO_SCHEMA_REL: &str = "http://nodeinfo.diaspora.software/ns/schema/2.0";

/// NodeInfo 2.0 document
///
/// Accounts live in the user directory, so no usage figures are published.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeInfo {
    version: &'static str,
    software: NodeInfoSoftware,
    protocols: [&'static str; 1],
    services: NodeInfoServices,
    open_registrations: bool,
    usage: serde_json::Value,
    metadata: NodeInfoMetadata,
}

#[derive(Debug, Serialize)]
struct NodeInfoSoftware {
    name: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct NodeInfoServices {
    inbound: [&'static str; 0],
    outbound: [&'static str; 0],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeInfoMetadata {
    node_name: String,
}

impl NodeInfo {
    fn for_host(hostname: &str) -> Self {
        Self {
            version: "2.0",
            software: NodeInfoSoftware {
                name: env!("CARGO_PKG_NAME"),
                version: env!("CARGO_PKG_VERSION"),
            },
            protocols: ["activitypub"],
            services: NodeInfoServices {
                inbound: [],
                outbound: [],
            },
            open_registrations: false,
            usage: serde_json::json!({ "users": {} }),
            metadata: NodeInfoMetadata {
                node_name: hostname.to_string(),
            },
        }
    }
}

/// GET /.well-known/nodeinfo
async fn nodeinfo_links(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "links": [{
            "rel": NODEINFO_SCHEMA_REL,
            "href": format!("{}/nodeinfo/2.0", state.config.server.base_url()),
        }]
    }))
}

/// GET /nodeinfo/2.0
async fn nodeinfo(State(state): State<AppState>) -> Json<NodeInfo> {
    Json(NodeInfo::for_host(&state.config.server.hostname))
}

/// XRD pointing LRDD lookups at the WebFinger endpoint under `base_url`.
fn host_meta_document(base_url: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "\n",
            r#"<XRD xmlns="http://docs.oasis-open.org/ns/xri/xrd-1.0">"#,
            "\n",
            r#"  <Link rel="lrdd" template="{}/.well-known/webfinger?resource={{uri}}"/>"#,
            "\n</XRD>"
        ),
        base_url
    )
}

/// GET /.well-known/host-meta
async fn host_meta(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/xrd+xml")],
        host_meta_document(&state.config.server.base_url()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_meta_templates_webfinger() {
        let xml = host_meta_document("http://localhost:8080");
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(
            r#"template="http://localhost:8080/.well-known/webfinger?resource={uri}""#
        ));
    }

    #[test]
    fn nodeinfo_describes_this_node() {
        let json = serde_json::to_value(NodeInfo::for_host("myhost.example")).unwrap();
        assert_eq!(json["software"]["name"], "fedinbox");
        assert_eq!(json["openRegistrations"], false);
        assert_eq!(json["metadata"]["nodeName"], "myhost.example");
        assert_eq!(json["services"]["inbound"], serde_json::json!([]));
        assert!(json["usage"]["users"].is_object());
    }
}

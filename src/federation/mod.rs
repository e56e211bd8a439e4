//! Federation layer
//!
//! Handles:
//! - Inbox dispatch (decode, authorize, classify, handle)
//! - Untrusted host list
//! - Activity timestamp freshness
//! - WebFinger identity resolution

mod activity;
mod freshness;
mod inbox;
mod trust_list;
mod webfinger;

pub use activity::{ActivityEnvelope, ActivityObject, ActorRef, ObjectRef};
pub use freshness::{
    DEFAULT_WINDOW, FreshnessValidator, TIMESTAMP_FORMAT, TimestampError, format_timestamp,
    parse_timestamp,
};
pub use inbox::{
    ActivityHandler, InboxAck, InboxCollaborators, InboxDispatcher, InboxRejection, InboxSettings,
};
pub use trust_list::{AuthorizationError, TrustList, extract_host};
pub use webfinger::{
    ACTIVITY_MEDIA_TYPE, IdentityResolver, PROFILE_PAGE_REL, SELF_REL, WebFingerError,
    WebFingerLink, WebFingerResponse, generate_webfinger_response, parse_acct,
};

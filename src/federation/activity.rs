//! Inbound activity envelopes
//!
//! Only the fields the inbox acts on are modelled; everything else in the
//! JSON document is ignored. Identity fields (`actor`, `attributedTo`, the
//! embedded `actor`/`object`) accept a string, an object with an `id`, or an
//! array of either. Any other shape in those fields fails decoding, so no
//! identity escapes the trust list.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// An activity as received from a remote server
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityEnvelope {
    /// Declared activity type, matched case-insensitively
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub actor: Vec<ActorRef>,
    #[serde(default, deserialize_with = "object_ref")]
    pub object: Option<ObjectRef>,
}

/// An identity: either an identifier or an embedded object with an `id`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ActorRef {
    Id(String),
    Object { id: String },
}

impl ActorRef {
    pub fn id(&self) -> &str {
        match self {
            ActorRef::Id(id) | ActorRef::Object { id } => id,
        }
    }
}

/// `object` is either a bare link or an embedded object
#[derive(Debug, Clone)]
pub enum ObjectRef {
    Link(String),
    Object(Box<ActivityObject>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityObject {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<String>,
    /// Display name (article title)
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub published: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub attributed_to: Vec<ActorRef>,
    /// Set when the object is itself an activity (the Follow inside an Accept)
    #[serde(default, deserialize_with = "one_or_many")]
    pub actor: Vec<ActorRef>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub object: Vec<ActorRef>,
}

impl ActivityObject {
    pub fn attributed_to_id(&self) -> Option<&str> {
        self.attributed_to.first().map(ActorRef::id)
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor.first().map(ActorRef::id)
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object.first().map(ActorRef::id)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Identity fields: absent or null is empty, otherwise one item or a list.
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(item)) => vec![item],
        Some(OneOrMany::Many(items)) => items,
    })
}

/// A string is a link and a JSON object must decode as an embedded object.
/// Scalars and lists carry no identity the inbox acts on and decode as absent.
fn object_ref<'de, D>(deserializer: D) -> Result<Option<ObjectRef>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(link) => Ok(Some(ObjectRef::Link(link))),
        value @ serde_json::Value::Object(_) => serde_json::from_value(value)
            .map(|object| Some(ObjectRef::Object(Box::new(object))))
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

/// Non-identity fields whose shape does not match decode as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

impl ActivityEnvelope {
    /// Decode a request body. Anything that is not a JSON object with a
    /// string `type` is rejected.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// First declared actor
    pub fn actor_id(&self) -> Option<&str> {
        self.actor.first().map(ActorRef::id)
    }

    /// Routing key: the declared type, ASCII-lowercased.
    pub fn type_token(&self) -> String {
        self.kind.to_ascii_lowercase()
    }

    pub fn embedded_object(&self) -> Option<&ActivityObject> {
        match &self.object {
            Some(ObjectRef::Object(object)) => Some(object),
            _ => None,
        }
    }

    /// Identifier of the object: the link itself, or the embedded object's `id`.
    pub fn object_id(&self) -> Option<&str> {
        match &self.object {
            Some(ObjectRef::Link(link)) => Some(link),
            Some(ObjectRef::Object(object)) => object.id.as_deref(),
            None => None,
        }
    }

    /// Every identity the envelope names: all actors, the object link or id,
    /// and the embedded object's attribution, actor and target.
    ///
    /// All of them must pass the trust list before dispatch, since any of
    /// them may be handed to a collaborator.
    pub fn sender_refs(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = self.actor.iter().map(ActorRef::id).collect();
        refs.extend(self.object_id());
        if let Some(object) = self.embedded_object() {
            refs.extend(
                object
                    .attributed_to
                    .iter()
                    .chain(&object.actor)
                    .chain(&object.object)
                    .map(ActorRef::id),
            );
        }
        refs
    }
}

/// Returns the value when it is present and not blank.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

//! Change events fanned out to real-time clients.
//!
//! On the wire every message is an envelope `{"type": "<kind>", "payload": {...}}`.
//! The broadcast endpoint receives the same payload under `"data"`, and inbound
//! socket messages may use either key. Envelopes are decoded into [`ChangeEvent`]
//! at the connection boundary; kinds this build does not know about survive as
//! [`ChangeEvent::Unknown`] so newer servers never break older clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub const TASK_CREATED: &str = "task_created";
pub const TASK_UPDATED: &str = "task_updated";
pub const TASK_DELETED: &str = "task_deleted";
pub const TASK_STATUS_CHANGED: &str = "task_status_changed";
pub const PING: &str = "ping";
pub const PONG: &str = "pong";

/// Raw wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEnvelope")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

/// Inbound shape: `payload` wins when a sender includes both keys.
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

impl From<RawEnvelope> for Envelope {
    fn from(raw: RawEnvelope) -> Self {
        Self {
            kind: raw.kind,
            payload: raw.payload.or(raw.data).unwrap_or(Value::Null),
        }
    }
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Keep-alive ping sent by clients.
    pub fn ping() -> Self {
        Self::new(PING, Value::Object(Map::new()))
    }

    /// Keep-alive acknowledgment sent by the relay.
    pub fn pong() -> Self {
        Self::new(PONG, Value::Object(Map::new()))
    }

    pub fn is_keepalive(&self) -> bool {
        self.kind == PING || self.kind == PONG
    }

    /// Body posted to the broadcast endpoint.
    pub fn to_broadcast_body(&self) -> BroadcastBody<'_> {
        BroadcastBody {
            kind: &self.kind,
            data: &self.payload,
        }
    }
}

/// `{"type": ..., "data": ...}` as expected by `POST /api/broadcast`.
#[derive(Debug, Serialize)]
pub struct BroadcastBody<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub data: &'a Value,
}

/// Which family of entities an event touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Task,
    Note,
    Application,
}

/// Create / update / delete for entity families without dedicated variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

impl ChangeAction {
    fn suffix(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Identifier of the changed entity plus whatever else the server sent along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreated {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdated {
    pub id: String,
    /// Changed fields, keyed by their camelCase names.
    #[serde(flatten)]
    pub changes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusChanged {
    pub id: String,
    pub status_id: String,
}

/// A change worth telling other sessions about.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    TaskCreated(TaskCreated),
    TaskUpdated(TaskUpdated),
    TaskDeleted(EntityRef),
    TaskStatusChanged(TaskStatusChanged),
    NoteChanged { action: ChangeAction, target: EntityRef },
    ApplicationChanged { action: ChangeAction, target: EntityRef },
    /// A known kind whose payload does not fit the typed shape. Still a
    /// change to `entity`, so consumers refetch on it.
    Partial {
        kind: String,
        entity: EntityKind,
        payload: Value,
    },
    Unknown { kind: String, payload: Value },
}

impl ChangeEvent {
    /// Wire tag of this event.
    pub fn kind(&self) -> String {
        match self {
            Self::TaskCreated(_) => TASK_CREATED.to_string(),
            Self::TaskUpdated(_) => TASK_UPDATED.to_string(),
            Self::TaskDeleted(_) => TASK_DELETED.to_string(),
            Self::TaskStatusChanged(_) => TASK_STATUS_CHANGED.to_string(),
            Self::NoteChanged { action, .. } => format!("note_{}", action.suffix()),
            Self::ApplicationChanged { action, .. } => {
                format!("application_{}", action.suffix())
            }
            Self::Partial { kind, .. } | Self::Unknown { kind, .. } => kind.clone(),
        }
    }

    /// Entity family this event refers to, `None` for unknown kinds.
    pub fn entity(&self) -> Option<EntityKind> {
        match self {
            Self::TaskCreated(_)
            | Self::TaskUpdated(_)
            | Self::TaskDeleted(_)
            | Self::TaskStatusChanged(_) => Some(EntityKind::Task),
            Self::NoteChanged { .. } => Some(EntityKind::Note),
            Self::ApplicationChanged { .. } => Some(EntityKind::Application),
            Self::Partial { entity, .. } => Some(*entity),
            Self::Unknown { .. } => None,
        }
    }

    /// Identifier of the affected entity, when the kind is known.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::TaskCreated(p) => Some(&p.id),
            Self::TaskUpdated(p) => Some(&p.id),
            Self::TaskDeleted(p) => Some(&p.id),
            Self::TaskStatusChanged(p) => Some(&p.id),
            Self::NoteChanged { target, .. } | Self::ApplicationChanged { target, .. } => {
                Some(&target.id)
            }
            Self::Partial { payload, .. } => payload.get("id").and_then(Value::as_str),
            Self::Unknown { .. } => None,
        }
    }

    /// Decode an envelope. Never fails: known kinds whose payload does not
    /// match the typed shape become [`ChangeEvent::Partial`], unrecognized
    /// kinds become [`ChangeEvent::Unknown`].
    pub fn from_envelope(envelope: Envelope) -> Self {
        let Envelope { kind, payload } = envelope;
        let Some(entity) = entity_of(&kind) else {
            return Self::Unknown { kind, payload };
        };

        match Self::decode_typed(&kind, payload.clone()) {
            Ok(event) => event,
            Err(e) => {
                debug!(kind = %kind, error = %e, "Payload does not match typed shape");
                Self::Partial {
                    kind,
                    entity,
                    payload,
                }
            }
        }
    }

    /// Strict decode for a kind already known to be recognized.
    fn decode_typed(kind: &str, payload: Value) -> Result<Self, serde_json::Error> {
        let event = match kind {
            TASK_CREATED => Self::TaskCreated(serde_json::from_value(payload)?),
            TASK_UPDATED => Self::TaskUpdated(serde_json::from_value(payload)?),
            TASK_DELETED => Self::TaskDeleted(serde_json::from_value(payload)?),
            TASK_STATUS_CHANGED => Self::TaskStatusChanged(serde_json::from_value(payload)?),
            other => match split_entity_kind(other) {
                Some((EntityKind::Note, action)) => Self::NoteChanged {
                    action,
                    target: serde_json::from_value(payload)?,
                },
                Some((EntityKind::Application, action)) => Self::ApplicationChanged {
                    action,
                    target: serde_json::from_value(payload)?,
                },
                _ => Self::Unknown {
                    kind: other.to_string(),
                    payload,
                },
            },
        };
        Ok(event)
    }

    /// Encode back into a wire envelope.
    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        let payload = match self {
            Self::TaskCreated(p) => serde_json::to_value(p)?,
            Self::TaskUpdated(p) => serde_json::to_value(p)?,
            Self::TaskDeleted(p) => serde_json::to_value(p)?,
            Self::TaskStatusChanged(p) => serde_json::to_value(p)?,
            Self::NoteChanged { target, .. } | Self::ApplicationChanged { target, .. } => {
                serde_json::to_value(target)?
            }
            Self::Partial { payload, .. } | Self::Unknown { payload, .. } => payload.clone(),
        };
        Ok(Envelope::new(self.kind(), payload))
    }
}

/// Entity family of a recognized kind.
fn entity_of(kind: &str) -> Option<EntityKind> {
    match kind {
        TASK_CREATED | TASK_UPDATED | TASK_DELETED | TASK_STATUS_CHANGED => Some(EntityKind::Task),
        other => split_entity_kind(other).map(|(entity, _)| entity),
    }
}

fn split_entity_kind(kind: &str) -> Option<(EntityKind, ChangeAction)> {
    if let Some(action) = kind.strip_prefix("note_").and_then(ChangeAction::from_suffix) {
        return Some((EntityKind::Note, action));
    }
    kind.strip_prefix("application_")
        .and_then(ChangeAction::from_suffix)
        .map(|action| (EntityKind::Application, action))
}

/// Parse a text frame into an envelope.
pub fn parse_envelope(text: &str) -> Result<Envelope, serde_json::Error> {
    serde_json::from_str(text)
}

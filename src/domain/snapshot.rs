use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntityId, EntityKind, OwnerScopeId};

/// Identity of a watched source object plus a plain name for log labels.
/// Deliberately holds no live handle back into the source client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub scope: OwnerScopeId,
    pub name: String,
}

/// One raw state-change notification from the source system. Attributes
/// are supplied fresh on every event; nothing here is cached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub entity: WatchedEntity,
    pub attributes: EntityAttributes,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityAttributes {
    VoiceChannel {
        occupants: Vec<Occupant>,
    },
    Presence {
        user_name: String,
        online: bool,
        activity: Option<String>,
    },
    ScheduledEvent {
        title: String,
        description: Option<String>,
        starts_at: Option<DateTime<Utc>>,
        location: Option<String>,
        cover_image: Option<String>,
        /// Deep link to the event on the source side; rendered as the
        /// message's action button.
        event_url: Option<String>,
        ended: bool,
    },
}

impl EntityAttributes {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityAttributes::VoiceChannel { .. } => EntityKind::VoiceChannel,
            EntityAttributes::Presence { .. } => EntityKind::Presence,
            EntityAttributes::ScheduledEvent { .. } => EntityKind::ScheduledEvent,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub display_name: String,
    pub activity: Option<String>,
    pub muted: bool,
}

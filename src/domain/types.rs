use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(EntityId);
string_id!(OwnerScopeId);
string_id!(SinkTargetId);
string_id!(MessageHandle);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    VoiceChannel,
    Presence,
    ScheduledEvent,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [
        EntityKind::VoiceChannel,
        EntityKind::Presence,
        EntityKind::ScheduledEvent,
    ];

    /// Presence watchers are 1:1 with a sink target; the other kinds fan
    /// out to a subscriber set.
    pub fn is_single_target(&self) -> bool {
        matches!(self, EntityKind::Presence)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::VoiceChannel => "channel",
            EntityKind::Presence => "presence",
            EntityKind::ScheduledEvent => "event",
        }
    }

    pub fn parse(s: &str) -> Result<Self, KeyError> {
        match s {
            "channel" => Ok(EntityKind::VoiceChannel),
            "presence" => Ok(EntityKind::Presence),
            "event" => Ok(EntityKind::ScheduledEvent),
            other => Err(KeyError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Composite identity of one watcher, used both as the registry map key
/// and (via `storage_key`) as the durable-store key. A typed struct rather
/// than a hand-concatenated string so the parts cannot drift apart.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatcherKey {
    pub scope: OwnerScopeId,
    pub kind: EntityKind,
    pub entity: EntityId,
    /// Set for single-target kinds only; multi-target kinds carry their
    /// subscriber set inside the watcher instead.
    pub target: Option<SinkTargetId>,
}

impl WatcherKey {
    pub fn new(scope: OwnerScopeId, kind: EntityKind, entity: EntityId) -> Self {
        Self {
            scope,
            kind,
            entity,
            target: None,
        }
    }

    pub fn with_target(mut self, target: SinkTargetId) -> Self {
        self.target = Some(target);
        self
    }

    /// Ids come from the source system and may themselves contain the
    /// separator, so every id segment is escaped on the way in.
    pub fn storage_key(&self) -> String {
        let mut out = format!(
            "{}:{}:{}",
            escape_segment(self.scope.as_str()),
            self.kind,
            escape_segment(self.entity.as_str())
        );
        if let Some(t) = &self.target {
            out.push(':');
            out.push_str(&escape_segment(t.as_str()));
        }
        out
    }

    pub fn storage_prefix(scope: &OwnerScopeId, kind: EntityKind) -> String {
        format!("{}:{}:", escape_segment(scope.as_str()), kind)
    }

    pub fn parse(s: &str) -> Result<Self, KeyError> {
        let parts = split_segments(s);
        if parts.len() < 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(KeyError::InvalidFormat(s.to_string()));
        }
        let kind = EntityKind::parse(&parts[1])?;
        let target = match (kind.is_single_target(), parts.len()) {
            (true, 4) => Some(SinkTargetId::new(parts[3].clone())),
            (false, 3) => None,
            _ => return Err(KeyError::InvalidFormat(s.to_string())),
        };
        Ok(Self {
            scope: OwnerScopeId::new(parts[0].clone()),
            kind,
            entity: EntityId::new(parts[2].clone()),
            target,
        })
    }
}

fn escape_segment(s: &str) -> String {
    s.replace('\\', "\\\\").replace(':', "\\:")
}

/// Splits on unescaped `:` and unescapes the segments.
fn split_segments(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            cur.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ':' {
            parts.push(std::mem::take(&mut cur));
        } else {
            cur.push(c);
        }
    }
    parts.push(cur);
    parts
}

impl fmt::Display for WatcherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid watcher key format: {0} (expected scope:kind:entity[:target])")]
    InvalidFormat(String),
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),
}

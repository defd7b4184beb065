use std::sync::Arc;

use super::{EntityAttributes, EntityKind, Occupant, Projection, RawSnapshot};

/// Pure per-kind rendering strategy. `project` is total: missing optional
/// fields render as absent sections, never as an error. `is_empty` decides
/// whether the entity has gone quiet (no occupants, offline, event ended),
/// which takes priority over debouncing in the watcher.
pub trait ProjectionStrategy: Send + Sync {
    fn project(&self, snapshot: &RawSnapshot) -> Projection;
    fn is_empty(&self, snapshot: &RawSnapshot) -> bool;
}

pub fn strategy_for(kind: EntityKind) -> Arc<dyn ProjectionStrategy> {
    match kind {
        EntityKind::VoiceChannel => Arc::new(VoiceChannelProjector),
        EntityKind::Presence => Arc::new(PresenceProjector),
        EntityKind::ScheduledEvent => Arc::new(ScheduledEventProjector),
    }
}

pub struct VoiceChannelProjector;

impl ProjectionStrategy for VoiceChannelProjector {
    fn project(&self, snapshot: &RawSnapshot) -> Projection {
        let occupants = match &snapshot.attributes {
            EntityAttributes::VoiceChannel { occupants } => occupants.as_slice(),
            _ => &[],
        };

        let mut lines = vec![format!(
            "🔊 {} — {} in channel",
            snapshot.entity.name,
            occupants.len()
        )];
        for o in occupants {
            lines.push(occupant_line(o));
        }

        Projection::text(lines.join("\n"))
    }

    fn is_empty(&self, snapshot: &RawSnapshot) -> bool {
        match &snapshot.attributes {
            EntityAttributes::VoiceChannel { occupants } => occupants.is_empty(),
            _ => true,
        }
    }
}

fn occupant_line(o: &Occupant) -> String {
    let mut line = format!("• {}", o.display_name);
    if o.muted {
        line.push_str(" 🔇");
    }
    if let Some(activity) = &o.activity {
        line.push_str(&format!(" — {}", activity));
    }
    line
}

pub struct PresenceProjector;

impl ProjectionStrategy for PresenceProjector {
    fn project(&self, snapshot: &RawSnapshot) -> Projection {
        let (user_name, activity) = match &snapshot.attributes {
            EntityAttributes::Presence {
                user_name,
                activity,
                ..
            } => (user_name.as_str(), activity.as_deref()),
            _ => (snapshot.entity.name.as_str(), None),
        };

        let text = match activity {
            Some(a) => format!("🟢 {} is online — {}", user_name, a),
            None => format!("🟢 {} is online", user_name),
        };
        Projection::text(text)
    }

    fn is_empty(&self, snapshot: &RawSnapshot) -> bool {
        match &snapshot.attributes {
            EntityAttributes::Presence { online, .. } => !online,
            _ => true,
        }
    }
}

pub struct ScheduledEventProjector;

impl ProjectionStrategy for ScheduledEventProjector {
    fn project(&self, snapshot: &RawSnapshot) -> Projection {
        let (title, description, starts_at, location, cover_image, event_url) =
            match &snapshot.attributes {
                EntityAttributes::ScheduledEvent {
                    title,
                    description,
                    starts_at,
                    location,
                    cover_image,
                    event_url,
                    ..
                } => (
                    title.as_str(),
                    description.as_deref(),
                    *starts_at,
                    location.as_deref(),
                    cover_image.clone(),
                    event_url.clone(),
                ),
                _ => (snapshot.entity.name.as_str(), None, None, None, None, None),
            };

        let mut lines = vec![format!("📅 {}", title)];
        if let Some(t) = starts_at {
            lines.push(format!("🕒 {}", t.format("%Y-%m-%d %H:%M UTC")));
        }
        if let Some(loc) = location {
            lines.push(format!("📍 {}", loc));
        }
        if let Some(d) = description {
            lines.push(d.to_string());
        }

        Projection {
            rendered_text: lines.join("\n"),
            image_ref: cover_image,
            action_url: event_url,
        }
    }

    fn is_empty(&self, snapshot: &RawSnapshot) -> bool {
        match &snapshot.attributes {
            EntityAttributes::ScheduledEvent { ended, .. } => *ended,
            _ => true,
        }
    }
}

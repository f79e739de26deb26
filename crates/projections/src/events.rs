//! Management events persisted in `$` system streams.
//!
//! Layout:
//! - `$projections-$all`: `$ProjectionCreated`, `$ProjectionDeleted`
//! - `$projections-{name}`: `$ProjectionEnabled`, `$ProjectionDisabled`,
//!   `$ProjectionAborted`, `$ProjectionReset`
//! - `$projections-{name}-checkpoint`: `$ProjectionCheckpoint`

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use common::ProjectionName;
use event_store::{EventNumber, NewEvent, RecordedEvent};
use serde::{Deserialize, Serialize};

use crate::{Checkpoint, ProjectionDefinition};

pub const PROJECTION_CREATED: &str = "$ProjectionCreated";
pub const PROJECTION_DELETED: &str = "$ProjectionDeleted";
pub const PROJECTION_ENABLED: &str = "$ProjectionEnabled";
pub const PROJECTION_DISABLED: &str = "$ProjectionDisabled";
pub const PROJECTION_ABORTED: &str = "$ProjectionAborted";
pub const PROJECTION_RESET: &str = "$ProjectionReset";
pub const PROJECTION_CHECKPOINT: &str = "$ProjectionCheckpoint";

/// An event with a fixed `$` event type and a JSON body.
pub trait PersistedEvent: Sized {
    fn event_type(&self) -> &'static str;

    fn to_new_event(&self) -> Result<NewEvent, serde_json::Error>;

    /// Decodes a recorded event. Unknown event types decode to `None`.
    fn from_recorded(event: &RecordedEvent) -> Result<Option<Self>, serde_json::Error>;
}

/// Events of the registry stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    ProjectionCreated(ProjectionDefinition),
    ProjectionDeleted(ProjectionDeletedData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionDeletedData {
    pub name: ProjectionName,
    pub deleted_at: DateTime<Utc>,
}

impl PersistedEvent for RegistryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RegistryEvent::ProjectionCreated(_) => PROJECTION_CREATED,
            RegistryEvent::ProjectionDeleted(_) => PROJECTION_DELETED,
        }
    }

    fn to_new_event(&self) -> Result<NewEvent, serde_json::Error> {
        let builder = NewEvent::builder().event_type(self.event_type());
        let builder = match self {
            RegistryEvent::ProjectionCreated(definition) => builder.data(definition)?,
            RegistryEvent::ProjectionDeleted(data) => builder.data(data)?,
        };
        Ok(builder.build())
    }

    fn from_recorded(event: &RecordedEvent) -> Result<Option<Self>, serde_json::Error> {
        Ok(match event.event_type.as_str() {
            PROJECTION_CREATED => Some(RegistryEvent::ProjectionCreated(event.data_as()?)),
            PROJECTION_DELETED => Some(RegistryEvent::ProjectionDeleted(event.data_as()?)),
            _ => None,
        })
    }
}

/// Events of a projection's management stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementEvent {
    Enabled,
    Disabled,
    Aborted,
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManagementEventData {
    at: DateTime<Utc>,
}

impl PersistedEvent for ManagementEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ManagementEvent::Enabled => PROJECTION_ENABLED,
            ManagementEvent::Disabled => PROJECTION_DISABLED,
            ManagementEvent::Aborted => PROJECTION_ABORTED,
            ManagementEvent::Reset => PROJECTION_RESET,
        }
    }

    fn to_new_event(&self) -> Result<NewEvent, serde_json::Error> {
        Ok(NewEvent::builder()
            .event_type(self.event_type())
            .data(&ManagementEventData { at: Utc::now() })?
            .build())
    }

    fn from_recorded(event: &RecordedEvent) -> Result<Option<Self>, serde_json::Error> {
        Ok(match event.event_type.as_str() {
            PROJECTION_ENABLED => Some(ManagementEvent::Enabled),
            PROJECTION_DISABLED => Some(ManagementEvent::Disabled),
            PROJECTION_ABORTED => Some(ManagementEvent::Aborted),
            PROJECTION_RESET => Some(ManagementEvent::Reset),
            _ => None,
        })
    }
}

impl PersistedEvent for Checkpoint {
    fn event_type(&self) -> &'static str {
        PROJECTION_CHECKPOINT
    }

    fn to_new_event(&self) -> Result<NewEvent, serde_json::Error> {
        Ok(NewEvent::builder()
            .event_type(PROJECTION_CHECKPOINT)
            .data(self)?
            .build())
    }

    fn from_recorded(event: &RecordedEvent) -> Result<Option<Self>, serde_json::Error> {
        if event.event_type != PROJECTION_CHECKPOINT {
            return Ok(None);
        }
        event.data_as().map(Some)
    }
}

/// Enabled/aborted flags folded from a management stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistedMode {
    pub enabled: bool,
    pub aborted: bool,
}

impl PersistedMode {
    /// Applies one management event.
    pub fn apply(&mut self, event: ManagementEvent) {
        match event {
            ManagementEvent::Enabled => {
                self.enabled = true;
                self.aborted = false;
            }
            ManagementEvent::Disabled => self.enabled = false,
            ManagementEvent::Aborted => {
                self.enabled = false;
                self.aborted = true;
            }
            ManagementEvent::Reset => *self = PersistedMode::default(),
        }
    }

    /// Folds a management stream, ignoring unknown event types.
    pub fn from_events(events: &[RecordedEvent]) -> Result<Self, serde_json::Error> {
        let mut mode = PersistedMode::default();
        for event in events {
            if let Some(e) = ManagementEvent::from_recorded(event)? {
                mode.apply(e);
            }
        }
        Ok(mode)
    }
}

/// A definition known to the registry, with the event number it was written at.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredDefinition {
    pub event_number: EventNumber,
    pub definition: ProjectionDefinition,
}

/// Live definitions and tombstones folded from the registry stream.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub definitions: BTreeMap<ProjectionName, RegisteredDefinition>,
    pub deleted: HashSet<ProjectionName>,
}

impl Registry {
    pub fn apply(&mut self, event_number: EventNumber, event: RegistryEvent) {
        match event {
            RegistryEvent::ProjectionCreated(definition) => {
                if self.deleted.contains(&definition.name) {
                    return;
                }
                self.definitions
                    .entry(definition.name.clone())
                    .or_insert(RegisteredDefinition {
                        event_number,
                        definition,
                    });
            }
            RegistryEvent::ProjectionDeleted(data) => {
                self.definitions.remove(&data.name);
                self.deleted.insert(data.name);
            }
        }
    }

    /// Folds the registry stream, ignoring unknown event types.
    pub fn from_events(events: &[RecordedEvent]) -> Result<Self, serde_json::Error> {
        let mut registry = Registry::default();
        for event in events {
            if let Some(e) = RegistryEvent::from_recorded(event)? {
                registry.apply(event.event_number, e);
            }
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use common::{LogPosition, StreamId};
    use event_store::EventId;

    use super::*;
    use crate::ProjectionConfig;

    fn record(stream: StreamId, number: i64, new_event: NewEvent) -> RecordedEvent {
        RecordedEvent {
            event_id: EventId::new(),
            stream_id: stream,
            event_number: EventNumber::new(number),
            event_type: new_event.event_type,
            position: LogPosition::new(number, number),
            timestamp: Utc::now(),
            data: new_event.data,
            metadata: HashMap::new(),
        }
    }

    fn name(s: &str) -> ProjectionName {
        ProjectionName::new(s).unwrap()
    }

    #[test]
    fn mode_fold() {
        let mut mode = PersistedMode::default();
        mode.apply(ManagementEvent::Enabled);
        assert!(mode.enabled);
        mode.apply(ManagementEvent::Aborted);
        assert_eq!(
            mode,
            PersistedMode {
                enabled: false,
                aborted: true
            }
        );
        mode.apply(ManagementEvent::Reset);
        assert_eq!(mode, PersistedMode::default());
    }

    #[test]
    fn registry_fold_drops_tombstoned_names() {
        let stream = StreamId::projection_registry();
        let a = ProjectionDefinition::new(name("a"), "{}", ProjectionConfig::default());
        let b = ProjectionDefinition::new(name("b"), "{}", ProjectionConfig::default());
        let events = vec![
            record(
                stream.clone(),
                0,
                RegistryEvent::ProjectionCreated(a.clone()).to_new_event().unwrap(),
            ),
            record(
                stream.clone(),
                1,
                RegistryEvent::ProjectionCreated(b).to_new_event().unwrap(),
            ),
            record(
                stream.clone(),
                2,
                RegistryEvent::ProjectionDeleted(ProjectionDeletedData {
                    name: name("b"),
                    deleted_at: Utc::now(),
                })
                .to_new_event()
                .unwrap(),
            ),
        ];

        let registry = Registry::from_events(&events).unwrap();
        assert_eq!(registry.definitions.len(), 1);
        let registered = &registry.definitions[&name("a")];
        assert_eq!(registered.event_number, EventNumber::new(0));
        assert_eq!(registered.definition, a);
        assert!(registry.deleted.contains(&name("b")));
    }

    #[test]
    fn checkpoint_event_decodes() {
        let cp = Checkpoint {
            position: LogPosition::new(12, 12),
            state: serde_json::json!({"total": 3}),
            version: 4,
        };
        let recorded = record(
            name("a").checkpoint_stream(),
            0,
            cp.to_new_event().unwrap(),
        );
        assert_eq!(Checkpoint::from_recorded(&recorded).unwrap(), Some(cp));
    }

    #[test]
    fn unknown_event_types_are_ignored() {
        let other = NewEvent::builder()
            .event_type("SomethingElse")
            .data_raw(serde_json::json!({}))
            .build();
        let recorded = record(name("a").management_stream(), 0, other);
        assert_eq!(ManagementEvent::from_recorded(&recorded).unwrap(), None);
    }
}

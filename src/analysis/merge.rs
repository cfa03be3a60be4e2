//! Cross-path three-valued presence merge
//!
//! "Must" facts survive only when every path agrees; anything else is
//! "may". An entity a path never mentioned counts as absent on that path.

use super::continuity::{EntityLedger, EntityState};
use super::issue::EntityRef;
use crate::graph::SceneId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Merged presence of an entity across paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    DefinitelyPresent,
    PossiblyPresent,
    DefinitelyAbsent,
}

impl Presence {
    fn of(state: Option<EntityState>) -> Self {
        match state {
            Some(EntityState::Active) => Presence::DefinitelyPresent,
            Some(EntityState::Removed) | None => Presence::DefinitelyAbsent,
            Some(EntityState::Unknown | EntityState::BackgroundOnly) => Presence::PossiblyPresent,
        }
    }

    /// Meet of two paths' answers
    pub fn meet(self, other: Presence) -> Presence {
        if self == other {
            self
        } else {
            Presence::PossiblyPresent
        }
    }
}

/// One entity's merged presence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPresence {
    pub entity: EntityRef,
    pub presence: Presence,
    /// Scenes that introduced the entity on the merged paths
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub introduced_at: Vec<SceneId>,
}

/// Merged presence of every entity seen on any of the merged paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSummary {
    /// Keyed by canonical entity name
    entities: BTreeMap<String, EntityPresence>,
}

impl PresenceSummary {
    pub fn get(&self, key: &str) -> Option<&EntityPresence> {
        self.entities.get(key)
    }

    /// Presence of an entity; unseen entities are absent
    pub fn presence_of(&self, key: &str) -> Presence {
        self.entities
            .get(key)
            .map_or(Presence::DefinitelyAbsent, |e| e.presence)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityPresence)> {
        self.entities.iter().map(|(k, e)| (k.as_str(), e))
    }

    fn names_with(&self, presence: Presence) -> Vec<String> {
        self.entities
            .values()
            .filter(|e| e.presence == presence)
            .map(|e| e.entity.name.clone())
            .collect()
    }

    pub fn definitely_present(&self) -> Vec<String> {
        self.names_with(Presence::DefinitelyPresent)
    }

    pub fn possibly_present(&self) -> Vec<String> {
        self.names_with(Presence::PossiblyPresent)
    }

    pub fn definitely_absent(&self) -> Vec<String> {
        self.names_with(Presence::DefinitelyAbsent)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Merge the entity ledgers of several paths at one point
///
/// An empty input yields an empty summary.
pub fn merge_presence<'a>(ledgers: impl IntoIterator<Item = &'a EntityLedger>) -> PresenceSummary {
    let ledgers: Vec<&EntityLedger> = ledgers.into_iter().collect();
    let mut entities: BTreeMap<String, EntityPresence> = BTreeMap::new();

    for ledger in &ledgers {
        for (key, track) in ledger.iter() {
            let entry = entities.entry(key.to_string()).or_insert_with(|| EntityPresence {
                entity: track.entity_ref(),
                presence: Presence::of(Some(track.state)),
                introduced_at: Vec::new(),
            });
            if let Some(scene) = &track.introduced_at {
                if !entry.introduced_at.contains(scene) {
                    entry.introduced_at.push(scene.clone());
                }
            }
        }
    }

    for (key, entry) in entities.iter_mut() {
        entry.presence = ledgers
            .iter()
            .map(|ledger| Presence::of(ledger.state_of(key)))
            .fold(entry.presence, Presence::meet);
    }

    PresenceSummary { entities }
}

/// Presence at the entry and exit of one scene, across every path reaching it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneContinuity {
    pub entry: PresenceSummary,
    pub exit: PresenceSummary,
}

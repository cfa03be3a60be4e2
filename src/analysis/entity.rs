//! Narrative entities and the classifier's per-scene view of them
//!
//! The classification collaborator speaks in strings. Every field that has
//! a closed set of meanings is mapped here, once, into a sum type with an
//! explicit catch-all, so nothing downstream ever matches on raw strings.

use super::issue::Confidence;
use crate::graph::SceneId;
use serde::{Deserialize, Serialize};

/// What sort of thing an entity is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Character,
    Location,
    Item,
    Concept,
    #[serde(other)]
    Other,
}

/// What a scene does with an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityAction {
    /// First appearance, presented as new
    Introduced,
    /// Referred to as already known
    Continued,
    /// Leaves the story (dies, departs, is destroyed)
    Removed,
    /// Classifier could not tell
    Ambiguous,
    /// Wire value the engine does not know
    Unrecognized(String),
}

impl EntityAction {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "introduced" | "introduce" | "new" => EntityAction::Introduced,
            "continued" | "continue" | "existing" => EntityAction::Continued,
            "removed" | "remove" => EntityAction::Removed,
            "ambiguous" => EntityAction::Ambiguous,
            _ => EntityAction::Unrecognized(raw.to_string()),
        }
    }
}

impl From<String> for EntityAction {
    fn from(raw: String) -> Self {
        Self::from_wire(&raw)
    }
}

impl From<EntityAction> for String {
    fn from(action: EntityAction) -> Self {
        match action {
            EntityAction::Introduced => "introduced".to_string(),
            EntityAction::Continued => "continued".to_string(),
            EntityAction::Removed => "removed".to_string(),
            EntityAction::Ambiguous => "ambiguous".to_string(),
            EntityAction::Unrecognized(raw) => raw,
        }
    }
}

/// Where the classifier thinks an entity stands at the end of a scene
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityStatus {
    Active,
    Removed,
    #[default]
    Unknown,
    BackgroundOnly,
    Unrecognized(String),
}

impl EntityStatus {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "active" => EntityStatus::Active,
            "removed" => EntityStatus::Removed,
            "unknown" | "" => EntityStatus::Unknown,
            "background_only" | "background" => EntityStatus::BackgroundOnly,
            _ => EntityStatus::Unrecognized(raw.to_string()),
        }
    }
}

impl From<String> for EntityStatus {
    fn from(raw: String) -> Self {
        Self::from_wire(&raw)
    }
}

impl From<EntityStatus> for String {
    fn from(status: EntityStatus) -> Self {
        match status {
            EntityStatus::Active => "active".to_string(),
            EntityStatus::Removed => "removed".to_string(),
            EntityStatus::Unknown => "unknown".to_string(),
            EntityStatus::BackgroundOnly => "background_only".to_string(),
            EntityStatus::Unrecognized(raw) => raw,
        }
    }
}

/// Coarse bucket of narrative time elapsed within a scene
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TimeSpan {
    #[default]
    Moments,
    Hours,
    Days,
    Weeks,
    Years,
}

/// One entity mention in a scene, as classified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReference {
    pub name: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: EntityKind,
    #[serde(default)]
    pub is_proper_noun: bool,
    pub action: EntityAction,
    #[serde(default)]
    pub status_at_end: EntityStatus,
    #[serde(default = "default_confidence")]
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

fn default_kind() -> EntityKind {
    EntityKind::Other
}

fn default_confidence() -> Confidence {
    Confidence::Low
}

impl EntityReference {
    pub fn new(name: impl Into<String>, kind: EntityKind, action: EntityAction) -> Self {
        Self {
            name: name.into(),
            kind,
            is_proper_noun: false,
            action,
            status_at_end: EntityStatus::Unknown,
            confidence: Confidence::High,
            evidence: None,
        }
    }

    /// A named character
    pub fn character(name: impl Into<String>, action: EntityAction) -> Self {
        Self::new(name, EntityKind::Character, action).proper_noun()
    }

    pub fn proper_noun(mut self) -> Self {
        self.is_proper_noun = true;
        self
    }

    pub fn with_status(mut self, status: EntityStatus) -> Self {
        self.status_at_end = status;
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    /// Canonical key entities are tracked under
    pub fn key(&self) -> String {
        canonical_key(&self.name)
    }
}

/// Case- and whitespace-insensitive entity key
pub fn canonical_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The classifier's answer for one scene
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneEntityClassification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<SceneId>,
    #[serde(default)]
    pub entities: Vec<EntityReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_span: Option<TimeSpan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl SceneEntityClassification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: EntityReference) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_time_span(mut self, span: TimeSpan) -> Self {
        self.time_span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

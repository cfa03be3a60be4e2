//! Consistency issues and their grading

use super::entity::canonical_key;
use crate::graph::{SceneId, StructuralIssue};
use serde::{Deserialize, Serialize};

/// How bad an issue is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Lower the severity by `steps`, never below `Low`
    pub fn lowered(self, steps: u8) -> Self {
        let rank = (self as u8).saturating_sub(steps);
        match rank {
            0 => Severity::Low,
            1 => Severity::Medium,
            2 => Severity::High,
            _ => Severity::Critical,
        }
    }

    /// Scale a base severity by how sure the classifier was
    ///
    /// Low-confidence findings are demoted, not dropped.
    pub fn scaled(self, confidence: Confidence) -> Self {
        match confidence {
            Confidence::High => self,
            Confidence::Medium => self.lowered(1),
            Confidence::Low => self.lowered(2),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// How sure a collaborator was about a classification or finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Map the collaborator's wire value; anything unrecognised is `Low`
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Confidence::High,
            "medium" | "med" => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

impl From<String> for Confidence {
    fn from(raw: String) -> Self {
        Self::from_wire(&raw)
    }
}

/// Category of a consistency issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    EntityNotIntroduced,
    EntityReintroduced,
    EntityIncorrectlyRemoved,
    EntityUsedAsKnown,
    EntityAmbiguousUsage,
    TimeInconsistency,
    CausalInconsistency,
    EmotionalInconsistency,
    NarrativeInconsistency,
    /// Graph-shape problems: dangling branches, dead scenes, bad starts
    Structural,
    Other,
}

/// The entity an issue is about
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: String,
    pub kind: super::EntityKind,
}

/// A single consistency problem, ready for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyIssue {
    pub issue_type: IssueType,
    pub severity: Severity,
    /// Scenes involved; the first one anchors the issue
    pub scene_ids: Vec<SceneId>,
    /// Indices of the evaluated paths the issue was found on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityRef>,
    pub summary: String,
    #[serde(default)]
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    pub confidence: Confidence,
}

impl ConsistencyIssue {
    pub fn new(issue_type: IssueType, severity: Severity, summary: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity,
            scene_ids: Vec::new(),
            paths: Vec::new(),
            entity: None,
            summary: summary.into(),
            details: String::new(),
            evidence: None,
            suggested_fix: None,
            confidence: Confidence::High,
        }
    }

    pub fn at_scene(mut self, scene: SceneId) -> Self {
        self.scene_ids.push(scene);
        self
    }

    pub fn on_path(mut self, path: usize) -> Self {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
        self
    }

    pub fn with_entity(mut self, entity: EntityRef) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    pub fn with_suggested_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    /// Scene the issue is anchored on
    pub fn primary_scene(&self) -> Option<&SceneId> {
        self.scene_ids.first()
    }

    /// Key under which the same problem found on several paths collapses
    pub fn dedup_key(&self) -> (IssueType, Option<SceneId>, Option<String>) {
        (
            self.issue_type,
            self.primary_scene().cloned(),
            self.entity.as_ref().map(|e| canonical_key(&e.name)),
        )
    }

    /// True if the issue alone makes a scenario inconsistent
    pub fn is_blocking(&self) -> bool {
        self.severity >= Severity::High
    }
}

impl From<&StructuralIssue> for ConsistencyIssue {
    fn from(issue: &StructuralIssue) -> Self {
        let mut out = ConsistencyIssue::new(IssueType::Structural, issue.severity, issue.summary());
        if let Some(scene) = issue.scene_id() {
            out = out.at_scene(scene.clone());
        }
        out
    }
}

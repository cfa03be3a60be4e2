//! Collaborator traits: the entity classifier and the narrative evaluator
//!
//! Both are external, I/O-bound services. The engine only ever sees them
//! through these traits, and a missing service is an implementation
//! ([`NullClassifier`]) rather than an `Option` threaded through the code.

use super::entity::SceneEntityClassification;
use super::issue::ConsistencyIssue;
use super::prefix::PrefixSummary;
use crate::graph::{ScenarioGraph, ScenarioId, Scene, SceneId};
use crate::query::Path;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Errors from the entity classification service
#[derive(Debug, Clone, Error)]
pub enum ClassifyError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("classification failed: {0}")]
    Failed(String),
    #[error("classification timed out after {0}s")]
    Timeout(u64),
}

/// Errors from the narrative-logic evaluator
#[derive(Debug, Clone, Error)]
pub enum EvaluatorError {
    #[error("narrative evaluator unavailable: {0}")]
    Unavailable(String),
    #[error("narrative evaluation failed: {0}")]
    Failed(String),
    #[error("narrative evaluation timed out after {0}s")]
    Timeout(u64),
}

/// What the classifier is asked about: one scene, in the light of the
/// path prefix that leads to it
#[derive(Debug)]
pub struct ClassificationRequest<'a> {
    pub scenario_id: &'a ScenarioId,
    pub scene: &'a Scene,
    /// Scenes before `scene` on this prefix, start first
    pub preceding: &'a [SceneId],
    /// Continuity state at the end of `preceding`
    pub prior: &'a PrefixSummary,
}

/// Classifies which narrative entities a scene introduces, continues or removes
#[async_trait]
pub trait EntityClassifier: Send + Sync {
    /// Unique identifier for this classifier
    fn id(&self) -> &str;

    /// False when the service is switched off; the engine then skips
    /// entity analysis altogether
    fn is_enabled(&self) -> bool {
        true
    }

    async fn classify(
        &self,
        request: &ClassificationRequest<'_>,
    ) -> Result<SceneEntityClassification, ClassifyError>;
}

/// What the narrative evaluator is asked about: one enumerated path
#[derive(Debug)]
pub struct NarrativeRequest<'a> {
    pub graph: &'a ScenarioGraph,
    pub path: &'a Path,
    pub path_index: usize,
}

/// Supplies causal, emotional, temporal and general narrative findings
#[async_trait]
pub trait NarrativeEvaluator: Send + Sync {
    fn id(&self) -> &str;

    async fn evaluate(
        &self,
        request: &NarrativeRequest<'_>,
    ) -> Result<Vec<ConsistencyIssue>, EvaluatorError>;
}

/// Stand-in used when no classification service is configured
///
/// Reports nothing about any scene.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClassifier;

#[async_trait]
impl EntityClassifier for NullClassifier {
    fn id(&self) -> &str {
        "null"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn classify(
        &self,
        _request: &ClassificationRequest<'_>,
    ) -> Result<SceneEntityClassification, ClassifyError> {
        Ok(SceneEntityClassification::new())
    }
}

/// Classifier that answers from a fixed per-scene table
///
/// Ignores the prefix: every path sees the same classification for a
/// scene. Scenes missing from the table classify as empty; scenes marked
/// failing return [`ClassifyError::Failed`].
#[derive(Debug, Default)]
pub struct StaticClassifier {
    scenes: HashMap<SceneId, SceneEntityClassification>,
    failing: HashSet<SceneId>,
    calls: AtomicUsize,
}

impl StaticClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the classification for a scene
    pub fn with_scene(
        mut self,
        scene: impl Into<SceneId>,
        classification: SceneEntityClassification,
    ) -> Self {
        self.scenes.insert(scene.into(), classification);
        self
    }

    /// Make classification of a scene fail
    pub fn with_failure(mut self, scene: impl Into<SceneId>) -> Self {
        self.failing.insert(scene.into());
        self
    }

    /// Load a table from JSON: an object keyed by scene id, or a list of
    /// classifications that carry their own `scene_id`
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let mut classifier = Self::new();
        if value.is_array() {
            let list: Vec<SceneEntityClassification> = serde_json::from_value(value)?;
            for classification in list {
                if let Some(scene) = classification.scene_id.clone() {
                    classifier.scenes.insert(scene, classification);
                }
            }
        } else {
            classifier.scenes = serde_json::from_value(value)?;
        }
        Ok(classifier)
    }

    /// Number of `classify` calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityClassifier for StaticClassifier {
    fn id(&self) -> &str {
        "static"
    }

    async fn classify(
        &self,
        request: &ClassificationRequest<'_>,
    ) -> Result<SceneEntityClassification, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scene = &request.scene.id;
        if self.failing.contains(scene) {
            return Err(ClassifyError::Failed(format!("no classification for '{}'", scene)));
        }
        Ok(self.scenes.get(scene).cloned().unwrap_or_default())
    }
}

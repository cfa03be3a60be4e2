//! Memoized continuity state at path prefixes
//!
//! Paths through a branching scenario share long prefixes. Each distinct
//! prefix is classified and folded exactly once; every path that shares it
//! reuses the same immutable summary.

use super::continuity::{fold_scene, EntityLedger};
use super::entity::{SceneEntityClassification, TimeSpan};
use super::issue::{Confidence, ConsistencyIssue, IssueType, Severity};
use super::merge::{merge_presence, PresenceSummary};
use super::traits::{ClassificationRequest, ClassifyError, EntityClassifier};
use super::types::{EngineError, EngineResult};
use crate::cancel::CancellationToken;
use crate::graph::{ScenarioGraph, SceneId};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, warn};

/// Continuity state at the end of one path prefix
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrefixSummary {
    pub prefix: Vec<SceneId>,
    pub ledger: EntityLedger,
    /// Presence along this one prefix
    pub presence: PresenceSummary,
    pub notes: Vec<String>,
    /// Coarsest elapsed-time bucket seen so far
    pub time_span: Option<TimeSpan>,
    /// Findings raised at the last scene of the prefix
    pub findings: Vec<ConsistencyIssue>,
}

impl PrefixSummary {
    /// Summary before the first scene
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn last_scene(&self) -> Option<&SceneId> {
        self.prefix.last()
    }

    pub fn definitely_present(&self) -> Vec<String> {
        self.presence.definitely_present()
    }

    pub fn maybe_present(&self) -> Vec<String> {
        self.presence.possibly_present()
    }

    pub fn definitely_absent(&self) -> Vec<String> {
        self.presence.definitely_absent()
    }

    /// Summary of this prefix extended by one classified scene
    pub fn extend(&self, scene: &SceneId, classification: &SceneEntityClassification) -> Self {
        let (ledger, findings) = fold_scene(&self.ledger, scene, classification);
        let presence = merge_presence(std::iter::once(&ledger));

        let mut prefix = self.prefix.clone();
        prefix.push(scene.clone());
        let mut notes = self.notes.clone();
        notes.extend(classification.notes.iter().map(|note| format!("{}: {}", scene, note)));

        Self {
            prefix,
            ledger,
            presence,
            notes,
            time_span: self.time_span.max(classification.time_span),
            findings,
        }
    }

    /// Summary of this prefix extended by a scene that could not be classified
    fn extend_unclassified(&self, scene: &SceneId, finding: ConsistencyIssue) -> Self {
        let mut next = self.extend(scene, &SceneEntityClassification::new());
        next.findings.push(finding);
        next
    }
}

type SummaryCell = Arc<OnceCell<Arc<PrefixSummary>>>;

/// Compute-once cache of prefix summaries for one scenario
///
/// Concurrent requests for the same uncomputed prefix share one
/// classification call. A cancelled computation leaves its cell empty.
pub struct PrefixSummaryEngine {
    scenario: Arc<ScenarioGraph>,
    classifier: Arc<dyn EntityClassifier>,
    /// Limits classifier calls in flight
    permits: Arc<Semaphore>,
    timeout: Duration,
    cancel: CancellationToken,
    cells: DashMap<Vec<SceneId>, SummaryCell>,
    classifications: AtomicUsize,
    hits: AtomicUsize,
}

impl PrefixSummaryEngine {
    pub fn new(
        scenario: Arc<ScenarioGraph>,
        classifier: Arc<dyn EntityClassifier>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            scenario,
            classifier,
            permits: Arc::new(Semaphore::new(4)),
            timeout: Duration::from_secs(30),
            cancel,
            cells: DashMap::new(),
            classifications: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
        }
    }

    /// Share a rate-limit semaphore with other engines
    pub fn with_permits(mut self, permits: Arc<Semaphore>) -> Self {
        self.permits = permits;
        self
    }

    pub fn with_concurrency(self, limit: usize) -> Self {
        self.with_permits(Arc::new(Semaphore::new(limit.max(1))))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Summary for a prefix, computing any missing ancestors first
    pub async fn get_or_compute(&self, prefix: &[SceneId]) -> EngineResult<Arc<PrefixSummary>> {
        let mut along = self.summaries_along(prefix).await?;
        Ok(along.pop().unwrap_or_else(|| Arc::new(PrefixSummary::empty())))
    }

    /// Summaries for every prefix of a path, shortest first
    pub async fn summaries_along(&self, scenes: &[SceneId]) -> EngineResult<Vec<Arc<PrefixSummary>>> {
        let mut out: Vec<Arc<PrefixSummary>> = Vec::with_capacity(scenes.len());
        let root = Arc::new(PrefixSummary::empty());

        for end in 1..=scenes.len() {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let key = &scenes[..end];
            let parent = out.last().cloned().unwrap_or_else(|| root.clone());
            let cell = self.cell(key);
            if cell.initialized() {
                self.hits.fetch_add(1, Ordering::Relaxed);
            }
            let summary = cell
                .get_or_try_init(|| async { self.compute(&parent, key).await.map(Arc::new) })
                .await?
                .clone();
            out.push(summary);
        }
        Ok(out)
    }

    /// Already-computed summary for a prefix, if any
    pub fn cached(&self, prefix: &[SceneId]) -> Option<Arc<PrefixSummary>> {
        self.cells.get(prefix).and_then(|cell| cell.value().get().cloned())
    }

    /// Number of prefixes with a computed summary
    pub fn len(&self) -> usize {
        self.cells.iter().filter(|cell| cell.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classifier calls made so far
    pub fn classifications(&self) -> usize {
        self.classifications.load(Ordering::SeqCst)
    }

    /// Lookups answered from the cache
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    fn cell(&self, key: &[SceneId]) -> SummaryCell {
        if let Some(cell) = self.cells.get(key) {
            return cell.value().clone();
        }
        self.cells.entry(key.to_vec()).or_default().value().clone()
    }

    async fn compute(&self, parent: &PrefixSummary, prefix: &[SceneId]) -> EngineResult<PrefixSummary> {
        let Some((scene_id, preceding)) = prefix.split_last() else {
            return Ok(parent.clone());
        };
        debug!(scene_id = %scene_id, depth = prefix.len(), "Computing prefix summary");

        let Some(scene) = self.scenario.scene(scene_id) else {
            let finding = unclassified(scene_id, "scene is not part of the scenario");
            return Ok(parent.extend_unclassified(scene_id, finding));
        };

        let request = ClassificationRequest {
            scenario_id: &self.scenario.id,
            scene,
            preceding,
            prior: parent,
        };
        match self.classify(&request).await? {
            Ok(classification) => Ok(parent.extend(scene_id, &classification)),
            Err(e) => {
                warn!(
                    scene_id = %scene_id,
                    classifier = self.classifier.id(),
                    error = %e,
                    "Entity classification failed"
                );
                Ok(parent.extend_unclassified(scene_id, unclassified(scene_id, &e.to_string())))
            }
        }
    }

    /// One rate-limited, time-boxed classifier call, abandoned on cancellation
    async fn classify(
        &self,
        request: &ClassificationRequest<'_>,
    ) -> EngineResult<Result<SceneEntityClassification, ClassifyError>> {
        let call = async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| ClassifyError::Unavailable(format!("Semaphore error: {}", e)))?;
            self.classifications.fetch_add(1, Ordering::SeqCst);
            match tokio::time::timeout(self.timeout, self.classifier.classify(request)).await {
                Ok(result) => result,
                Err(_) => Err(ClassifyError::Timeout(self.timeout.as_secs())),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            result = call => Ok(result),
        }
    }
}

impl std::fmt::Debug for PrefixSummaryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixSummaryEngine")
            .field("scenario", &self.scenario.id)
            .field("classifier", &self.classifier.id())
            .field("prefixes", &self.cells.len())
            .finish()
    }
}

fn unclassified(scene: &SceneId, reason: &str) -> ConsistencyIssue {
    ConsistencyIssue::new(
        IssueType::Other,
        Severity::Low,
        format!("Entities in '{}' could not be classified", scene),
    )
    .at_scene(scene.clone())
    .with_details(reason)
    .with_confidence(Confidence::Low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{EntityAction, EntityReference, StaticClassifier};
    use crate::graph::Scene;

    fn ids(raw: &[&str]) -> Vec<SceneId> {
        raw.iter().map(|s| SceneId::from(*s)).collect()
    }

    fn setup(classifier: StaticClassifier) -> (PrefixSummaryEngine, Arc<StaticClassifier>) {
        let graph = ScenarioGraph::new(
            "diamond",
            vec![
                Scene::new("start").leads_to("a").leads_to("b"),
                Scene::new("a").leads_to("end"),
                Scene::new("b").leads_to("end"),
                Scene::new("end"),
            ],
        )
        .unwrap();
        let classifier = Arc::new(classifier);
        let engine = PrefixSummaryEngine::new(
            Arc::new(graph),
            classifier.clone(),
            CancellationToken::new(),
        );
        (engine, classifier)
    }

    fn mara_in_a() -> StaticClassifier {
        StaticClassifier::new().with_scene(
            "a",
            SceneEntityClassification::new()
                .with_entity(EntityReference::character("Mara", EntityAction::Introduced))
                .with_time_span(TimeSpan::Days),
        )
    }

    #[tokio::test]
    async fn test_shared_prefix_classified_once() {
        let (engine, classifier) = setup(mara_in_a());

        engine.get_or_compute(&ids(&["start", "a", "end"])).await.unwrap();
        engine.get_or_compute(&ids(&["start", "b", "end"])).await.unwrap();

        // start, start/a, start/a/end, start/b, start/b/end
        assert_eq!(classifier.calls(), 5);
        assert_eq!(engine.classifications(), 5);
        assert_eq!(engine.len(), 5);
        assert!(engine.hits() >= 1);
    }

    #[tokio::test]
    async fn test_repeat_is_value_equal() {
        let (engine, classifier) = setup(mara_in_a());
        let prefix = ids(&["start", "a", "end"]);

        let first = engine.get_or_compute(&prefix).await.unwrap();
        let second = engine.get_or_compute(&prefix).await.unwrap();

        assert_eq!(*first, *second);
        assert_eq!(classifier.calls(), 3);
        assert_eq!(first.definitely_present(), vec!["Mara".to_string()]);
        assert_eq!(first.time_span, Some(TimeSpan::Days));
    }

    #[tokio::test]
    async fn test_failed_classification_becomes_low_finding() {
        let (engine, classifier) = setup(StaticClassifier::new().with_failure("a"));
        let prefix = ids(&["start", "a"]);

        let summary = engine.get_or_compute(&prefix).await.unwrap();
        assert_eq!(summary.findings.len(), 1);
        assert_eq!(summary.findings[0].issue_type, IssueType::Other);
        assert_eq!(summary.findings[0].severity, Severity::Low);
        assert_eq!(summary.findings[0].confidence, Confidence::Low);

        // Cached, not retried
        engine.get_or_compute(&prefix).await.unwrap();
        assert_eq!(classifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_leaves_no_summary() {
        let (engine, _) = setup(mara_in_a());
        engine.cancel.cancel();

        let result = engine.get_or_compute(&ids(&["start"])).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(engine.cached(&ids(&["start"])).is_none());
        assert!(engine.is_empty());
    }
}

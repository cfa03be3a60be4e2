//! End-to-end evaluations of small authored scenarios

mod common;

use async_trait::async_trait;
use common::{continues, diamond, introduces, linear, self_loop, CountingClassifier};
use plotline::analysis::{
    Assessment, Confidence, ConsistencyIssue, EngineError, EvaluationRequest, EvaluatorError,
    IssueType, NarrativeEvaluator, NarrativeRequest, Presence, Severity, StaticClassifier,
};
use plotline::graph::{InMemoryScenarioStore, ScenarioGraph, Scene, SceneId};
use plotline::query::PathTermination;
use plotline::{CancellationToken, ConsistencyEvaluator, EngineConfig};
use std::sync::Arc;
use std::time::Duration;

fn evaluator_for(graph: ScenarioGraph) -> ConsistencyEvaluator {
    let store = Arc::new(InMemoryScenarioStore::new());
    store.insert(graph);
    ConsistencyEvaluator::new(store)
}

fn scene(id: &str) -> SceneId {
    SceneId::from(id)
}

#[tokio::test]
async fn test_linear_scenario_is_clean() {
    let evaluator = evaluator_for(linear()).with_classifier(Arc::new(
        StaticClassifier::new()
            .with_scene("start", introduces("Mara"))
            .with_scene("middle", continues("Mara"))
            .with_scene("end", continues("Mara")),
    ));

    let response = evaluator.evaluate(&EvaluationRequest::new("linear")).await;
    assert!(response.success);
    let result = response.result.unwrap();

    let end = result.scene(&scene("end")).unwrap();
    assert_eq!(end.dominators, vec![scene("start"), scene("middle"), scene("end")]);
    assert_eq!(end.immediate_dominator, Some(scene("middle")));
    assert_eq!(end.continuity.entry.presence_of("mara"), Presence::DefinitelyPresent);

    assert!(result.issues.is_empty());
    assert_eq!(result.score, 1.0);
    assert_eq!(result.assessment, Assessment::Ok);
    assert!(result.is_consistent);
    assert!(result.fully_explored());
}

#[tokio::test]
async fn test_optional_introduction_is_possibly_present() {
    let evaluator = evaluator_for(diamond()).with_classifier(Arc::new(
        StaticClassifier::new()
            .with_scene("a", introduces("Mara"))
            .with_scene("end", continues("Mara")),
    ));

    let result = evaluator
        .evaluate(&EvaluationRequest::new("diamond"))
        .await
        .result
        .unwrap();

    let end = result.scene(&scene("end")).unwrap();
    assert_eq!(end.dominators, vec![scene("start"), scene("end")]);
    assert_eq!(end.immediate_dominator, Some(scene("start")));
    assert_eq!(end.continuity.entry.presence_of("mara"), Presence::PossiblyPresent);

    let used: Vec<&ConsistencyIssue> = result.issues_of_type(IssueType::EntityUsedAsKnown).collect();
    assert_eq!(used.len(), 1);
    assert!(used[0].severity >= Severity::Medium);
    assert_eq!(used[0].primary_scene(), Some(&scene("end")));
    assert_eq!(used[0].entity.as_ref().map(|e| e.name.as_str()), Some("Mara"));
    assert!(!result.is_consistent);

    // Only the path through B carries the issue
    assert!(result.paths[0].issues.is_empty());
    assert_eq!(result.paths[1].issues.len(), 1);
    assert_eq!(result.paths[0].assessment, Assessment::Ok);
}

#[tokio::test]
async fn test_cycle_truncates_and_caps_assessment() {
    let evaluator = evaluator_for(self_loop());
    let result = evaluator
        .evaluate(&EvaluationRequest::new("loop"))
        .await
        .result
        .unwrap();

    assert_eq!(result.paths.len(), 2);
    let looped = &result.paths[0];
    assert!(looped.truncated);
    assert_eq!(
        looped.path.termination,
        PathTermination::Cycle { revisit: scene("x") }
    );
    assert_eq!(looped.assessment, Assessment::HasMinorIssues);
    assert!(!result.paths[1].truncated);

    assert_eq!(result.truncation.cycle_cuts, 1);
    assert!(result.issues.is_empty());
    assert_eq!(result.assessment, Assessment::HasMinorIssues);
    assert!(!result.fully_explored());
}

#[tokio::test]
async fn test_classification_failure_is_absorbed() {
    let evaluator = evaluator_for(diamond())
        .with_classifier(Arc::new(StaticClassifier::new().with_failure("a")));

    let response = evaluator.evaluate(&EvaluationRequest::new("diamond")).await;
    assert!(response.success);
    let result = response.result.unwrap();

    let failures: Vec<_> = result.issues_of_type(IssueType::Other).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].severity, Severity::Low);
    assert_eq!(failures[0].primary_scene(), Some(&scene("a")));
    assert!(result.is_consistent);
}

#[tokio::test(start_paused = true)]
async fn test_slow_classifier_times_out_as_low_finding() {
    let config = EngineConfig::from_yaml("classification:\n  timeout_secs: 1\n").unwrap();
    let graph = ScenarioGraph::new("single", vec![Scene::new("only")]).unwrap();
    let classifier = Arc::new(CountingClassifier::new().with_delay(Duration::from_secs(60)));
    let evaluator = evaluator_for(graph)
        .with_config(config)
        .with_classifier(classifier.clone());

    let response = evaluator.evaluate(&EvaluationRequest::new("single")).await;
    assert!(response.success);
    let result = response.result.unwrap();

    assert_eq!(classifier.calls(), 1);
    assert_eq!(result.issues.len(), 1);
    let timed_out = &result.issues[0];
    assert_eq!(timed_out.issue_type, IssueType::Other);
    assert_eq!(timed_out.severity, Severity::Low);
    assert_eq!(timed_out.confidence, Confidence::Low);
    assert_eq!(timed_out.primary_scene(), Some(&scene("only")));
    assert!(timed_out.details.contains("timed out"));
    assert!(result.is_consistent);
}

#[tokio::test]
async fn test_entity_analysis_can_be_switched_off() {
    let classifier = Arc::new(CountingClassifier::new().with_scene("end", continues("Mara")));
    let evaluator = evaluator_for(diamond()).with_classifier(classifier.clone());

    let request = EvaluationRequest::new("diamond").without_entity_analysis();
    let result = evaluator.evaluate(&request).await.result.unwrap();

    assert_eq!(classifier.calls(), 0);
    assert!(result.issues.is_empty());
    assert_eq!(result.scene(&scene("end")).unwrap().dominators.len(), 2);
}

#[tokio::test]
async fn test_disabled_classification_config_skips_classifier() {
    let config = EngineConfig::from_yaml("classification:\n  enabled: false\n").unwrap();
    let classifier = Arc::new(CountingClassifier::new());
    let evaluator = evaluator_for(linear())
        .with_config(config)
        .with_classifier(classifier.clone());

    let response = evaluator.evaluate(&EvaluationRequest::new("linear")).await;
    assert!(response.success);
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_shared_prefixes_classified_once_per_evaluation() {
    let classifier = Arc::new(CountingClassifier::new());
    let evaluator = evaluator_for(diamond()).with_classifier(classifier.clone());

    evaluator.evaluate(&EvaluationRequest::new("diamond")).await;
    // start, start-a, start-a-end, start-b, start-b-end
    assert_eq!(classifier.calls(), 5);
    assert_eq!(classifier.max_calls_per_prefix(), 1);
}

#[tokio::test]
async fn test_cancellation_fails_without_partial_result() {
    let classifier = Arc::new(CountingClassifier::new().with_delay(Duration::from_secs(5)));
    let evaluator = evaluator_for(diamond()).with_classifier(classifier);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let response = evaluator
        .evaluate_with_cancel(&EvaluationRequest::new("diamond"), cancel)
        .await;
    assert!(!response.success);
    assert!(response.result.is_none());
    assert_eq!(response.error, Some(EngineError::Cancelled.to_string()));
}

#[tokio::test]
async fn test_depth_limit_is_reported() {
    let evaluator = evaluator_for(linear());
    let request = EvaluationRequest::new("linear").with_max_depth(2);
    let result = evaluator.evaluate(&request).await.result.unwrap();

    assert_eq!(result.paths.len(), 1);
    assert_eq!(result.paths[0].path.termination, PathTermination::DepthLimit);
    assert_eq!(result.truncation.depth_cuts, 1);
    assert_eq!(result.assessment, Assessment::HasMinorIssues);
}

#[tokio::test]
async fn test_structural_issues_are_reported() {
    let graph = ScenarioGraph::from_json(
        r#"{
            "id": "broken",
            "scenes": [
                { "id": "start", "branches": [ { "next_scene_id": "gone" }, { "next_scene_id": "end" } ] },
                { "id": "end", "branches": [] },
                { "id": "orphan", "branches": [ { "next_scene_id": "end" } ] }
            ],
            "start_scene_ids": ["start"]
        }"#,
    )
    .unwrap();
    let evaluator = evaluator_for(graph);

    let result = evaluator
        .evaluate(&EvaluationRequest::new("broken"))
        .await
        .result
        .unwrap();

    let structural: Vec<_> = result.issues_of_type(IssueType::Structural).collect();
    assert_eq!(structural.len(), 2);
    assert!(result.truncation.unreached_scenes.contains(&scene("orphan")));
    assert!(result.is_consistent);
}

/// Flags every path that passes through a given scene
struct SceneFlagger {
    scene: SceneId,
}

#[async_trait]
impl NarrativeEvaluator for SceneFlagger {
    fn id(&self) -> &str {
        "scene-flagger"
    }

    async fn evaluate(
        &self,
        request: &NarrativeRequest<'_>,
    ) -> Result<Vec<ConsistencyIssue>, EvaluatorError> {
        if request.path.contains(&self.scene) {
            Ok(vec![ConsistencyIssue::new(
                IssueType::CausalInconsistency,
                Severity::Medium,
                "The storm ends before it starts",
            )
            .at_scene(self.scene.clone())])
        } else {
            Ok(Vec::new())
        }
    }
}

struct Unreachable;

#[async_trait]
impl NarrativeEvaluator for Unreachable {
    fn id(&self) -> &str {
        "unreachable"
    }

    async fn evaluate(&self, _request: &NarrativeRequest<'_>) -> Result<Vec<ConsistencyIssue>, EvaluatorError> {
        Err(EvaluatorError::Unavailable("connection refused".to_string()))
    }
}

/// Never answers within any reasonable timeout
struct Stalled;

#[async_trait]
impl NarrativeEvaluator for Stalled {
    fn id(&self) -> &str {
        "stalled"
    }

    async fn evaluate(&self, _request: &NarrativeRequest<'_>) -> Result<Vec<ConsistencyIssue>, EvaluatorError> {
        tokio::time::sleep(Duration::from_secs(120)).await;
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_narrative_findings_are_merged() {
    let evaluator = evaluator_for(diamond()).with_narrative_evaluator(Arc::new(SceneFlagger {
        scene: scene("b"),
    }));

    let result = evaluator
        .evaluate(&EvaluationRequest::new("diamond"))
        .await
        .result
        .unwrap();

    let causal: Vec<_> = result.issues_of_type(IssueType::CausalInconsistency).collect();
    assert_eq!(causal.len(), 1);
    assert_eq!(causal[0].paths, vec![1]);
    assert_eq!(result.assessment, Assessment::HasMinorIssues);
    assert!(result.is_consistent);

    let skipped = evaluator
        .evaluate(&EvaluationRequest::new("diamond").without_narrative_analysis())
        .await
        .result
        .unwrap();
    assert!(skipped.issues.is_empty());
}

#[tokio::test]
async fn test_narrative_failure_is_absorbed() {
    let evaluator = evaluator_for(linear()).with_narrative_evaluator(Arc::new(Unreachable));

    let response = evaluator.evaluate(&EvaluationRequest::new("linear")).await;
    assert!(response.success);
    let result = response.result.unwrap();

    let other: Vec<_> = result.issues_of_type(IssueType::Other).collect();
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].severity, Severity::Low);
    assert!(result.is_consistent);
}

#[tokio::test(start_paused = true)]
async fn test_slow_narrative_evaluator_times_out() {
    let config = EngineConfig::from_yaml("narrative:\n  timeout_secs: 1\n").unwrap();
    let evaluator = evaluator_for(diamond())
        .with_config(config)
        .with_narrative_evaluator(Arc::new(Stalled));

    let response = evaluator.evaluate(&EvaluationRequest::new("diamond")).await;
    assert!(response.success);
    let result = response.result.unwrap();

    // Both paths start at the same scene, so their failures collapse into one
    let other: Vec<_> = result.issues_of_type(IssueType::Other).collect();
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].paths, vec![0, 1]);
    assert_eq!(other[0].severity, Severity::Low);
    assert_eq!(other[0].confidence, Confidence::Low);
    assert_eq!(other[0].details, EvaluatorError::Timeout(1).to_string());
    assert!(result.is_consistent);
}

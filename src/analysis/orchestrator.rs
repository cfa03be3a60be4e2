//! Consistency evaluator: runs the full pipeline for one scenario
//!
//! Path enumeration and dominance are computed on the calling task, in a
//! fixed order. Entity continuity and narrative evaluation fan out across
//! paths, with classifier calls rate limited; results are put back in path
//! order before aggregation so output never depends on scheduling.

use super::context::EvaluationContext;
use super::continuity::EntityLedger;
use super::dominators::{DominatorAnalyzer, DominatorMap};
use super::entity::canonical_key;
use super::issue::{Confidence, ConsistencyIssue, IssueType, Severity};
use super::merge::{merge_presence, Presence, SceneContinuity};
use super::prefix::{PrefixSummary, PrefixSummaryEngine};
use super::scoring::ConsistencyScorer;
use super::traits::{
    EntityClassifier, EvaluatorError, NarrativeEvaluator, NarrativeRequest, NullClassifier,
};
use super::types::{
    EngineError, EngineResult, EvaluationRequest, EvaluationResponse, EvaluationResult, PathResult,
    SceneReport, TruncationReport,
};
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::graph::{ScenarioGraph, ScenarioStore, SceneId};
use crate::query::{check_explicit_path, EnumerationStats, Path, PathEnumerator, PathTermination};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// How often enumeration checks for cancellation, in paths
const CANCEL_CHECK_INTERVAL: usize = 64;

type Timeline = Vec<Arc<PrefixSummary>>;

/// Evaluates scenarios for story consistency
pub struct ConsistencyEvaluator {
    store: Arc<dyn ScenarioStore>,
    classifier: Arc<dyn EntityClassifier>,
    narrative: Option<Arc<dyn NarrativeEvaluator>>,
    config: EngineConfig,
    scorer: ConsistencyScorer,
    /// Shared across evaluations so the collaborators' rate limit holds globally
    permits: Arc<Semaphore>,
}

impl ConsistencyEvaluator {
    /// Evaluator with no classifier and no narrative evaluator
    pub fn new(store: Arc<dyn ScenarioStore>) -> Self {
        let config = EngineConfig::default();
        Self {
            store,
            classifier: Arc::new(NullClassifier),
            narrative: None,
            permits: Arc::new(Semaphore::new(config.classification.max_concurrency)),
            config,
            scorer: ConsistencyScorer::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn EntityClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_narrative_evaluator(mut self, evaluator: Arc<dyn NarrativeEvaluator>) -> Self {
        self.narrative = Some(evaluator);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.permits = Arc::new(Semaphore::new(config.classification.max_concurrency.max(1)));
        self.config = config;
        self
    }

    pub fn with_scorer(mut self, scorer: ConsistencyScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate a stored scenario; failures come back in the response
    pub async fn evaluate(&self, request: &EvaluationRequest) -> EvaluationResponse {
        self.evaluate_with_cancel(request, CancellationToken::new()).await
    }

    #[instrument(skip(self, request, cancel), fields(scenario_id = %request.scenario_id))]
    pub async fn evaluate_with_cancel(
        &self,
        request: &EvaluationRequest,
        cancel: CancellationToken,
    ) -> EvaluationResponse {
        let outcome = async {
            let graph = self.store.load(&request.scenario_id).await?;
            self.evaluate_graph(graph, request, cancel).await
        }
        .await;

        match outcome {
            Ok(result) => EvaluationResponse::succeeded(result),
            Err(e) => {
                warn!(error = %e, "Evaluation failed");
                EvaluationResponse::failed(e.to_string())
            }
        }
    }

    /// Evaluate an already-loaded scenario
    #[instrument(skip_all, fields(scenario_id = %graph.id))]
    pub async fn evaluate_graph(
        &self,
        graph: Arc<ScenarioGraph>,
        request: &EvaluationRequest,
        cancel: CancellationToken,
    ) -> EngineResult<EvaluationResult> {
        let bounds = self.config.bounds_for(request.max_depth, request.max_paths);
        info!(
            scenes = graph.scene_count(),
            max_depth = bounds.max_depth,
            max_paths = bounds.max_paths,
            "Evaluating scenario"
        );

        let prefixes = PrefixSummaryEngine::new(graph.clone(), self.classifier.clone(), cancel.clone())
            .with_permits(self.permits.clone())
            .with_timeout(Duration::from_secs(self.config.classification.timeout_secs));
        let ctx = Arc::new(EvaluationContext::new(graph.clone(), bounds, cancel, prefixes));

        for issue in graph.validate() {
            ctx.sink.report(ConsistencyIssue::from(&issue));
        }

        let (all_paths, stats, dominators) = collect_paths(&ctx, request)?;
        let targets = resolve_targets(&ctx, request);
        let paths: Vec<Path> = all_paths
            .into_iter()
            .filter(|p| match &targets {
                Some(targets) => p.scenes.iter().any(|s| targets.contains(s)),
                None => true,
            })
            .collect();
        info!(
            paths = paths.len(),
            truncated = stats.is_truncated(),
            "Paths ready for evaluation"
        );

        let entity_analysis = request.include_entity_analysis
            && self.config.classification.enabled
            && self.classifier.is_enabled();
        let timelines = if entity_analysis {
            track_entities(&ctx, &paths).await?
        } else {
            debug!("Entity analysis disabled");
            vec![Vec::new(); paths.len()]
        };

        let continuity = scene_continuity(&paths, &timelines);
        for (index, timeline) in timelines.iter().enumerate() {
            for summary in timeline {
                for finding in &summary.findings {
                    let finding = refine(finding.clone(), &continuity, &dominators);
                    ctx.sink.report(finding.on_path(index));
                }
            }
        }

        if request.include_narrative_analysis && self.config.narrative.enabled {
            if let Some(evaluator) = &self.narrative {
                self.evaluate_narrative(&ctx, evaluator.clone(), &paths).await?;
            }
        }

        let issues = ctx.sink.drain();
        let mut truncation = TruncationReport::from_stats(&stats);
        truncation.truncated_paths = paths.iter().filter(|p| p.truncated()).count();
        truncation.unreached_scenes = dominators.unreached().cloned().collect();

        let path_results = paths
            .iter()
            .enumerate()
            .map(|(index, path)| {
                let on_path: Vec<usize> = issues
                    .iter()
                    .enumerate()
                    .filter(|(_, issue)| issue.paths.contains(&index))
                    .map(|(n, _)| n)
                    .collect();
                let score = self.scorer.score(on_path.iter().map(|&n| &issues[n]));
                PathResult {
                    index,
                    path: path.clone(),
                    truncated: path.truncated(),
                    issues: on_path,
                    score: score.score,
                    assessment: score.assessment.capped_for_truncation(path.truncated()),
                    is_consistent: score.is_consistent,
                }
            })
            .collect();

        let scenes = scene_reports(&dominators, &continuity, &timelines, &paths, targets.as_deref());
        let overall = self.scorer.score(&issues);
        let assessment = overall.assessment.capped_for_truncation(truncation.is_truncated());

        info!(
            score = overall.score,
            assessment = %assessment,
            issues = issues.len(),
            prefixes = ctx.prefixes.len(),
            classifications = ctx.prefixes.classifications(),
            "Evaluation complete"
        );

        Ok(EvaluationResult {
            evaluation_id: Uuid::new_v4(),
            scenario_id: graph.id.clone(),
            score: overall.score,
            assessment,
            is_consistent: overall.is_consistent,
            truncation,
            paths: path_results,
            scenes,
            issues,
            evaluated_at: Utc::now(),
        })
    }

    /// Run the narrative evaluator over every path
    async fn evaluate_narrative(
        &self,
        ctx: &Arc<EvaluationContext>,
        evaluator: Arc<dyn NarrativeEvaluator>,
        paths: &[Path],
    ) -> EngineResult<()> {
        let timeout = Duration::from_secs(self.config.narrative.timeout_secs);
        let mut tasks = JoinSet::new();

        for (index, path) in paths.iter().enumerate() {
            let ctx = ctx.clone();
            let evaluator = evaluator.clone();
            let permits = self.permits.clone();
            let path = path.clone();
            tasks.spawn(async move {
                let call = async {
                    let _permit = permits.acquire().await.ok();
                    let request = NarrativeRequest {
                        graph: ctx.scenario.as_ref(),
                        path: &path,
                        path_index: index,
                    };
                    tokio::time::timeout(timeout, evaluator.evaluate(&request)).await
                };
                let outcome = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
                    outcome = call => outcome,
                };

                let issues = match outcome {
                    Ok(Ok(issues)) => issues,
                    Ok(Err(e)) => {
                        warn!(path = index, evaluator = evaluator.id(), error = %e, "Narrative evaluation failed");
                        vec![narrative_failure(&path, e.to_string())]
                    }
                    Err(_) => {
                        warn!(path = index, evaluator = evaluator.id(), "Narrative evaluation timed out");
                        let e = EvaluatorError::Timeout(timeout.as_secs());
                        vec![narrative_failure(&path, e.to_string())]
                    }
                };
                ctx.sink.report_all(issues.into_iter().map(|issue| issue.on_path(index)));
                Ok(())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| EngineError::Task(e.to_string()))??;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConsistencyEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyEvaluator")
            .field("classifier", &self.classifier.id())
            .field("narrative", &self.narrative.as_ref().map(|n| n.id().to_string()))
            .field("config", &self.config)
            .finish()
    }
}

/// Enumerate (or check explicit) paths, streaming each into the dominator analysis
fn collect_paths(
    ctx: &EvaluationContext,
    request: &EvaluationRequest,
) -> EngineResult<(Vec<Path>, EnumerationStats, DominatorMap)> {
    let graph = &ctx.scenario;
    let mut analyzer = DominatorAnalyzer::new(graph);
    let mut paths = Vec::new();

    let stats = if request.paths.is_empty() {
        let mut enumerator = PathEnumerator::new(graph, ctx.bounds);
        for path in enumerator.by_ref() {
            if paths.len() % CANCEL_CHECK_INTERVAL == 0 && ctx.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            analyzer.observe(&path);
            paths.push(path);
        }
        enumerator.stats()
    } else {
        let mut stats = EnumerationStats::default();
        for scenes in &request.paths {
            let (path, issue) = check_explicit_path(graph, scenes);
            if let Some(issue) = issue {
                ctx.sink.report(ConsistencyIssue::from(&issue));
            }
            let Some(path) = path else {
                continue;
            };
            if let PathTermination::Cycle { .. } = path.termination {
                stats.cycle_cuts += 1;
            }
            analyzer.observe(&path);
            paths.push(path);
        }
        stats.paths = paths.len();
        stats
    };

    if stats.is_truncated() {
        info!(
            cycle_cuts = stats.cycle_cuts,
            depth_cuts = stats.depth_cuts,
            path_limit_reached = stats.path_limit_reached,
            "Path enumeration truncated"
        );
    }

    let mut dominators = analyzer.finish();
    if stats.path_limit_reached || !request.paths.is_empty() {
        dominators.mark_sampled();
    }
    Ok((paths, stats, dominators))
}

/// Requested target scenes that exist; unknown ones are reported
///
/// `None` means no targets were requested and every path is in scope. A
/// request whose targets are all unknown yields `Some` of an empty list,
/// which selects nothing.
fn resolve_targets(ctx: &EvaluationContext, request: &EvaluationRequest) -> Option<Vec<SceneId>> {
    if request.target_scene_ids.is_empty() {
        return None;
    }
    let mut targets = Vec::new();
    for target in &request.target_scene_ids {
        if ctx.scenario.contains(target) {
            if !targets.contains(target) {
                targets.push(target.clone());
            }
        } else {
            warn!(scene_id = %target, "Unknown target scene");
            ctx.sink.report(
                ConsistencyIssue::new(
                    IssueType::Other,
                    Severity::Low,
                    format!("Target scene '{}' is not part of the scenario", target),
                )
                .at_scene(target.clone()),
            );
        }
    }
    Some(targets)
}

/// Prefix summaries along every path, in path order
async fn track_entities(ctx: &Arc<EvaluationContext>, paths: &[Path]) -> EngineResult<Vec<Timeline>> {
    let mut tasks = JoinSet::new();
    for (index, path) in paths.iter().enumerate() {
        let ctx = ctx.clone();
        let scenes = path.scenes.clone();
        tasks.spawn(async move { (index, ctx.prefixes.summaries_along(&scenes).await) });
    }

    let mut timelines = vec![Vec::new(); paths.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, timeline) = joined.map_err(|e| EngineError::Task(e.to_string()))?;
        timelines[index] = timeline?;
    }
    debug!(
        prefixes = ctx.prefixes.len(),
        cache_hits = ctx.prefixes.hits(),
        "Entity timelines complete"
    );
    Ok(timelines)
}

/// Entry and exit presence at every scene any path reaches
fn scene_continuity(paths: &[Path], timelines: &[Timeline]) -> HashMap<SceneId, SceneContinuity> {
    let empty = EntityLedger::new();
    let mut ledgers: HashMap<&SceneId, (Vec<&EntityLedger>, Vec<&EntityLedger>)> = HashMap::new();

    for (path, timeline) in paths.iter().zip(timelines) {
        for (at, scene) in path.scenes.iter().enumerate() {
            let (entry, exit) = ledgers.entry(scene).or_default();
            let Some(summary) = timeline.get(at) else {
                continue;
            };
            entry.push(match at {
                0 => &empty,
                _ => &timeline[at - 1].ledger,
            });
            exit.push(&summary.ledger);
        }
    }

    ledgers
        .into_iter()
        .map(|(scene, (entry, exit))| {
            let continuity = SceneContinuity {
                entry: merge_presence(entry),
                exit: merge_presence(exit),
            };
            (scene.clone(), continuity)
        })
        .collect()
}

/// Sharpen a per-path "used as known" finding with what all paths say
///
/// If no path brings the entity into the scene it was never introduced at
/// all; otherwise name the introducing scenes that do not dominate it.
fn refine(
    finding: ConsistencyIssue,
    continuity: &HashMap<SceneId, SceneContinuity>,
    dominators: &DominatorMap,
) -> ConsistencyIssue {
    if finding.issue_type != IssueType::EntityUsedAsKnown {
        return finding;
    }
    let (Some(scene), Some(entity)) = (finding.primary_scene().cloned(), finding.entity.clone()) else {
        return finding;
    };
    let key = canonical_key(&entity.name);
    let entry = continuity.get(&scene).map(|c| &c.entry);

    match entry.map(|e| e.presence_of(&key)) {
        Some(Presence::DefinitelyAbsent) | None => ConsistencyIssue {
            issue_type: IssueType::EntityNotIntroduced,
            summary: format!(
                "'{}' is referenced in '{}' but no path introduces it beforehand",
                entity.name, scene
            ),
            ..finding
        },
        Some(_) => {
            let elsewhere: Vec<String> = entry
                .and_then(|e| e.get(&key))
                .map(|p| {
                    p.introduced_at
                        .iter()
                        .filter(|intro| !dominators.dominates(intro, &scene))
                        .map(|intro| intro.to_string())
                        .collect()
                })
                .unwrap_or_default();
            if elsewhere.is_empty() {
                finding
            } else {
                let details = format!(
                    "Introduced only in {}, which not every path to '{}' passes through",
                    elsewhere.join(", "),
                    scene
                );
                finding.with_details(details)
            }
        }
    }
}

fn scene_reports(
    dominators: &DominatorMap,
    continuity: &HashMap<SceneId, SceneContinuity>,
    timelines: &[Timeline],
    paths: &[Path],
    targets: Option<&[SceneId]>,
) -> Vec<SceneReport> {
    dominators
        .iter()
        .filter(|set| targets.map_or(true, |targets| targets.contains(&set.scene)))
        .map(|set| {
            let time_span = paths
                .iter()
                .zip(timelines)
                .filter_map(|(path, timeline)| {
                    path.position(&set.scene)
                        .and_then(|at| timeline.get(at))
                        .and_then(|summary| summary.time_span)
                })
                .max();
            SceneReport {
                scene_id: set.scene.clone(),
                reached: set.is_reached(),
                paths: set.paths_observed,
                dominators: set.dominators.clone(),
                immediate_dominator: set.immediate.clone(),
                continuity: continuity.get(&set.scene).cloned().unwrap_or_default(),
                time_span,
            }
        })
        .collect()
}

fn narrative_failure(path: &Path, reason: String) -> ConsistencyIssue {
    let mut issue = ConsistencyIssue::new(
        IssueType::Other,
        Severity::Low,
        format!("Narrative evaluation unavailable for path {}", path),
    )
    .with_details(reason)
    .with_confidence(Confidence::Low);
    if let Some(first) = path.scenes.first() {
        issue = issue.at_scene(first.clone());
    }
    issue
}

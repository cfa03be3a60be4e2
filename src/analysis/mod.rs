//! Consistency analysis for branching scenarios
//!
//! # Architecture
//!
//! One evaluation runs these stages over a scenario graph:
//!
//! - **Path dominance** ([`DominatorAnalyzer`]): every scene every path to a
//!   scene passes through, computed while paths stream out of enumeration
//! - **Entity continuity** ([`PrefixSummaryEngine`]): each distinct path
//!   prefix is classified once and folded into an [`EntityLedger`]
//! - **Presence merge** ([`merge_presence`]): must/may presence of every
//!   entity at scene entry and exit, across all paths
//! - **Narrative evaluation** ([`NarrativeEvaluator`]): optional per-path
//!   logic checks by an external collaborator
//! - **Scoring** ([`IssueAggregator`], [`ConsistencyScorer`]): deduplicated
//!   issues and a severity-weighted score
//!
//! [`ConsistencyEvaluator`] wires the stages together.
//!
//! # Example
//!
//! ```ignore
//! use plotline::analysis::{ConsistencyEvaluator, EvaluationRequest, StaticClassifier};
//! use plotline::graph::InMemoryScenarioStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryScenarioStore::new());
//! store.insert_file("lighthouse.yaml")?;
//!
//! let evaluator = ConsistencyEvaluator::new(store)
//!     .with_classifier(Arc::new(StaticClassifier::from_json(&table)?));
//!
//! let response = evaluator.evaluate(&EvaluationRequest::new("lighthouse")).await;
//! ```

mod context;
mod continuity;
mod dominators;
mod entity;
mod issue;
mod merge;
mod orchestrator;
mod prefix;
mod scoring;
mod traits;
mod types;

pub use context::{EvaluationContext, IssueSink};
pub use continuity::{fold_scene, EntityLedger, EntityState, EntityTrack};
pub use dominators::{compute_dominators, DominatorAnalyzer, DominatorMap, DominatorSet};
pub use entity::{
    canonical_key, EntityAction, EntityKind, EntityReference, EntityStatus,
    SceneEntityClassification, TimeSpan,
};
pub use issue::{Confidence, ConsistencyIssue, EntityRef, IssueType, Severity};
pub use merge::{merge_presence, EntityPresence, Presence, PresenceSummary, SceneContinuity};
pub use orchestrator::ConsistencyEvaluator;
pub use prefix::{PrefixSummary, PrefixSummaryEngine};
pub use scoring::{Assessment, ConsistencyScorer, IssueAggregator, Score};
pub use traits::{
    ClassificationRequest, ClassifyError, EntityClassifier, EvaluatorError, NarrativeEvaluator,
    NarrativeRequest, NullClassifier, StaticClassifier,
};
pub use types::{
    EngineError, EngineResult, EvaluationRequest, EvaluationResponse, EvaluationResult, PathResult,
    SceneReport, TruncationReport,
};

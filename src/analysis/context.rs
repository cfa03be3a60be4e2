//! Per-evaluation state
//!
//! Built for one evaluation call and dropped when it returns; nothing in
//! here outlives the evaluation.

use super::issue::ConsistencyIssue;
use super::prefix::PrefixSummaryEngine;
use super::scoring::IssueAggregator;
use crate::cancel::CancellationToken;
use crate::graph::ScenarioGraph;
use crate::query::PathBounds;
use std::sync::{Arc, Mutex, PoisonError};

/// Where components report issues during an evaluation
///
/// Duplicates collapse as they arrive.
#[derive(Debug, Default)]
pub struct IssueSink {
    aggregator: Mutex<IssueAggregator>,
}

impl IssueSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, issue: ConsistencyIssue) {
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(issue);
    }

    pub fn report_all(&self, issues: impl IntoIterator<Item = ConsistencyIssue>) {
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(issues);
    }

    pub fn len(&self) -> usize {
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deduplicated, ordered issues reported so far; leaves the sink empty
    pub fn drain(&self) -> Vec<ConsistencyIssue> {
        let mut aggregator = self.aggregator.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *aggregator).finish()
    }
}

/// Everything one evaluation shares between its components
#[derive(Debug)]
pub struct EvaluationContext {
    pub scenario: Arc<ScenarioGraph>,
    pub bounds: PathBounds,
    pub cancel: CancellationToken,
    pub prefixes: PrefixSummaryEngine,
    pub sink: IssueSink,
}

impl EvaluationContext {
    pub fn new(
        scenario: Arc<ScenarioGraph>,
        bounds: PathBounds,
        cancel: CancellationToken,
        prefixes: PrefixSummaryEngine,
    ) -> Self {
        Self {
            scenario,
            bounds,
            cancel,
            prefixes,
            sink: IssueSink::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

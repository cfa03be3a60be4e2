//! Scenario source: where the engine loads graphs from
//!
//! The engine only ever reads scenarios. Persisting them belongs to the
//! surrounding application, so the only bundled store is in-memory.

use super::scenario::{GraphError, ScenarioGraph, ScenarioId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while fetching a scenario
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Scenario not found: {0}")]
    NotFound(ScenarioId),

    #[error("Scenario store unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed scenario: {0}")]
    Malformed(#[from] GraphError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Read-only access to authored scenarios
///
/// Implementations must be thread-safe (Send + Sync) so one store can
/// serve concurrent evaluations.
#[async_trait]
pub trait ScenarioStore: Send + Sync {
    /// Load a scenario graph by ID
    async fn load(&self, id: &ScenarioId) -> StoreResult<Arc<ScenarioGraph>>;
}

/// In-memory scenario store
#[derive(Debug, Default)]
pub struct InMemoryScenarioStore {
    scenarios: DashMap<ScenarioId, Arc<ScenarioGraph>>,
}

impl InMemoryScenarioStore {
    pub fn new() -> Self {
        Self {
            scenarios: DashMap::new(),
        }
    }

    /// Insert or replace a scenario, returning its ID
    pub fn insert(&self, graph: ScenarioGraph) -> ScenarioId {
        let id = graph.id.clone();
        self.scenarios.insert(id.clone(), Arc::new(graph));
        id
    }

    /// Read a scenario file (`.yaml`/`.yml` as YAML, anything else as JSON)
    pub fn insert_file(&self, path: impl AsRef<Path>) -> StoreResult<ScenarioId> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let graph = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => ScenarioGraph::from_yaml(&raw)?,
            _ => ScenarioGraph::from_json(&raw)?,
        };
        Ok(self.insert(graph))
    }

    pub fn remove(&self, id: &ScenarioId) -> Option<Arc<ScenarioGraph>> {
        self.scenarios.remove(id).map(|(_, graph)| graph)
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn ids(&self) -> Vec<ScenarioId> {
        self.scenarios.iter().map(|r| r.key().clone()).collect()
    }
}

#[async_trait]
impl ScenarioStore for InMemoryScenarioStore {
    async fn load(&self, id: &ScenarioId) -> StoreResult<Arc<ScenarioGraph>> {
        self.scenarios
            .get(id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

//! Scenario graph data structures

mod scenario;
mod scene;
mod store;
mod validate;


pub use scenario::{GraphError, GraphResult, ScenarioDocument, ScenarioGraph, ScenarioId, Successor};
pub use scene::{Branch, Scene, SceneId};
pub use store::{InMemoryScenarioStore, ScenarioStore, StoreError, StoreResult};
pub use validate::{StructuralIssue, StructuralIssueKind};

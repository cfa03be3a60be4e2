//! Plotline: consistency evaluation for branching narrative scenarios
//!
//! Checks that every path a reader can take through a branching story is
//! internally consistent: characters and objects are introduced before they
//! are treated as known, are not brought back after leaving, and the
//! structure of the scenario holds together.
//!
//! # Core Concepts
//!
//! - **Scenarios**: graphs of scenes joined by branches ([`graph`])
//! - **Paths**: bounded linear walks through a scenario ([`query`])
//! - **Evaluation**: dominance, entity continuity and scoring over those
//!   paths ([`analysis`])
//!
//! # Example
//!
//! ```
//! use plotline::graph::{Scene, ScenarioGraph};
//! use plotline::query::{PathBounds, PathEnumerator};
//!
//! let graph = ScenarioGraph::new(
//!     "fork",
//!     vec![
//!         Scene::new("start").leads_to("left").leads_to("right"),
//!         Scene::new("left"),
//!         Scene::new("right"),
//!     ],
//! )
//! .unwrap();
//!
//! let paths: Vec<_> = PathEnumerator::new(&graph, PathBounds::default()).collect();
//! assert_eq!(paths.len(), 2);
//! ```

pub mod analysis;
pub mod cancel;
pub mod config;
pub mod graph;
pub mod query;

pub use analysis::{
    Assessment, ConsistencyEvaluator, ConsistencyIssue, EngineError, EngineResult, EvaluationRequest,
    EvaluationResponse, EvaluationResult, IssueType, Severity,
};
pub use cancel::CancellationToken;
pub use config::{ConfigError, EngineConfig};
pub use graph::{ScenarioGraph, ScenarioId, Scene, SceneId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

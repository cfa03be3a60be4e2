//! Evaluation request, response and result types

use super::entity::TimeSpan;
use super::issue::{ConsistencyIssue, IssueType};
use super::merge::SceneContinuity;
use super::scoring::Assessment;
use crate::config::ConfigError;
use crate::graph::{GraphError, ScenarioId, SceneId, StoreError};
use crate::query::{EnumerationStats, Path};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors that stop an evaluation
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Scenario error: {0}")]
    Graph(#[from] GraphError),

    #[error("Scenario unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Evaluation cancelled")]
    Cancelled,

    #[error("Evaluation task failed: {0}")]
    Task(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

fn default_true() -> bool {
    true
}

/// What to evaluate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub scenario_id: ScenarioId,
    /// Only evaluate paths through these scenes, and report only on them
    #[serde(default)]
    pub target_scene_ids: Vec<SceneId>,
    /// Evaluate exactly these paths instead of enumerating
    #[serde(default)]
    pub paths: Vec<Vec<SceneId>>,
    #[serde(default = "default_true")]
    pub include_entity_analysis: bool,
    #[serde(default = "default_true", alias = "include_srl_analysis")]
    pub include_narrative_analysis: bool,
    /// Overrides the configured bound; 0 means unlimited
    #[serde(default)]
    pub max_paths: Option<usize>,
    /// Overrides the configured bound; 0 means unlimited
    #[serde(default)]
    pub max_depth: Option<usize>,
}

impl EvaluationRequest {
    pub fn new(scenario_id: impl Into<ScenarioId>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            target_scene_ids: Vec::new(),
            paths: Vec::new(),
            include_entity_analysis: true,
            include_narrative_analysis: true,
            max_paths: None,
            max_depth: None,
        }
    }

    pub fn with_target(mut self, scene: impl Into<SceneId>) -> Self {
        self.target_scene_ids.push(scene.into());
        self
    }

    pub fn with_path<I, S>(mut self, scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SceneId>,
    {
        self.paths.push(scenes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = Some(max_paths);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn without_entity_analysis(mut self) -> Self {
        self.include_entity_analysis = false;
        self
    }

    pub fn without_narrative_analysis(mut self) -> Self {
        self.include_narrative_analysis = false;
        self
    }
}

/// How much of the scenario the run did not see
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationReport {
    pub cycle_cuts: usize,
    pub depth_cuts: usize,
    /// `max_paths` stopped enumeration while paths remained
    pub path_limit_reached: bool,
    /// Evaluated paths that were cut short
    pub truncated_paths: usize,
    /// Scenes no evaluated path reached
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unreached_scenes: Vec<SceneId>,
}

impl TruncationReport {
    pub fn from_stats(stats: &EnumerationStats) -> Self {
        Self {
            cycle_cuts: stats.cycle_cuts,
            depth_cuts: stats.depth_cuts,
            path_limit_reached: stats.path_limit_reached,
            ..Default::default()
        }
    }

    /// True when any consistency claim covers only a sample of the scenario
    pub fn is_truncated(&self) -> bool {
        self.path_limit_reached || self.cycle_cuts > 0 || self.depth_cuts > 0 || self.truncated_paths > 0
    }
}

/// Outcome for one evaluated path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub index: usize,
    pub path: Path,
    pub truncated: bool,
    /// Indices into [`EvaluationResult::issues`]
    pub issues: Vec<usize>,
    pub score: f64,
    pub assessment: Assessment,
    pub is_consistent: bool,
}

/// Dominance and entity continuity at one scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneReport {
    pub scene_id: SceneId,
    /// Reached by at least one evaluated path
    pub reached: bool,
    /// Paths observed reaching the scene
    pub paths: usize,
    /// Scenes every observed path passes through on the way here, this one last
    pub dominators: Vec<SceneId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate_dominator: Option<SceneId>,
    #[serde(flatten)]
    pub continuity: SceneContinuity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_span: Option<TimeSpan>,
}

/// Full evaluation outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub evaluation_id: Uuid,
    pub scenario_id: ScenarioId,
    pub score: f64,
    pub assessment: Assessment,
    /// No issue reaches `high`; only about the sampled paths when truncated
    pub is_consistent: bool,
    pub truncation: TruncationReport,
    pub paths: Vec<PathResult>,
    pub scenes: Vec<SceneReport>,
    pub issues: Vec<ConsistencyIssue>,
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationResult {
    /// True when every path was explored to its end
    pub fn fully_explored(&self) -> bool {
        !self.truncation.is_truncated()
    }

    pub fn scene(&self, id: &SceneId) -> Option<&SceneReport> {
        self.scenes.iter().find(|s| &s.scene_id == id)
    }

    pub fn issues_of_type(&self, issue_type: IssueType) -> impl Iterator<Item = &ConsistencyIssue> {
        self.issues.iter().filter(move |i| i.issue_type == issue_type)
    }
}

/// Boundary shape: success flag plus either a result or an error message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<EvaluationResult>,
}

impl EvaluationResponse {
    pub fn succeeded(result: EvaluationResult) -> Self {
        Self {
            success: true,
            error: None,
            result: Some(result),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_defaults() {
        let request: EvaluationRequest =
            serde_json::from_str(r#"{ "scenario_id": "lighthouse", "include_srl_analysis": false }"#).unwrap();

        assert!(request.include_entity_analysis);
        assert!(!request.include_narrative_analysis);
        assert!(request.paths.is_empty());
        assert_eq!(request.max_paths, None);
    }

    #[test]
    fn test_truncation_report() {
        let stats = EnumerationStats {
            paths: 100,
            cycle_cuts: 0,
            depth_cuts: 0,
            path_limit_reached: true,
        };
        assert!(TruncationReport::from_stats(&stats).is_truncated());
        assert!(!TruncationReport::default().is_truncated());
    }

    #[test]
    fn test_failed_response_has_no_result() {
        let response = EvaluationResponse::failed("scenario 'x' not found");
        assert!(!response.success);
        assert!(response.result.is_none());

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("result").is_none());
    }
}

//! ScenarioGraph: the typed, read-only view of an authored scenario

use super::scene::{Scene, SceneId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while turning a wire document into a graph
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Scenario {0} has no scenes")]
    Empty(ScenarioId),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for graph construction
pub type GraphResult<T> = Result<T, GraphError>;

/// Unique identifier for a scenario
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(String);

impl ScenarioId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ScenarioId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ScenarioId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Wire shape of a scenario, as the scenario store hands it over
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDocument {
    pub id: ScenarioId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub start_scene_ids: Vec<SceneId>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

/// Where a scene's choices lead, with terminal choices collapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Successor {
    /// Another scene, by declaration index
    Scene(usize),
    /// The narrative ends here
    Ending,
    /// A branch points at a scene that does not exist
    Dangling,
}

/// A branching scenario: scenes connected by player-choice branches
///
/// Scene order is declaration order and is part of the contract: path
/// enumeration and dominator tie-breaking both depend on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ScenarioDocument", into = "ScenarioDocument")]
pub struct ScenarioGraph {
    pub id: ScenarioId,
    pub title: String,
    scenes: Vec<Scene>,
    declared_starts: Vec<SceneId>,
    index: HashMap<SceneId, usize>,
    duplicates: Vec<SceneId>,
}

impl ScenarioGraph {
    /// Build a graph from scenes in declaration order
    pub fn new(id: impl Into<ScenarioId>, scenes: Vec<Scene>) -> GraphResult<Self> {
        let id = id.into();
        if scenes.is_empty() {
            return Err(GraphError::Empty(id));
        }

        let mut index = HashMap::with_capacity(scenes.len());
        let mut duplicates = Vec::new();
        for (i, scene) in scenes.iter().enumerate() {
            if index.contains_key(&scene.id) {
                duplicates.push(scene.id.clone());
            } else {
                index.insert(scene.id.clone(), i);
            }
        }

        Ok(Self {
            id,
            title: String::new(),
            scenes,
            declared_starts: Vec::new(),
            index,
            duplicates,
        })
    }

    /// Parse a scenario from its JSON wire form
    pub fn from_json(json: &str) -> GraphResult<Self> {
        let doc: ScenarioDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    /// Parse a scenario from its YAML wire form
    pub fn from_yaml(yaml: &str) -> GraphResult<Self> {
        let doc: ScenarioDocument = serde_yaml::from_str(yaml)?;
        Self::from_document(doc)
    }

    pub fn from_document(doc: ScenarioDocument) -> GraphResult<Self> {
        let mut graph = Self::new(doc.id, doc.scenes)?;
        graph.title = doc.title;
        graph.declared_starts = doc.start_scene_ids;
        Ok(graph)
    }

    /// Declare explicit start scenes
    pub fn with_start_scenes<I, S>(mut self, starts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SceneId>,
    {
        self.declared_starts = starts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Get a scene by ID
    pub fn scene(&self, id: &SceneId) -> Option<&Scene> {
        self.index.get(id).map(|&i| &self.scenes[i])
    }

    /// Declaration index of a scene
    pub fn index_of(&self, id: &SceneId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Scene at a declaration index
    ///
    /// Panics if `index` is out of bounds; indices come from this graph.
    pub fn scene_at(&self, index: usize) -> &Scene {
        &self.scenes[index]
    }

    /// All scenes in declaration order
    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.iter()
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn contains(&self, id: &SceneId) -> bool {
        self.index.contains_key(id)
    }

    /// Scene ids declared more than once (later copies are ignored)
    pub fn duplicate_scenes(&self) -> &[SceneId] {
        &self.duplicates
    }

    /// Start scenes as declared by the author, unresolved
    pub fn declared_start_scenes(&self) -> &[SceneId] {
        &self.declared_starts
    }

    /// Resolve start scenes to declaration indices
    ///
    /// Declared starts that exist win. Without declared starts, every scene
    /// that no branch points to is a start; if each scene has an incoming
    /// branch, the first declared scene is used.
    pub fn start_scenes(&self) -> Vec<usize> {
        if !self.declared_starts.is_empty() {
            let mut starts: Vec<usize> = Vec::new();
            for id in &self.declared_starts {
                if let Some(i) = self.index_of(id) {
                    if !starts.contains(&i) {
                        starts.push(i);
                    }
                }
            }
            return starts;
        }

        let mut has_incoming = vec![false; self.scenes.len()];
        for (i, scene) in self.canonical_scenes() {
            for branch in &scene.branches {
                if let Some(target) = branch.next_scene_id.as_ref().and_then(|t| self.index_of(t)) {
                    if target != i {
                        has_incoming[target] = true;
                    }
                }
            }
        }

        let roots: Vec<usize> = self
            .canonical_scenes()
            .map(|(i, _)| i)
            .filter(|&i| !has_incoming[i])
            .collect();
        if roots.is_empty() {
            vec![0]
        } else {
            roots
        }
    }

    /// Distinct successors of a scene in branch declaration order
    ///
    /// Every terminal branch (ending or dangling) collapses into one
    /// successor, so a scene always has at least one.
    pub fn successors(&self, index: usize) -> Vec<Successor> {
        let scene = &self.scenes[index];
        let mut out: Vec<Successor> = Vec::with_capacity(scene.branches.len().max(1));
        let mut has_end = false;

        for branch in &scene.branches {
            let next = match &branch.next_scene_id {
                None => Successor::Ending,
                Some(target) => match self.index_of(target) {
                    Some(i) => Successor::Scene(i),
                    None => Successor::Dangling,
                },
            };
            match next {
                Successor::Scene(_) => {
                    if !out.contains(&next) {
                        out.push(next);
                    }
                }
                _ => {
                    if !has_end {
                        has_end = true;
                        out.push(next);
                    }
                }
            }
        }

        if out.is_empty() {
            out.push(Successor::Ending);
        }
        out
    }

    /// Scenes that are the canonical copy for their id
    fn canonical_scenes(&self) -> impl Iterator<Item = (usize, &Scene)> {
        self.scenes
            .iter()
            .enumerate()
            .filter(move |(i, s)| self.index.get(&s.id) == Some(i))
    }

    pub fn to_document(&self) -> ScenarioDocument {
        ScenarioDocument {
            id: self.id.clone(),
            title: self.title.clone(),
            start_scene_ids: self.declared_starts.clone(),
            scenes: self.scenes.clone(),
        }
    }
}

impl TryFrom<ScenarioDocument> for ScenarioGraph {
    type Error = GraphError;

    fn try_from(doc: ScenarioDocument) -> Result<Self, Self::Error> {
        Self::from_document(doc)
    }
}

impl From<ScenarioGraph> for ScenarioDocument {
    fn from(graph: ScenarioGraph) -> Self {
        graph.to_document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Branch;

    fn branching() -> ScenarioGraph {
        ScenarioGraph::new(
            "branching",
            vec![
                Scene::new("start").leads_to("a").leads_to("b"),
                Scene::new("a").leads_to("end"),
                Scene::new("b").leads_to("end"),
                Scene::new("end"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_scenario_is_rejected() {
        let result = ScenarioGraph::new("empty", vec![]);
        assert!(matches!(result, Err(GraphError::Empty(_))));
    }

    #[test]
    fn test_inferred_start_is_root() {
        let graph = branching();
        assert_eq!(graph.start_scenes(), vec![0]);
    }

    #[test]
    fn test_declared_start_wins() {
        let graph = branching().with_start_scenes(["b", "missing"]);
        assert_eq!(graph.start_scenes(), vec![2]);
    }

    #[test]
    fn test_all_scenes_in_cycle_falls_back_to_first() {
        let graph = ScenarioGraph::new(
            "loop",
            vec![Scene::new("x").leads_to("y"), Scene::new("y").leads_to("x")],
        )
        .unwrap();
        assert_eq!(graph.start_scenes(), vec![0]);
    }

    #[test]
    fn test_self_loop_does_not_hide_root() {
        let graph = ScenarioGraph::new(
            "self",
            vec![Scene::new("x").leads_to("x").with_branch(Branch::ending())],
        )
        .unwrap();
        assert_eq!(graph.start_scenes(), vec![0]);
    }

    #[test]
    fn test_successors_collapse_terminal_branches() {
        let graph = ScenarioGraph::new(
            "ends",
            vec![
                Scene::new("s")
                    .with_branch(Branch::ending())
                    .leads_to("t")
                    .with_branch(Branch::to("nowhere"))
                    .leads_to("t"),
                Scene::new("t"),
            ],
        )
        .unwrap();

        assert_eq!(
            graph.successors(0),
            vec![Successor::Ending, Successor::Scene(1)]
        );
        assert_eq!(graph.successors(1), vec![Successor::Ending]);
    }

    #[test]
    fn test_duplicate_scene_keeps_first() {
        let graph = ScenarioGraph::new(
            "dup",
            vec![
                Scene::new("s").with_title("first"),
                Scene::new("s").with_title("second"),
            ],
        )
        .unwrap();

        assert_eq!(graph.scene(&"s".into()).unwrap().title, "first");
        assert_eq!(graph.duplicate_scenes(), &[SceneId::from("s")]);
    }
}

//! Structural validation of a scenario graph
//!
//! Malformed content is reported, never thrown: every finding here becomes
//! an issue in the evaluation output and evaluation carries on.

use super::scenario::ScenarioGraph;
use super::scene::SceneId;
use crate::analysis::Severity;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What is structurally wrong with a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralIssueKind {
    /// A branch points at a scene that does not exist
    DanglingBranch {
        scene_id: SceneId,
        branch_index: usize,
        target: SceneId,
    },
    /// A declared start scene does not exist
    UnknownStartScene { scene_id: SceneId },
    /// Scene id declared more than once
    DuplicateScene { scene_id: SceneId },
    /// No start scene could be resolved
    NoStartScene,
    /// Scene cannot be reached from any start scene
    UnreachableScene { scene_id: SceneId },
    /// An explicitly requested path steps between two unconnected scenes
    BrokenPathLink { from: SceneId, to: SceneId },
}

/// A structural finding with its severity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralIssue {
    pub kind: StructuralIssueKind,
    pub severity: Severity,
}

impl StructuralIssue {
    pub fn new(kind: StructuralIssueKind) -> Self {
        let severity = match &kind {
            StructuralIssueKind::UnreachableScene { .. } => Severity::Low,
            StructuralIssueKind::NoStartScene => Severity::Critical,
            _ => Severity::Medium,
        };
        Self { kind, severity }
    }

    /// Scene the issue is anchored on, if any
    pub fn scene_id(&self) -> Option<&SceneId> {
        match &self.kind {
            StructuralIssueKind::DanglingBranch { scene_id, .. }
            | StructuralIssueKind::UnknownStartScene { scene_id }
            | StructuralIssueKind::DuplicateScene { scene_id }
            | StructuralIssueKind::UnreachableScene { scene_id } => Some(scene_id),
            StructuralIssueKind::BrokenPathLink { from, .. } => Some(from),
            StructuralIssueKind::NoStartScene => None,
        }
    }

    pub fn summary(&self) -> String {
        match &self.kind {
            StructuralIssueKind::DanglingBranch {
                scene_id,
                branch_index,
                target,
            } => format!(
                "Branch {} of scene '{}' points to missing scene '{}'",
                branch_index, scene_id, target
            ),
            StructuralIssueKind::UnknownStartScene { scene_id } => {
                format!("Start scene '{}' does not exist", scene_id)
            }
            StructuralIssueKind::DuplicateScene { scene_id } => {
                format!("Scene '{}' is declared more than once", scene_id)
            }
            StructuralIssueKind::NoStartScene => "Scenario has no reachable start scene".to_string(),
            StructuralIssueKind::UnreachableScene { scene_id } => {
                format!("Scene '{}' is unreachable from every start scene", scene_id)
            }
            StructuralIssueKind::BrokenPathLink { from, to } => {
                format!("No branch leads from '{}' to '{}'", from, to)
            }
        }
    }
}

impl ScenarioGraph {
    /// Check the graph for dangling branches, bad starts and dead content
    pub fn validate(&self) -> Vec<StructuralIssue> {
        let mut issues = Vec::new();

        for id in self.duplicate_scenes() {
            issues.push(StructuralIssue::new(StructuralIssueKind::DuplicateScene {
                scene_id: id.clone(),
            }));
        }

        for (i, scene) in self.scenes().enumerate() {
            // Later duplicates are invisible to traversal; don't double-report them
            if self.index_of(&scene.id) != Some(i) {
                continue;
            }
            for (branch_index, branch) in scene.branches.iter().enumerate() {
                if let Some(target) = &branch.next_scene_id {
                    if !self.contains(target) {
                        issues.push(StructuralIssue::new(StructuralIssueKind::DanglingBranch {
                            scene_id: scene.id.clone(),
                            branch_index,
                            target: target.clone(),
                        }));
                    }
                }
            }
        }

        for id in self.declared_start_scenes() {
            if !self.contains(id) {
                issues.push(StructuralIssue::new(StructuralIssueKind::UnknownStartScene {
                    scene_id: id.clone(),
                }));
            }
        }

        let starts = self.start_scenes();
        if starts.is_empty() {
            issues.push(StructuralIssue::new(StructuralIssueKind::NoStartScene));
            return issues;
        }

        let reachable = self.reachable_from(&starts);
        for (i, scene) in self.scenes().enumerate() {
            if self.index_of(&scene.id) == Some(i) && !reachable[i] {
                issues.push(StructuralIssue::new(StructuralIssueKind::UnreachableScene {
                    scene_id: scene.id.clone(),
                }));
            }
        }

        issues
    }

    /// Breadth-first reachability from the given scenes, by declaration index
    pub fn reachable_from(&self, starts: &[usize]) -> Vec<bool> {
        let mut visited = vec![false; self.scene_count()];
        let mut queue: VecDeque<usize> = VecDeque::new();

        for &start in starts {
            if !visited[start] {
                visited[start] = true;
                queue.push_back(start);
            }
        }

        while let Some(current) = queue.pop_front() {
            for successor in self.successors(current) {
                if let super::Successor::Scene(next) = successor {
                    if !visited[next] {
                        visited[next] = true;
                        queue.push_back(next);
                    }
                }
            }
        }

        visited
    }
}

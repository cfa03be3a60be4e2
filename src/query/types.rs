//! Path types and enumeration bounds

use crate::graph::SceneId;
use serde::{Deserialize, Serialize};

/// Why a path stopped where it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PathTermination {
    /// The last scene ends the narrative
    Ending,
    /// The last scene's remaining branch targets a missing scene
    DanglingBranch,
    /// The next scene was already on the path
    Cycle { revisit: SceneId },
    /// `max_depth` was reached while the scene still had successors
    DepthLimit,
    /// An explicitly supplied path was cut short at a missing link
    BrokenLink,
    /// An explicitly supplied path stops at a scene that still has successors
    Unfinished,
}

/// A linear walk through the scenario, start scene first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub scenes: Vec<SceneId>,
    pub termination: PathTermination,
}

impl Path {
    pub fn new(scenes: Vec<SceneId>, termination: PathTermination) -> Self {
        Self { scenes, termination }
    }

    /// True when the path does not reach the end of the narrative
    pub fn truncated(&self) -> bool {
        matches!(
            self.termination,
            PathTermination::Cycle { .. }
                | PathTermination::DepthLimit
                | PathTermination::BrokenLink
                | PathTermination::Unfinished
        )
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn contains(&self, scene: &SceneId) -> bool {
        self.scenes.contains(scene)
    }

    /// Position of a scene on the path
    pub fn position(&self, scene: &SceneId) -> Option<usize> {
        self.scenes.iter().position(|s| s == scene)
    }

    pub fn last(&self) -> Option<&SceneId> {
        self.scenes.last()
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<&str> = self.scenes.iter().map(SceneId::as_str).collect();
        write!(f, "{}", joined.join(" -> "))?;
        match &self.termination {
            PathTermination::Cycle { revisit } => write!(f, " -> ({} ...)", revisit),
            PathTermination::DepthLimit | PathTermination::Unfinished => write!(f, " -> ..."),
            _ => Ok(()),
        }
    }
}

/// Limits on path enumeration
///
/// Zero means unlimited for either bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathBounds {
    /// Maximum scenes on one path
    pub max_depth: usize,
    /// Maximum number of paths produced
    pub max_paths: usize,
}

impl PathBounds {
    pub fn new(max_depth: usize, max_paths: usize) -> Self {
        Self { max_depth, max_paths }
    }

    pub fn unlimited() -> Self {
        Self {
            max_depth: 0,
            max_paths: 0,
        }
    }
}

impl Default for PathBounds {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_paths: 1000,
        }
    }
}

/// Counters describing how enumeration went
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerationStats {
    /// Paths produced
    pub paths: usize,
    /// Paths cut at a revisited scene
    pub cycle_cuts: usize,
    /// Paths cut at `max_depth`
    pub depth_cuts: usize,
    /// More paths existed when `max_paths` stopped enumeration
    pub path_limit_reached: bool,
}

impl EnumerationStats {
    /// True if any part of the scenario went unexplored
    pub fn is_truncated(&self) -> bool {
        self.path_limit_reached || self.cycle_cuts > 0 || self.depth_cuts > 0
    }
}

//! Path-intersection dominance
//!
//! A scene's dominators are the scenes found at or before it on every
//! observed path that reaches it. Paths are folded in one at a time as a
//! running intersection, so the full path set never has to be held.

use crate::graph::{ScenarioGraph, SceneId};
use crate::query::Path;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dominance facts for one scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DominatorSet {
    pub scene: SceneId,
    /// Dominators in the order they occur on the first observed path,
    /// ending with the scene itself; empty if no path reached it
    pub dominators: Vec<SceneId>,
    /// Closest dominator other than the scene itself
    pub immediate: Option<SceneId>,
    /// Number of observed paths that reached the scene
    pub paths_observed: usize,
}

impl DominatorSet {
    fn unreached(scene: SceneId) -> Self {
        Self {
            scene,
            dominators: Vec::new(),
            immediate: None,
            paths_observed: 0,
        }
    }

    pub fn is_reached(&self) -> bool {
        self.paths_observed > 0
    }

    pub fn contains(&self, scene: &SceneId) -> bool {
        self.dominators.contains(scene)
    }
}

/// Dominator sets for every scene, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DominatorMap {
    sets: Vec<DominatorSet>,
    #[serde(skip)]
    index: HashMap<SceneId, usize>,
    /// False when some path was cut or enumeration stopped early; the sets
    /// then describe only the observed paths
    pub exact: bool,
}

impl DominatorMap {
    pub fn get(&self, scene: &SceneId) -> Option<&DominatorSet> {
        self.index.get(scene).map(|&i| &self.sets[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &DominatorSet> {
        self.sets.iter()
    }

    /// Does `dominator` dominate `scene`?
    pub fn dominates(&self, dominator: &SceneId, scene: &SceneId) -> bool {
        self.get(scene).is_some_and(|set| set.contains(dominator))
    }

    /// Scenes no observed path reached
    pub fn unreached(&self) -> impl Iterator<Item = &SceneId> {
        self.sets.iter().filter(|s| !s.is_reached()).map(|s| &s.scene)
    }

    /// Mark the result as describing a sample of the paths
    pub fn mark_sampled(&mut self) {
        self.exact = false;
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Running intersection for one scene
#[derive(Debug)]
struct Running {
    /// Prefix of the first path that reached the scene, scene last
    reference: Vec<usize>,
    /// Which `reference` entries are still dominators
    alive: Vec<bool>,
    paths: usize,
}

/// Streams paths into per-scene dominator sets
///
/// Feed every enumerated path to [`observe`](Self::observe), then call
/// [`finish`](Self::finish). Observation order only affects which path
/// is used as the reference for ordering, never set membership.
#[derive(Debug)]
pub struct DominatorAnalyzer<'g> {
    graph: &'g ScenarioGraph,
    running: Vec<Option<Running>>,
    exact: bool,
}

impl<'g> DominatorAnalyzer<'g> {
    pub fn new(graph: &'g ScenarioGraph) -> Self {
        Self {
            graph,
            running: (0..graph.scene_count()).map(|_| None).collect(),
            exact: true,
        }
    }

    /// Fold one path into the running intersections
    pub fn observe(&mut self, path: &Path) {
        if path.truncated() {
            self.exact = false;
        }

        // Position of each scene's first occurrence on this path
        let mut indices = Vec::with_capacity(path.len());
        let mut position: HashMap<usize, usize> = HashMap::with_capacity(path.len());
        for scene in &path.scenes {
            let Some(index) = self.graph.index_of(scene) else {
                break;
            };
            position.entry(index).or_insert(indices.len());
            indices.push(index);
        }

        for (at, &scene) in indices.iter().enumerate() {
            if position.get(&scene) != Some(&at) {
                continue;
            }
            let slot = &mut self.running[scene];
            if let Some(running) = slot.as_mut() {
                running.paths += 1;
                for (member, alive) in running.reference.iter().zip(running.alive.iter_mut()) {
                    if *alive && !position.get(member).is_some_and(|&p| p <= at) {
                        *alive = false;
                    }
                }
            } else {
                let reference = indices[..=at].to_vec();
                let alive = vec![true; reference.len()];
                *slot = Some(Running {
                    reference,
                    alive,
                    paths: 1,
                });
            }
        }
    }

    pub fn finish(self) -> DominatorMap {
        let graph = self.graph;
        let mut sets = Vec::with_capacity(graph.scene_count());
        let mut index = HashMap::with_capacity(graph.scene_count());

        for (i, running) in self.running.into_iter().enumerate() {
            let scene = graph.scene_at(i).id.clone();
            let set = match running {
                None => DominatorSet::unreached(scene.clone()),
                Some(running) => {
                    let members: Vec<usize> = running
                        .reference
                        .iter()
                        .zip(&running.alive)
                        .filter(|(_, alive)| **alive)
                        .map(|(member, _)| *member)
                        .collect();
                    let immediate = immediate_dominator(&members, i);
                    DominatorSet {
                        scene: scene.clone(),
                        dominators: members.iter().map(|&m| graph.scene_at(m).id.clone()).collect(),
                        immediate: immediate.map(|m| graph.scene_at(m).id.clone()),
                        paths_observed: running.paths,
                    }
                }
            };
            index.entry(scene).or_insert(sets.len());
            sets.push(set);
        }

        DominatorMap {
            sets,
            index,
            exact: self.exact,
        }
    }
}

/// Closest strict dominator: greatest position on the reference path,
/// lowest declaration index on a tie
fn immediate_dominator(members: &[usize], scene: usize) -> Option<usize> {
    members
        .iter()
        .enumerate()
        .filter(|(_, m)| **m != scene)
        .max_by(|(pa, a), (pb, b)| pa.cmp(pb).then(b.cmp(a)))
        .map(|(_, &m)| m)
}

/// Compute dominator sets from a complete set of paths
pub fn compute_dominators<'a>(
    graph: &ScenarioGraph,
    paths: impl IntoIterator<Item = &'a Path>,
) -> DominatorMap {
    let mut analyzer = DominatorAnalyzer::new(graph);
    for path in paths {
        analyzer.observe(path);
    }
    analyzer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Scene;
    use crate::query::{PathBounds, PathEnumerator};

    fn ids(scenes: &[SceneId]) -> Vec<&str> {
        scenes.iter().map(SceneId::as_str).collect()
    }

    fn dominators_of(graph: &ScenarioGraph) -> DominatorMap {
        let paths: Vec<Path> = PathEnumerator::new(graph, PathBounds::default()).collect();
        compute_dominators(graph, &paths)
    }

    #[test]
    fn test_linear_chain_dominates_all() {
        let graph = ScenarioGraph::new(
            "linear",
            vec![
                Scene::new("start").leads_to("middle"),
                Scene::new("middle").leads_to("end"),
                Scene::new("end"),
            ],
        )
        .unwrap();

        let map = dominators_of(&graph);
        let end = map.get(&"end".into()).unwrap();
        assert_eq!(ids(&end.dominators), vec!["start", "middle", "end"]);
        assert_eq!(end.immediate, Some("middle".into()));
        assert!(map.exact);
    }

    #[test]
    fn test_diamond_excludes_branches() {
        let graph = ScenarioGraph::new(
            "diamond",
            vec![
                Scene::new("start").leads_to("a").leads_to("b"),
                Scene::new("a").leads_to("end"),
                Scene::new("b").leads_to("end"),
                Scene::new("end"),
            ],
        )
        .unwrap();

        let map = dominators_of(&graph);
        let end = map.get(&"end".into()).unwrap();
        assert_eq!(ids(&end.dominators), vec!["start", "end"]);
        assert_eq!(end.immediate, Some("start".into()));
        assert_eq!(end.paths_observed, 2);

        let start = map.get(&"start".into()).unwrap();
        assert_eq!(ids(&start.dominators), vec!["start"]);
        assert_eq!(start.immediate, None);
    }

    #[test]
    fn test_unreached_scene_is_empty() {
        let graph = ScenarioGraph::new(
            "island",
            vec![Scene::new("start").leads_to("end"), Scene::new("end"), Scene::new("island")],
        )
        .unwrap()
        .with_start_scenes(["start"]);

        let map = dominators_of(&graph);
        let island = map.get(&"island".into()).unwrap();
        assert!(!island.is_reached());
        assert!(island.dominators.is_empty());
        assert_eq!(map.unreached().collect::<Vec<_>>(), vec![&SceneId::from("island")]);
    }

    #[test]
    fn test_truncated_paths_make_result_inexact() {
        let graph = ScenarioGraph::new(
            "loop",
            vec![Scene::new("start").leads_to("x"), Scene::new("x").leads_to("start")],
        )
        .unwrap()
        .with_start_scenes(["start"]);

        let map = dominators_of(&graph);
        assert!(!map.exact);
        assert!(map.dominates(&"start".into(), &"x".into()));
    }

    #[test]
    fn test_observation_order_does_not_change_membership() {
        let graph = ScenarioGraph::new(
            "diamond",
            vec![
                Scene::new("start").leads_to("a").leads_to("b"),
                Scene::new("a").leads_to("end"),
                Scene::new("b").leads_to("end"),
                Scene::new("end"),
            ],
        )
        .unwrap();
        let mut paths: Vec<Path> = PathEnumerator::new(&graph, PathBounds::default()).collect();
        let forward = compute_dominators(&graph, &paths);
        paths.reverse();
        let backward = compute_dominators(&graph, &paths);

        for set in forward.iter() {
            let other = backward.get(&set.scene).unwrap();
            let mut a = set.dominators.clone();
            let mut b = other.dominators.clone();
            a.sort();
            b.sort();
            assert_eq!(a, b);
            assert_eq!(set.immediate, other.immediate);
        }
    }
}

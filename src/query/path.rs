//! Depth-first path enumeration

use super::types::{EnumerationStats, Path, PathBounds, PathTermination};
use crate::graph::{ScenarioGraph, SceneId, StructuralIssue, StructuralIssueKind, Successor};

/// What to do with one successor of a scene on the current path
#[derive(Debug, Clone)]
enum Step {
    Enter(usize),
    Stop(PathTermination),
}

/// One scene on the current DFS path
#[derive(Debug)]
struct Frame {
    scene: usize,
    steps: Vec<Step>,
    next: usize,
}

/// Lazy, deterministic path enumeration over a scenario
///
/// Walks depth-first from each start scene in order, visiting branches in
/// declaration order. Paths end at endings, at dangling branches, one step
/// before a revisited scene, or at `max_depth`. Once `max_paths` paths have
/// been produced the iterator stops and [`stats`](Self::stats) reports
/// whether more paths were left.
#[derive(Debug)]
pub struct PathEnumerator<'g> {
    graph: &'g ScenarioGraph,
    starts: Vec<usize>,
    next_start: usize,
    stack: Vec<Frame>,
    on_path: Vec<bool>,
    bounds: PathBounds,
    stats: EnumerationStats,
    limit_checked: bool,
}

impl<'g> PathEnumerator<'g> {
    /// Enumerate from the graph's resolved start scenes
    pub fn new(graph: &'g ScenarioGraph, bounds: PathBounds) -> Self {
        Self::from_starts(graph, graph.start_scenes(), bounds)
    }

    /// Enumerate from explicit start scenes (unknown ids are skipped)
    pub fn with_start_ids(graph: &'g ScenarioGraph, starts: &[SceneId], bounds: PathBounds) -> Self {
        let indices = starts.iter().filter_map(|id| graph.index_of(id)).collect();
        Self::from_starts(graph, indices, bounds)
    }

    fn from_starts(graph: &'g ScenarioGraph, starts: Vec<usize>, bounds: PathBounds) -> Self {
        Self {
            graph,
            starts,
            next_start: 0,
            stack: Vec::new(),
            on_path: vec![false; graph.scene_count()],
            bounds,
            stats: EnumerationStats::default(),
            limit_checked: false,
        }
    }

    /// Counters so far; final once the iterator returned `None`
    pub fn stats(&self) -> EnumerationStats {
        self.stats
    }

    /// Put a scene on the path and decide each of its successors up front
    ///
    /// Ancestors cannot change while the frame is live, so cycle checks made
    /// here stay valid until the frame is popped.
    fn push(&mut self, scene: usize) {
        self.on_path[scene] = true;
        let at_depth_limit =
            self.bounds.max_depth > 0 && self.stack.len() + 1 >= self.bounds.max_depth;

        let mut steps = Vec::new();
        let mut depth_cut = false;
        for successor in self.graph.successors(scene) {
            let step = match successor {
                Successor::Ending => Step::Stop(PathTermination::Ending),
                Successor::Dangling => Step::Stop(PathTermination::DanglingBranch),
                Successor::Scene(next) if self.on_path[next] => Step::Stop(PathTermination::Cycle {
                    revisit: self.graph.scene_at(next).id.clone(),
                }),
                Successor::Scene(_) if at_depth_limit => {
                    if depth_cut {
                        continue;
                    }
                    depth_cut = true;
                    Step::Stop(PathTermination::DepthLimit)
                }
                Successor::Scene(next) => Step::Enter(next),
            };
            steps.push(step);
        }

        self.stack.push(Frame {
            scene,
            steps,
            next: 0,
        });
    }

    fn pop(&mut self) {
        if let Some(frame) = self.stack.pop() {
            self.on_path[frame.scene] = false;
        }
    }

    fn current_scenes(&self) -> Vec<SceneId> {
        self.stack
            .iter()
            .map(|f| self.graph.scene_at(f.scene).id.clone())
            .collect()
    }

    /// Advance the DFS to the next complete path
    fn advance(&mut self) -> Option<Path> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                let start = *self.starts.get(self.next_start)?;
                self.next_start += 1;
                self.push(start);
                continue;
            };

            let Some(step) = frame.steps.get(frame.next).cloned() else {
                self.pop();
                continue;
            };
            frame.next += 1;

            let termination = match step {
                Step::Enter(next) => {
                    self.push(next);
                    continue;
                }
                Step::Stop(termination) => termination,
            };

            match termination {
                PathTermination::Cycle { .. } => self.stats.cycle_cuts += 1,
                PathTermination::DepthLimit => self.stats.depth_cuts += 1,
                _ => {}
            }
            return Some(Path::new(self.current_scenes(), termination));
        }
    }
}

impl Iterator for PathEnumerator<'_> {
    type Item = Path;

    fn next(&mut self) -> Option<Path> {
        if self.bounds.max_paths > 0 && self.stats.paths >= self.bounds.max_paths {
            if !self.limit_checked {
                self.limit_checked = true;
                // Peek once so an exact fit isn't reported as truncated
                let cuts = (self.stats.cycle_cuts, self.stats.depth_cuts);
                if self.advance().is_some() {
                    self.stats.path_limit_reached = true;
                }
                (self.stats.cycle_cuts, self.stats.depth_cuts) = cuts;
            }
            return None;
        }

        let path = self.advance()?;
        self.stats.paths += 1;
        Some(path)
    }
}

/// Enumerate paths from explicit start scenes, or the graph's own starts
pub fn enumerate_paths<'g>(
    graph: &'g ScenarioGraph,
    start_scene_ids: &[SceneId],
    bounds: PathBounds,
) -> PathEnumerator<'g> {
    if start_scene_ids.is_empty() {
        PathEnumerator::new(graph, bounds)
    } else {
        PathEnumerator::with_start_ids(graph, start_scene_ids, bounds)
    }
}

/// Check an explicitly supplied path against the graph
///
/// The path is cut before the first step that no branch supports (or the
/// first unknown scene) and a structural issue is returned for the break.
/// Returns `None` if not even the first scene exists.
pub fn check_explicit_path(
    graph: &ScenarioGraph,
    scenes: &[SceneId],
) -> (Option<Path>, Option<StructuralIssue>) {
    let Some(first) = scenes.first() else {
        return (None, None);
    };
    let Some(mut current) = graph.index_of(first) else {
        let issue = StructuralIssue::new(StructuralIssueKind::UnknownStartScene {
            scene_id: first.clone(),
        });
        return (None, Some(issue));
    };

    let mut kept = vec![first.clone()];
    for next_id in &scenes[1..] {
        let linked = graph
            .index_of(next_id)
            .filter(|next| graph.successors(current).contains(&Successor::Scene(*next)));
        match linked {
            Some(next) => {
                if kept.contains(next_id) {
                    let path = Path::new(kept, PathTermination::Cycle { revisit: next_id.clone() });
                    return (Some(path), None);
                }
                kept.push(next_id.clone());
                current = next;
            }
            None => {
                let issue = StructuralIssue::new(StructuralIssueKind::BrokenPathLink {
                    from: graph.scene_at(current).id.clone(),
                    to: next_id.clone(),
                });
                return (Some(Path::new(kept, PathTermination::BrokenLink)), Some(issue));
            }
        }
    }

    let termination = if graph.successors(current).contains(&Successor::Ending) {
        PathTermination::Ending
    } else if graph.successors(current).contains(&Successor::Dangling) {
        PathTermination::DanglingBranch
    } else {
        PathTermination::Unfinished
    };
    (Some(Path::new(kept, termination)), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Branch, Scene};

    fn ids(path: &Path) -> Vec<&str> {
        path.scenes.iter().map(SceneId::as_str).collect()
    }

    fn diamond() -> ScenarioGraph {
        ScenarioGraph::new(
            "diamond",
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
    fn test_linear_single_path() {
        let graph = ScenarioGraph::new(
            "linear",
            vec![
                Scene::new("start").leads_to("middle"),
                Scene::new("middle").leads_to("end"),
                Scene::new("end"),
            ],
        )
        .unwrap();

        let paths: Vec<Path> = PathEnumerator::new(&graph, PathBounds::default()).collect();
        assert_eq!(paths.len(), 1);
        assert_eq!(ids(&paths[0]), vec!["start", "middle", "end"]);
        assert!(!paths[0].truncated());
    }

    #[test]
    fn test_branches_in_declaration_order() {
        let graph = diamond();
        let paths: Vec<Path> = PathEnumerator::new(&graph, PathBounds::default()).collect();

        assert_eq!(paths.len(), 2);
        assert_eq!(ids(&paths[0]), vec!["start", "a", "end"]);
        assert_eq!(ids(&paths[1]), vec!["start", "b", "end"]);
    }

    #[test]
    fn test_self_loop_is_cut_and_flagged() {
        let graph = ScenarioGraph::new(
            "loop",
            vec![
                Scene::new("start").leads_to("x"),
                Scene::new("x").leads_to("x").with_branch(Branch::ending()),
            ],
        )
        .unwrap();

        let mut enumerator = PathEnumerator::new(&graph, PathBounds::default());
        let paths: Vec<Path> = enumerator.by_ref().collect();

        assert_eq!(paths.len(), 2);
        assert_eq!(ids(&paths[0]), vec!["start", "x"]);
        assert_eq!(
            paths[0].termination,
            PathTermination::Cycle { revisit: "x".into() }
        );
        assert!(paths[0].truncated());
        assert_eq!(paths[1].termination, PathTermination::Ending);
        assert_eq!(enumerator.stats().cycle_cuts, 1);
    }

    #[test]
    fn test_depth_limit_truncates_once() {
        let graph = diamond();
        let mut enumerator = PathEnumerator::new(&graph, PathBounds::new(2, 0));
        let paths: Vec<Path> = enumerator.by_ref().collect();

        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.termination == PathTermination::DepthLimit));
        assert_eq!(ids(&paths[0]), vec!["start", "a"]);
        assert_eq!(enumerator.stats().depth_cuts, 2);
    }

    #[test]
    fn test_exact_path_limit_is_not_truncation() {
        let graph = diamond();
        let mut enumerator = PathEnumerator::new(&graph, PathBounds::new(0, 2));
        assert_eq!(enumerator.by_ref().count(), 2);
        assert!(!enumerator.stats().path_limit_reached);
    }

    #[test]
    fn test_path_limit_stops_and_reports() {
        let graph = diamond();
        let mut enumerator = PathEnumerator::new(&graph, PathBounds::new(0, 1));
        let paths: Vec<Path> = enumerator.by_ref().collect();

        assert_eq!(paths.len(), 1);
        assert_eq!(ids(&paths[0]), vec!["start", "a", "end"]);
        assert!(enumerator.stats().path_limit_reached);
        assert!(enumerator.next().is_none());
    }

    #[test]
    fn test_dangling_branch_ends_path() {
        let graph = ScenarioGraph::new(
            "dangling",
            vec![Scene::new("start").with_branch(Branch::to("ghost"))],
        )
        .unwrap();

        let paths: Vec<Path> = PathEnumerator::new(&graph, PathBounds::default()).collect();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].termination, PathTermination::DanglingBranch);
    }

    #[test]
    fn test_explicit_start_ids() {
        let graph = diamond();
        let paths: Vec<Path> =
            enumerate_paths(&graph, &["b".into()], PathBounds::default()).collect();
        assert_eq!(paths.len(), 1);
        assert_eq!(ids(&paths[0]), vec!["b", "end"]);
    }

    #[test]
    fn test_explicit_path_accepts_real_walk() {
        let graph = diamond();
        let (path, issue) =
            check_explicit_path(&graph, &["start".into(), "b".into(), "end".into()]);

        assert!(issue.is_none());
        let path = path.unwrap();
        assert_eq!(path.termination, PathTermination::Ending);
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_explicit_path_stopping_early_is_unfinished() {
        let graph = diamond();
        let (path, issue) = check_explicit_path(&graph, &["start".into(), "a".into()]);

        assert!(issue.is_none());
        let path = path.unwrap();
        assert_eq!(path.termination, PathTermination::Unfinished);
        assert!(path.truncated());
        assert_eq!(path.to_string(), "start -> a -> ...");
    }

    #[test]
    fn test_explicit_path_cut_at_broken_link() {
        let graph = diamond();
        let (path, issue) =
            check_explicit_path(&graph, &["start".into(), "end".into()]);

        let path = path.unwrap();
        assert_eq!(ids(&path), vec!["start"]);
        assert!(path.truncated());
        assert!(matches!(
            issue.unwrap().kind,
            StructuralIssueKind::BrokenPathLink { .. }
        ));
    }
}

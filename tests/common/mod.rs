//! Shared fixtures for the integration tests
//!
//! Scenario builders, a brute-force dominance oracle and a classifier that
//! counts how often each prefix is classified.

#![allow(dead_code)]

use async_trait::async_trait;
use plotline::analysis::{
    ClassificationRequest, ClassifyError, EntityAction, EntityClassifier, EntityReference,
    SceneEntityClassification,
};
use plotline::graph::{Scene, ScenarioGraph, SceneId};
use plotline::query::Path;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Start -> Middle -> End
pub fn linear() -> ScenarioGraph {
    ScenarioGraph::new(
        "linear",
        vec![
            Scene::new("start").leads_to("middle"),
            Scene::new("middle").leads_to("end"),
            Scene::new("end"),
        ],
    )
    .unwrap()
}

/// Start branches to A or B, both rejoin at End
pub fn diamond() -> ScenarioGraph {
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

/// Start -> X, where X loops back to itself or moves on to End
pub fn self_loop() -> ScenarioGraph {
    ScenarioGraph::new(
        "loop",
        vec![
            Scene::new("start").leads_to("x"),
            Scene::new("x").leads_to("x").leads_to("end"),
            Scene::new("end"),
        ],
    )
    .unwrap()
}

/// Id of the scene at `column` in `layer`
pub fn layered_id(layer: usize, column: usize) -> String {
    format!("l{}c{}", layer, column)
}

/// A start scene followed by `depth - 1` layers of `width` scenes, each
/// scene branching to every scene of the next layer
pub fn layered(width: usize, depth: usize) -> ScenarioGraph {
    let mut start = Scene::new("start");
    for column in 0..width {
        start = start.leads_to(layered_id(1, column));
    }
    let mut scenes = vec![start];
    for layer in 1..depth {
        for column in 0..width {
            let mut scene = Scene::new(layered_id(layer, column));
            if layer + 1 < depth {
                for next in 0..width {
                    scene = scene.leads_to(layered_id(layer + 1, next));
                }
            }
            scenes.push(scene);
        }
    }
    ScenarioGraph::new("layered", scenes).unwrap()
}

/// Random acyclic scenario: branches only point forward in declaration order
pub fn random_dag(seed: u64, scenes: usize) -> ScenarioGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(scenes);
    for i in 0..scenes {
        let mut scene = Scene::new(format!("s{}", i));
        if i + 1 < scenes {
            let fan_out = rng.gen_range(0..=3);
            let mut targets = BTreeSet::new();
            for _ in 0..fan_out {
                targets.insert(rng.gen_range(i + 1..scenes));
            }
            for target in targets {
                scene = scene.leads_to(format!("s{}", target));
            }
        }
        out.push(scene);
    }
    ScenarioGraph::new(format!("random-{}", seed), out).unwrap()
}

/// Dominators by direct intersection over every path reaching each scene
pub fn brute_force_dominators(paths: &[Path]) -> HashMap<SceneId, BTreeSet<SceneId>> {
    let mut out: HashMap<SceneId, BTreeSet<SceneId>> = HashMap::new();
    for path in paths {
        for (at, scene) in path.scenes.iter().enumerate() {
            let preceding: BTreeSet<SceneId> = path.scenes[..=at].iter().cloned().collect();
            out.entry(scene.clone())
                .and_modify(|set| set.retain(|s| preceding.contains(s)))
                .or_insert(preceding);
        }
    }
    out
}

/// Classification introducing a character
pub fn introduces(name: &str) -> SceneEntityClassification {
    SceneEntityClassification::new().with_entity(EntityReference::character(name, EntityAction::Introduced))
}

/// Classification treating a character as already known
pub fn continues(name: &str) -> SceneEntityClassification {
    SceneEntityClassification::new().with_entity(EntityReference::character(name, EntityAction::Continued))
}

/// Serves a fixed table and records every prefix it is asked about
#[derive(Default)]
pub struct CountingClassifier {
    table: HashMap<SceneId, SceneEntityClassification>,
    delay: Duration,
    calls: AtomicUsize,
    per_prefix: Mutex<HashMap<Vec<SceneId>, usize>>,
}

impl CountingClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scene(mut self, scene: &str, classification: SceneEntityClassification) -> Self {
        self.table.insert(SceneId::from(scene), classification);
        self
    }

    /// Hold every call open for `delay` so concurrent callers overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls any single prefix received
    pub fn max_calls_per_prefix(&self) -> usize {
        self.per_prefix.lock().unwrap().values().copied().max().unwrap_or(0)
    }

    pub fn distinct_prefixes(&self) -> usize {
        self.per_prefix.lock().unwrap().len()
    }
}

#[async_trait]
impl EntityClassifier for CountingClassifier {
    fn id(&self) -> &str {
        "counting"
    }

    async fn classify(
        &self,
        request: &ClassificationRequest<'_>,
    ) -> Result<SceneEntityClassification, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut prefix = request.preceding.to_vec();
        prefix.push(request.scene.id.clone());
        *self.per_prefix.lock().unwrap().entry(prefix).or_default() += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.table.get(&request.scene.id).cloned().unwrap_or_default())
    }
}

//! Issue aggregation and consistency scoring

use super::issue::{ConsistencyIssue, IssueType, Severity};
use crate::graph::SceneId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Overall verdict bucket, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    Ok,
    HasMinorIssues,
    HasMajorIssues,
    Broken,
}

impl Assessment {
    /// Downgrade to at least `HasMinorIssues` when the run saw only a
    /// sample of the scenario
    pub fn capped_for_truncation(self, truncated: bool) -> Self {
        if truncated {
            self.max(Assessment::HasMinorIssues)
        } else {
            self
        }
    }
}

impl std::fmt::Display for Assessment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Assessment::Ok => "ok",
            Assessment::HasMinorIssues => "has_minor_issues",
            Assessment::HasMajorIssues => "has_major_issues",
            Assessment::Broken => "broken",
        };
        write!(f, "{}", s)
    }
}

/// Score and verdict for a set of issues
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// 1.0 is clean, 0.0 is the floor
    pub score: f64,
    pub assessment: Assessment,
    /// No issue reaches `high`
    pub is_consistent: bool,
}

/// Severity-weighted penalty scorer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsistencyScorer {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
    /// Lowest score still `ok`
    pub ok_threshold: f64,
    /// Lowest score still `has_minor_issues`
    pub minor_threshold: f64,
    /// Lowest score still `has_major_issues`
    pub major_threshold: f64,
}

impl Default for ConsistencyScorer {
    fn default() -> Self {
        Self {
            critical: 0.4,
            high: 0.2,
            medium: 0.1,
            low: 0.03,
            ok_threshold: 0.95,
            minor_threshold: 0.75,
            major_threshold: 0.4,
        }
    }
}

impl ConsistencyScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn penalty(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    pub fn assess(&self, score: f64) -> Assessment {
        if score >= self.ok_threshold {
            Assessment::Ok
        } else if score >= self.minor_threshold {
            Assessment::HasMinorIssues
        } else if score >= self.major_threshold {
            Assessment::HasMajorIssues
        } else {
            Assessment::Broken
        }
    }

    /// Score a deduplicated issue list; order does not matter
    pub fn score<'a>(&self, issues: impl IntoIterator<Item = &'a ConsistencyIssue>) -> Score {
        let mut counts = [0u32; 4];
        for issue in issues {
            counts[issue.severity as usize] += 1;
        }

        // Summed per severity so the floating-point result cannot depend on order
        let total: f64 = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical]
            .iter()
            .map(|&s| f64::from(counts[s as usize]) * self.penalty(s))
            .sum();
        let score = (1.0 - total).clamp(0.0, 1.0);
        let blocking = counts[Severity::High as usize] + counts[Severity::Critical as usize];

        Score {
            score,
            assessment: self.assess(score),
            is_consistent: blocking == 0,
        }
    }
}

/// Collapses the same problem found on several paths into one issue
///
/// Issues sharing a (type, scene, entity) key keep the first one's text,
/// the union of their paths and the highest severity seen.
#[derive(Debug, Default)]
pub struct IssueAggregator {
    issues: Vec<ConsistencyIssue>,
    index: HashMap<(IssueType, Option<SceneId>, Option<String>), usize>,
}

impl IssueAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: ConsistencyIssue) {
        let key = issue.dedup_key();
        match self.index.get(&key) {
            Some(&at) => {
                let existing = &mut self.issues[at];
                for path in issue.paths {
                    if !existing.paths.contains(&path) {
                        existing.paths.push(path);
                    }
                }
                if issue.severity > existing.severity {
                    existing.severity = issue.severity;
                    existing.confidence = issue.confidence;
                }
                for scene in issue.scene_ids {
                    if !existing.scene_ids.contains(&scene) {
                        existing.scene_ids.push(scene);
                    }
                }
            }
            None => {
                self.index.insert(key, self.issues.len());
                self.issues.push(issue);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Deduplicated issues, most severe first, in a stable order
    pub fn finish(self) -> Vec<ConsistencyIssue> {
        let mut issues = self.issues;
        for issue in &mut issues {
            issue.paths.sort_unstable();
        }
        issues.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(a.issue_type.cmp(&b.issue_type))
                .then_with(|| a.primary_scene().cmp(&b.primary_scene()))
                .then_with(|| a.dedup_key().2.cmp(&b.dedup_key().2))
                .then_with(|| a.summary.cmp(&b.summary))
        });
        issues
    }
}

impl Extend<ConsistencyIssue> for IssueAggregator {
    fn extend<T: IntoIterator<Item = ConsistencyIssue>>(&mut self, iter: T) {
        for issue in iter {
            self.add(issue);
        }
    }
}

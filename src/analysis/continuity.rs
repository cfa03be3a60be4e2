//! Per-path entity continuity
//!
//! Folds one scene's classification into the entity ledger carried along
//! a path, raising findings for references that contradict what the path
//! has established so far.

use super::entity::{EntityAction, EntityKind, EntityReference, EntityStatus, SceneEntityClassification};
use super::issue::{Confidence, ConsistencyIssue, EntityRef, IssueType, Severity};
use crate::graph::SceneId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where an entity stands at one point on one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// Guaranteed present
    Active,
    /// Guaranteed absent
    Removed,
    /// Mentioned without a clear footing
    Unknown,
    /// Around, but only in the background
    BackgroundOnly,
}

/// Everything a path knows about one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTrack {
    /// Name as first referenced
    pub name: String,
    pub kind: EntityKind,
    pub is_proper_noun: bool,
    pub state: EntityState,
    /// Scene where the path introduced the entity, if it did
    pub introduced_at: Option<SceneId>,
    /// Most recent scene that referenced the entity
    pub last_seen: SceneId,
    pub confidence: Confidence,
}

impl EntityTrack {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            name: self.name.clone(),
            kind: self.kind,
        }
    }
}

/// Entity tracks keyed by canonical name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLedger {
    tracks: BTreeMap<String, EntityTrack>,
}

impl EntityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&EntityTrack> {
        self.tracks.get(key)
    }

    pub fn state_of(&self, key: &str) -> Option<EntityState> {
        self.tracks.get(key).map(|t| t.state)
    }

    /// Tracks in canonical-key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityTrack)> {
        self.tracks.iter().map(|(k, t)| (k.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// All references to one entity within a scene, collapsed
#[derive(Debug)]
struct Mention<'a> {
    key: String,
    first: &'a EntityReference,
    is_proper_noun: bool,
    introduces: bool,
    continues: bool,
    removes: bool,
    ambiguous: bool,
    unrecognized: Option<&'a str>,
    /// A reference says the entity stays while another removes it
    conflicting: bool,
    status: EntityStatus,
    confidence: Confidence,
    evidence: Option<&'a str>,
}

impl<'a> Mention<'a> {
    fn new(key: String, reference: &'a EntityReference) -> Self {
        Self {
            key,
            first: reference,
            is_proper_noun: false,
            introduces: false,
            continues: false,
            removes: false,
            ambiguous: false,
            unrecognized: None,
            conflicting: false,
            status: EntityStatus::Unknown,
            confidence: reference.confidence,
            evidence: None,
        }
    }

    fn absorb(&mut self, reference: &'a EntityReference) {
        self.is_proper_noun |= reference.is_proper_noun;
        match &reference.action {
            EntityAction::Introduced => self.introduces = true,
            EntityAction::Continued => self.continues = true,
            EntityAction::Removed => self.removes = true,
            EntityAction::Ambiguous => self.ambiguous = true,
            EntityAction::Unrecognized(raw) => {
                self.ambiguous = true;
                self.unrecognized.get_or_insert(raw.as_str());
            }
        }
        match &reference.status_at_end {
            EntityStatus::Unknown | EntityStatus::Unrecognized(_) => {}
            status => self.status = status.clone(),
        }
        self.confidence = self.confidence.min(reference.confidence);
        if self.evidence.is_none() {
            self.evidence = reference.evidence.as_deref();
        }
    }

    fn finish(mut self, references: &[&EntityReference]) -> Self {
        let keeps = references
            .iter()
            .any(|r| r.status_at_end == EntityStatus::Active);
        let drops = self.removes
            || references
                .iter()
                .any(|r| r.status_at_end == EntityStatus::Removed);
        self.conflicting = keeps && drops;
        if self.conflicting {
            self.status = EntityStatus::Removed;
            self.removes = true;
        }
        self
    }

    fn entity_ref(&self) -> EntityRef {
        EntityRef {
            name: self.first.name.clone(),
            kind: self.first.kind,
        }
    }

    /// Base severity graded by confidence and by how identifiable the entity is
    fn graded(&self, base: Severity) -> Severity {
        let severity = base.scaled(self.confidence);
        if self.is_proper_noun {
            severity
        } else {
            severity.lowered(1)
        }
    }

    fn finding(&self, scene: &SceneId, issue_type: IssueType, base: Severity, summary: String) -> ConsistencyIssue {
        let mut issue = ConsistencyIssue::new(issue_type, self.graded(base), summary)
            .at_scene(scene.clone())
            .with_entity(self.entity_ref())
            .with_confidence(self.confidence);
        if let Some(evidence) = self.evidence {
            issue = issue.with_evidence(evidence);
        }
        issue
    }
}

/// Group a scene's references by entity, in order of first mention
fn collapse(classification: &SceneEntityClassification) -> Vec<Mention<'_>> {
    let mut order: Vec<(String, Vec<&EntityReference>)> = Vec::new();
    for reference in &classification.entities {
        let key = reference.key();
        if key.is_empty() {
            continue;
        }
        match order.iter_mut().find(|(k, _)| *k == key) {
            Some((_, refs)) => refs.push(reference),
            None => order.push((key, vec![reference])),
        }
    }

    order
        .into_iter()
        .map(|(key, refs)| {
            let mut mention = Mention::new(key, refs[0]);
            for &reference in &refs {
                mention.absorb(reference);
            }
            mention.finish(&refs)
        })
        .collect()
}

/// Fold one scene's classification into a path's ledger
///
/// Returns the ledger after the scene and the findings raised at it. The
/// prior ledger is left untouched.
pub fn fold_scene(
    prior: &EntityLedger,
    scene: &SceneId,
    classification: &SceneEntityClassification,
) -> (EntityLedger, Vec<ConsistencyIssue>) {
    let mut ledger = prior.clone();
    let mut findings = Vec::new();

    for mention in collapse(classification) {
        let before = prior.state_of(&mention.key);
        let name = &mention.first.name;
        let mut state = before;
        let mut introduced_here = false;

        if mention.conflicting {
            findings.push(
                mention
                    .finding(
                        scene,
                        IssueType::EntityAmbiguousUsage,
                        Severity::Medium,
                        format!("'{}' is both kept and removed in '{}'", name, scene),
                    )
                    .with_details("The scene references the entity as staying and as leaving; treated as removed."),
            );
        }

        if mention.introduces {
            match before {
                Some(EntityState::Active) => findings.push(
                    mention
                        .finding(
                            scene,
                            IssueType::EntityReintroduced,
                            Severity::Medium,
                            format!("'{}' is introduced again in '{}'", name, scene),
                        )
                        .with_suggested_fix("Refer to the entity as already known."),
                ),
                Some(EntityState::Removed) => findings.push(
                    mention
                        .finding(
                            scene,
                            IssueType::EntityReintroduced,
                            Severity::High,
                            format!("'{}' is introduced in '{}' after being removed", name, scene),
                        )
                        .with_suggested_fix("Explain the return, or introduce a different entity."),
                ),
                _ => introduced_here = true,
            }
            state = Some(EntityState::Active);
        } else if mention.continues {
            match before {
                None => findings.push(used_as_known(&mention, scene)),
                Some(EntityState::Removed) => findings.push(
                    mention
                        .finding(
                            scene,
                            IssueType::EntityIncorrectlyRemoved,
                            Severity::High,
                            format!("'{}' appears in '{}' after being removed", name, scene),
                        )
                        .with_suggested_fix("Remove the reference, or do not remove the entity earlier."),
                ),
                _ => {}
            }
            state = Some(EntityState::Active);
        } else if mention.removes {
            match before {
                None => findings.push(used_as_known(&mention, scene)),
                Some(EntityState::Removed) if !mention.conflicting => findings.push(mention.finding(
                    scene,
                    IssueType::EntityIncorrectlyRemoved,
                    Severity::Medium,
                    format!("'{}' is removed again in '{}'", name, scene),
                )),
                _ => {}
            }
        } else if mention.ambiguous && before.is_none() {
            let mut finding = mention.finding(
                scene,
                IssueType::EntityAmbiguousUsage,
                Severity::Low,
                format!("Unclear how '{}' enters the story in '{}'", name, scene),
            );
            if let Some(raw) = mention.unrecognized {
                finding = finding.with_details(format!("Unrecognised action '{}'", raw));
            }
            findings.push(finding);
            state = Some(EntityState::Unknown);
        }

        if mention.removes {
            state = Some(EntityState::Removed);
        }
        state = match mention.status {
            EntityStatus::Active => Some(EntityState::Active),
            EntityStatus::Removed => Some(EntityState::Removed),
            EntityStatus::BackgroundOnly => Some(EntityState::BackgroundOnly),
            EntityStatus::Unknown | EntityStatus::Unrecognized(_) => state,
        };
        let Some(state) = state else {
            continue;
        };

        let track = ledger.tracks.entry(mention.key.clone()).or_insert_with(|| EntityTrack {
            name: name.clone(),
            kind: mention.first.kind,
            is_proper_noun: mention.is_proper_noun,
            state,
            introduced_at: None,
            last_seen: scene.clone(),
            confidence: mention.confidence,
        });
        track.state = state;
        track.last_seen = scene.clone();
        track.is_proper_noun |= mention.is_proper_noun;
        track.confidence = mention.confidence;
        if introduced_here {
            track.introduced_at = Some(scene.clone());
        }
    }

    (ledger, findings)
}

fn used_as_known(mention: &Mention<'_>, scene: &SceneId) -> ConsistencyIssue {
    mention
        .finding(
            scene,
            IssueType::EntityUsedAsKnown,
            Severity::High,
            format!(
                "'{}' is treated as known in '{}' but was not introduced on this path",
                mention.first.name, scene
            ),
        )
        .with_suggested_fix("Introduce the entity earlier on every path, or present it as new here.")
}

//! Scene and branch representation in the scenario graph

use serde::{Deserialize, Deserializer, Serialize};

/// Unique identifier for a scene
///
/// Serializes as a plain string (the authoring tool's scene key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(String);

impl SceneId {
    /// Create a SceneId from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SceneId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SceneId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A player choice leading out of a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// Choice text shown to the player
    #[serde(default)]
    pub choice: String,
    /// Scene this choice leads to; `None` ends the narrative
    #[serde(default, deserialize_with = "empty_as_none")]
    pub next_scene_id: Option<SceneId>,
    /// Compass direction or moral axis the choice leans toward
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compass: Option<String>,
    /// Free-text continuity note attached by the author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuity: Option<String>,
}

impl Branch {
    /// Create a branch leading to another scene
    pub fn to(next: impl Into<SceneId>) -> Self {
        Self {
            choice: String::new(),
            next_scene_id: Some(next.into()),
            compass: None,
            continuity: None,
        }
    }

    /// Create a branch that ends the narrative
    pub fn ending() -> Self {
        Self {
            choice: String::new(),
            next_scene_id: None,
            compass: None,
            continuity: None,
        }
    }

    /// Set the choice text
    pub fn with_choice(mut self, choice: impl Into<String>) -> Self {
        self.choice = choice.into();
        self
    }

    /// Set the compass metadata
    pub fn with_compass(mut self, compass: impl Into<String>) -> Self {
        self.compass = Some(compass.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.next_scene_id.is_none()
    }
}

/// A scene in the scenario graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Unique identifier
    pub id: SceneId,
    /// Short title
    #[serde(default)]
    pub title: String,
    /// Narration text; handed to the entity classifier
    #[serde(default)]
    pub narration: String,
    /// Outgoing choices, in declaration order
    #[serde(default)]
    pub branches: Vec<Branch>,
}

impl Scene {
    /// Create a new scene with no branches (a narrative ending)
    pub fn new(id: impl Into<SceneId>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            narration: String::new(),
            branches: Vec::new(),
        }
    }

    /// Set the narration text
    pub fn with_narration(mut self, narration: impl Into<String>) -> Self {
        self.narration = narration.into();
        self
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Add a branch
    pub fn with_branch(mut self, branch: Branch) -> Self {
        self.branches.push(branch);
        self
    }

    /// Add a branch to another scene
    pub fn leads_to(self, next: impl Into<SceneId>) -> Self {
        self.with_branch(Branch::to(next))
    }

    /// True if the scene has no branches or only terminal ones
    pub fn is_ending(&self) -> bool {
        self.branches.iter().all(Branch::is_terminal)
    }
}

/// Authoring tools write terminal branches as `""` as often as `null`.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<SceneId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(SceneId::from))
}

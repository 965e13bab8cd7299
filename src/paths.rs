//! Research-path configuration tree.
//!
//! The static JSON document describing the three research-methodology paths
//! (quantitative, qualitative, mixed), their per-step specifications, and the
//! worldview-to-path mapping. Loaded once at startup and treated as read-only
//! for the process lifetime; resolution logic lives in [`crate::resolve`] as
//! pure functions over this tree.
//!
//! Document shape:
//!
//! ```json
//! {
//!   "worldview_to_path": { "positivist": "quantitative", ... },
//!   "paths": {
//!     "quantitative": { "steps": { "4": { "title": "...", ... } } },
//!     ...
//!   }
//! }
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Path name for mixed-methods students.
pub const PATH_MIXED: &str = "mixed";
/// Path name for the quantitative track.
pub const PATH_QUANTITATIVE: &str = "quantitative";
/// Path name for the qualitative track.
pub const PATH_QUALITATIVE: &str = "qualitative";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub worldview_to_path: HashMap<String, String>,
    #[serde(default)]
    pub paths: HashMap<String, ResearchPath>,
}

/// One research-methodology track.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResearchPath {
    /// Step specifications keyed by step number as a string ("4".."9").
    #[serde(default)]
    pub steps: HashMap<String, StepSpec>,
}

/// Per-step UI and guidance specification.
///
/// `options` and `fields` stay schema-flexible (`serde_json::Value`) — their
/// contents drive the UI and pass through resolution untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepSpec {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub directions: String,
    #[serde(default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub field_key: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub fields: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub llm_guidance: Option<String>,
    #[serde(default)]
    pub inherits_from_chosen_methodology: bool,
    #[serde(default)]
    pub llm_guidance_addendum: Option<String>,
}

impl PathsConfig {
    /// The step spec for `(path, step)`, if the configuration has one.
    pub fn step_spec(&self, path: &str, step: u8) -> Option<&StepSpec> {
        self.paths.get(path)?.steps.get(&step.to_string())
    }

    /// Resolve a worldview id to its path name.
    pub fn path_for_worldview(&self, worldview_id: &str) -> Option<&str> {
        self.worldview_to_path.get(worldview_id).map(String::as_str)
    }

    /// Whether a worldview id is known to the configuration.
    pub fn is_known_worldview(&self, worldview_id: &str) -> bool {
        self.worldview_to_path.contains_key(worldview_id)
    }
}

/// Load the paths configuration document.
///
/// A missing or invalid file degrades to an empty tree with a warning —
/// resolution then yields holding/default configurations rather than the
/// chat flow crashing.
pub fn load_paths_config(path: &Path) -> PathsConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "paths config not found; using empty tree");
            return PathsConfig::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "paths config invalid; using empty tree");
            PathsConfig::default()
        }
    }
}

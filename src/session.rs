//! Session resolution state.
//!
//! The slice of session state the core owns: which worldview the student
//! picked, the research path resolved from it, the methodology chosen at
//! Step 4, and the per-step saved inputs. Storage and transport of full
//! sessions belong to the surrounding application; this type only enforces
//! the lifecycle rules that resolution depends on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::paths::{PathsConfig, PATH_QUALITATIVE, PATH_QUANTITATIVE};
use crate::resolve::{MAX_STEP, MIN_STEP};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid worldview id: {0}")]
    InvalidWorldview(String),
    #[error("methodology must be 'quantitative' or 'qualitative', got: {0}")]
    InvalidMethodology(String),
}

/// The resolution-relevant subset of a student session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub worldview_id: Option<String>,
    pub worldview_label: Option<String>,
    /// Pinned from `worldview_to_path` when the worldview is selected.
    pub resolved_path: Option<String>,
    /// Methodology override chosen at Step 4; governs steps 5-9 once set.
    pub chosen_methodology: Option<String>,
    pub active_step: u8,
    /// Saved inputs per step, keyed by step number.
    pub step_notes: BTreeMap<u8, serde_json::Value>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            worldview_id: None,
            worldview_label: None,
            resolved_path: None,
            chosen_methodology: None,
            active_step: MIN_STEP,
            step_notes: BTreeMap::new(),
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the student's worldview and pin the research path from the
    /// configuration's `worldview_to_path` mapping.
    pub fn set_worldview(&mut self, cfg: &PathsConfig, worldview_id: &str) -> Result<(), SessionError> {
        let id = worldview_id.trim();
        if !cfg.is_known_worldview(id) {
            return Err(SessionError::InvalidWorldview(id.to_string()));
        }

        self.worldview_id = Some(id.to_string());
        self.worldview_label = Some(title_case(id));
        self.resolved_path = cfg.path_for_worldview(id).map(str::to_string);

        let notes = self.step_notes.entry(1).or_insert_with(|| serde_json::json!({}));
        if let Some(obj) = notes.as_object_mut() {
            obj.insert("worldview_id".to_string(), serde_json::json!(id));
        }
        Ok(())
    }

    /// Set or change the chosen methodology.
    ///
    /// Changing an existing choice clears saved inputs for steps 5-9, since
    /// their shape depends on the methodology.
    pub fn set_methodology(&mut self, methodology: &str) -> Result<(), SessionError> {
        let m = methodology.trim().to_lowercase();
        if m != PATH_QUANTITATIVE && m != PATH_QUALITATIVE {
            return Err(SessionError::InvalidMethodology(m));
        }

        if let Some(prev) = &self.chosen_methodology {
            if prev != &m {
                for step in 5..=MAX_STEP {
                    self.step_notes.remove(&step);
                }
            }
        }

        self.chosen_methodology = Some(m.clone());
        let notes = self.step_notes.entry(4).or_insert_with(|| serde_json::json!({}));
        if let Some(obj) = notes.as_object_mut() {
            obj.insert("chosen_methodology".to_string(), serde_json::json!(m));
        }
        Ok(())
    }

    /// Save a step's input data.
    pub fn save_step(&mut self, step: u8, data: serde_json::Value) {
        self.step_notes.insert(step, data);
    }

    /// Steps with meaningful saved data: step 1 once a worldview id is
    /// recorded, steps 2-9 once their notes are non-empty.
    pub fn completed_steps(&self) -> Vec<u8> {
        let mut completed = Vec::new();
        if let Some(s1) = self.step_notes.get(&1) {
            if s1.get("worldview_id").and_then(|v| v.as_str()).is_some() {
                completed.push(1);
            }
        }
        for step in 2..=MAX_STEP {
            if let Some(notes) = self.step_notes.get(&step) {
                let non_empty = match notes.as_object() {
                    Some(obj) => !obj.is_empty(),
                    None => !notes.is_null(),
                };
                if non_empty {
                    completed.push(step);
                }
            }
        }
        completed
    }
}

/// "post_positivist" → "Post Positivist".
fn title_case(id: &str) -> String {
    id.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

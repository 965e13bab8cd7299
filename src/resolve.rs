//! Path resolution engine.
//!
//! Pure functions computing the effective step configuration and LLM guidance
//! for a session's `(resolved_path, chosen_methodology, step)` triple against
//! the static [`PathsConfig`] tree. All inheritance and override precedence
//! lives here:
//!
//! - Steps 1–3 are pre-path; they resolve to an empty configuration.
//! - Step 4 always resolves against the resolved path's own spec. A mixed
//!   path additionally exposes both single-methodology option sets so the
//!   student can pick one; quantitative and qualitative paths recommend
//!   themselves, mixed recommends nothing.
//! - Steps 5–9: a mixed path whose step spec inherits from the chosen
//!   methodology resolves to that methodology's spec with the mixed addendum
//!   appended to the guidance; without a choice yet, a holding configuration
//!   directs the student back to Step 4. A non-mixed path with a differing
//!   override uses the override's spec verbatim — full substitution, no
//!   addendum merge. Otherwise the resolved path's own spec applies.
//!
//! Missing path or step entries degrade to an empty spec; only a step number
//! outside 1–9 is rejected, since that is a bug in the caller rather than an
//! environmental condition.

use serde::Serialize;
use thiserror::Error;

use crate::paths::{PathsConfig, StepSpec, PATH_MIXED, PATH_QUALITATIVE, PATH_QUANTITATIVE};

/// First step of the workflow.
pub const MIN_STEP: u8 = 1;
/// Last step of the workflow.
pub const MAX_STEP: u8 = 9;
/// First step governed by path configuration.
pub const FIRST_PATH_STEP: u8 = 4;

/// Caller-contract violations. Everything else degrades instead of erroring.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("step {0} is outside the supported range 1-9")]
    StepOutOfRange(u8),
}

/// The effective configuration for one step, ready to drive the UI.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StepConfig {
    pub step: u8,
    pub path: Option<String>,
    pub title: String,
    pub directions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_guidance: Option<String>,
    /// Step 4 on the mixed path only: the quantitative option set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantitative_options: Option<Vec<serde_json::Value>>,
    /// Step 4 on the mixed path only: the qualitative option set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualitative_options: Option<Vec<serde_json::Value>>,
    /// Step 4 on a single-methodology path: the path recommends itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_methodology: Option<String>,
}

impl StepConfig {
    fn holding(step: u8, path: Option<&str>, directions: &str) -> Self {
        Self {
            step,
            path: path.map(str::to_string),
            title: format!("Step {}", step),
            directions: directions.to_string(),
            ..Default::default()
        }
    }

    fn from_spec(step: u8, path: &str, spec: &StepSpec) -> Self {
        Self {
            step,
            path: Some(path.to_string()),
            title: if spec.title.is_empty() {
                format!("Step {}", step)
            } else {
                spec.title.clone()
            },
            directions: spec.directions.clone(),
            field_type: spec.field_type.clone(),
            field_key: spec.field_key.clone(),
            options: spec.options.clone(),
            fields: spec.fields.clone(),
            llm_guidance: spec.llm_guidance.clone(),
            ..Default::default()
        }
    }

    /// True when the configuration carries an actual field specification
    /// (as opposed to a pre-path or holding configuration).
    pub fn has_field_spec(&self) -> bool {
        self.field_type.is_some() || self.fields.is_some() || self.options.is_some()
    }
}

const COMPLETE_STEP_1: &str = "Please complete Step 1 first and select your worldview.";
const COMPLETE_STEP_4: &str = "Please complete Step 4 first and choose your primary methodology.";
const GUIDANCE_AWAITING_CHOICE: &str =
    "The student has not yet chosen their primary methodology in Step 4.";

/// Resolve the effective step configuration.
///
/// Pure function of its inputs plus the static configuration tree; safe to
/// call from any number of concurrent request handlers.
pub fn resolve_step_config(
    cfg: &PathsConfig,
    resolved_path: Option<&str>,
    chosen_methodology: Option<&str>,
    step: u8,
) -> Result<StepConfig, ResolveError> {
    check_step(step)?;

    // Steps 1-3 are pre-path; nothing to resolve.
    if step < FIRST_PATH_STEP {
        return Ok(StepConfig {
            step,
            ..Default::default()
        });
    }

    let resolved = match resolved_path {
        Some(p) => p,
        None => return Ok(StepConfig::holding(step, None, COMPLETE_STEP_1)),
    };

    let empty = StepSpec::default();
    let spec = cfg.step_spec(resolved, step).unwrap_or(&empty);

    // Mixed-path inheritance for steps 5-9.
    if resolved == PATH_MIXED && step > FIRST_PATH_STEP && spec.inherits_from_chosen_methodology {
        let chosen = match chosen_methodology {
            Some(c) => c,
            None => return Ok(StepConfig::holding(step, Some(PATH_MIXED), COMPLETE_STEP_4)),
        };
        let inherited = cfg.step_spec(chosen, step).unwrap_or(&empty);
        let mut config = StepConfig::from_spec(step, PATH_MIXED, inherited);
        config.llm_guidance = merge_guidance(
            inherited.llm_guidance.as_deref(),
            spec.llm_guidance_addendum.as_deref(),
        );
        return Ok(config);
    }

    // Non-mixed override: a differing chosen methodology substitutes its own
    // spec in full for steps 5-9.
    if resolved != PATH_MIXED && step > FIRST_PATH_STEP {
        if let Some(chosen) = chosen_methodology {
            if chosen != resolved {
                let override_spec = cfg.step_spec(chosen, step).unwrap_or(&empty);
                return Ok(StepConfig::from_spec(step, chosen, override_spec));
            }
        }
    }

    let mut config = StepConfig::from_spec(step, resolved, spec);

    if step == FIRST_PATH_STEP {
        if resolved == PATH_MIXED {
            // Expose both option sets side by side so the student can choose.
            config.quantitative_options = cfg
                .step_spec(PATH_QUANTITATIVE, step)
                .and_then(|s| s.options.clone());
            config.qualitative_options = cfg
                .step_spec(PATH_QUALITATIVE, step)
                .and_then(|s| s.options.clone());
        } else if resolved == PATH_QUANTITATIVE || resolved == PATH_QUALITATIVE {
            config.recommended_methodology = Some(resolved.to_string());
        }
    }

    Ok(config)
}

/// Resolve only the LLM guidance string for a step.
///
/// Identical precedence to [`resolve_step_config`], returning just the
/// guidance — used when building the model's system context.
pub fn resolve_step_guidance(
    cfg: &PathsConfig,
    resolved_path: Option<&str>,
    chosen_methodology: Option<&str>,
    step: u8,
) -> Result<Option<String>, ResolveError> {
    check_step(step)?;

    if step < FIRST_PATH_STEP {
        return Ok(None);
    }
    let resolved = match resolved_path {
        Some(p) => p,
        None => return Ok(None),
    };

    let empty = StepSpec::default();
    let spec = cfg.step_spec(resolved, step).unwrap_or(&empty);

    if resolved == PATH_MIXED && step > FIRST_PATH_STEP && spec.inherits_from_chosen_methodology {
        let chosen = match chosen_methodology {
            Some(c) => c,
            None => return Ok(Some(GUIDANCE_AWAITING_CHOICE.to_string())),
        };
        let inherited = cfg.step_spec(chosen, step).unwrap_or(&empty);
        return Ok(merge_guidance(
            inherited.llm_guidance.as_deref(),
            spec.llm_guidance_addendum.as_deref(),
        ));
    }

    if resolved != PATH_MIXED && step > FIRST_PATH_STEP {
        if let Some(chosen) = chosen_methodology {
            if chosen != resolved {
                let override_spec = cfg.step_spec(chosen, step).unwrap_or(&empty);
                return Ok(override_spec.llm_guidance.clone().filter(|g| !g.is_empty()));
            }
        }
    }

    Ok(spec.llm_guidance.clone().filter(|g| !g.is_empty()))
}

fn check_step(step: u8) -> Result<(), ResolveError> {
    if !(MIN_STEP..=MAX_STEP).contains(&step) {
        return Err(ResolveError::StepOutOfRange(step));
    }
    Ok(())
}

/// Append the mixed addendum to inherited guidance: `"{inherited}\n{addendum}"`,
/// or just the addendum when the inherited guidance is empty.
fn merge_guidance(inherited: Option<&str>, addendum: Option<&str>) -> Option<String> {
    let inherited = inherited.unwrap_or("");
    let addendum = addendum.unwrap_or("");
    match (inherited.is_empty(), addendum.is_empty()) {
        (true, true) => None,
        (false, true) => Some(inherited.to_string()),
        (true, false) => Some(addendum.to_string()),
        (false, false) => Some(format!("{}\n{}", inherited, addendum)),
    }
}

//! Chat-context assembler.
//!
//! Composes one chat turn's grounding payload: the student's worldview
//! profile, their saved step inputs, the step-specific LLM guidance resolved
//! from the paths tree, and supporting passages from the retriever. The chat
//! transport to the model is out of scope — callers hand the payload to
//! their own LLM client.

use crate::models::Passage;
use crate::paths::PathsConfig;
use crate::resolve::{resolve_step_guidance, ResolveError};
use crate::retriever::Retriever;
use crate::session::SessionState;

/// Saved step values are truncated to this many characters in the rendered
/// context, keeping the prompt bounded.
const MAX_VALUE_CHARS: usize = 300;
/// Passages are clipped to this many characters in the rendered block.
const MAX_PASSAGE_CHARS: usize = 800;

/// Everything a chat turn needs to ground the model's reply.
#[derive(Debug)]
pub struct ContextPayload {
    /// Step-specific tutoring guidance, per the resolution precedence rules.
    pub step_guidance: Option<String>,
    /// Human-readable worldview summary for the system context.
    pub worldview_profile: String,
    /// Rendered prior step inputs.
    pub step_context: String,
    /// Supporting passages, ranked.
    pub passages: Vec<Passage>,
}

impl ContextPayload {
    /// Render the passages as numbered, source-attributed blocks.
    pub fn render_passages(&self) -> String {
        if self.passages.is_empty() {
            return "No matching passages.".to_string();
        }
        self.passages
            .iter()
            .enumerate()
            .map(|(i, p)| {
                format!("[{}] Source: {}\n{}", i + 1, p.source, clip(&p.text, MAX_PASSAGE_CHARS))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Assemble the grounding payload for one chat turn.
///
/// The step guidance doubles as the retrieval boost: the composite query ties
/// the student's message to the step they are working on.
pub async fn assemble_context(
    paths: &PathsConfig,
    retriever: &Retriever,
    session: &SessionState,
    message: &str,
    k: usize,
) -> Result<ContextPayload, ResolveError> {
    let step_guidance = resolve_step_guidance(
        paths,
        session.resolved_path.as_deref(),
        session.chosen_methodology.as_deref(),
        session.active_step,
    )?;

    let passages = retriever
        .retrieve(message, k, step_guidance.as_deref())
        .await;

    Ok(ContextPayload {
        worldview_profile: render_worldview_profile(session),
        step_context: render_step_context(session),
        step_guidance,
        passages,
    })
}

/// Human-readable worldview summary sent to the model.
pub fn render_worldview_profile(session: &SessionState) -> String {
    let id = match &session.worldview_id {
        Some(id) => id,
        None => return "The student has not yet selected a worldview.".to_string(),
    };
    let label = session.worldview_label.clone().unwrap_or_else(|| id.clone());
    let path = session
        .resolved_path
        .as_deref()
        .unwrap_or("not yet determined");

    let mut parts = vec![
        format!("Student's worldview: {}", label),
        format!("Research methodology pathway: {}", path),
    ];
    if let Some(desc) = worldview_description(id) {
        parts.push(format!("Worldview description: {}", desc));
    }
    parts.join("\n")
}

/// Render all saved step inputs as labeled lines, long values truncated.
pub fn render_step_context(session: &SessionState) -> String {
    let mut lines = Vec::new();

    if let Some(label) = &session.worldview_label {
        lines.push(format!("Step 1 worldview: {}", label));
    }
    if let Some(path) = &session.resolved_path {
        lines.push(format!("Research path: {}", path));
    }
    if let Some(m) = &session.chosen_methodology {
        lines.push(format!("Chosen methodology (Step 4): {}", m));
    }

    for (step, notes) in &session.step_notes {
        let Some(obj) = notes.as_object() else {
            continue;
        };
        for (key, val) in obj {
            if *step == 1 && key == "worldview_id" {
                continue; // already rendered as the label above
            }
            let rendered = match val {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) if s.is_empty() => continue,
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(render_scalar)
                    .collect::<Vec<_>>()
                    .join(", "),
                other => render_scalar(other),
            };
            if rendered.is_empty() {
                continue;
            }
            lines.push(format!("Step {} {}: {}", step, key, clip_ellipsis(&rendered)));
        }
    }

    if lines.is_empty() {
        "No step inputs saved yet.".to_string()
    } else {
        lines.join("\n")
    }
}

fn render_scalar(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn clip_ellipsis(text: &str) -> String {
    match text.char_indices().nth(MAX_VALUE_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Static descriptions of the five worldviews surfaced to the model.
pub fn worldview_description(id: &str) -> Option<&'static str> {
    match id {
        "positivist" => Some(
            "Positivist: believes in an objective, knowable reality. Knowledge comes from \
             observation, measurement, and empirical testing; research should be value-free and \
             generalizable. Favours quantitative methods such as experiments, surveys, and \
             statistical analysis, with the researcher detached and neutral.",
        ),
        "post_positivist" => Some(
            "Post-Positivist: reality exists but can only be imperfectly known; all observation \
             is fallible and theory-laden. Emphasises falsification, triangulation, and critical \
             multiplism. Uses primarily quantitative methods while acknowledging the limits of \
             absolute objectivity.",
        ),
        "constructivist" => Some(
            "Constructivist (Interpretivist): reality is socially constructed and multiple, \
             equally valid realities exist. Knowledge is co-created between researcher and \
             participants; deep understanding of lived experience and context matters most. \
             Favours qualitative methods such as interviews, observation, and narrative analysis.",
        ),
        "transformative" => Some(
            "Transformative: centres power, justice, and equity. Reality is shaped by social, \
             political, cultural, and economic forces; research should serve marginalised \
             communities and promote change. Uses qualitative and participatory methods with the \
             researcher as a collaborating advocate.",
        ),
        "pragmatist" => Some(
            "Pragmatist: focuses on what works rather than committing to a single ontology. The \
             research question drives the choice of methods — quantitative, qualitative, or both. \
             Values practical consequences and real-world applicability, embracing mixed methods \
             and methodological flexibility.",
        ),
        _ => None,
    }
}

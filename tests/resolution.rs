//! Path-resolution tests against a fixture configuration document, exercising
//! the worldview mapping, mixed-methods inheritance, override substitution,
//! and the chat-context assembly that consumes resolution output.

use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use tutor_harness::config::ChunkingConfig;
use tutor_harness::context::assemble_context;
use tutor_harness::index::IndexStore;
use tutor_harness::paths::{load_paths_config, PathsConfig};
use tutor_harness::resolve::{resolve_step_config, resolve_step_guidance, ResolveError};
use tutor_harness::retriever::Retriever;
use tutor_harness::session::SessionState;

const FIXTURE: &str = r#"{
  "worldview_to_path": {
    "positivist": "quantitative",
    "post_positivist": "quantitative",
    "constructivist": "qualitative",
    "transformative": "qualitative",
    "pragmatist": "mixed"
  },
  "paths": {
    "quantitative": {
      "steps": {
        "4": {
          "title": "Select your quantitative design",
          "directions": "Pick the design that best fits your question.",
          "field_type": "select",
          "field_key": "design",
          "options": [{"id": "experimental"}, {"id": "quasi_experimental"}, {"id": "survey"}],
          "llm_guidance": "Explain experimental, quasi-experimental, and survey designs."
        },
        "5": {
          "title": "State your hypothesis",
          "field_type": "textarea",
          "field_key": "hypothesis",
          "llm_guidance": "Help the student phrase a testable hypothesis."
        },
        "6": {
          "title": "Quantitative data collection",
          "field_type": "checklist",
          "field_key": "collection",
          "llm_guidance": "Discuss instruments, sampling frames, and measurement."
        }
      }
    },
    "qualitative": {
      "steps": {
        "4": {
          "title": "Select your qualitative design",
          "field_type": "select",
          "field_key": "design",
          "options": [{"id": "case_study"}, {"id": "phenomenology"}],
          "llm_guidance": "Explain case study and phenomenological designs."
        },
        "5": {
          "title": "Frame your central question",
          "field_type": "textarea",
          "field_key": "central_question",
          "llm_guidance": "Help the student frame an open-ended central question."
        },
        "6": {
          "title": "Qualitative data collection",
          "field_type": "checklist",
          "field_key": "collection",
          "llm_guidance": "Discuss interviews, focus groups, and observation."
        }
      }
    },
    "mixed": {
      "steps": {
        "4": {
          "title": "Choose your primary methodology",
          "directions": "Mixed-methods studies still lead with one strand.",
          "field_type": "methodology_choice",
          "llm_guidance": "Weigh both traditions against the research question."
        },
        "5": {
          "inherits_from_chosen_methodology": true,
          "llm_guidance_addendum": "Note how the secondary strand complements the question."
        },
        "6": {
          "inherits_from_chosen_methodology": true,
          "llm_guidance_addendum": "Also plan how the two data strands will be integrated."
        }
      }
    }
  }
}"#;

fn fixture_config() -> PathsConfig {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("research_paths.json");
    fs::write(&file, FIXTURE).unwrap();
    load_paths_config(&file)
}

#[test]
fn worldviews_resolve_to_their_paths() {
    let cfg = fixture_config();
    let mut sess = SessionState::new();
    sess.set_worldview(&cfg, "post_positivist").unwrap();
    assert_eq!(sess.resolved_path.as_deref(), Some("quantitative"));

    let mut sess2 = SessionState::new();
    sess2.set_worldview(&cfg, "pragmatist").unwrap();
    assert_eq!(sess2.resolved_path.as_deref(), Some("mixed"));
}

#[test]
fn mixed_student_holds_at_step_6_until_choice_then_inherits() {
    let cfg = fixture_config();

    // Before the Step 4 choice: a holding configuration, no field spec.
    let holding = resolve_step_config(&cfg, Some("mixed"), None, 6).unwrap();
    assert!(!holding.has_field_spec());
    assert!(holding.directions.contains("Step 4"));

    // After choosing qualitative: qualitative's spec with the addendum appended.
    let resolved = resolve_step_config(&cfg, Some("mixed"), Some("qualitative"), 6).unwrap();
    assert_eq!(resolved.title, "Qualitative data collection");
    assert_eq!(resolved.field_key.as_deref(), Some("collection"));
    assert_eq!(
        resolved.llm_guidance.as_deref(),
        Some(
            "Discuss interviews, focus groups, and observation.\n\
             Also plan how the two data strands will be integrated."
        )
    );
}

#[test]
fn non_mixed_override_uses_other_path_verbatim() {
    let cfg = fixture_config();
    let config = resolve_step_config(&cfg, Some("quantitative"), Some("qualitative"), 5).unwrap();
    assert_eq!(config.title, "Frame your central question");
    assert_eq!(config.field_key.as_deref(), Some("central_question"));
    // No addendum concatenation on the override path.
    assert_eq!(
        config.llm_guidance.as_deref(),
        Some("Help the student frame an open-ended central question.")
    );
}

#[test]
fn step_4_surfaces_recommendation_or_both_option_sets() {
    let cfg = fixture_config();

    let quant = resolve_step_config(&cfg, Some("quantitative"), None, 4).unwrap();
    assert_eq!(quant.recommended_methodology.as_deref(), Some("quantitative"));
    assert_eq!(quant.options.as_ref().unwrap().len(), 3);

    let mixed = resolve_step_config(&cfg, Some("mixed"), None, 4).unwrap();
    assert!(mixed.recommended_methodology.is_none());
    assert_eq!(mixed.quantitative_options.as_ref().unwrap().len(), 3);
    assert_eq!(mixed.qualitative_options.as_ref().unwrap().len(), 2);
}

#[test]
fn out_of_range_step_is_a_caller_error() {
    let cfg = fixture_config();
    assert_eq!(
        resolve_step_config(&cfg, Some("mixed"), None, 11),
        Err(ResolveError::StepOutOfRange(11))
    );
}

#[test]
fn methodology_change_invalidates_dependent_answers() {
    let cfg = fixture_config();
    let mut sess = SessionState::new();
    sess.set_worldview(&cfg, "pragmatist").unwrap();
    sess.set_methodology("quantitative").unwrap();
    sess.save_step(5, serde_json::json!({"hypothesis": "H1: scores improve"}));
    sess.save_step(6, serde_json::json!({"collection": ["survey"]}));

    sess.set_methodology("qualitative").unwrap();
    assert!(!sess.step_notes.contains_key(&5));
    assert!(!sess.step_notes.contains_key(&6));
    // The Step 4 record survives and reflects the new choice.
    assert_eq!(
        sess.step_notes.get(&4).and_then(|n| n.get("chosen_methodology")),
        Some(&serde_json::json!("qualitative"))
    );
}

#[tokio::test]
async fn assembled_context_carries_guidance_and_passages() {
    let cfg = fixture_config();

    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("resources");
    fs::create_dir_all(&corpus).unwrap();
    fs::write(
        corpus.join("questions.md"),
        "A central question in qualitative research is open-ended. A good central \
         question invites exploration rather than measurement.",
    )
    .unwrap();

    let store = Arc::new(IndexStore::new(
        corpus.clone(),
        tmp.path().join("index"),
        ChunkingConfig {
            max_chars: 200,
            overlap: 40,
        },
        None,
    ));
    store.open().await.unwrap();
    let retriever = Retriever::new(Arc::clone(&store), None, corpus);

    let mut sess = SessionState::new();
    sess.set_worldview(&cfg, "pragmatist").unwrap();
    sess.set_methodology("qualitative").unwrap();
    sess.active_step = 5;
    sess.save_step(2, serde_json::json!({"topic": "first-generation students"}));

    let payload = assemble_context(&cfg, &retriever, &sess, "central question", 3)
        .await
        .unwrap();

    let guidance = payload.step_guidance.as_deref().unwrap();
    assert!(guidance.contains("open-ended central question"));
    assert!(guidance.contains("secondary strand"));

    assert!(payload.worldview_profile.contains("Pragmatist"));
    assert!(payload.step_context.contains("first-generation students"));

    assert!(!payload.passages.is_empty());
    assert!(payload.render_passages().contains("[1] Source: questions.md"));
}

#[tokio::test]
async fn assembled_context_for_pre_path_step_has_no_guidance() {
    let cfg = fixture_config();
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("resources");
    fs::create_dir_all(&corpus).unwrap();

    let store = Arc::new(IndexStore::new(
        corpus.clone(),
        tmp.path().join("index"),
        ChunkingConfig::default(),
        None,
    ));
    store.open().await.unwrap();
    let retriever = Retriever::new(Arc::clone(&store), None, corpus);

    let sess = SessionState::new(); // active_step = 1
    let payload = assemble_context(&cfg, &retriever, &sess, "what is a worldview", 3)
        .await
        .unwrap();
    assert!(payload.step_guidance.is_none());
    assert!(payload.worldview_profile.contains("not yet selected"));
    assert_eq!(payload.step_context, "No step inputs saved yet.");
}

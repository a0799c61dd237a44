//! Prompt construction
//!
//! The RAG-enhanced prompt carries the fusion gate's decision label as an
//! explicit instruction, so how much weight the model gives the references is
//! decided by the gate and not left to prose.

use std::fmt::Write;

use symloc_common::models::DecisionLabel;

use super::{KnowledgeContext, PredictionRequest};

/// System message shared by all prompts
pub const SYSTEM_PROMPT: &str = "You are a clinical anatomy assistant. Identify the organ(s) and \
anatomical location(s) most likely responsible for a symptom. Answer with JSON only.";

const OUTPUT_FORMAT: &str = r#"Respond with JSON only, in exactly this format:
{
  "organs": [
    {"organName": "<organ>", "anatomicalLocations": ["<location>", "..."]}
  ],
  "decision_rationale": "<one sentence>"
}"#;

/// Instruction telling the model how to treat the references
pub fn presentation_instruction(label: DecisionLabel) -> &'static str {
    match label {
        DecisionLabel::Trust => {
            "The references are consistent and of high quality. Use them as primary evidence, \
             checking them against your medical knowledge."
        }
        DecisionLabel::Cautious => {
            "The references are of medium quality or disagreed on the organ. Weigh them against \
             your medical knowledge and prefer your knowledge where they conflict."
        }
        DecisionLabel::Distrust => {
            "The references are unreliable. Base the answer on your medical knowledge and treat \
             the references as background only."
        }
    }
}

/// Render the user message for a request
pub fn build_prompt(request: &PredictionRequest) -> String {
    match &request.knowledge {
        None => build_baseline_prompt(&request.symptom_text),
        Some(knowledge) => build_augmented_prompt(&request.symptom_text, knowledge),
    }
}

fn build_baseline_prompt(symptom_text: &str) -> String {
    format!(
        "Identify the organ(s) and anatomical location(s) for the following symptom.\n\n\
         Symptom: {}\n\n{}",
        symptom_text.trim(),
        OUTPUT_FORMAT
    )
}

fn build_augmented_prompt(symptom_text: &str, knowledge: &KnowledgeContext) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Identify the organ(s) and anatomical location(s) for the following symptom.\n\nSymptom: {}\n",
        symptom_text.trim()
    );

    let _ = writeln!(
        prompt,
        "Retrieved references (decision: {}, quality: {:.2}, consistent: {}):",
        knowledge.decision_label,
        knowledge.quality_score,
        if knowledge.consistent { "yes" } else { "no" }
    );

    if knowledge.resolved_organ_distribution.is_empty() && knowledge.reference_diagnoses.is_empty() {
        let _ = writeln!(prompt, "- none");
    }
    for (organ, locations) in &knowledge.resolved_organ_distribution {
        let locations: Vec<&str> = locations.iter().map(String::as_str).collect();
        let _ = writeln!(prompt, "- organ: {} | locations: {}", organ, locations.join(", "));
    }
    for diagnosis in &knowledge.reference_diagnoses {
        let _ = writeln!(prompt, "- diagnosis: {}", diagnosis);
    }
    if !knowledge.conflicting_organs.is_empty() {
        let _ = writeln!(
            prompt,
            "Note: other references named {}, which were set aside as the minority.",
            knowledge.conflicting_organs.join(", ")
        );
    }

    let _ = writeln!(prompt, "\n{}\n", presentation_instruction(knowledge.decision_label));
    prompt.push_str(OUTPUT_FORMAT);
    prompt
}

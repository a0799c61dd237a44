//! Model response parsing
//!
//! Chat models wrap their JSON in prose or Markdown fences and disagree on
//! field names. Accepted shapes:
//! - `{"organs": [{"organName": .., "anatomicalLocations": [..]}]}`
//! - `{"organName": .., "anatomicalLocations": [..]}`
//! - `{"organ": .., "anatomical_locations": [..]}`
//!
//! Organ fields may be a string or a list of strings. An optional
//! `decision_rationale` (or `rationale`) becomes the prediction rationale.

use serde_json::Value;
use symloc_common::models::Prediction;

use super::ProviderError;

const ORGAN_KEYS: [&str; 3] = ["organName", "organ_name", "organ"];
const LOCATION_KEYS: [&str; 3] = ["anatomicalLocations", "anatomical_locations", "locations"];
const RATIONALE_KEYS: [&str; 3] = ["decision_rationale", "rationale", "reasoning"];

/// Parse raw model text into a prediction
///
/// Blank text means no payload (`Ok(None)`). Text without a JSON object, or
/// with an object of the wrong shape, is a permanent error since retrying the
/// same prompt is not expected to fix it.
pub fn parse_prediction(text: &str) -> Result<Option<Prediction>, ProviderError> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let json_str = extract_json_object(text)
        .ok_or_else(|| ProviderError::Permanent(format!("no JSON object in response: {}", preview(text))))?;

    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| ProviderError::Permanent(format!("invalid JSON in response: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| ProviderError::Permanent("response JSON is not an object".to_string()))?;

    let mut organ_names = Vec::new();
    let mut anatomical_locations = Vec::new();
    let mut recognized = false;

    if let Some(organs) = object.get("organs").and_then(Value::as_array) {
        recognized = true;
        for entry in organs {
            match entry {
                Value::String(name) => push_term(&mut organ_names, name),
                Value::Object(_) => {
                    collect_field(entry, &ORGAN_KEYS, &mut organ_names);
                    collect_field(entry, &LOCATION_KEYS, &mut anatomical_locations);
                }
                _ => {}
            }
        }
    }

    if ORGAN_KEYS.iter().chain(LOCATION_KEYS.iter()).any(|k| object.contains_key(*k)) {
        recognized = true;
        collect_field(&value, &ORGAN_KEYS, &mut organ_names);
        collect_field(&value, &LOCATION_KEYS, &mut anatomical_locations);
    }

    if !recognized {
        return Err(ProviderError::Permanent(format!(
            "response JSON has no organ or location fields: {}",
            preview(json_str)
        )));
    }

    let rationale = RATIONALE_KEYS
        .iter()
        .find_map(|k| object.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    Ok(Some(Prediction {
        organ_names,
        anatomical_locations,
        rationale,
    }))
}

/// Locate the JSON object in a model response
///
/// Prefers the body of a Markdown code fence; otherwise the span from the
/// first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(fenced) = fenced_block(text) {
        let fenced = fenced.trim();
        if fenced.starts_with('{') && fenced.ends_with('}') {
            return Some(fenced);
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip the language tag line (```json)
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

fn collect_field(value: &Value, keys: &[&str], out: &mut Vec<String>) {
    for key in keys {
        match value.get(*key) {
            Some(Value::String(s)) => push_term(out, s),
            Some(Value::Array(items)) => {
                for item in items.iter().filter_map(Value::as_str) {
                    push_term(out, item);
                }
            }
            _ => {}
        }
    }
}

fn push_term(out: &mut Vec<String>, term: &str) {
    let term = term.trim();
    if !term.is_empty() && !out.iter().any(|t| t == term) {
        out.push(term.to_string());
    }
}

fn preview(text: &str) -> String {
    let preview: String = text.chars().take(120).collect();
    if preview.len() < text.len() {
        format!("{}...", preview)
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_response_is_absent() {
        assert_eq!(parse_prediction("   \n").unwrap(), None);
    }

    #[test]
    fn test_organs_array_in_fence() {
        let text = "Here is my answer:\n```json\n{\n  \"organs\": [\n    {\"organName\": \"Heart (Cor)\", \"anatomicalLocations\": [\"Mitral Valve\", \"Left Atrium\"]},\n    {\"organName\": \"Lung (Pulmo)\", \"anatomicalLocations\": [\"Left Lung\"]}\n  ],\n  \"decision_rationale\": \"Murmur plus crackles\"\n}\n```\nThanks.";
        let p = parse_prediction(text).unwrap().unwrap();
        assert_eq!(p.organ_names, vec!["Heart (Cor)", "Lung (Pulmo)"]);
        assert_eq!(p.anatomical_locations, vec!["Mitral Valve", "Left Atrium", "Left Lung"]);
        assert_eq!(p.rationale.as_deref(), Some("Murmur plus crackles"));
    }

    #[test]
    fn test_flat_snake_case_shape() {
        let text = r#"{"organ": "Vein (Vena)", "anatomical_locations": ["Femoral Vein", "Femoral Vein "]}"#;
        let p = parse_prediction(text).unwrap().unwrap();
        assert_eq!(p.organ_names, vec!["Vein (Vena)"]);
        assert_eq!(p.anatomical_locations, vec!["Femoral Vein"]);
        assert!(p.rationale.is_none());
    }

    #[test]
    fn test_object_embedded_in_prose() {
        let text = r#"Based on the findings {"organName": ["Liver (Hepar)"], "anatomicalLocations": []} is most likely."#;
        let p = parse_prediction(text).unwrap().unwrap();
        assert_eq!(p.organ_names, vec!["Liver (Hepar)"]);
        assert!(p.anatomical_locations.is_empty());
    }

    #[test]
    fn test_prose_without_json_is_permanent() {
        let err = parse_prediction("I cannot determine the organ.").unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_wrong_shape_is_permanent() {
        let err = parse_prediction(r#"{"answer": "heart"}"#).unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));
    }

    #[test]
    fn test_broken_json_is_permanent() {
        assert!(parse_prediction(r#"{"organ": "Heart (Cor)", "#).is_err());
    }

    #[test]
    fn test_extract_json_prefers_fence() {
        let text = "{not this}\n```\n{\"organ\": \"x\"}\n```";
        assert_eq!(extract_json_object(text), Some("{\"organ\": \"x\"}"));
    }
}

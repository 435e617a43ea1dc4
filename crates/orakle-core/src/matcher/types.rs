use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured outcome of matching a request to a skill.
///
/// `parameters` contains only keys declared in the chosen skill's schema;
/// required parameters without inferable values cause resolution to fail
/// instead of producing a decision with missing required fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchDecision {
    pub skill_id: String,
    pub parameters: HashMap<String, Value>,
    pub intention: String,
    pub frustration_score: f32,
    #[serde(default)]
    pub frustration_reason: Option<String>,
}

/// A candidate surviving phase 1, carried into the phase-2 prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub skill_id: String,
    pub description: String,
    pub similarity: f32,
}

/// Raw shape the phase-2 LLM is asked to return. Parsed strictly; anything
/// that doesn't deserialize into this is a parse failure, not a decision.
#[derive(Debug, Deserialize)]
pub(super) struct RawSelection {
    #[serde(default)]
    pub skill_id: Option<String>,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    #[serde(default)]
    pub intention: String,
    #[serde(default)]
    pub frustration_score: f32,
    #[serde(default)]
    pub frustration_reason: Option<String>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

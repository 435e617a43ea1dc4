use serde::{Deserialize, Serialize};

/// A single parameter in a skill's schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Declared type of a skill parameter, as exposed to the matcher's phase-2
/// LLM prompt so it knows how to shape extracted values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

/// HTTP method used to invoke a skill's route.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportMethod {
    Get,
    Post,
}

impl Default for TransportMethod {
    fn default() -> Self {
        Self::Post
    }
}

/// Identity, description, parameter schema, and transport hint for a single
/// skill, plus the dense embedding computed from its description. The
/// embedding is kept alongside the descriptor for the lifetime of the
/// registry so matching never recomputes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDescriptor {
    pub skill_id: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<SkillParameter>,
    pub route: String,
    #[serde(default)]
    pub method: TransportMethod,
    /// Dense embedding of `description`. Not serialized over the wire from
    /// the skills host — computed locally after fetch — but kept alongside
    /// the descriptor for the registry's k-NN search.
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl SkillDescriptor {
    /// A descriptor is valid when it carries a non-empty `skill_id`, a
    /// description, and an embedding of the catalog's fixed dimensionality.
    pub fn is_valid(&self, expected_dim: usize) -> bool {
        !self.skill_id.is_empty() && !self.description.is_empty() && self.embedding.len() == expected_dim
    }

    /// Returns the names of required parameters.
    pub fn required_parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().filter(|p| p.required).map(|p| p.name.as_str())
    }

    /// Returns true if `name` is a declared parameter on this skill.
    pub fn declares_parameter(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name == name)
    }
}

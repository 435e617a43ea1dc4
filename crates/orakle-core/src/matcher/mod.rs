//! Matches a natural-language directive to exactly one skill and extracts
//! its parameters, through a semantic pre-filter followed by an LLM
//! refinement pass.

mod error;
mod types;

pub use error::{MatcherError, MatcherResult};
pub use types::{Candidate, MatchDecision};

use std::sync::Arc;

use types::RawSelection;

use crate::ai::provider::LLMProvider;
use crate::ai::types::{CompletionRequest, Message};
use crate::config::MatcherConfig;
use crate::skills::{EmbeddingProvider, SkillRegistry};

/// Phase-2 parse attempt, tracked so a malformed response gets exactly one
/// retry with a tighter prompt before failing resolution outright.
enum ParseAttempt {
    First,
    Retry,
}

pub struct HybridMatcher {
    registry: Arc<SkillRegistry>,
    embeddings: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LLMProvider>,
    config: MatcherConfig,
}

impl HybridMatcher {
    pub fn new(
        registry: Arc<SkillRegistry>,
        embeddings: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LLMProvider>,
        config: MatcherConfig,
    ) -> Self {
        Self { registry, embeddings, llm, config }
    }

    /// The catalog this matcher resolves against, shared with the
    /// dispatcher so it can look up a chosen skill's route after matching.
    pub fn registry(&self) -> &Arc<SkillRegistry> {
        &self.registry
    }

    /// Phase 1: embed `directive_text`, retrieve the top-k catalog entries
    /// by cosine similarity, and drop anything below the similarity floor.
    /// Pure and synchronous once the embedding is in hand — no network
    /// calls beyond the embedding itself.
    async fn pre_filter(&self, directive_text: &str) -> MatcherResult<Vec<Candidate>> {
        let query_embedding = self.embeddings.embed(directive_text).await.map_err(crate::skills::RegistryError::from)?;
        let hits = self.registry.search(&query_embedding, self.config.top_k, self.config.similarity_floor);
        Ok(hits
            .into_iter()
            .map(|(descriptor, similarity)| Candidate { skill_id: descriptor.skill_id, description: descriptor.description, similarity })
            .collect())
    }

    /// Full two-phase match: pre-filter, then LLM refinement unless a
    /// single candidate already clears the confidence floor.
    pub async fn match_directive(&self, directive_text: &str) -> MatcherResult<MatchDecision> {
        let candidates = self.pre_filter(directive_text).await?;
        if candidates.is_empty() {
            return Err(MatcherError::NoCandidates);
        }

        if candidates.len() == 1 && candidates[0].similarity >= self.config.confidence_floor {
            let only = &candidates[0];
            return Ok(MatchDecision {
                skill_id: only.skill_id.clone(),
                parameters: Default::default(),
                intention: directive_text.to_owned(),
                frustration_score: 0.0,
                frustration_reason: None,
            });
        }

        self.llm_select(directive_text, &candidates).await
    }

    /// Phase 2: one LLM call, and on a malformed response exactly one
    /// retry with a tighter prompt before giving up with
    /// `skill-resolution-failed` — never a silent fallback to an arbitrary
    /// candidate.
    async fn llm_select(&self, directive_text: &str, candidates: &[Candidate]) -> MatcherResult<MatchDecision> {
        let skill_ids: Vec<&str> = candidates.iter().map(|c| c.skill_id.as_str()).collect();

        let descriptors: Vec<_> = candidates
            .iter()
            .filter_map(|c| self.registry.find(&c.skill_id))
            .collect();

        let mut last_error = String::new();
        for attempt in [ParseAttempt::First, ParseAttempt::Retry] {
            let system_prompt = build_system_prompt(matches!(attempt, ParseAttempt::Retry));
            let user_prompt = build_user_prompt(directive_text, &descriptors);

            let request = CompletionRequest::new("", vec![Message::system(system_prompt), Message::user(user_prompt)])
                .with_temperature(0.1)
                .with_max_tokens(600);

            let response = self.llm.complete(request).await?;

            match parse_and_validate(&response.content, &skill_ids, &descriptors) {
                Ok(decision) => return Ok(decision),
                Err(parse_err) => last_error = parse_err,
            }
        }

        Err(MatcherError::ResolutionFailed(last_error))
    }
}

fn build_system_prompt(is_retry: bool) -> String {
    let mut prompt = String::from(
        "You match a user's request to exactly one skill from a fixed list \
         and extract its parameters. Respond with a single well-formed JSON \
         object and no surrounding prose.\n\n\
         Rules:\n\
         1. `skill_id` must be exactly one of the candidate skill ids given.\n\
         2. `parameters` must only contain names declared in that skill's schema.\n\
         3. Include optional parameters only when the request implies a value.\n\
         4. If a required parameter has no inferable value, choose a different \
            skill, or if none fit set `error_msg` and omit `skill_id`.\n\
         5. Include `intention` (a short restatement of what the user wants) \
            and `frustration_score` (0.0 to 1.0).",
    );
    if is_retry {
        prompt.push_str(
            "\n\nYour previous response could not be parsed as JSON matching \
             this schema exactly. Return ONLY the JSON object, with no \
             markdown fences and no commentary before or after it.",
        );
    }
    prompt
}

fn build_user_prompt(directive_text: &str, descriptors: &[crate::skills::SkillDescriptor]) -> String {
    let mut prompt = String::from("## Candidate skills\n\n");
    for d in descriptors {
        prompt.push_str(&format!("### {}\n{}\nParameters:\n", d.skill_id, d.description));
        for p in &d.parameters {
            prompt.push_str(&format!("- {} ({:?}, required={}): {}\n", p.name, p.param_type, p.required, p.description.as_deref().unwrap_or("")));
        }
        prompt.push('\n');
    }
    prompt.push_str("## Request\n\n");
    prompt.push_str(directive_text);
    prompt.push_str("\n\n## Your selection\n\nRespond with JSON:");
    prompt
}

fn parse_and_validate(response: &str, valid_ids: &[&str], descriptors: &[crate::skills::SkillDescriptor]) -> Result<MatchDecision, String> {
    let json_start = response.find('{').ok_or("no JSON object in response")?;
    let json_end = response.rfind('}').map(|i| i + 1).ok_or("no JSON object in response")?;
    let json_str = &response[json_start..json_end];

    let raw: RawSelection = serde_json::from_str(json_str).map_err(|e| e.to_string())?;

    if let Some(err_msg) = raw.error_msg {
        return Err(err_msg);
    }

    let skill_id = raw.skill_id.ok_or("response set neither skill_id nor error_msg")?;

    if !valid_ids.contains(&skill_id.as_str()) {
        return Err(format!("skill_id {skill_id:?} is not among the candidates"));
    }

    let descriptor = descriptors.iter().find(|d| d.skill_id == skill_id).ok_or("selected skill missing from candidate set")?;

    for name in raw.parameters.keys() {
        if !descriptor.declares_parameter(name) {
            return Err(format!("parameter {name:?} is not declared on skill {skill_id:?}"));
        }
    }

    for required in descriptor.required_parameter_names() {
        if !raw.parameters.contains_key(required) {
            return Err(format!("required parameter {required:?} missing for skill {skill_id:?}"));
        }
    }

    Ok(MatchDecision {
        skill_id,
        parameters: raw.parameters,
        intention: raw.intention,
        frustration_score: raw.frustration_score,
        frustration_reason: raw.frustration_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::{ParamType, SkillDescriptor, SkillParameter, TransportMethod};

    fn weather_descriptor() -> SkillDescriptor {
        SkillDescriptor {
            skill_id: "weather.lookup".to_owned(),
            description: "get current weather for a location".to_owned(),
            parameters: vec![SkillParameter { name: "location".to_owned(), param_type: ParamType::String, required: true, description: None }],
            route: "/skills/weather".to_owned(),
            method: TransportMethod::Post,
            embedding: Vec::new(),
        }
    }

    #[test]
    fn parse_and_validate_accepts_well_formed_response() {
        let descriptors = vec![weather_descriptor()];
        let ids = vec!["weather.lookup"];
        let response = r#"{"skill_id":"weather.lookup","parameters":{"location":"Tokyo"},"intention":"check the weather","frustration_score":0.1}"#;
        let decision = parse_and_validate(response, &ids, &descriptors).unwrap();
        assert_eq!(decision.skill_id, "weather.lookup");
        assert_eq!(decision.parameters.get("location").unwrap(), "Tokyo");
    }

    #[test]
    fn parse_and_validate_rejects_unknown_skill_id() {
        let descriptors = vec![weather_descriptor()];
        let ids = vec!["weather.lookup"];
        let response = r#"{"skill_id":"not.a.real.skill","parameters":{},"intention":"x","frustration_score":0.0}"#;
        assert!(parse_and_validate(response, &ids, &descriptors).is_err());
    }

    #[test]
    fn parse_and_validate_rejects_undeclared_parameter() {
        let descriptors = vec![weather_descriptor()];
        let ids = vec!["weather.lookup"];
        let response = r#"{"skill_id":"weather.lookup","parameters":{"location":"Tokyo","unit":"celsius"},"intention":"x","frustration_score":0.0}"#;
        assert!(parse_and_validate(response, &ids, &descriptors).is_err());
    }

    #[test]
    fn parse_and_validate_rejects_missing_required_parameter() {
        let descriptors = vec![weather_descriptor()];
        let ids = vec!["weather.lookup"];
        let response = r#"{"skill_id":"weather.lookup","parameters":{},"intention":"x","frustration_score":0.0}"#;
        assert!(parse_and_validate(response, &ids, &descriptors).is_err());
    }

    #[test]
    fn parse_and_validate_surfaces_explicit_error_msg() {
        let descriptors = vec![weather_descriptor()];
        let ids = vec!["weather.lookup"];
        let response = r#"{"error_msg":"no skill fits this request","intention":"x","frustration_score":0.0}"#;
        let err = parse_and_validate(response, &ids, &descriptors).unwrap_err();
        assert!(err.contains("no skill fits"));
    }

    #[test]
    fn parse_and_validate_rejects_non_json_prose() {
        let descriptors = vec![weather_descriptor()];
        let ids = vec!["weather.lookup"];
        let response = "I think you want the weather skill.";
        assert!(parse_and_validate(response, &ids, &descriptors).is_err());
    }
}

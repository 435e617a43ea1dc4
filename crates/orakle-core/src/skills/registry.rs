//! Atomically-published catalog of skills fetched from the skills host.

use std::sync::Arc;

use arc_swap::ArcSwap;
use reqwest::Client;
use serde::Deserialize;

use super::embeddings::{EmbeddingProvider, EMBEDDING_DIM};
use super::error::{RegistryError, RegistryResult};
use super::types::SkillDescriptor;

/// Wire shape of the skills host's `/capabilities` response: a bare array
/// of descriptors, embeddings absent (computed locally after fetch).
#[derive(Debug, Deserialize)]
struct CapabilitiesResponse {
    skills: Vec<SkillDescriptor>,
}

/// Holds the current skill catalog behind an [`ArcSwap`] so readers never
/// observe a torn state while a reload is in flight: `list`/`find`/`search`
/// always see either the old catalog in full or the new one in full.
pub struct SkillRegistry {
    catalog: ArcSwap<Vec<SkillDescriptor>>,
    client: Client,
    capabilities_url: String,
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl SkillRegistry {
    pub fn new(client: Client, capabilities_url: impl Into<String>, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            catalog: ArcSwap::from_pointee(Vec::new()),
            client,
            capabilities_url: capabilities_url.into(),
            embeddings,
        }
    }

    /// Fetch descriptors from the skills host, embed each description, and
    /// atomically publish the new catalog. An empty catalog is a valid
    /// outcome and is published like any other; only a fetch/decode/dup
    /// failure is an error.
    pub async fn reload(&self) -> RegistryResult<usize> {
        let response = self
            .client
            .get(&self.capabilities_url)
            .send()
            .await
            .map_err(|e| RegistryError::FetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RegistryError::HostStatus(response.status().to_string()));
        }

        let body: CapabilitiesResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::FetchFailed(e.to_string()))?;

        let mut seen = std::collections::HashSet::with_capacity(body.skills.len());
        let mut next = Vec::with_capacity(body.skills.len());
        for mut descriptor in body.skills {
            if !seen.insert(descriptor.skill_id.clone()) {
                return Err(RegistryError::DuplicateSkillId(descriptor.skill_id));
            }
            descriptor.embedding = self.embeddings.embed(&descriptor.description).await?;
            if !descriptor.is_valid(EMBEDDING_DIM) {
                return Err(RegistryError::InvalidDescriptor(descriptor.skill_id));
            }
            next.push(descriptor);
        }
        next.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));

        let count = next.len();
        self.catalog.store(Arc::new(next));
        Ok(count)
    }

    /// Returns the current published catalog, ordered by `skill_id`.
    pub fn list(&self) -> Vec<SkillDescriptor> {
        self.catalog.load().as_ref().clone()
    }

    /// Exact lookup by `skill_id`.
    pub fn find(&self, skill_id: &str) -> Option<SkillDescriptor> {
        self.catalog.load().iter().find(|d| d.skill_id == skill_id).cloned()
    }

    /// Top-k descriptors by cosine similarity to `query_embedding`, above
    /// `similarity_floor`. Ties are broken by `skill_id` ordering so results
    /// are deterministic run to run.
    pub fn search(&self, query_embedding: &[f32], k: usize, similarity_floor: f32) -> Vec<(SkillDescriptor, f32)> {
        let snapshot = self.catalog.load();
        let mut scored: Vec<(SkillDescriptor, f32)> = snapshot
            .iter()
            .map(|d| (d.clone(), super::embeddings::cosine_similarity(&d.embedding, query_embedding)))
            .filter(|(_, score)| *score >= similarity_floor)
            .collect();

        scored.sort_by(|a, b| match b.1.partial_cmp(&a.1) {
            Some(std::cmp::Ordering::Equal) | None => a.0.skill_id.cmp(&b.0.skill_id),
            Some(ord) => ord,
        });
        scored.truncate(k);
        scored
    }

    /// Number of skills in the current catalog.
    pub fn len(&self) -> usize {
        self.catalog.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::embeddings::HashEmbeddingProvider;
    use crate::skills::types::{ParamType, SkillParameter, TransportMethod};

    fn descriptor(id: &str, description: &str) -> SkillDescriptor {
        SkillDescriptor {
            skill_id: id.to_owned(),
            description: description.to_owned(),
            parameters: vec![SkillParameter {
                name: "query".to_owned(),
                param_type: ParamType::String,
                required: true,
                description: None,
            }],
            route: format!("/skills/{id}"),
            method: TransportMethod::Post,
            embedding: Vec::new(),
        }
    }

    fn registry() -> SkillRegistry {
        SkillRegistry::new(
            Client::new(),
            "http://127.0.0.1:0/capabilities",
            Arc::new(HashEmbeddingProvider::new()),
        )
    }

    #[tokio::test]
    async fn empty_catalog_is_valid() {
        let reg = registry();
        assert!(reg.is_empty());
        assert_eq!(reg.list().len(), 0);
        assert!(reg.find("anything").is_none());
    }

    #[tokio::test]
    async fn find_after_manual_publish() {
        let reg = registry();
        let embedder = HashEmbeddingProvider::new();
        let mut d = descriptor("weather.lookup", "get the current weather for a location");
        d.embedding = embedder.embed(&d.description).await.unwrap();
        reg.catalog.store(Arc::new(vec![d]));

        assert_eq!(reg.len(), 1);
        assert!(reg.find("weather.lookup").is_some());
        assert!(reg.find("nonexistent").is_none());
    }

    #[tokio::test]
    async fn search_orders_by_similarity_then_skill_id() {
        let reg = registry();
        let embedder = HashEmbeddingProvider::new();
        let mut a = descriptor("alpha.tool", "convert currency amounts between units");
        let mut b = descriptor("beta.tool", "convert currency amounts between units");
        a.embedding = embedder.embed(&a.description).await.unwrap();
        b.embedding = embedder.embed(&b.description).await.unwrap();
        reg.catalog.store(Arc::new(vec![a.clone(), b.clone()]));

        let query = embedder.embed("convert currency amounts between units").await.unwrap();
        let results = reg.search(&query, 10, 0.0);
        assert_eq!(results.len(), 2);
        // identical descriptions tie on similarity; skill_id breaks the tie
        assert_eq!(results[0].0.skill_id, "alpha.tool");
        assert_eq!(results[1].0.skill_id, "beta.tool");
    }

    #[tokio::test]
    async fn search_respects_similarity_floor() {
        let reg = registry();
        let embedder = HashEmbeddingProvider::new();
        let mut d = descriptor("weather.lookup", "get the current weather for a location");
        d.embedding = embedder.embed(&d.description).await.unwrap();
        reg.catalog.store(Arc::new(vec![d]));

        let query = embedder.embed("completely unrelated request about tax law").await.unwrap();
        let results = reg.search(&query, 10, 0.99);
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_respects_k() {
        let reg = registry();
        let embedder = HashEmbeddingProvider::new();
        let mut descriptors = Vec::new();
        for i in 0..5 {
            let mut d = descriptor(&format!("tool.{i}"), &format!("do task number {i}"));
            d.embedding = embedder.embed(&d.description).await.unwrap();
            descriptors.push(d);
        }
        reg.catalog.store(Arc::new(descriptors));

        let query = embedder.embed("do task number 2").await.unwrap();
        let results = reg.search(&query, 2, 0.0);
        assert_eq!(results.len(), 2);
    }
}

//! Example `~/.orakle/config.toml`:
//! ```toml
//! [provider]
//! default_id = "openai"
//! default_model = "gpt-4o-mini"
//!
//! [matcher]
//! top_k = 10
//! similarity_floor = 0.35
//! confidence_floor = 0.92
//!
//! [skills_host]
//! base_url = "http://127.0.0.1:18800"
//! health_path = "/health"
//! capabilities_path = "/capabilities"
//!
//! [supervisor]
//! startup_timeout_secs = 600
//! shutdown_timeout_secs = 20
//! health_poll_secs = 5
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level backend configuration, read many / written by one (see
/// `/config` GET and PUT in the HTTP façade).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OrakleConfig {
    pub provider: ProviderConfig,
    pub matcher: MatcherConfig,
    pub skills_host: SkillsHostConfig,
    pub bridge: BridgeConfig,
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// ID of the default LLM provider, e.g. `"openai"`, `"anthropic"`, `"ollama"`.
    pub default_id: String,
    /// Default model identifier, e.g. `"gpt-4o-mini"`.
    pub default_model: String,
    /// API key. Never echoed back unless `show_sensitive=true` is requested.
    pub api_key: String,
    /// Per-LLM-call timeout in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for the matcher's phase-2 refinement call specifically.
    pub matcher_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_id: "openai".to_owned(),
            default_model: "gpt-4o-mini".to_owned(),
            api_key: String::new(),
            request_timeout_secs: 60,
            matcher_timeout_secs: 30,
        }
    }
}

/// Tunables for the hybrid skill matcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatcherConfig {
    /// Phase-1 candidate count (`k` in "top-k by cosine similarity").
    pub top_k: usize,
    /// Phase-1 similarity floor; candidates below this are dropped.
    pub similarity_floor: f32,
    /// Phase-1 confidence floor above which phase 2 may be skipped.
    pub confidence_floor: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { top_k: 10, similarity_floor: 0.35, confidence_floor: 0.92 }
    }
}

/// How to reach the skills host (skill descriptors + per-skill routes).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SkillsHostConfig {
    pub base_url: String,
    pub health_path: String,
    pub capabilities_path: String,
    /// Per-skill-call timeout in seconds.
    pub call_timeout_secs: u64,
    /// Command used by the supervisor to spawn this service, e.g. `"skills-host"`.
    pub command: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for SkillsHostConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:18800".to_owned(),
            health_path: "/health".to_owned(),
            capabilities_path: "/capabilities".to_owned(),
            call_timeout_secs: 30,
            command: "orakle-skills-host".to_owned(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }
}

/// How to reach the bridge process (providers list, LLM/skill-key test,
/// hardware probe, config read/write passthrough).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub base_url: String,
    pub health_path: String,
    pub command: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:18801".to_owned(),
            health_path: "/health".to_owned(),
            command: "orakle-bridge".to_owned(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }
}

/// Tunables for the service supervisor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Bound on per-service startup, generous enough for heavy ML model
    /// initialization on first launch.
    pub startup_timeout_secs: u64,
    /// Bound on graceful shutdown before a service is killed outright.
    pub shutdown_timeout_secs: u64,
    pub health_poll_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self { startup_timeout_secs: 600, shutdown_timeout_secs: 20, health_poll_secs: 5 }
    }
}

impl OrakleConfig {
    /// Build the supervisor's launch specs for the skills host and bridge
    /// from this configuration's `base_url`/`command`/timeout fields.
    pub fn service_specs(&self) -> Vec<crate::supervisor::ServiceSpec> {
        use crate::supervisor::{ServiceId, ServiceSpec};
        use std::time::Duration;

        vec![
            ServiceSpec {
                id: ServiceId::SkillsHost,
                command: self.skills_host.command.clone(),
                args: self.skills_host.args.clone(),
                env: self.skills_host.env.clone(),
                port: port_of(&self.skills_host.base_url).unwrap_or(18800),
                health_path: self.skills_host.health_path.clone(),
                startup_timeout: Duration::from_secs(self.supervisor.startup_timeout_secs),
                shutdown_timeout: Duration::from_secs(self.supervisor.shutdown_timeout_secs),
                health_poll_interval: Duration::from_secs(self.supervisor.health_poll_secs),
            },
            ServiceSpec {
                id: ServiceId::Bridge,
                command: self.bridge.command.clone(),
                args: self.bridge.args.clone(),
                env: self.bridge.env.clone(),
                port: port_of(&self.bridge.base_url).unwrap_or(18801),
                health_path: self.bridge.health_path.clone(),
                startup_timeout: Duration::from_secs(self.supervisor.startup_timeout_secs),
                shutdown_timeout: Duration::from_secs(self.supervisor.shutdown_timeout_secs),
                health_poll_interval: Duration::from_secs(self.supervisor.health_poll_secs),
            },
        ]
    }
}

/// Extract the port from a `http://host:port` base URL.
fn port_of(base_url: &str) -> Option<u16> {
    let after_scheme = base_url.split("://").nth(1)?;
    let host_port = after_scheme.split('/').next()?;
    host_port.rsplit(':').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_of_parses_standard_url() {
        assert_eq!(port_of("http://127.0.0.1:18800"), Some(18800));
    }

    #[test]
    fn port_of_ignores_trailing_path() {
        assert_eq!(port_of("http://127.0.0.1:18801/health"), Some(18801));
    }

    #[test]
    fn port_of_missing_port_returns_none() {
        assert_eq!(port_of("http://127.0.0.1"), None);
    }

    #[test]
    fn service_specs_builds_both_services() {
        let config = OrakleConfig::default();
        let specs = config.service_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].port, 18800);
        assert_eq!(specs[1].port, 18801);
    }
}

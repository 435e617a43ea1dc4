//! TOML configuration schema for Orakle, and a `#[serde(default)]`-everywhere
//! loader so a partially filled `config.toml` works correctly.

mod loader;
mod schema;

pub use loader::{default_config_path, load_config, load_or_init_config, save_config};
pub use schema::{BridgeConfig, MatcherConfig, OrakleConfig, ProviderConfig, SkillsHostConfig, SupervisorConfig};

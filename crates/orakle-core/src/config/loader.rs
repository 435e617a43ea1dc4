//! TOML configuration loading and env-var overrides.
//!
//! # Loading order
//! 1. Parse `~/.orakle/config.toml` (or the path in `ORAKLE_CONFIG`)
//! 2. Apply `ORAKLE_*` environment variable overrides
//! 3. Fall back to [`OrakleConfig::default()`] if the file is missing

use std::{env, fs, path::{Path, PathBuf}};

use super::schema::OrakleConfig;

/// Return the default config file path: `~/.orakle/config.toml`.
pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::home_dir()
        .map(|h| h.join(".orakle").join("config.toml"))
        .ok_or_else(|| "could not determine home directory".to_string())
}

/// Load [`OrakleConfig`] from `path`, falling back to defaults if the file
/// does not exist, then applying environment variable overrides.
pub fn load_config(path: &Path) -> Result<OrakleConfig, String> {
    let mut config = match fs::read_to_string(path) {
        Ok(content) => toml::from_str::<OrakleConfig>(&content)
            .map_err(|e| format!("failed to parse config at {path:?}: {e}"))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => OrakleConfig::default(),
        Err(e) => return Err(format!("failed to read config at {path:?}: {e}")),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load from the default path (or `ORAKLE_CONFIG`), creating nothing on
/// disk — config is only persisted when `/config` PUT is called.
pub fn load_or_init_config() -> OrakleConfig {
    let path = env::var("ORAKLE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_path().unwrap_or_else(|_| PathBuf::from("config.toml")));
    load_config(&path).unwrap_or_default()
}

/// Write `config` to `path` atomically: write to `<path>.tmp`, then rename
/// over the destination so a crash mid-write never leaves a torn file.
pub fn save_config(path: &Path, config: &OrakleConfig) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("failed to create config dir: {e}"))?;
    }
    let serialized = toml::to_string_pretty(config).map_err(|e| format!("failed to serialize config: {e}"))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, serialized).map_err(|e| format!("failed to write temp config: {e}"))?;
    fs::rename(&tmp_path, path).map_err(|e| format!("failed to rename temp config into place: {e}"))?;
    Ok(())
}

/// Apply `ORAKLE_*` environment variable overrides to `config`.
///
/// Supported overrides:
/// - `ORAKLE_PROVIDER_ID`     → `provider.default_id`
/// - `ORAKLE_PROVIDER_MODEL`  → `provider.default_model`
/// - `ORAKLE_PROVIDER_KEY`    → `provider.api_key`
/// - `ORAKLE_SKILLS_HOST_URL` → `skills_host.base_url`
/// - `ORAKLE_BRIDGE_URL`      → `bridge.base_url`
/// - `ORAKLE_MATCHER_TOP_K`   → `matcher.top_k`
fn apply_env_overrides(config: &mut OrakleConfig) {
    if let Ok(v) = env::var("ORAKLE_PROVIDER_ID") {
        config.provider.default_id = v;
    }
    if let Ok(v) = env::var("ORAKLE_PROVIDER_MODEL") {
        config.provider.default_model = v;
    }
    if let Ok(v) = env::var("ORAKLE_PROVIDER_KEY") {
        config.provider.api_key = v;
    }
    if let Ok(v) = env::var("ORAKLE_SKILLS_HOST_URL") {
        config.skills_host.base_url = v;
    }
    if let Ok(v) = env::var("ORAKLE_BRIDGE_URL") {
        config.bridge.base_url = v;
    }
    if let Ok(v) = env::var("ORAKLE_MATCHER_TOP_K") {
        if let Ok(k) = v.parse::<usize>() {
            config.matcher.top_k = k;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config, OrakleConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[provider]\ndefault_id = \"anthropic\"").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.provider.default_id, "anthropic");
        assert_eq!(config.matcher.top_k, 10);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = OrakleConfig::default();
        config.provider.default_model = "gpt-4o".to_string();
        save_config(&path, &config).unwrap();
        let reloaded = load_config(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "not = [valid").unwrap();
        assert!(load_config(&path).is_err());
    }
}

//! Process-wide engine configuration (§4.6), loaded from the environment
//! via the `config` crate with `dotenvy` for local `.env` loading --
//! `BRIDGE__`-prefixed, `__`-nested -- but distinct from the per-build
//! `BuildEngineOptions` (§6.2) that a host passes explicitly at
//! `Engine::builder(...)` time. Every field defaults, since this engine has
//! no external service credentials of its own to require.

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),
}

/// Default trace level used when a host's `BuildEngineOptions.trace` is not
/// set (§6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    #[default]
    Off,
    Basic,
    Full,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// `BRIDGE__TRACE`.
    #[serde(default)]
    pub trace: TraceLevel,

    /// `BRIDGE__STD_NAMESPACE_ENABLED` -- disabling the `std` fallback
    /// namespace (§4.4) makes `ToolNotFound` strict for embedding contexts
    /// that want every tool explicitly host-registered.
    #[serde(default = "default_std_namespace_enabled")]
    pub std_namespace_enabled: bool,

    /// `BRIDGE__MAX_DEFINE_INLINE_DEPTH` -- bounds nested define-inside-define
    /// inlining depth (§4.1 rule 7) so a pathological `.bridge` file fails
    /// with a `SemanticError` at compile time instead of exhausting stack
    /// during lowering.
    #[serde(default = "default_max_define_inline_depth")]
    pub max_define_inline_depth: usize,
}

fn default_std_namespace_enabled() -> bool {
    true
}

fn default_max_define_inline_depth() -> usize {
    64
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            trace: TraceLevel::default(),
            std_namespace_enabled: default_std_namespace_enabled(),
            max_define_inline_depth: default_max_define_inline_depth(),
        }
    }
}

impl EngineSettings {
    /// Loads settings from the environment. Never fails on missing env
    /// vars -- every field has a default -- so `EngineSettings::default()`
    /// is always a valid, fully-off-the-shelf configuration.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let settings = config::Config::builder()
            .add_source(config::Environment::default().prefix("BRIDGE").separator("__"))
            .build()?
            .try_deserialize()
            .unwrap_or_default();
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_always_valid() {
        let settings = EngineSettings::default();
        assert_eq!(settings.trace, TraceLevel::Off);
        assert!(settings.std_namespace_enabled);
        assert_eq!(settings.max_define_inline_depth, 64);
    }

    #[test]
    fn load_never_fails_on_missing_env_vars() {
        assert!(EngineSettings::load().is_ok());
    }
}

//! `RuntimeConfig`: the semantic configuration surface named in §6. Loading
//! a config file is the thinnest possible wrapper (the CLI owns that); this
//! type and its defaults are what the runtime actually consumes.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::safety::SafetyMode;
use crate::types::ToolCategory;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub capacity: usize,
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(with = "humantime_serde")]
    pub router: Duration,
    #[serde(with = "humantime_serde")]
    pub per_agent_default: Duration,
    #[serde(with = "humantime_serde")]
    pub per_agent_hard_cap: Duration,
    #[serde(with = "humantime_serde")]
    pub per_tool: Duration,
    #[serde(with = "humantime_serde")]
    pub pool_acquire: Duration,
    #[serde(with = "humantime_serde")]
    pub subprocess_start: Duration,
    #[serde(with = "humantime_serde")]
    pub graceful_shutdown: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            router: Duration::from_secs(5),
            per_agent_default: Duration::from_secs(45),
            per_agent_hard_cap: Duration::from_secs(120),
            per_tool: Duration::from_secs(30),
            pool_acquire: Duration::from_secs(5),
            subprocess_start: Duration::from_secs(10),
            graceful_shutdown: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub enable_fallback: bool,
    pub fallback_agent: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            enable_fallback: true,
            fallback_agent: "medical_literature_search".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub allow_parallel_helpers: bool,
    pub always_run: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    pub prefer: Vec<String>,
    pub agent_priority: Vec<String>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            prefer: vec!["doi".to_string(), "pmid".to_string(), "url".to_string()],
            agent_priority: crate::synthesis::default_agent_priority(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub mode: SafetyModeConfig,
    pub extended_phi: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            mode: SafetyModeConfig::ZeroTolerance,
            extended_phi: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyModeConfig {
    ZeroTolerance,
    Redact,
}

impl From<SafetyModeConfig> for SafetyMode {
    fn from(value: SafetyModeConfig) -> Self {
        match value {
            SafetyModeConfig::ZeroTolerance => SafetyMode::ZeroTolerance,
            SafetyModeConfig::Redact => SafetyMode::Redact,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub per_session_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            per_session_max_entries: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    pub category: ToolCategory,
    pub command: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub pool: PoolConfig,
    pub timeouts: TimeoutsConfig,
    pub selection: SelectionConfig,
    pub routing: RoutingConfig,
    pub synthesis: SynthesisConfig,
    pub safety: SafetyConfig,
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    pub tool_servers: Vec<ToolServerConfig>,
}

impl RuntimeConfig {
    pub fn tool_server_map(&self) -> HashMap<ToolCategory, crate::transport::ToolServerSpec> {
        self.tool_servers
            .iter()
            .map(|t| {
                (
                    t.category,
                    crate::transport::ToolServerSpec {
                        category: t.category,
                        command: t.command.clone(),
                        args: t.args.clone(),
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let config = RuntimeConfig::default();
        assert_eq!(config.pool.capacity, 3);
        assert_eq!(config.timeouts.router, Duration::from_secs(5));
        assert_eq!(config.timeouts.per_agent_default, Duration::from_secs(45));
        assert_eq!(config.timeouts.per_agent_hard_cap, Duration::from_secs(120));
        assert_eq!(config.cache.per_session_max_entries, 256);
        assert_eq!(config.selection.fallback_agent, "medical_literature_search");
    }
}

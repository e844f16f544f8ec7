use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the prompt reaches a spawned agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptDelivery {
    /// Prompt passed as a trailing argv element.
    Args,
    /// Prompt piped to stdin, which is then closed.
    Stdin,
    /// Prompt written to a temp file whose path is passed as argv.
    Tempfile,
}

impl PromptDelivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptDelivery::Args => "args",
            PromptDelivery::Stdin => "stdin",
            PromptDelivery::Tempfile => "tempfile",
        }
    }
}

/// Per-agent invocation config. An open map in storage but a closed set in
/// code: unknown keys are preserved on read and passed through on write so
/// older peers do not lose data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeConfig {
    pub driver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trust: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_delivery: Option<PromptDelivery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_checkin_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_runtime_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl InvokeConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            model: None,
            trust: Vec::new(),
            prompt_delivery: None,
            spawn_timeout_ms: None,
            idle_after_ms: None,
            min_checkin_ms: None,
            max_runtime_ms: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn spawn_timeout_ms(&self) -> u64 {
        self.spawn_timeout_ms.unwrap_or(30_000)
    }

    pub fn idle_after_ms(&self) -> u64 {
        self.idle_after_ms.unwrap_or(120_000)
    }

    pub fn min_checkin_ms(&self) -> u64 {
        self.min_checkin_ms.unwrap_or(0)
    }

    pub fn max_runtime_ms(&self) -> u64 {
        self.max_runtime_ms.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let json = r#"{"driver":"claude","model":"opus","future_knob":42}"#;
        let config: InvokeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.driver, "claude");
        assert_eq!(config.extra.get("future_knob"), Some(&serde_json::json!(42)));

        let out = serde_json::to_string(&config).unwrap();
        assert!(out.contains("future_knob"));
    }

    #[test]
    fn test_timeout_defaults() {
        let config = InvokeConfig::new("codex");
        assert_eq!(config.spawn_timeout_ms(), 30_000);
        assert_eq!(config.min_checkin_ms(), 0);
        assert_eq!(config.max_runtime_ms(), 0);
    }
}

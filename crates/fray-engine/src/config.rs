use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Sync backend selection recorded at setup time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum SyncConfig {
    Path { base: PathBuf },
    Cloud { base: PathBuf },
    Hosted { url: String },
}

/// Channel config stored at `.fray/fray-config.json`. Unknown keys are
/// preserved so newer peers' settings are not dropped on save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel_id: String,
    pub channel_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_agents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncConfig>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChannelConfig {
    pub fn new(channel_id: String, channel_name: String) -> Self {
        Self {
            channel_id,
            channel_name,
            known_agents: Vec::new(),
            sync: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn path(fray_dir: &Path) -> PathBuf {
        fray_dir.join("fray-config.json")
    }

    pub fn load(fray_dir: &Path) -> Result<Self> {
        let path = Self::path(fray_dir);
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::InvalidInput(format!("corrupt channel config: {}", e)))
    }

    pub fn save(&self, fray_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(fray_dir)?;
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidInput(format!("channel config: {}", e)))?;
        std::fs::write(Self::path(fray_dir), content)?;
        Ok(())
    }

    pub fn remember_agent(&mut self, agent_id: &str) {
        if !self.known_agents.iter().any(|a| a == agent_id) {
            self.known_agents.push(agent_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let mut config = ChannelConfig::new("ch-1".to_string(), "dev".to_string());
        config.remember_agent("alice");
        config.save(temp.path()).unwrap();

        let loaded = ChannelConfig::load(temp.path()).unwrap();
        assert_eq!(loaded.channel_id, "ch-1");
        assert_eq!(loaded.known_agents, vec!["alice"]);
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("fray-config.json"),
            r#"{"channel_id":"ch-1","channel_name":"dev","router_version":3}"#,
        )
        .unwrap();

        let config = ChannelConfig::load(temp.path()).unwrap();
        config.save(temp.path()).unwrap();

        let raw = std::fs::read_to_string(temp.path().join("fray-config.json")).unwrap();
        assert!(raw.contains("router_version"));
    }

    #[test]
    fn test_sync_config_tagging() {
        let config = SyncConfig::Hosted {
            url: "https://relay.example".to_string(),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["backend"], "hosted");
    }
}

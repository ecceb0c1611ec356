use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// `.librainian.json`: `{version:1, ignore:[...]}`. Invalid JSON emits a
/// warning but never fails the Freshness Gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibrainianIgnoreConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub ignore: Vec<String>,
}

fn default_version() -> u32 {
    1
}

impl LibrainianIgnoreConfig {
    pub fn load(workspace_root: &Path) -> Self {
        let path = workspace_root.join(".librainian.json");
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<LibrainianIgnoreConfig>(&raw) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "invalid .librainian.json, ignoring");
                    LibrainianIgnoreConfig::default()
                }
            },
            Err(_) => LibrainianIgnoreConfig::default(),
        }
    }
}

/// `librainian.config.json::retrieval.max_escalation_depth`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub max_escalation_depth: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibrainianConfigFile {
    #[serde(default)]
    retrieval: RetrievalConfig,
}

impl RetrievalConfig {
    pub fn load(workspace_root: &Path) -> Self {
        let path = workspace_root.join("librainian.config.json");
        match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<LibrainianConfigFile>(&raw)
                .map(|f| f.retrieval)
                .unwrap_or_default(),
            Err(_) => RetrievalConfig::default(),
        }
    }
}

/// Public re-export name matching the `librainian.config.json`
/// vocabulary for callers that want the whole file, not just retrieval.
pub type LibrainianConfig = LibrainianConfigFile;

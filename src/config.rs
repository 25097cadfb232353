use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "ScriptConfig::default_core_assembly")]
    pub core_assembly: PathBuf,
    #[serde(default = "ScriptConfig::default_client_assembly")]
    pub client_assembly: PathBuf,
    #[serde(default = "ScriptConfig::default_auto_reload")]
    pub auto_reload: bool,
}

impl ScriptConfig {
    fn default_core_assembly() -> PathBuf {
        PathBuf::from("assets/scripts/core.rhai")
    }

    fn default_client_assembly() -> PathBuf {
        PathBuf::from("assets/scripts/sandbox.rhai")
    }

    const fn default_auto_reload() -> bool {
        true
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            core_assembly: Self::default_core_assembly(),
            client_assembly: Self::default_client_assembly(),
            auto_reload: Self::default_auto_reload(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub scripting: ScriptConfig,
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                eprintln!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }
}

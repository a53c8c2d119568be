use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Voice provider API root.
    pub voice_api_base: String,
    pub voice_api_key: String,
    /// Object storage root narration audio is uploaded under.
    pub storage_base: String,
    /// Document store root for books and voice samples.
    pub library_base: String,
    pub cache_dir: PathBuf,
    /// Worker threads used for preload fetch fan-out.
    pub preload_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            voice_api_base: "https://api.elevenlabs.io".to_string(),
            voice_api_key: String::new(),
            storage_base: String::new(),
            library_base: String::new(),
            cache_dir: PathBuf::from(".narration-cache"),
            preload_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new() -> Result<Self> {
        let base = BaseDirs::new().context("unable to resolve home directory")?;
        let path = base.home_dir().join(".config").join("storyvoice.yaml");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read config {}", self.path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
        let contents = serde_yaml::to_string(config)?;
        fs::write(&self.path, contents)
            .with_context(|| format!("write config {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn config_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("storyvoice.yaml");
        let store = ConfigStore { path };
        let mut cfg = Config::default();
        cfg.voice_api_key = "key-123".to_string();
        cfg.storage_base = "https://storage.example.com/narration".to_string();
        cfg.library_base = "https://api.example.com".to_string();
        cfg.cache_dir = PathBuf::from("custom-cache");
        cfg.preload_concurrency = 8;
        store.save(&cfg)?;
        let loaded = store.load()?;
        assert_eq!(loaded.voice_api_key, cfg.voice_api_key);
        assert_eq!(loaded.storage_base, cfg.storage_base);
        assert_eq!(loaded.library_base, cfg.library_base);
        assert_eq!(loaded.cache_dir, cfg.cache_dir);
        assert_eq!(loaded.preload_concurrency, cfg.preload_concurrency);
        Ok(())
    }

    #[test]
    fn missing_file_loads_defaults() -> Result<()> {
        let dir = tempdir()?;
        let store = ConfigStore {
            path: dir.path().join("absent.yaml"),
        };
        let loaded = store.load()?;
        assert_eq!(loaded.preload_concurrency, 4);
        Ok(())
    }
}

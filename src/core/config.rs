use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::state::{chapter_count_in_range, MAX_CHAPTERS, MIN_CHAPTERS};
use crate::services::llm::LlmConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub llm: LlmConfig,

    #[serde(default)]
    pub workshop: WorkshopConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkshopConfig {
    #[serde(default = "default_chapters")]
    pub default_chapters: usize,
}

impl Default for WorkshopConfig {
    fn default() -> Self {
        Self {
            default_chapters: default_chapters(),
        }
    }
}

fn default_chapters() -> usize {
    25
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Path::new("config.yml");
        if !path.exists() {
            anyhow::bail!("config.yml not found. Please create one.");
        }
        Self::load_from(path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml_ng::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.llm.validate()?;
        if !chapter_count_in_range(self.workshop.default_chapters) {
            anyhow::bail!(
                "workshop.default_chapters must be between {} and {}, got {}",
                MIN_CHAPTERS,
                MAX_CHAPTERS,
                self.workshop.default_chapters
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GEMINI_YAML: &str = r#"
llm:
  provider: gemini
  gemini:
    api_key: test-key
    model: gemini-2.0-flash
"#;

    #[test]
    fn test_defaults_applied() -> Result<()> {
        let config = Config::from_yaml(GEMINI_YAML)?;
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.workshop.default_chapters, 25);
        Ok(())
    }

    #[test]
    fn test_out_of_range_default_chapters_rejected() {
        let yaml = format!("{}workshop:\n  default_chapters: 40\n", GEMINI_YAML);
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("default_chapters"));
    }

    #[test]
    fn test_missing_provider_block_rejected() {
        let yaml = "llm:\n  provider: ollama\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_from_file_and_save_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.yml");
        let mut file = fs::File::create(&path)?;
        file.write_all(
            b"llm:\n  provider: openai\n  openai:\n    api_key: k\n    model: mistralai/devstral-small:free\n    base_url: https://openrouter.ai/api/v1\nworkshop:\n  default_chapters: 12\n",
        )?;

        let config = Config::load_from(&path)?;
        assert_eq!(config.workshop.default_chapters, 12);
        let openai = config.llm.openai.as_ref().context("openai block")?;
        assert_eq!(openai.base_url.as_deref(), Some("https://openrouter.ai/api/v1"));

        let copy = dir.path().join("copy.yml");
        config.save(&copy)?;
        let reloaded = Config::load_from(&copy)?;
        assert_eq!(reloaded.llm.provider, "openai");
        Ok(())
    }
}

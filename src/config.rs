//! Runtime settings, built once in `main` and handed to every collaborator.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::PipelineResult;

const DEFAULT_CONFIG_FILE: &str = "jobcz.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub scrape: ScrapeSettings,
    pub openai: OpenAiSettings,
    pub rag: RagSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeSettings {
    pub base_url: String,
    pub page_limit: u32,
    /// Pause before every request to the job board.
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
    pub max_retries: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Settings {
    /// Defaults, then `jobcz.toml` (or `file`), then `JOBCZ__*` env vars,
    /// then `OPENAI_API_KEY`.
    pub fn load(file: Option<&Path>) -> PipelineResult<Self> {
        let file_source = match file {
            Some(path) => File::from(path.to_path_buf()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Self::defaults()?
            .add_source(file_source)
            .add_source(
                Environment::with_prefix("JOBCZ")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("openai.api_key", std::env::var("OPENAI_API_KEY").ok())?
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    fn defaults() -> PipelineResult<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("database.path", "data/jobcz.sqlite")?
            .set_default("scrape.base_url", "https://www.jobs.cz/en")?
            .set_default("scrape.page_limit", 1)?
            .set_default("scrape.request_delay_ms", 2000)?
            .set_default("scrape.timeout_secs", 30)?
            .set_default(
                "scrape.user_agent",
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            )?
            .set_default("openai.base_url", "https://api.openai.com/v1")?
            .set_default("openai.embedding_model", "text-embedding-ada-002")?
            .set_default("openai.chat_model", "gpt-3.5-turbo")?
            .set_default("openai.temperature", 0.0)?
            .set_default("openai.max_retries", 3)?
            .set_default("openai.batch_size", 64)?
            .set_default("rag.chunk_size", 1000)?
            .set_default("rag.chunk_overlap", 0)?
            .set_default("rag.top_k", 4)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize() {
        let settings: Settings = Settings::defaults()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.scrape.base_url, "https://www.jobs.cz/en");
        assert_eq!(settings.scrape.page_limit, 1);
        assert_eq!(settings.rag.chunk_size, 1000);
        assert_eq!(settings.rag.top_k, 4);
        assert!(settings.openai.api_key.is_none());
        assert_eq!(settings.database.path, PathBuf::from("data/jobcz.sqlite"));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let settings: Settings = Settings::defaults()
            .unwrap()
            .set_override("scrape.page_limit", 5)
            .unwrap()
            .set_override("openai.api_key", "sk-test")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.scrape.page_limit, 5);
        assert_eq!(settings.openai.api_key.as_deref(), Some("sk-test"));
    }
}

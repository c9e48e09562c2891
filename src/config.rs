//! Configuration management for researchd.
//!
//! Configuration is read from environment variables:
//! - `OPENROUTER_API_KEY` - Optional. Without it the deep research tool is disabled.
//! - `TAVILY_API_KEY` - Optional. Without it web search is unavailable.
//! - `DEFAULT_MODEL` - Optional. Fallback model for every research role. Defaults to `openai/gpt-4o-mini`.
//! - `CURATOR_MODEL`, `SUMMARIZER_MODEL`, `WRITER_MODEL` - Optional per-role overrides.
//! - `LLM_MAX_RETRIES` - Optional. Transient-error retries in the LLM client. Defaults to `0`.
//! - `LLM_TIMEOUT_SECS` - Optional. Per-request timeout of the LLM client. Defaults to `120`.
//! - `WORKSPACE_ROOT` - Optional. Base directory of task workspaces. Defaults to `./workspace`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `WEB_READER_TIMEOUT_SECS` - Optional. Page fetch timeout. Defaults to `15`.
//! - `WEB_READER_MAX_LENGTH` - Optional. Max extracted page length in chars. Defaults to `4000`.
//! - `PDF_READER_WARNING_LENGTH` - Optional. PDF size warning threshold. Defaults to `20000`.
//! - `SHELL_TIMEOUT_SECS` - Optional. Shell command timeout. Defaults to `60`.
//! - `SHELL_MAX_OUTPUT` - Optional. Shell output cap in bytes. Defaults to `3000`.
//! - `RESEARCH_FETCH_DELAY_MS` - Optional. Pause between research page fetches. Defaults to `500`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::research::ResearchSettings;
use crate::tools::{ReadLimits, ShellLimits};
use crate::util::{env_var_opt, env_var_parse};

const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Model ids for the three research roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub curator: String,
    pub summarizer: String,
    pub writer: String,
}

/// Page fetching limits.
#[derive(Debug, Clone)]
pub struct WebReaderConfig {
    pub timeout: Duration,
    pub max_length: usize,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter API key (research generation)
    pub openrouter_api_key: Option<String>,

    /// Tavily API key (web search)
    pub tavily_api_key: Option<String>,

    pub models: ModelConfig,

    /// Retries for transient LLM failures (0 = fail fast)
    pub llm_max_retries: u32,

    /// Per-request timeout for chat completions
    pub llm_timeout: Duration,

    /// Base directory under which each task gets its workspace
    pub workspace_root: PathBuf,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    pub web_reader: WebReaderConfig,

    pub read_limits: ReadLimits,

    pub shell_limits: ShellLimits,

    pub research: ResearchSettings,
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    env_var_parse(name, default).map_err(|raw| {
        ConfigError::InvalidValue(name.to_string(), format!("could not parse '{}'", raw))
    })
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let default_model = env_var_opt("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let model_for = |name: &str| env_var_opt(name).unwrap_or_else(|| default_model.clone());

        let models = ModelConfig {
            curator: model_for("CURATOR_MODEL"),
            summarizer: model_for("SUMMARIZER_MODEL"),
            writer: model_for("WRITER_MODEL"),
        };

        let workspace_root = env_var_opt("WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./workspace"));

        let web_reader = WebReaderConfig {
            timeout: Duration::from_secs(parse_var("WEB_READER_TIMEOUT_SECS", 15u64)?),
            max_length: parse_var("WEB_READER_MAX_LENGTH", 4000usize)?,
        };

        let read_limits = ReadLimits {
            pdf_warning_length: parse_var("PDF_READER_WARNING_LENGTH", 20_000usize)?,
        };

        let shell_limits = ShellLimits {
            timeout: Duration::from_secs(parse_var("SHELL_TIMEOUT_SECS", 60u64)?),
            max_output_bytes: parse_var("SHELL_MAX_OUTPUT", 3000usize)?,
        };
        if shell_limits.timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "SHELL_TIMEOUT_SECS".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        let llm_timeout = Duration::from_secs(parse_var("LLM_TIMEOUT_SECS", 120u64)?);
        if llm_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "LLM_TIMEOUT_SECS".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        let research = ResearchSettings {
            fetch_delay: Duration::from_millis(parse_var("RESEARCH_FETCH_DELAY_MS", 500u64)?),
        };

        Ok(Self {
            openrouter_api_key: env_var_opt("OPENROUTER_API_KEY"),
            tavily_api_key: env_var_opt("TAVILY_API_KEY"),
            models,
            llm_max_retries: parse_var("LLM_MAX_RETRIES", 0u32)?,
            llm_timeout,
            workspace_root,
            host: env_var_opt("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_var("PORT", 3000u16)?,
            web_reader,
            read_limits,
            shell_limits,
            research,
        })
    }

    /// Configuration with defaults, rooted at `workspace_root`. Keys are unset.
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            openrouter_api_key: None,
            tavily_api_key: None,
            models: ModelConfig {
                curator: DEFAULT_MODEL.to_string(),
                summarizer: DEFAULT_MODEL.to_string(),
                writer: DEFAULT_MODEL.to_string(),
            },
            llm_max_retries: 0,
            llm_timeout: Duration::from_secs(120),
            workspace_root: workspace_root.into(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            web_reader: WebReaderConfig {
                timeout: Duration::from_secs(15),
                max_length: 4000,
            },
            read_limits: ReadLimits::default(),
            shell_limits: ShellLimits::default(),
            research: ResearchSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_numeric_vars_use_defaults() {
        assert_eq!(
            parse_var("RESEARCHD_TEST_UNSET_NUMBER", 15u64).expect("default"),
            15
        );
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        // Unique name so parallel tests cannot observe it.
        std::env::set_var("RESEARCHD_TEST_BAD_PORT", "eighty");
        let err = parse_var("RESEARCHD_TEST_BAD_PORT", 3000u16).expect_err("should fail");
        std::env::remove_var("RESEARCHD_TEST_BAD_PORT");

        let ConfigError::InvalidValue(name, message) = err;
        assert_eq!(name, "RESEARCHD_TEST_BAD_PORT");
        assert!(message.contains("eighty"));
    }

    #[test]
    fn new_matches_documented_defaults() {
        let config = Config::new("/tmp/ws");
        assert_eq!(config.models.curator, DEFAULT_MODEL);
        assert_eq!(config.port, 3000);
        assert_eq!(config.web_reader.max_length, 4000);
        assert_eq!(config.read_limits.pdf_warning_length, 20_000);
        assert_eq!(config.shell_limits.max_output_bytes, 3000);
        assert_eq!(config.research.fetch_delay, Duration::from_millis(500));
        assert_eq!(config.llm_timeout, Duration::from_secs(120));
        assert!(config.openrouter_api_key.is_none());
    }
}

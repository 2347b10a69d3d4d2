use crate::core::extract::SelectorSettings;
use crate::core::pipeline::PipelineSettings;
use crate::core::retry::RetryPolicy;
use crate::domain::model::CardModel;
use crate::utils::error::{DeckError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_range,
    validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 設定檔；每個區段與欄位都可省略
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub source: SourceConfig,
    pub fetch: FetchConfig,
    pub extract: ExtractConfig,
    pub upload: UploadConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// 任務清單路徑，CLI 的 `--tasks` 優先
    pub tasks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub retry_delay_ms: u64,
    pub max_attempts: Option<u32>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_size: 1000,
            timeout_seconds: 30,
            user_agent: crate::adapters::http::DEFAULT_USER_AGENT.to_string(),
            retry_delay_ms: 500,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub selectors: SelectorSettings,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_size: 100,
            selectors: SelectorSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
    pub queue_size: usize,
    pub retry_delay_ms: u64,
    pub max_attempts: Option<u32>,
    pub model: CardModel,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::adapters::anki::DEFAULT_ENDPOINT.to_string(),
            timeout_seconds: 30,
            queue_size: 100,
            retry_delay_ms: 100,
            max_attempts: None,
            model: CardModel::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| DeckError::ConfigError {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| DeckError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${ANKI_URL})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| DeckError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        if let Some(tasks) = &self.source.tasks {
            validate_path("source.tasks", tasks)?;
        }

        validate_positive_number("fetch.workers", self.fetch.workers, 1)?;
        validate_positive_number("fetch.queue_size", self.fetch.queue_size, 1)?;
        validate_range("fetch.timeout_seconds", self.fetch.timeout_seconds, 1, 600)?;
        validate_non_empty_string("fetch.user_agent", &self.fetch.user_agent)?;
        if let Some(max) = self.fetch.max_attempts {
            validate_positive_number("fetch.max_attempts", max as usize, 1)?;
        }

        validate_positive_number("extract.workers", self.extract.workers, 1)?;
        validate_positive_number("extract.queue_size", self.extract.queue_size, 1)?;

        validate_url("upload.endpoint", &self.upload.endpoint)?;
        validate_range("upload.timeout_seconds", self.upload.timeout_seconds, 1, 600)?;
        validate_positive_number("upload.queue_size", self.upload.queue_size, 1)?;
        if let Some(max) = self.upload.max_attempts {
            validate_positive_number("upload.max_attempts", max as usize, 1)?;
        }

        let model = &self.upload.model;
        validate_non_empty_string("upload.model.name", &model.name)?;
        validate_non_empty_string("upload.model.front_field", &model.front_field)?;
        validate_non_empty_string("upload.model.back_field", &model.back_field)?;
        validate_non_empty_string(
            "upload.model.implementation_field",
            &model.implementation_field,
        )?;

        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            fetch_workers: self.fetch.workers,
            extract_workers: self.extract.workers,
            source_queue: self.fetch.queue_size,
            extract_queue: self.extract.queue_size,
            upload_queue: self.upload.queue_size,
            fetch_retry: RetryPolicy::fixed(Duration::from_millis(self.fetch.retry_delay_ms))
                .with_max_attempts(self.fetch.max_attempts),
            upload_retry: RetryPolicy::fixed(Duration::from_millis(self.upload.retry_delay_ms))
                .with_max_attempts(self.upload.max_attempts),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_seconds)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload.timeout_seconds)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert!(config.validate().is_ok());

        let settings = config.pipeline_settings();
        assert_eq!(settings, PipelineSettings::default());
    }

    #[test]
    fn test_parse_sections() {
        let toml_content = r#"
[source]
tasks = "./urls_1.22.0.txt"

[fetch]
workers = 2
retry_delay_ms = 1000
max_attempts = 20

[extract.selectors]
source_link = "a.Source"

[upload]
endpoint = "http://localhost:9000"

[upload.model]
name = "Rust"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.source.tasks.as_deref(), Some("./urls_1.22.0.txt"));
        assert_eq!(config.fetch.workers, 2);
        assert_eq!(config.fetch.queue_size, 1000);
        assert_eq!(config.extract.selectors.source_link, "a.Source");
        assert_eq!(
            config.extract.selectors.type_container,
            SelectorSettings::default().type_container
        );
        assert_eq!(config.upload.model.name, "Rust");
        assert_eq!(config.upload.model.front_field, "Identifier");

        let settings = config.pipeline_settings();
        assert_eq!(settings.fetch_workers, 2);
        assert_eq!(settings.fetch_retry.delay, Duration::from_secs(1));
        assert_eq!(settings.fetch_retry.max_attempts, Some(20));
        assert_eq!(settings.upload_retry.max_attempts, None);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("DOCDECK_TEST_ANKI_URL", "http://10.0.0.2:8765");

        let toml_content = r#"
[upload]
endpoint = "${DOCDECK_TEST_ANKI_URL}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.upload.endpoint, "http://10.0.0.2:8765");

        std::env::remove_var("DOCDECK_TEST_ANKI_URL");
    }

    #[test]
    fn test_config_validation() {
        let config = TomlConfig::from_toml_str("[upload]\nendpoint = \"invalid-url\"\n").unwrap();
        assert!(config.validate().is_err());

        let config = TomlConfig::from_toml_str("[fetch]\nworkers = 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(DeckError::InvalidConfigValueError { field, .. }) if field == "fetch.workers"
        ));

        let config = TomlConfig::from_toml_str("[upload.model]\nback_field = \" \"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[extract]\nworkers = 3\n\n[monitoring]\nenabled = true\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.extract.workers, 3);
        assert!(config.monitoring.enabled);

        assert!(TomlConfig::from_file("/no/such/docdeck.toml").is_err());
        assert!(TomlConfig::from_toml_str("[fetch]\nworkers = \"many\"\n").is_err());
    }
}

pub mod toml_config;

pub use toml_config::TomlConfig;

#[cfg(feature = "cli")]
use crate::utils::error::{DeckError, Result};
#[cfg(feature = "cli")]
use crate::utils::validation::{validate_path, validate_positive_number, validate_url, Validate};
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Default, Serialize, Deserialize, Parser)]
#[command(name = "docdeck")]
#[command(about = "Turn Go package documentation into Anki flashcards")]
pub struct CliConfig {
    /// Task list: one `<Deck::Name::Path> <url>` per line
    #[arg(long, short = 't')]
    pub tasks: Option<String>,

    /// Optional TOML configuration file
    #[arg(long, short = 'c')]
    pub config: Option<String>,

    #[arg(long, help = "AnkiConnect endpoint")]
    pub anki_url: Option<String>,

    #[arg(long)]
    pub fetch_workers: Option<usize>,

    #[arg(long)]
    pub extract_workers: Option<usize>,

    #[arg(long, help = "Capacity of the queue feeding the fetch workers")]
    pub source_queue: Option<usize>,

    #[arg(long, help = "Give up on a task after this many rate-limited attempts")]
    pub max_attempts: Option<u32>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,

    #[arg(long, help = "Log CPU and memory usage per stage")]
    pub monitor: bool,

    #[arg(long, help = "Parse the task list and configuration, then exit")]
    pub dry_run: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 讀取設定檔（若有）並套用命令列覆寫
    pub fn resolve(&self) -> Result<TomlConfig> {
        let mut config = match &self.config {
            Some(path) => TomlConfig::from_file(path)?,
            None => TomlConfig::default(),
        };
        self.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_to(&self, config: &mut TomlConfig) {
        if let Some(tasks) = &self.tasks {
            config.source.tasks = Some(tasks.clone());
        }
        if let Some(url) = &self.anki_url {
            config.upload.endpoint = url.clone();
        }
        if let Some(workers) = self.fetch_workers {
            config.fetch.workers = workers;
        }
        if let Some(workers) = self.extract_workers {
            config.extract.workers = workers;
        }
        if let Some(size) = self.source_queue {
            config.fetch.queue_size = size;
        }
        if self.max_attempts.is_some() {
            config.fetch.max_attempts = self.max_attempts;
        }
        if self.monitor {
            config.monitoring.enabled = true;
        }
    }

    pub fn task_file(&self, config: &TomlConfig) -> Result<String> {
        self.tasks
            .clone()
            .or_else(|| config.source.tasks.clone())
            .ok_or_else(|| DeckError::ConfigError {
                message: "no task list given (use --tasks or [source] tasks)".to_string(),
            })
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        if let Some(tasks) = &self.tasks {
            validate_path("tasks", tasks)?;
        }
        if let Some(config) = &self.config {
            validate_path("config", config)?;
        }
        if let Some(url) = &self.anki_url {
            validate_url("anki_url", url)?;
        }
        if let Some(workers) = self.fetch_workers {
            validate_positive_number("fetch_workers", workers, 1)?;
        }
        if let Some(workers) = self.extract_workers {
            validate_positive_number("extract_workers", workers, 1)?;
        }
        Ok(())
    }
}

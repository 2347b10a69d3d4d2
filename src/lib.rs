pub mod adapters;
pub mod config;
pub mod core;
pub mod dom;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::TomlConfig;

pub use adapters::{AnkiConnect, HttpFetcher};
pub use core::extract::Extractor;
pub use core::pipeline::{Pipeline, PipelineReport, PipelineSettings};
pub use utils::error::{DeckError, Result};

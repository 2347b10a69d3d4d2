use crate::domain::model::Category;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for '{field}': '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Malformed task list line {line_number}: '{line}' ({reason})")]
    MalformedTaskLine {
        line_number: usize,
        line: String,
        reason: String,
    },

    #[error("Invalid deck name '{name}': {reason}")]
    InvalidDeckName { name: String, reason: String },

    #[error("Invalid selector '{selector}': {reason}")]
    SelectorError { selector: String, reason: String },

    #[error(
        "Unexpected document structure in {url}: found {containers} {category} containers but {headers} headers"
    )]
    StructureMismatch {
        category: Category,
        url: String,
        containers: usize,
        headers: usize,
    },

    #[error("Unexpected document structure in {url}: {category} header #{index} is not inside its container")]
    MisplacedHeader {
        category: Category,
        url: String,
        index: usize,
    },

    #[error("Unexpected document structure in {url}: no '{selector}' inside a {category} declaration")]
    MissingElement {
        category: Category,
        url: String,
        selector: String,
    },

    #[error("Unexpected document structure in {url}: <{element}> marker lacks attribute '{attribute}'")]
    MissingAttribute {
        url: String,
        element: String,
        attribute: String,
    },

    #[error("Unexpected HTTP status {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("{stage} gave up after {attempts} attempts: {reason}")]
    RetriesExhausted {
        stage: &'static str,
        attempts: u32,
        reason: String,
    },

    #[error("Note service is unavailable: {message}")]
    NoteServiceUnavailable { message: String },

    #[error("Note service refused '{action}': {message}")]
    NoteServiceError { action: String, message: String },

    #[error("Note rejected for deck '{deck}': {reason}\nNote:\n{note}")]
    NoteRejected {
        deck: String,
        reason: String,
        note: String,
    },

    #[error("Pipeline stage '{stage}' failed: {message}")]
    StageError { stage: &'static str, message: String },

    #[error("Worker task failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    DocumentStructure,
    NoteService,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DeckError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DeckError::HttpError(_)
            | DeckError::UnexpectedStatus { .. }
            | DeckError::RetriesExhausted { .. } => ErrorCategory::Network,
            DeckError::ConfigError { .. }
            | DeckError::InvalidConfigValueError { .. }
            | DeckError::MalformedTaskLine { .. }
            | DeckError::InvalidDeckName { .. }
            | DeckError::SelectorError { .. } => ErrorCategory::Configuration,
            DeckError::StructureMismatch { .. }
            | DeckError::MisplacedHeader { .. }
            | DeckError::MissingElement { .. }
            | DeckError::MissingAttribute { .. } => ErrorCategory::DocumentStructure,
            DeckError::NoteServiceUnavailable { .. }
            | DeckError::NoteServiceError { .. }
            | DeckError::NoteRejected { .. } => ErrorCategory::NoteService,
            DeckError::IoError(_)
            | DeckError::SerializationError(_)
            | DeckError::StageError { .. }
            | DeckError::JoinError(_) => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::DocumentStructure | ErrorCategory::NoteService => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::Internal => ErrorSeverity::Critical,
        }
    }

    /// 文件版面已不符合抽取時的假設，整個執行必須中止
    pub fn is_structural(&self) -> bool {
        self.category() == ErrorCategory::DocumentStructure
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not download documentation: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::DocumentStructure => {
                format!("Documentation layout changed, extraction aborted: {}", self)
            }
            ErrorCategory::NoteService => format!("Anki rejected the upload: {}", self),
            ErrorCategory::Internal => format!("Internal error: {}", self),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            DeckError::MalformedTaskLine { .. } | DeckError::InvalidDeckName { .. } => {
                "Each task line must read '<Deck::With::Three::Segments> <https://url>'"
            }
            DeckError::SelectorError { .. } => "Check the [extract.selectors] section of the config file",
            DeckError::UnexpectedStatus { .. } | DeckError::HttpError(_) => {
                "Check the URLs in the task list and your network connection"
            }
            DeckError::RetriesExhausted { .. } => "Raise max_attempts or retry_delay_ms and run again",
            DeckError::NoteServiceUnavailable { .. } | DeckError::NoteServiceError { .. } => {
                "Make sure Anki is running with the AnkiConnect add-on enabled"
            }
            DeckError::NoteRejected { .. } => {
                "Check that the card model and its field names exist in Anki"
            }
            _ if self.is_structural() => {
                "The documentation site changed its layout; update the selectors"
            }
            _ => "Run again with --verbose for more details",
        }
    }
}

pub type Result<T> = std::result::Result<T, DeckError>;

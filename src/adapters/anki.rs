use crate::domain::model::Note;
use crate::domain::ports::{AddNoteOutcome, NoteStore};
use crate::utils::error::{DeckError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8765";
pub const API_VERSION: u8 = 6;

#[derive(Debug, Serialize)]
struct Request<'a> {
    action: &'a str,
    version: u8,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Reply<T> {
    result: Option<T>,
    error: Option<String>,
}

/// 單次呼叫的失敗分類
#[derive(Debug, Clone, PartialEq, Eq)]
enum CallError {
    /// 連線失敗或 5xx
    Transient(String),
    /// API 回傳 error、其他 HTTP 狀態或無法解析的回應
    Rejected(String),
}

impl CallError {
    fn into_deck_error(self, action: &str) -> DeckError {
        match self {
            CallError::Transient(message) => DeckError::NoteServiceUnavailable { message },
            CallError::Rejected(message) => DeckError::NoteServiceError {
                action: action.to_string(),
                message,
            },
        }
    }
}

/// AnkiConnect HTTP API 用戶端
#[derive(Debug, Clone)]
pub struct AnkiConnect {
    client: Client,
    endpoint: String,
}

impl AnkiConnect {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 回傳 AnkiConnect 的 API 版本，用來確認 Anki 有在執行
    pub async fn ping(&self) -> Result<u32> {
        let version: u32 = self.invoke("version", json!({})).await?;
        tracing::info!("Connected to AnkiConnect {} (API version {})", self.endpoint, version);
        Ok(version)
    }

    pub async fn invoke<T: DeserializeOwned>(&self, action: &str, params: serde_json::Value) -> Result<T> {
        self.call(action, params)
            .await
            .map_err(|e| e.into_deck_error(action))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        params: serde_json::Value,
    ) -> std::result::Result<T, CallError> {
        let request = Request {
            action,
            version: API_VERSION,
            params,
        };
        tracing::debug!("AnkiConnect {}", action);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| CallError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(CallError::Transient(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(CallError::Rejected(format!("HTTP {}", status)));
        }

        let reply: Reply<T> = response
            .json()
            .await
            .map_err(|e| CallError::Rejected(format!("invalid response: {}", e)))?;
        if let Some(error) = reply.error {
            return Err(CallError::Rejected(error));
        }
        reply
            .result
            .ok_or_else(|| CallError::Rejected("empty result".to_string()))
    }
}

#[async_trait]
impl NoteStore for AnkiConnect {
    async fn deck_names(&self) -> Result<HashSet<String>> {
        let names: Vec<String> = self.invoke("deckNames", json!({})).await?;
        Ok(names.into_iter().collect())
    }

    async fn create_deck(&self, name: &str) -> Result<()> {
        let _deck_id: u64 = self.invoke("createDeck", json!({ "deck": name })).await?;
        Ok(())
    }

    async fn add_note(&self, note: &Note) -> AddNoteOutcome {
        match self.call::<u64>("addNote", json!({ "note": note })).await {
            Ok(_) => AddNoteOutcome::Added,
            Err(CallError::Transient(reason)) => AddNoteOutcome::Transient(reason),
            Err(CallError::Rejected(reason)) => AddNoteOutcome::Rejected(reason),
        }
    }
}

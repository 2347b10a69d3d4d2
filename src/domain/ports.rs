use crate::domain::model::Note;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// 下載結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Document(String),
    RateLimited,
    /// 200 與 429 以外的狀態碼
    Rejected { status: u16 },
}

/// 新增筆記的結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddNoteOutcome {
    Added,
    Transient(String),
    Rejected(String),
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 傳輸層失敗以 `Err` 回傳，會附在任務上往下游傳
    async fn fetch(&self, url: &str) -> Result<FetchOutcome>;
}

#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn deck_names(&self) -> Result<HashSet<String>>;
    async fn create_deck(&self, name: &str) -> Result<()>;
    async fn add_note(&self, note: &Note) -> AddNoteOutcome;
}

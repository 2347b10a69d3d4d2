use crate::core::extract::Extractor;
use crate::core::retry::RetryPolicy;
use crate::domain::model::{CardModel, Note, Task, TaskSpec};
use crate::domain::ports::{AddNoteOutcome, FetchOutcome, Fetcher, NoteStore};
use crate::utils::error::{DeckError, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// worker pool 共用的接收端
pub type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

/// 單一 stage（或單一 worker）的處理統計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub stage: &'static str,
    pub processed: usize,
    pub failed: usize,
    pub cards: usize,
    pub retries: usize,
}

impl StageReport {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            ..Default::default()
        }
    }
}

fn queue_closed(stage: &'static str) -> DeckError {
    DeckError::StageError {
        stage,
        message: "downstream queue closed".to_string(),
    }
}

async fn next_task(input: &SharedReceiver<Task>) -> Option<Task> {
    input.lock().await.recv().await
}

/// 依序送出任務；下游佇列滿時等待。
///
/// 任務在各 stage 之間移交所有權，只在收到與送出之間屬於該 stage。
pub async fn run_source(specs: Vec<TaskSpec>, out: mpsc::Sender<Task>) -> Result<StageReport> {
    let mut report = StageReport::new("source");
    for (sequence, spec) in specs.into_iter().enumerate() {
        let task = Task::new(sequence, spec);
        tracing::debug!("Queued {}", task);
        out.send(task).await.map_err(|_| queue_closed("source"))?;
        report.processed += 1;
    }
    tracing::info!("Source emitted {} tasks", report.processed);
    Ok(report)
}

pub async fn run_fetcher(
    worker: usize,
    fetcher: Arc<dyn Fetcher>,
    policy: RetryPolicy,
    input: SharedReceiver<Task>,
    out: mpsc::Sender<Task>,
) -> Result<StageReport> {
    let mut report = StageReport::new("fetch");
    while let Some(mut task) = next_task(&input).await {
        report.retries += fetch_into(fetcher.as_ref(), &policy, &mut task).await? as usize;
        report.processed += 1;
        if task.error.is_some() {
            report.failed += 1;
        }
        out.send(task).await.map_err(|_| queue_closed("fetch"))?;
    }
    tracing::debug!("Fetch worker {} finished: {:?}", worker, report);
    Ok(report)
}

/// 下載任務頁面，回傳因限流而重試的次數。
///
/// 傳輸失敗與重試用盡會附在任務上；200 與 429 以外的狀態碼直接回傳錯誤。
pub async fn fetch_into(fetcher: &dyn Fetcher, policy: &RetryPolicy, task: &mut Task) -> Result<u32> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match fetcher.fetch(&task.url).await {
            Ok(FetchOutcome::Document(body)) => {
                tracing::info!("'{}' downloaded documentation ({} bytes)", task.url, body.len());
                task.payload = Some(body);
                return Ok(attempts - 1);
            }
            Ok(FetchOutcome::RateLimited) => {
                if !policy.allows(attempts) {
                    tracing::warn!("'{}' still rate limited after {} attempts", task.url, attempts);
                    task.error = Some(DeckError::RetriesExhausted {
                        stage: "fetch",
                        attempts,
                        reason: "rate limited".to_string(),
                    });
                    return Ok(attempts - 1);
                }
                tracing::debug!(
                    "'{}' rate limited (attempt {}), retrying in {:?}",
                    task.url,
                    attempts,
                    policy.delay
                );
                policy.wait().await;
            }
            Ok(FetchOutcome::Rejected { status }) => {
                return Err(DeckError::UnexpectedStatus {
                    url: task.url.clone(),
                    status,
                });
            }
            Err(e) => {
                tracing::warn!("Failed to download {}: {}", task.url, e);
                task.error = Some(e);
                return Ok(attempts - 1);
            }
        }
    }
}

pub async fn run_extractor(
    worker: usize,
    extractor: Arc<Extractor>,
    input: SharedReceiver<Task>,
    out: mpsc::Sender<Task>,
) -> Result<StageReport> {
    let mut report = StageReport::new("extract");
    while let Some(task) = next_task(&input).await {
        let extractor = Arc::clone(&extractor);
        let task = tokio::task::spawn_blocking(move || extract_task(&extractor, task)).await??;

        report.processed += 1;
        report.cards += task.card_count();
        if task.error.is_some() {
            report.failed += 1;
        }
        out.send(task).await.map_err(|_| queue_closed("extract"))?;
    }
    tracing::debug!("Extract worker {} finished: {:?}", worker, report);
    Ok(report)
}

/// 抽取卡片並附在任務上。
///
/// 已帶錯誤的任務原樣轉交；版面結構錯誤會中止整個執行。
pub fn extract_task(extractor: &Extractor, mut task: Task) -> Result<Task> {
    if let Some(error) = &task.error {
        tracing::debug!("Skipping extraction for {}: {}", task.url, error);
        return Ok(task);
    }

    let extracted = match task.payload.as_deref() {
        Some(markup) => extractor.extract(markup, &task.url, &task.deck),
        None => Err(DeckError::StageError {
            stage: "extract",
            message: format!("no payload for {}", task.url),
        }),
    };

    match extracted {
        Ok(cards) => task.cards = Some(cards),
        Err(e) if e.is_structural() => return Err(e),
        Err(e) => task.error = Some(e),
    }
    Ok(task)
}

/// 單一消費者，依到達順序上傳
pub async fn run_uploader(
    store: Arc<dyn NoteStore>,
    model: CardModel,
    policy: RetryPolicy,
    mut input: mpsc::Receiver<Task>,
) -> Result<StageReport> {
    let mut decks = store.deck_names().await?;
    tracing::info!("Found {} existing decks", decks.len());

    let mut report = StageReport::new("upload");
    while let Some(task) = input.recv().await {
        report.processed += 1;
        if let Some(error) = &task.error {
            tracing::warn!("Not uploading {}: {}", task, error);
            report.failed += 1;
            continue;
        }

        if !decks.contains(task.deck.as_str()) {
            store.create_deck(task.deck.as_str()).await?;
            tracing::info!("'{}' created deck", task.deck);
            decks.insert(task.deck.as_str().to_string());
        }

        let cards = task.cards.as_deref().unwrap_or_default();
        if cards.is_empty() {
            tracing::warn!("'{}' contains no cards", task.deck);
        }
        for card in cards {
            let note = model.note_for(&task.deck, card);
            report.retries += add_with_retry(store.as_ref(), &policy, &note).await? as usize;
            report.cards += 1;
        }
        tracing::info!("'{}' added {} notes to anki", task.deck, cards.len());
    }
    Ok(report)
}

/// 新增一則筆記，暫時性失敗依策略重試；回傳重試次數
pub async fn add_with_retry(store: &dyn NoteStore, policy: &RetryPolicy, note: &Note) -> Result<u32> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match store.add_note(note).await {
            AddNoteOutcome::Added => return Ok(attempts - 1),
            AddNoteOutcome::Transient(reason) => {
                if !policy.allows(attempts) {
                    return Err(DeckError::RetriesExhausted {
                        stage: "upload",
                        attempts,
                        reason,
                    });
                }
                tracing::debug!(
                    "Transient upload failure for '{}' (attempt {}): {}",
                    note.deck_name,
                    attempts,
                    reason
                );
                policy.wait().await;
            }
            AddNoteOutcome::Rejected(reason) => {
                let dump = serde_json::to_string_pretty(note)?;
                tracing::error!("Upload failed: {}\nNote:\n{}", reason, dump);
                return Err(DeckError::NoteRejected {
                    deck: note.deck_name.clone(),
                    reason,
                    note: dump,
                });
            }
        }
    }
}

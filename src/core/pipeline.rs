use crate::core::extract::Extractor;
use crate::core::retry::RetryPolicy;
use crate::core::stages::{self, SharedReceiver, StageReport};
use crate::domain::model::{CardModel, Task, TaskSpec};
use crate::domain::ports::{Fetcher, NoteStore};
use crate::utils::error::{DeckError, Result};
use crate::utils::monitor::SystemMonitor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

/// 佇列容量、worker 數量與重試策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub fetch_workers: usize,
    pub extract_workers: usize,
    pub source_queue: usize,
    pub extract_queue: usize,
    pub upload_queue: usize,
    pub fetch_retry: RetryPolicy,
    pub upload_retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fetch_workers: 5,
            extract_workers: 10,
            source_queue: 1000,
            extract_queue: 100,
            upload_queue: 100,
            fetch_retry: RetryPolicy::fixed(Duration::from_millis(500)),
            upload_retry: RetryPolicy::fixed(Duration::from_millis(100)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub tasks: usize,
    pub fetched: usize,
    pub failed: usize,
    pub cards: usize,
    pub notes: usize,
    pub fetch_retries: usize,
    pub upload_retries: usize,
    pub elapsed: Duration,
}

impl PipelineReport {
    fn absorb(&mut self, stage: &StageReport) {
        match stage.stage {
            "source" => self.tasks += stage.processed,
            "fetch" => {
                self.fetched += stage.processed - stage.failed;
                self.fetch_retries += stage.retries;
            }
            "extract" => self.cards += stage.cards,
            "upload" => {
                self.failed += stage.failed;
                self.notes += stage.cards;
                self.upload_retries += stage.retries;
            }
            _ => {}
        }
    }
}

/// 擁有所有佇列與 stage 的執行個體
pub struct Pipeline {
    stages: JoinSet<Result<StageReport>>,
    started: Instant,
    monitor: Option<Arc<SystemMonitor>>,
}

impl Pipeline {
    /// 建立佇列並啟動每個 stage 一次；必須在 tokio runtime 內呼叫
    pub fn spawn(
        specs: Vec<TaskSpec>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<Extractor>,
        store: Arc<dyn NoteStore>,
        model: CardModel,
        settings: &PipelineSettings,
    ) -> Self {
        let (source_tx, source_rx) = mpsc::channel::<Task>(settings.source_queue.max(1));
        let (extract_tx, extract_rx) = mpsc::channel::<Task>(settings.extract_queue.max(1));
        let (upload_tx, upload_rx) = mpsc::channel::<Task>(settings.upload_queue.max(1));

        let mut stages = JoinSet::new();
        stages.spawn(stages::run_source(specs, source_tx));

        let fetch_input: SharedReceiver<Task> = Arc::new(Mutex::new(source_rx));
        for worker in 0..settings.fetch_workers.max(1) {
            stages.spawn(stages::run_fetcher(
                worker,
                Arc::clone(&fetcher),
                settings.fetch_retry,
                Arc::clone(&fetch_input),
                extract_tx.clone(),
            ));
        }
        drop(extract_tx);

        let extract_input: SharedReceiver<Task> = Arc::new(Mutex::new(extract_rx));
        for worker in 0..settings.extract_workers.max(1) {
            stages.spawn(stages::run_extractor(
                worker,
                Arc::clone(&extractor),
                Arc::clone(&extract_input),
                upload_tx.clone(),
            ));
        }
        drop(upload_tx);

        stages.spawn(stages::run_uploader(
            store,
            model,
            settings.upload_retry,
            upload_rx,
        ));

        tracing::info!(
            "Pipeline started with {} fetch and {} extract workers",
            settings.fetch_workers.max(1),
            settings.extract_workers.max(1)
        );

        Self {
            stages,
            started: Instant::now(),
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<SystemMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// 等所有 stage 結束；任一 stage 失敗時中止其餘 stage 並回傳該錯誤
    pub async fn join(mut self) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();

        while let Some(joined) = self.stages.join_next().await {
            match joined.map_err(DeckError::from).and_then(|outcome| outcome) {
                Ok(stage) => {
                    report.absorb(&stage);
                    if let Some(monitor) = &self.monitor {
                        monitor.log_stage(&stage);
                    }
                }
                Err(e) => {
                    tracing::error!("Pipeline stopped: {}", e);
                    self.abort();
                    while self.stages.join_next().await.is_some() {}
                    return Err(e);
                }
            }
        }

        report.elapsed = self.started.elapsed();
        tracing::info!(
            "Pipeline finished in {:?}: {} tasks, {} failed, {} cards extracted, {} notes uploaded",
            report.elapsed,
            report.tasks,
            report.failed,
            report.cards,
            report.notes
        );
        if let Some(monitor) = &self.monitor {
            monitor.log_run(&report);
        }
        Ok(report)
    }

    /// 取消所有 stage，進行中的任務直接丟棄
    pub fn abort(&mut self) {
        self.stages.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{DeckName, Note};
    use crate::domain::ports::{AddNoteOutcome, FetchOutcome};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const PAGE: &str = r#"<body><section class="Documentation-constants">
<div class="Documentation-declaration"><pre>const <span id="Max" data-kind="constant">Max</span> = 1</pre></div>
</section></body>"#;

    /// 收到通知前所有下載都卡住
    struct GatedFetcher {
        gate: Notify,
        started: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for GatedFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchOutcome> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            if url.ends_with("/missing") {
                return Ok(FetchOutcome::Rejected { status: 404 });
            }
            Ok(FetchOutcome::Document(PAGE.to_string()))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        notes: std::sync::Mutex<Vec<Note>>,
    }

    #[async_trait]
    impl NoteStore for MemoryStore {
        async fn deck_names(&self) -> Result<HashSet<String>> {
            Ok(HashSet::new())
        }

        async fn create_deck(&self, _name: &str) -> Result<()> {
            Ok(())
        }

        async fn add_note(&self, note: &Note) -> AddNoteOutcome {
            self.notes.lock().unwrap().push(note.clone());
            AddNoteOutcome::Added
        }
    }

    fn specs(urls: &[&str]) -> Vec<TaskSpec> {
        urls.iter()
            .enumerate()
            .map(|(i, url)| TaskSpec {
                deck: DeckName::parse("Go::std::math").unwrap(),
                url: url.to_string(),
                line_number: i + 1,
            })
            .collect()
    }

    fn small_settings() -> PipelineSettings {
        PipelineSettings {
            fetch_workers: 2,
            extract_workers: 2,
            source_queue: 1,
            extract_queue: 1,
            upload_queue: 1,
            ..PipelineSettings::default()
        }
    }

    #[tokio::test]
    async fn test_stalled_fetchers_lose_no_tasks() {
        let fetcher = Arc::new(GatedFetcher {
            gate: Notify::new(),
            started: AtomicUsize::new(0),
        });
        let store = Arc::new(MemoryStore::default());
        let urls: Vec<String> = (0..12).map(|i| format!("https://pkg.go.dev/math/{}", i)).collect();
        let urls: Vec<&str> = urls.iter().map(String::as_str).collect();

        let pipeline = Pipeline::spawn(
            specs(&urls),
            fetcher.clone(),
            Arc::new(Extractor::new().unwrap()),
            store.clone(),
            CardModel::default(),
            &small_settings(),
        );

        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        // 只有兩個 worker 在等，來源被一格的佇列擋住
        assert_eq!(fetcher.started.load(Ordering::SeqCst), 2);
        assert!(store.notes.lock().unwrap().is_empty());

        let opener = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move {
                loop {
                    fetcher.gate.notify_waiters();
                    tokio::task::yield_now().await;
                }
            })
        };

        let report = pipeline.join().await.unwrap();
        opener.abort();

        assert_eq!(report.tasks, 12);
        assert_eq!(report.fetched, 12);
        assert_eq!(report.failed, 0);
        assert_eq!(report.cards, 12);
        assert_eq!(report.notes, 12);

        let notes = store.notes.lock().unwrap();
        assert_eq!(notes.len(), 12);
        assert!(notes[0].fields["Identifier"].contains("math.Max"));
    }

    #[tokio::test]
    async fn test_fatal_stage_error_aborts_run() {
        let fetcher = Arc::new(GatedFetcher {
            gate: Notify::new(),
            started: AtomicUsize::new(0),
        });
        fetcher.gate.notify_one();
        let store = Arc::new(MemoryStore::default());

        let pipeline = Pipeline::spawn(
            specs(&["https://pkg.go.dev/missing"]),
            fetcher,
            Arc::new(Extractor::new().unwrap()),
            store.clone(),
            CardModel::default(),
            &small_settings(),
        );

        let err = pipeline.join().await.unwrap_err();
        assert!(matches!(err, DeckError::UnexpectedStatus { status: 404, .. }));
        assert!(store.notes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_monitored_run_reports_the_same_totals() {
        let fetcher = Arc::new(GatedFetcher {
            gate: Notify::new(),
            started: AtomicUsize::new(0),
        });
        fetcher.gate.notify_one();
        let store = Arc::new(MemoryStore::default());

        let report = Pipeline::spawn(
            specs(&["https://pkg.go.dev/math"]),
            fetcher,
            Arc::new(Extractor::new().unwrap()),
            store.clone(),
            CardModel::default(),
            &small_settings(),
        )
        .with_monitor(Arc::new(SystemMonitor::new(true)))
        .join()
        .await
        .unwrap();

        assert_eq!(report.tasks, 1);
        assert_eq!(report.notes, 1);
        assert_eq!(store.notes.lock().unwrap().len(), 1);
    }
}

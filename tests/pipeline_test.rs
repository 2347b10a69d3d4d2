use anyhow::Result;
use docdeck::adapters::task_file::{load_task_list, parse_task_list};
use docdeck::domain::model::{CardModel, Category, DeckName};
use docdeck::{AnkiConnect, DeckError, Extractor, HttpFetcher, Pipeline, PipelineSettings};
use httpmock::prelude::*;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

const IO_PAGE: &str = include_str!("fixtures/io.html");

fn anki_server() -> MockServer {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).body_contains(r#""action":"version""#);
        then.status(200).json_body(json!({ "result": 6, "error": null }));
    });
    server.mock(|when, then| {
        when.method(POST).body_contains(r#""action":"deckNames""#);
        then.status(200)
            .json_body(json!({ "result": ["Default"], "error": null }));
    });
    server
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        fetch_workers: 2,
        extract_workers: 2,
        source_queue: 2,
        extract_queue: 1,
        upload_queue: 1,
        ..PipelineSettings::default()
    }
}

fn fetcher() -> Arc<HttpFetcher> {
    Arc::new(HttpFetcher::new(Duration::from_secs(5), "docdeck-tests").unwrap())
}

#[test]
fn test_extract_realistic_page() -> Result<()> {
    let deck = DeckName::parse("Go::std::io")?;
    let cards = Extractor::new()?.extract(IO_PAGE, "https://pkg.go.dev/io", &deck)?;

    let categories: Vec<Category> = cards.iter().map(|card| card.category()).collect();
    assert_eq!(
        categories,
        vec![
            Category::Variable,
            Category::Constant,
            Category::Function,
            Category::Type
        ]
    );

    let eof = &cards[0];
    assert!(eof.front().contains(">io.EOF</span>"));
    assert!(eof.front().contains(r#"href="https://pkg.go.dev/errors#New""#));
    assert!(eof.front().contains("graceful end of input"));

    let constants = &cards[1];
    assert!(constants.front().contains(">io.SeekStart</span>"));
    assert!(constants.front().contains(">io.SeekCurrent</span>"));
    assert!(constants.front().contains("Seek whence values."));

    let copy = &cards[2];
    assert!(copy.front().contains(">io.Copy</a>"));
    assert!(!copy.front().contains("until either EOF"));
    assert!(copy.back().contains("until either EOF"));
    assert!(copy.back().contains(r#"href="https://pkg.go.dev/io#Writer""#));

    let reader = &cards[3];
    assert!(reader.front().contains(">io.Reader</a>"));
    assert!(!reader.front().contains("<title>"));
    Ok(())
}

#[tokio::test]
async fn test_end_to_end_upload_to_anki() -> Result<()> {
    let docs = MockServer::start();
    let page = docs.mock(|when, then| {
        when.method(GET).path_contains("/io");
        then.status(200)
            .header("Content-Type", "text/html")
            .body(IO_PAGE);
    });

    let anki = anki_server();
    let create = anki.mock(|when, then| {
        when.method(POST)
            .body_contains(r#""action":"createDeck""#)
            .body_contains(r#""deck":"Go::std::io""#);
        then.status(200)
            .json_body(json!({ "result": 1519323742721u64, "error": null }));
    });
    let add = anki.mock(|when, then| {
        when.method(POST)
            .body_contains(r#""action":"addNote""#)
            .body_contains(r#""modelName":"Golang""#);
        then.status(200)
            .json_body(json!({ "result": 1496198395707u64, "error": null }));
    });

    let mut task_file = NamedTempFile::new()?;
    writeln!(task_file, "# io and a mirror of it")?;
    writeln!(task_file, "Go::std::io {}", docs.url("/io"))?;
    writeln!(task_file)?;
    writeln!(task_file, "Go::std::io {}", docs.url("/mirror/io"))?;
    let specs = load_task_list(task_file.path()).await?;
    assert_eq!(specs.len(), 2);

    let store = AnkiConnect::new(&anki.base_url(), Duration::from_secs(5))?;
    assert_eq!(store.ping().await?, 6);

    let report = Pipeline::spawn(
        specs,
        fetcher(),
        Arc::new(Extractor::new()?),
        Arc::new(store),
        CardModel::default(),
        &settings(),
    )
    .join()
    .await?;

    page.assert_hits(2);
    create.assert_hits(1);
    add.assert_hits(8);
    assert_eq!(report.tasks, 2);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.cards, 8);
    assert_eq!(report.notes, 8);
    assert_eq!(report.failed, 0);
    Ok(())
}

#[tokio::test]
async fn test_layout_change_stops_the_run() {
    let docs = MockServer::start();
    docs.mock(|when, then| {
        when.method(GET).path("/broken");
        then.status(200).body(
            r#"<body><div class="Documentation-type"><pre>type T int</pre></div></body>"#,
        );
    });
    let anki = anki_server();
    let add = anki.mock(|when, then| {
        when.method(POST).body_contains(r#""action":"addNote""#);
        then.status(200).json_body(json!({ "result": 1, "error": null }));
    });

    let specs = parse_task_list(&format!("Go::std::broken {}", docs.url("/broken"))).unwrap();
    let result = Pipeline::spawn(
        specs,
        fetcher(),
        Arc::new(Extractor::new().unwrap()),
        Arc::new(AnkiConnect::new(&anki.base_url(), Duration::from_secs(5)).unwrap()),
        CardModel::default(),
        &settings(),
    )
    .join()
    .await;

    match result {
        Err(DeckError::StructureMismatch {
            category,
            containers,
            headers,
            ..
        }) => {
            assert_eq!(category, Category::Type);
            assert_eq!(containers, 1);
            assert_eq!(headers, 0);
        }
        other => panic!("unexpected result {:?}", other.map(|report| report.notes)),
    }
    add.assert_hits(0);
}

#[tokio::test]
async fn test_missing_page_is_fatal() {
    let docs = MockServer::start();
    docs.mock(|when, then| {
        when.method(GET).path("/missing");
        then.status(404);
    });
    let anki = anki_server();

    let specs = parse_task_list(&format!("Go::std::missing {}", docs.url("/missing"))).unwrap();
    let err = Pipeline::spawn(
        specs,
        fetcher(),
        Arc::new(Extractor::new().unwrap()),
        Arc::new(AnkiConnect::new(&anki.base_url(), Duration::from_secs(5)).unwrap()),
        CardModel::default(),
        &settings(),
    )
    .join()
    .await
    .unwrap_err();

    assert!(matches!(err, DeckError::UnexpectedStatus { status: 404, .. }));
    assert_eq!(err.severity(), docdeck::utils::error::ErrorSeverity::Medium);
}

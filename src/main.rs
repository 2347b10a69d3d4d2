use clap::Parser;
use docdeck::adapters::task_file::load_task_list;
use docdeck::utils::error::{ErrorSeverity, Result};
use docdeck::utils::monitor::SystemMonitor;
use docdeck::utils::{logger, validation::Validate};
use docdeck::{AnkiConnect, CliConfig, Extractor, HttpFetcher, Pipeline};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose, cli.log_json);

    tracing::info!("Starting docdeck");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = run(&cli).await {
        tracing::error!(
            "❌ docdeck failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn run(cli: &CliConfig) -> Result<()> {
    cli.validate()?;
    let config = cli.resolve()?;

    let specs = load_task_list(cli.task_file(&config)?).await?;
    let extractor = Arc::new(Extractor::from_settings(&config.extract.selectors)?);

    if cli.dry_run {
        tracing::info!("Dry run: {} tasks and configuration are valid", specs.len());
        println!("✅ {} tasks ready, nothing uploaded (dry run)", specs.len());
        return Ok(());
    }

    let anki = AnkiConnect::new(&config.upload.endpoint, config.upload_timeout())?;
    anki.ping().await?;
    let fetcher = HttpFetcher::new(config.fetch_timeout(), &config.fetch.user_agent)?;

    let monitor = Arc::new(SystemMonitor::new(config.monitoring.enabled));
    if monitor.is_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let report = Pipeline::spawn(
        specs,
        Arc::new(fetcher),
        extractor,
        Arc::new(anki),
        config.upload.model.clone(),
        &config.pipeline_settings(),
    )
    .with_monitor(monitor)
    .join()
    .await?;

    println!(
        "✅ {} tasks processed, {} notes added to Anki ({} failed) in {:?}",
        report.tasks, report.notes, report.failed, report.elapsed
    );
    Ok(())
}

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use watch_page::renderers::WebDriverFactory;
use watch_page::sink::JsonFileSink;
use watch_page::{Annotator, MonitorConfig, Pipeline, Supervisor};

mod args;
use args::{Args, Command};

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Args::parse();

    let result = match args.command {
        Command::Watch {
            url,
            interval,
            config,
            results_dir,
        } => watch(url, interval, config.as_deref(), results_dir).await,
        Command::Extract { file, config } => extract(&file, config.as_deref()),
        Command::Diff {
            old,
            new,
            annotate,
            config,
        } => diff(&old, &new, annotate, config.as_deref()).await,
    };

    if let Err(e) = result {
        ::log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Configuration from a file or defaults, with environment overrides applied
fn load_config(url: &str, path: Option<&Path>) -> watch_page::Result<MonitorConfig> {
    let mut config = match path {
        Some(path) => MonitorConfig::from_file(path)?,
        None => MonitorConfig::new(url),
    };
    if !url.is_empty() {
        config.url = url.to_string();
    }
    Ok(config.with_env_overrides())
}

async fn watch(
    url: String,
    interval: Option<u64>,
    config_path: Option<&Path>,
    results_dir: PathBuf,
) -> watch_page::Result<()> {
    let mut config = load_config(&url, config_path)?;
    if let Some(minutes) = interval {
        config.check_interval_minutes = minutes;
    }

    println!("Note: Watching requires a WebDriver server (e.g., ChromeDriver).");
    println!(
        "Set WEBDRIVER_URL environment variable if not using the default http://localhost:4444"
    );
    if config.active_analysis().is_none() {
        ::log::info!("No analysis key configured; changes will not be annotated");
    }

    let factory = Arc::new(WebDriverFactory::from_config(&config));
    let supervisor = Supervisor::new(factory).with_sink(Arc::new(JsonFileSink::new(&results_dir)));

    let job_id = supervisor.create(config).await?;
    supervisor.start(&job_id).await?;
    ::log::info!(
        "Watching {} as job {}, results in {}",
        url,
        job_id,
        results_dir.display()
    );

    tokio::signal::ctrl_c().await?;
    ::log::info!("Interrupted, stopping job {}", job_id);

    let status = supervisor.status(&job_id).await?;
    supervisor.shutdown().await;
    ::log::info!(
        "Watch complete - {} checks, {} changes detected",
        status.total_checks,
        status.changes_detected
    );
    Ok(())
}

fn extract(file: &Path, config_path: Option<&Path>) -> watch_page::Result<()> {
    let config = load_config("", config_path)?;
    let html = std::fs::read_to_string(file)?;
    let snapshot = Pipeline::from_config(&config)?.extract(&html)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn diff(
    old: &Path,
    new: &Path,
    annotate: bool,
    config_path: Option<&Path>,
) -> watch_page::Result<()> {
    let config = load_config("", config_path)?;
    let pipeline = Pipeline::from_config(&config)?;

    let old_snapshot = pipeline.extract(&std::fs::read_to_string(old)?)?;
    let new_snapshot = pipeline.extract(&std::fs::read_to_string(new)?)?;
    let mut changes = pipeline.diff(&old_snapshot, &new_snapshot);
    ::log::info!("Found {} changes", changes.len());

    if annotate {
        match config.active_analysis().and_then(Annotator::from_config) {
            Some(annotator) => annotator.annotate_all(&mut changes).await,
            None => ::log::warn!("Annotation requested but no API_KEY or OPENROUTER_API_KEY set"),
        }
    }

    println!("{}", serde_json::to_string_pretty(&changes)?);
    Ok(())
}

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod chromedriver_manager;
mod config;
mod error;
mod export;
mod models;
mod scraper;
mod session;

use chromedriver_manager::ChromeDriverManager;
use config::{Credentials, ScraperConfig};
use error::{Result, ScrapeError};
use export::csv::CsvExporter;
use export::json::JsonExporter;
use export::Exporter;
use scraper::ScraperEngine;

#[derive(Parser)]
#[command(name = "catalog_scraper")]
#[command(about = "Product catalog table scraper with session reuse")]
#[command(version)]
struct Cli {
    /// App base URL
    #[arg(long, default_value = "https://hiring.idenhq.com/")]
    base_url: String,

    /// Output JSON file
    #[arg(long, default_value = "products.json")]
    output: PathBuf,

    /// Additional CSV export path
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Session file (defaults to the platform config directory)
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Ignore any saved session and log in fresh
    #[arg(long)]
    fresh_login: bool,

    /// Run the browser with a visible window
    #[arg(long)]
    headed: bool,

    /// Menu labels from the root to the table view, in click order
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "Data Tools,Inventory Management,Product Catalog"
    )]
    menu_path: Vec<String>,

    /// Entry button clicked when present
    #[arg(long, default_value = "Launch Challenge")]
    launch_label: String,

    /// Button that loads the table data after the menu path
    #[arg(long, default_value = "Load Product Data")]
    load_label: String,

    /// CSS selector for one table row
    #[arg(long, default_value = "table tbody tr")]
    row_selector: String,

    /// Unique column used for deduplication instead of all cell values
    #[arg(long)]
    key_column: Option<String>,

    /// Element wait timeout in seconds
    #[arg(long, default_value_t = 30)]
    wait_timeout: u64,

    /// Row-set change timeout after a page advance, in seconds
    #[arg(long, default_value_t = 10)]
    advance_timeout: u64,

    /// Consecutive empty extraction passes before convergence
    #[arg(long, default_value_t = 2)]
    stable_passes: u32,

    /// Hard cap on extraction passes
    #[arg(long, default_value_t = 500)]
    max_passes: u32,

    /// Port for the managed chromedriver
    #[arg(long, default_value_t = 9516)]
    driver_port: u16,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let credentials = Credentials::from_env()?;

    let session_file = match cli.session_file {
        Some(path) => path,
        None => ScraperConfig::default_session_path()?,
    };

    let config = ScraperConfig {
        base_url: cli.base_url.trim_end_matches('/').to_string(),
        credentials,
        headless: !cli.headed,
        session_file,
        output_file: cli.output,
        csv_file: cli.csv,
        fresh_login: cli.fresh_login,
        launch_label: Some(cli.launch_label),
        menu_path: cli.menu_path,
        load_label: Some(cli.load_label),
        row_selector: cli.row_selector,
        key_column: cli.key_column,
        wait_timeout_secs: cli.wait_timeout,
        advance_timeout_secs: cli.advance_timeout,
        stable_passes: cli.stable_passes,
        max_passes: cli.max_passes,
        driver_port: cli.driver_port,
    };

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ScrapeError::Config(errors.join("; ")));
    }

    let output_file = config.output_file.clone();
    let csv_file = config.csv_file.clone();

    let driver_manager = Arc::new(ChromeDriverManager::new());
    let mut engine = ScraperEngine::new(config, driver_manager).await?;

    // Release the browser on every exit path, then surface the run result.
    let outcome = engine.run().await;
    if let Err(e) = engine.close().await {
        warn!("browser shutdown: {}", e);
    }
    let collection = outcome?;

    JsonExporter::new().export(&collection, &output_file)?;
    info!(
        "exported {} records to {:?}",
        collection.len(),
        output_file
    );

    if let Some(path) = &csv_file {
        CsvExporter::new().export(&collection, path)?;
        info!("exported csv copy to {:?}", path);
    }

    if engine.skipped_rows() > 0 {
        warn!("{} malformed rows were skipped during collection", engine.skipped_rows());
    }

    Ok(())
}

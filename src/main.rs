use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, LevelFilter};

use catalog_scraper_lib::{
    logger, BrowserSession, ConfigFile, CrawlConfig, DelayRange, MergeConfig, ResumeMerger,
    TableCrawler,
};

#[derive(Debug, Parser)]
#[command(
    name = "catalog-scraper",
    version,
    about = "Crawl a paginated catalog results table, then merge rows per person"
)]
struct Cli {
    /// JSON file with `crawl` and/or `merge` sections; flags override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch every results page and write the raw table.
    Crawl(CrawlArgs),
    /// Group the raw table by person and write one merged row each.
    Merge(MergeArgs),
}

#[derive(Debug, Args)]
struct CrawlArgs {
    /// Page address; `{page}` is replaced by the page number, otherwise it is appended.
    #[arg(long)]
    url: Option<String>,

    /// Number of pages to visit.
    #[arg(long)]
    pages: Option<u32>,

    #[arg(long)]
    start_page: Option<u32>,

    /// Output CSV path.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Element id that marks a fully rendered page.
    #[arg(long)]
    marker: Option<String>,

    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(long)]
    min_delay: Option<f64>,

    #[arg(long)]
    max_delay: Option<f64>,

    /// Extra attempts for a failed page.
    #[arg(long)]
    retries: Option<u32>,

    #[arg(long)]
    user_agent: Option<String>,

    /// Show the browser window.
    #[arg(long)]
    headful: bool,
}

#[derive(Debug, Args)]
struct MergeArgs {
    /// Crawl output to read.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Merged CSV path.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    identity_column: Option<String>,

    #[arg(long)]
    merged_column: Option<String>,

    #[arg(long)]
    separator: Option<String>,
}

fn crawl_config(base: CrawlConfig, args: CrawlArgs) -> Result<CrawlConfig> {
    let mut config = base;
    if let Some(url) = args.url {
        config.url_template = url;
    }
    if let Some(pages) = args.pages {
        config.page_count = pages;
    }
    if let Some(start) = args.start_page {
        config.start_page = start;
    }
    if let Some(output) = args.output {
        config.output_path = output;
    }
    if let Some(marker) = args.marker {
        config.marker_id = marker;
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout_secs = secs;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if let Some(ua) = args.user_agent {
        config.user_agent = ua;
    }
    if args.headful {
        config.headless = false;
    }
    if args.min_delay.is_some() || args.max_delay.is_some() {
        config.delay = DelayRange::new(
            args.min_delay.unwrap_or(config.delay.min_secs),
            args.max_delay.unwrap_or(config.delay.max_secs),
        )
        .map_err(|e| anyhow!(e))?;
    }

    if config.url_template.trim().is_empty() {
        anyhow::bail!("no url template given; pass --url or set crawl.url_template in --config");
    }
    Ok(config)
}

fn merge_config(base: MergeConfig, args: MergeArgs) -> MergeConfig {
    let mut config = base;
    if let Some(input) = args.input {
        config.input_path = input;
    }
    if let Some(output) = args.output {
        config.output_path = output;
    }
    if let Some(column) = args.identity_column {
        config.identity_column = column;
    }
    if let Some(column) = args.merged_column {
        config.merged_column = column;
    }
    if let Some(separator) = args.separator {
        config.separator = separator;
    }
    config
}

fn run_crawl(config: &CrawlConfig) -> Result<()> {
    info!(
        "Starting crawl of {} pages from {}",
        config.page_count, config.url_template
    );

    // Dropping the session on any return path kills the browser.
    let session = BrowserSession::launch(config).context("could not start the browser")?;
    let crawler = TableCrawler::new(&session, config).map_err(|e| anyhow!(e))?;
    let (table, report) = crawler.crawl_from(config.start_page, config.page_count);
    drop(crawler);
    session.close();

    let failed = report.failed_pages();
    if !failed.is_empty() {
        info!("Pages skipped: {:?}", failed);
    }
    table
        .write_csv(&config.output_path)
        .with_context(|| format!("failed to save {}", config.output_path.display()))?;
    info!(
        "Crawl completed: {} rows saved to {:?}.",
        report.rows, config.output_path
    );
    Ok(())
}

fn run_merge(config: MergeConfig) -> Result<()> {
    let merger = ResumeMerger::new(config);
    let (merged, report) = merger.run().with_context(|| {
        format!(
            "merge of {} failed",
            merger.config().input_path.display()
        )
    })?;

    info!("--- Merged preview (first 5) ---");
    for record in merged.records.iter().take(5) {
        info!("{}: {:?}", record.identity, record.merged);
    }
    info!(
        "Merged {} input rows into {} records ({} dropped for empty identity).",
        report.input_rows, report.records, report.dropped_rows
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });

    let file = match cli.config.as_deref().map(ConfigFile::load).transpose() {
        Ok(file) => file.unwrap_or_default(),
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(1);
        }
    };

    let result = match cli.command {
        Commands::Crawl(args) => crawl_config(file.crawl, args).and_then(|c| run_crawl(&c)),
        Commands::Merge(args) => run_merge(merge_config(file.merge, args)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

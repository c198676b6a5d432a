pub mod config;
pub mod crawler;
pub mod delay_manager;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod input_loader;
pub mod logger;
pub mod merger;
pub mod table;

// Exporting types for convenience
pub use config::{ComponentField, ConfigFile, CrawlConfig, DelayRange, MergeConfig};
pub use crawler::{CrawlReport, PageOutcome, TableCrawler};
pub use error::{CrawlError, FetchError, MergeError};
pub use extractor::Extractor;
pub use fetcher::{BrowserSession, PageFetcher};
pub use merger::{MergeRecord, MergeReport, MergedRecord, MergedRecordSet, ResumeMerger};
pub use table::{Columns, Header, RawTable, Row};

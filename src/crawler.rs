use log::{debug, info, warn};

use crate::config::{CrawlConfig, DelayRange};
use crate::delay_manager;
use crate::error::FetchError;
use crate::extractor::Extractor;
use crate::fetcher::PageFetcher;
use crate::table::{Header, RawTable, Row};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Rows(usize),
    Failed(String),
    NoTable,
}

#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    pub pages: Vec<(u32, PageOutcome)>,
    pub rows: usize,
    pub header_applied: bool,
}

impl CrawlReport {
    pub fn failed_pages(&self) -> Vec<u32> {
        self.pages
            .iter()
            .filter(|(_, outcome)| !matches!(outcome, PageOutcome::Rows(_)))
            .map(|(page, _)| *page)
            .collect()
    }
}

/// Walks result pages one at a time and accumulates their table rows.
pub struct TableCrawler<'a, F: PageFetcher> {
    fetcher: &'a F,
    extractor: Extractor,
    delay: DelayRange,
    retries: u32,
}

impl<'a, F: PageFetcher> TableCrawler<'a, F> {
    pub fn new(fetcher: &'a F, config: &CrawlConfig) -> Result<Self, String> {
        Ok(TableCrawler {
            fetcher,
            extractor: Extractor::new(&config.marker_id)?,
            delay: config.delay,
            retries: config.retries,
        })
    }

    /// Pages `1..=page_count`.
    pub fn crawl(&self, page_count: u32) -> (RawTable, CrawlReport) {
        self.crawl_from(1, page_count)
    }

    pub fn crawl_from(&self, first_page: u32, page_count: u32) -> (RawTable, CrawlReport) {
        let mut report = CrawlReport::default();
        let mut header = Header::default();
        let mut header_attempted = false;
        let mut rows: Vec<Row> = Vec::new();

        let last_page = match page_count.checked_sub(1).map(|n| first_page.checked_add(n)) {
            Some(Some(last)) => last,
            Some(None) => u32::MAX,
            None => {
                info!("Page count is 0; nothing to crawl.");
                return (RawTable::assemble(header, rows), report);
            }
        };

        for page in first_page..=last_page {
            info!("Processing page {} / {}", page, last_page);

            let outcome = match self.fetch_with_retries(page) {
                Err(e) => {
                    warn!("Skipping page {} ({}): {}", page, e.kind(), e);
                    PageOutcome::Failed(e.to_string())
                }
                Ok(html) => match self.extractor.extract(&html) {
                    None => {
                        warn!("Page {} rendered but has no results table; skipping.", page);
                        PageOutcome::NoTable
                    }
                    Some(page_table) => {
                        if !header_attempted {
                            header_attempted = true;
                            if page_table.header.is_empty() {
                                warn!("Page {} has no header row; columns will be positional.", page);
                            } else {
                                debug!("Header captured from page {}: {:?}", page, page_table.header.names());
                                header = page_table.header;
                            }
                        }
                        let count = page_table.rows.len();
                        rows.extend(page_table.rows);
                        info!("Page {}: {} rows (total {}).", page, count, rows.len());
                        PageOutcome::Rows(count)
                    }
                },
            };
            report.pages.push((page, outcome));

            if page < last_page {
                delay_manager::random_page_delay(self.delay);
            }
        }

        let table = RawTable::assemble(header, rows);
        report.rows = table.len();
        report.header_applied = table.columns().is_named();
        info!(
            "Crawl finished: {} rows from {} pages ({} skipped).",
            report.rows,
            report.pages.len(),
            report.failed_pages().len()
        );
        (table, report)
    }

    fn fetch_with_retries(&self, page: u32) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetcher.fetch(page) {
                Ok(html) => return Ok(html),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!("Page {} failed: {}; retrying ({}/{}).", page, e, attempt, self.retries);
                    delay_manager::retry_delay(self.delay, attempt + 1);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::table::Columns;

    struct FakeFetcher {
        pages: HashMap<u32, Result<String, ()>>,
        visited: RefCell<Vec<u32>>,
    }

    impl FakeFetcher {
        fn new(pages: Vec<(u32, Result<&str, ()>)>) -> Self {
            FakeFetcher {
                pages: pages
                    .into_iter()
                    .map(|(i, p)| (i, p.map(str::to_string)))
                    .collect(),
                visited: RefCell::new(Vec::new()),
            }
        }
    }

    impl PageFetcher for FakeFetcher {
        fn fetch(&self, page_index: u32) -> Result<String, FetchError> {
            self.visited.borrow_mut().push(page_index);
            match self.pages.get(&page_index) {
                Some(Ok(html)) => Ok(html.clone()),
                _ => Err(FetchError::Timeout {
                    page: page_index,
                    waited: Duration::from_secs(20),
                }),
            }
        }
    }

    fn config() -> CrawlConfig {
        CrawlConfig {
            delay: DelayRange::NONE,
            ..CrawlConfig::default()
        }
    }

    const PAGE_A: &str = r#"<table id="searchresult_tb">
        <thead><tr><th>Name</th><th>Date</th></tr></thead>
        <tbody><tr><td>a</td><td>1</td></tr><tr><td>b</td><td>2</td></tr></tbody></table>"#;
    const PAGE_B: &str = r#"<table id="searchresult_tb">
        <thead><tr><th>Other</th><th>Header</th></tr></thead>
        <tbody><tr><td>c</td><td>3</td></tr></tbody></table>"#;

    #[test]
    fn visits_each_page_once_in_order() {
        let fetcher = FakeFetcher::new(vec![(1, Ok(PAGE_A)), (2, Err(())), (3, Ok(PAGE_B))]);
        let crawler = TableCrawler::new(&fetcher, &config()).unwrap();

        let (table, report) = crawler.crawl(3);

        assert_eq!(*fetcher.visited.borrow(), vec![1, 2, 3]);
        assert_eq!(table.len(), 3);
        assert_eq!(report.failed_pages(), vec![2]);
        // Header comes from page 1 only.
        assert_eq!(table.columns().labels(), vec!["Name", "Date"]);
        assert!(report.header_applied);
    }

    #[test]
    fn header_comes_from_first_successful_page() {
        let fetcher = FakeFetcher::new(vec![(2, Ok(PAGE_B)), (3, Ok(PAGE_A))]);
        let crawler = TableCrawler::new(&fetcher, &config()).unwrap();

        let (table, _) = crawler.crawl(3);
        assert_eq!(table.columns().labels(), vec!["Other", "Header"]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn page_without_table_contributes_nothing() {
        let fetcher = FakeFetcher::new(vec![(1, Ok("<p>maintenance</p>")), (2, Ok(PAGE_B))]);
        let crawler = TableCrawler::new(&fetcher, &config()).unwrap();

        let (table, report) = crawler.crawl(2);
        assert_eq!(report.pages[0], (1, PageOutcome::NoTable));
        assert_eq!(table.len(), 1);
        assert_eq!(table.columns().labels(), vec!["Other", "Header"]);
    }

    #[test]
    fn ragged_rows_fall_back_to_positional() {
        let ragged = r#"<table id="searchresult_tb">
            <thead><tr><th>Name</th><th>Date</th></tr></thead>
            <tbody><tr><td>a</td><td>1</td><td>extra</td></tr></tbody></table>"#;
        let fetcher = FakeFetcher::new(vec![(1, Ok(PAGE_A)), (2, Ok(ragged))]);
        let crawler = TableCrawler::new(&fetcher, &config()).unwrap();

        let (table, report) = crawler.crawl(2);
        assert_eq!(table.columns(), &Columns::Positional { width: 3 });
        assert!(!report.header_applied);
    }

    #[test]
    fn zero_pages_is_an_empty_table() {
        let fetcher = FakeFetcher::new(Vec::new());
        let crawler = TableCrawler::new(&fetcher, &config()).unwrap();

        let (table, report) = crawler.crawl(0);
        assert!(fetcher.visited.borrow().is_empty());
        assert!(table.is_empty());
        assert!(report.pages.is_empty());
    }

    #[test]
    fn retries_are_bounded() {
        let fetcher = FakeFetcher::new(vec![(1, Err(()))]);
        let crawler = TableCrawler::new(
            &fetcher,
            &CrawlConfig {
                retries: 2,
                ..config()
            },
        )
        .unwrap();

        let (table, report) = crawler.crawl(1);
        assert_eq!(*fetcher.visited.borrow(), vec![1, 1, 1]);
        assert!(table.is_empty());
        assert!(matches!(report.pages[0].1, PageOutcome::Failed(_)));
    }
}

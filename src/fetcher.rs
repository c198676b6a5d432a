use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions, Tab};
use log::{debug, info, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::error::{CrawlError, FetchError};
use crate::extractor::marker_selector;

/// Source of fully rendered result pages.
pub trait PageFetcher {
    fn fetch(&self, page_index: u32) -> Result<String, FetchError>;
}

/// Substitutes `{page}` in the template, or appends the number when there is
/// no placeholder.
pub fn page_url(template: &str, page_index: u32) -> Result<Url, CrawlError> {
    let raw = if template.contains("{page}") {
        template.replace("{page}", &page_index.to_string())
    } else {
        format!("{template}{page_index}")
    };
    Url::parse(&raw).map_err(|source| CrawlError::InvalidUrl {
        template: template.to_string(),
        source,
    })
}

/// One browser process and one tab, held for the whole crawl. The process is
/// killed when the session is dropped, on every exit path.
pub struct BrowserSession {
    browser: Option<Browser>,
    tab: Arc<Tab>,
    url_template: String,
    marker_selector: String,
    timeout: Duration,
}

impl BrowserSession {
    pub fn launch(config: &CrawlConfig) -> Result<Self, CrawlError> {
        page_url(&config.url_template, config.start_page)?;
        let marker_selector = marker_selector(&config.marker_id).map_err(CrawlError::InvalidMarker)?;

        let args: Vec<OsString> = vec![
            OsString::from(format!("--user-agent={}", config.user_agent)),
            // Keep Chrome's own console output down to fatal errors.
            OsString::from("--log-level=3"),
            OsString::from("--disable-gpu"),
        ];
        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .args(args.iter().map(|a| a.as_os_str()).collect())
            .build()
            .map_err(|e| CrawlError::Launch(e.to_string()))?;

        let browser = Browser::new(options).map_err(|e| CrawlError::Launch(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| CrawlError::Launch(e.to_string()))?;
        info!("Browser session started (headless: {}).", config.headless);

        Ok(BrowserSession {
            browser: Some(browser),
            tab,
            url_template: config.url_template.clone(),
            marker_selector,
            timeout: config.timeout(),
        })
    }

    /// Shuts the browser down now instead of at drop.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(browser) = self.browser.take() {
            if let Err(e) = self.tab.close(false) {
                debug!("Closing tab failed: {}", e);
            }
            drop(browser);
            info!("Browser session closed.");
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// The tab operations one page load needs.
trait BrowserTab {
    fn navigate(&self, url: &str) -> anyhow::Result<()>;
    fn wait_navigated(&self) -> anyhow::Result<()>;
    fn wait_for(&self, selector: &str, timeout: Duration) -> anyhow::Result<()>;
    fn has(&self, selector: &str) -> bool;
    fn content(&self) -> anyhow::Result<String>;
}

impl BrowserTab for Tab {
    fn navigate(&self, url: &str) -> anyhow::Result<()> {
        self.navigate_to(url).map(|_| ())
    }

    fn wait_navigated(&self) -> anyhow::Result<()> {
        self.wait_until_navigated().map(|_| ())
    }

    fn wait_for(&self, selector: &str, timeout: Duration) -> anyhow::Result<()> {
        self.wait_for_element_with_custom_timeout(selector, timeout)
            .map(|_| ())
    }

    fn has(&self, selector: &str) -> bool {
        self.find_element(selector).is_ok()
    }

    fn content(&self) -> anyhow::Result<String> {
        self.get_content()
    }
}

/// Navigates, lets the navigation settle so the previous page's marker is
/// gone, then waits for this page's marker before reading the markup.
fn load_page<T: BrowserTab + ?Sized>(
    tab: &T,
    url: &Url,
    page_index: u32,
    selector: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    let unknown = |message: String| FetchError::Unknown {
        page: page_index,
        message,
    };

    tab.navigate(url.as_str())
        .map_err(|e| unknown(format!("navigation failed: {e}")))?;
    tab.wait_navigated()
        .map_err(|e| unknown(format!("navigation did not complete: {e}")))?;

    // The wait only gives up when the deadline passes.
    tab.wait_for(selector, timeout).map_err(|e| {
        debug!("Wait for {} failed: {}", selector, e);
        FetchError::Timeout {
            page: page_index,
            waited: timeout,
        }
    })?;

    if !tab.has(selector) {
        warn!(
            "Marker {} disappeared on page {} after rendering",
            selector, page_index
        );
        return Err(FetchError::ElementNotFound {
            page: page_index,
            marker: selector.to_string(),
        });
    }

    tab.content()
        .map_err(|e| unknown(format!("reading rendered markup failed: {e}")))
}

impl PageFetcher for BrowserSession {
    fn fetch(&self, page_index: u32) -> Result<String, FetchError> {
        let url = page_url(&self.url_template, page_index).map_err(|e| FetchError::Unknown {
            page: page_index,
            message: e.to_string(),
        })?;
        info!("Visiting: {}", url);

        load_page(
            self.tab.as_ref(),
            &url,
            page_index,
            &self.marker_selector,
            self.timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Records calls; serves `current` only once navigation has settled, and
    /// until then still shows the previous page.
    #[derive(Default)]
    struct FakeTab {
        calls: RefCell<Vec<String>>,
        settled: RefCell<bool>,
        fail_navigation_wait: bool,
        marker_missing_after_wait: bool,
    }

    impl BrowserTab for FakeTab {
        fn navigate(&self, url: &str) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(format!("navigate {url}"));
            *self.settled.borrow_mut() = false;
            Ok(())
        }

        fn wait_navigated(&self) -> anyhow::Result<()> {
            self.calls.borrow_mut().push("wait_navigated".to_string());
            if self.fail_navigation_wait {
                anyhow::bail!("navigation timed out");
            }
            *self.settled.borrow_mut() = true;
            Ok(())
        }

        fn wait_for(&self, selector: &str, _timeout: Duration) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(format!("wait_for {selector}"));
            Ok(())
        }

        fn has(&self, _selector: &str) -> bool {
            !self.marker_missing_after_wait
        }

        fn content(&self) -> anyhow::Result<String> {
            self.calls.borrow_mut().push("content".to_string());
            Ok(if *self.settled.borrow() {
                "current".to_string()
            } else {
                "previous".to_string()
            })
        }
    }

    fn url() -> Url {
        page_url("https://catalog.example.org/search?page={page}", 2).unwrap()
    }

    #[test]
    fn content_is_read_only_after_navigation_settles() {
        let tab = FakeTab::default();
        let html = load_page(&tab, &url(), 2, r#"[id="searchresult_tb"]"#, Duration::from_secs(20))
            .unwrap();

        assert_eq!(html, "current");
        assert_eq!(
            *tab.calls.borrow(),
            vec![
                "navigate https://catalog.example.org/search?page=2".to_string(),
                "wait_navigated".to_string(),
                r#"wait_for [id="searchresult_tb"]"#.to_string(),
                "content".to_string(),
            ]
        );
    }

    #[test]
    fn unfinished_navigation_is_unknown() {
        let tab = FakeTab {
            fail_navigation_wait: true,
            ..FakeTab::default()
        };
        let err = load_page(&tab, &url(), 2, "[id=\"x\"]", Duration::from_secs(1)).unwrap_err();

        assert!(matches!(err, FetchError::Unknown { page: 2, .. }), "{err}");
        assert!(!tab.calls.borrow().iter().any(|c| c == "content"));
    }

    #[test]
    fn vanished_marker_is_element_not_found() {
        let tab = FakeTab {
            marker_missing_after_wait: true,
            ..FakeTab::default()
        };
        let err = load_page(&tab, &url(), 2, "[id=\"x\"]", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, FetchError::ElementNotFound { page: 2, .. }));
    }

    #[test]
    fn placeholder_is_substituted() {
        let url = page_url("https://catalog.example.org/search?q=x&page={page}&n=50", 4).unwrap();
        assert_eq!(url.as_str(), "https://catalog.example.org/search?q=x&page=4&n=50");
    }

    #[test]
    fn page_number_is_appended_without_placeholder() {
        let url = page_url("https://catalog.example.org/search?q=x&page=", 12).unwrap();
        assert_eq!(url.query(), Some("q=x&page=12"));
    }

    #[test]
    fn unparsable_template_is_rejected() {
        let err = page_url("not a url ", 1).unwrap_err();
        assert!(matches!(err, CrawlError::InvalidUrl { .. }));
    }
}

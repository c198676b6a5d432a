use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MARKER_ID: &str = "searchresult_tb";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const DEFAULT_CRAWL_OUTPUT: &str = "catalog_scrape.csv";
pub const DEFAULT_MERGE_OUTPUT: &str = "merged_resumes.csv";
pub const DEFAULT_IDENTITY_COLUMN: &str = "姓名Name";
pub const DEFAULT_MERGED_COLUMN: &str = "合併經歷Entries";
pub const DEFAULT_SEPARATOR: &str = "\n------------------------------\n";

/// Inclusive bounds, in seconds, of the pause between two page loads.
/// Config files go through [`DelayRange::new`], so bad bounds fail at load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDelayRange")]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub const NONE: DelayRange = DelayRange {
        min_secs: 0.0,
        max_secs: 0.0,
    };

    pub fn new(min_secs: f64, max_secs: f64) -> Result<Self, String> {
        if !(min_secs.is_finite() && max_secs.is_finite()) || min_secs < 0.0 {
            return Err(format!("invalid delay bounds {min_secs}..{max_secs}"));
        }
        if min_secs > max_secs {
            return Err(format!(
                "minimum delay {min_secs}s exceeds maximum delay {max_secs}s"
            ));
        }
        Ok(Self { min_secs, max_secs })
    }
}

#[derive(Deserialize)]
struct RawDelayRange {
    min_secs: f64,
    max_secs: f64,
}

impl TryFrom<RawDelayRange> for DelayRange {
    type Error = String;

    fn try_from(raw: RawDelayRange) -> Result<Self, Self::Error> {
        DelayRange::new(raw.min_secs, raw.max_secs)
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min_secs: 1.0,
            max_secs: 2.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Page address; `{page}` is replaced by the page number, otherwise the
    /// number is appended.
    pub url_template: String,
    pub start_page: u32,
    pub page_count: u32,
    pub marker_id: String,
    pub user_agent: String,
    pub headless: bool,
    pub timeout_secs: u64,
    pub delay: DelayRange,
    /// Extra attempts per failed page. Zero keeps single-attempt behaviour.
    pub retries: u32,
    pub output_path: PathBuf,
}

impl CrawlConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn last_page(&self) -> Option<u32> {
        if self.page_count == 0 {
            return None;
        }
        self.start_page.checked_add(self.page_count - 1)
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            url_template: String::new(),
            start_page: 1,
            page_count: 1,
            marker_id: DEFAULT_MARKER_ID.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headless: true,
            timeout_secs: 20,
            delay: DelayRange::default(),
            retries: 0,
            output_path: PathBuf::from(DEFAULT_CRAWL_OUTPUT),
        }
    }
}

/// A column folded into each composite entry, and the label it is shown under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentField {
    pub column: String,
    pub label: String,
}

impl ComponentField {
    pub fn new(column: &str, label: &str) -> Self {
        Self {
            column: column.to_string(),
            label: label.to_string(),
        }
    }
}

/// Display order of the composite entry lines.
pub fn default_component_fields() -> Vec<ComponentField> {
    vec![
        ComponentField::new("命令日期Release date", "日期"),
        ComponentField::new("類別Category", "類別"),
        ComponentField::new("狀態Situation", "狀態"),
        ComponentField::new(
            "機關 | 官/職等 | 職務Organization | Rank/Grade | Capacity",
            "機關/職務",
        ),
        ComponentField::new("原因Reason", "原因"),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub identity_column: String,
    pub merged_column: String,
    pub component_fields: Vec<ComponentField>,
    pub separator: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from(DEFAULT_CRAWL_OUTPUT),
            output_path: PathBuf::from(DEFAULT_MERGE_OUTPUT),
            identity_column: DEFAULT_IDENTITY_COLUMN.to_string(),
            merged_column: DEFAULT_MERGED_COLUMN.to_string(),
            component_fields: default_component_fields(),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

/// Both stages share one file layout: `{"crawl": {...}, "merge": {...}}`.
/// Either section may be omitted, as may any key inside it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub crawl: CrawlConfig,
    pub merge: MergeConfig,
}

impl ConfigFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        load_json(path)
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path.display(), e))?;
    let parsed = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config {}: {}", path.display(), e))?;
    Ok(parsed)
}

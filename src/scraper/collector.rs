use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use thirtyfour::prelude::*;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{Result, ScrapeError};
use crate::models::{Collection, Record};
use crate::scraper::browser::BrowserDriver;

/// Source of table rows. The collector only sees this seam, so the
/// termination logic can be driven by a scripted source in tests.
#[async_trait]
pub trait RowSource {
    /// Bounded wait for at least one row to be present. False means no row
    /// ever appeared.
    async fn wait_for_rows(&mut self) -> Result<bool>;

    /// Extract every currently visible row.
    async fn visible_rows(&mut self) -> Result<Vec<Record>>;

    /// Advance pagination or trigger further lazy-loading. False means no
    /// further advance is possible.
    async fn advance(&mut self) -> Result<bool>;

    /// Rows dropped as malformed so far.
    fn skipped_rows(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone)]
pub struct CollectorPolicy {
    /// Consecutive zero-new-record passes required before convergence.
    /// A single empty pass can be render jitter, not the end of the data.
    pub stable_passes: u32,
    /// Hard cap on extraction passes.
    pub max_passes: u32,
    /// Designated unique column for record identity.
    pub key_column: Option<String>,
}

impl Default for CollectorPolicy {
    fn default() -> Self {
        Self {
            stable_passes: 2,
            max_passes: 500,
            key_column: None,
        }
    }
}

/// Termination-driven collection loop: extract, deduplicate, advance, until
/// the row set stops producing anything new.
pub struct TableCollector<S: RowSource> {
    source: S,
    policy: CollectorPolicy,
}

impl<S: RowSource> TableCollector<S> {
    pub fn new(source: S, policy: CollectorPolicy) -> Self {
        Self { source, policy }
    }

    pub async fn collect(&mut self) -> Result<Collection> {
        if !self.source.wait_for_rows().await? {
            return Err(ScrapeError::NoDataFound);
        }

        let mut collection = match &self.policy.key_column {
            Some(column) => Collection::with_key_column(column.clone()),
            None => Collection::new(),
        };
        let mut stable_count = 0u32;

        for pass in 1..=self.policy.max_passes {
            let rows = self.source.visible_rows().await?;
            let mut added = 0usize;
            for row in rows {
                if collection.insert(row) {
                    added += 1;
                }
            }
            debug!(
                "pass {}: {} new records, {} total",
                pass,
                added,
                collection.len()
            );

            if added == 0 {
                stable_count += 1;
                if stable_count >= self.policy.stable_passes {
                    info!(
                        "no new records for {} consecutive passes, collection complete",
                        stable_count
                    );
                    break;
                }
            } else {
                stable_count = 0;
            }

            if !self.source.advance().await? {
                info!("no further pages, collection complete");
                break;
            }

            if pass == self.policy.max_passes {
                warn!(
                    "pass cap ({}) reached before convergence",
                    self.policy.max_passes
                );
            }
        }

        let skipped = self.source.skipped_rows();
        if skipped > 0 {
            warn!("{} malformed rows were skipped", skipped);
        }
        info!("collected {} unique records", collection.len());

        Ok(collection)
    }

    pub fn skipped_rows(&self) -> usize {
        self.source.skipped_rows()
    }
}

/// Header names and raw cell text for the visible table, read in one script
/// round trip. Headers are read from the header row; rows positionally.
const EXTRACT_ROWS_JS: &str = r#"
    const rowSelector = arguments[0];
    const table = document.querySelector('table, [role="table"]');
    if (!table) {
        return { headers: [], rows: [] };
    }
    const headers = Array.from(table.querySelectorAll('thead th, th'))
        .map(cell => cell.textContent.trim())
        .filter(text => text.length > 0);
    const rows = Array.from(document.querySelectorAll(rowSelector))
        .map(row => Array.from(row.querySelectorAll('td'))
        .map(cell => cell.textContent.trim()));
    return { headers: headers, rows: rows };
"#;

/// Cheap view identity used to detect whether an advance changed anything:
/// row count, first row text, and the scroll extent of the lazy container.
const FINGERPRINT_JS: &str = r#"
    const rowSelector = arguments[0];
    const rows = document.querySelectorAll(rowSelector);
    const first = rows.length ? rows[0].textContent.trim() : '';
    const el = document.querySelector('.infinite-table')
        || document.scrollingElement || document.body;
    return { count: rows.length, first: first, height: el.scrollHeight };
"#;

const SCROLL_TO_BOTTOM_JS: &str = r#"
    const el = document.querySelector('.infinite-table')
        || document.scrollingElement || document.body;
    el.scrollTop = el.scrollHeight;
"#;

fn next_button_selectors() -> Vec<By> {
    vec![
        By::XPath("//button[contains(., 'Next') and not(@disabled)]"),
        By::Css("button[aria-label='Next page']:not([disabled])"),
        By::Css("a[rel='next']"),
    ]
}

fn remaining_hint_selectors() -> Vec<By> {
    vec![By::Css("div.text-center span, div.text-muted-foreground")]
}

#[derive(Debug, Deserialize)]
struct ExtractedTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, PartialEq, Deserialize)]
struct PageFingerprint {
    count: u64,
    first: String,
    height: i64,
}

/// Name cells by header position, `Column_N` past the header row's width.
/// Rows with no cells at all (layout rows, loaders) are dropped and counted.
fn records_from_extract(extract: ExtractedTable, skipped: &mut usize) -> Vec<Record> {
    let mut records = Vec::with_capacity(extract.rows.len());

    for cells in extract.rows {
        if cells.is_empty() {
            *skipped += 1;
            continue;
        }

        let mut record = Record::new();
        for (i, value) in cells.into_iter().enumerate() {
            let column = extract
                .headers
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("Column_{}", i + 1));
            record.push(column, value);
        }
        records.push(record);
    }

    records
}

/// Live [`RowSource`] over a rendered table: one-shot script extraction,
/// next-page click or scroll-to-bottom advance, and the page's own
/// "N remaining" hint as an early stop.
pub struct PageTableSource<'a> {
    browser: &'a BrowserDriver,
    row_selector: String,
    wait_timeout: Duration,
    advance_timeout: Duration,
    skipped: usize,
    remaining_re: Regex,
}

impl<'a> PageTableSource<'a> {
    pub fn new(
        browser: &'a BrowserDriver,
        row_selector: impl Into<String>,
        wait_timeout: Duration,
        advance_timeout: Duration,
    ) -> Self {
        Self {
            browser,
            row_selector: row_selector.into(),
            wait_timeout,
            advance_timeout,
            skipped: 0,
            remaining_re: Regex::new(r"(\d+)\s+remaining").unwrap(),
        }
    }

    async fn fingerprint(&self) -> Result<PageFingerprint> {
        let value = self
            .browser
            .execute_script_and_get_value(
                FINGERPRINT_JS,
                vec![serde_json::Value::String(self.row_selector.clone())],
            )
            .await?;

        serde_json::from_value(value)
            .map_err(|e| ScrapeError::Driver(format!("bad fingerprint result: {}", e)))
    }

    /// The catalog view counts down how many products are left to load.
    /// Zero means advancing cannot produce anything new.
    async fn remaining_is_zero(&self) -> Result<bool> {
        for selector in remaining_hint_selectors() {
            let Ok(elements) = self.browser.find_elements(selector).await else {
                continue;
            };
            for element in elements {
                let text = element.text().await.unwrap_or_default().to_lowercase();
                if text.contains("all products loaded") {
                    return Ok(true);
                }
                if let Some(caps) = self.remaining_re.captures(&text) {
                    if caps[1].parse::<u64>().ok() == Some(0) {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    async fn wait_for_change(&self, before: &PageFingerprint) -> Result<bool> {
        let start = Instant::now();
        while start.elapsed() < self.advance_timeout {
            if self.fingerprint().await? != *before {
                return Ok(true);
            }
            sleep(Duration::from_millis(500)).await;
        }
        Ok(false)
    }
}

#[async_trait]
impl RowSource for PageTableSource<'_> {
    async fn wait_for_rows(&mut self) -> Result<bool> {
        match self
            .browser
            .wait_for_element(By::Css(self.row_selector.clone()), self.wait_timeout)
            .await
        {
            Ok(_) => Ok(true),
            Err(ScrapeError::Driver(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn visible_rows(&mut self) -> Result<Vec<Record>> {
        let value = self
            .browser
            .execute_script_and_get_value(
                EXTRACT_ROWS_JS,
                vec![serde_json::Value::String(self.row_selector.clone())],
            )
            .await?;

        let extract: ExtractedTable = serde_json::from_value(value)
            .map_err(|e| ScrapeError::Driver(format!("bad extraction result: {}", e)))?;

        Ok(records_from_extract(extract, &mut self.skipped))
    }

    async fn advance(&mut self) -> Result<bool> {
        if self.remaining_is_zero().await? {
            debug!("page reports nothing remaining");
            return Ok(false);
        }

        let before = self.fingerprint().await?;

        match self
            .browser
            .wait_for_clickable(&next_button_selectors(), Duration::from_secs(2))
            .await?
        {
            Some(button) => {
                self.browser.click_element(&button).await?;
                debug!("clicked next-page control");
            }
            None => {
                self.browser
                    .execute_script(SCROLL_TO_BOTTOM_JS, Vec::new())
                    .await?;
                debug!("scrolled to bottom");
            }
        }

        self.wait_for_change(&before).await
    }

    fn skipped_rows(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn row(id: &str, name: &str) -> Record {
        Record::from_cells(vec![
            ("ID".to_string(), id.to_string()),
            ("Name".to_string(), name.to_string()),
        ])
    }

    fn keys(collection: &Collection) -> BTreeSet<String> {
        collection.iter().map(|r| r.identity_key(None)).collect()
    }

    /// Pages served in order; after the last page the source either refuses
    /// to advance (pagination) or keeps serving the last page (lazy-load
    /// that can always scroll).
    struct ScriptedSource {
        pages: Vec<Vec<Record>>,
        index: usize,
        endless_advance: bool,
        passes: usize,
        advances: usize,
    }

    impl ScriptedSource {
        fn paged(pages: Vec<Vec<Record>>) -> Self {
            Self {
                pages,
                index: 0,
                endless_advance: false,
                passes: 0,
                advances: 0,
            }
        }

        fn endless(pages: Vec<Vec<Record>>) -> Self {
            Self {
                endless_advance: true,
                ..Self::paged(pages)
            }
        }
    }

    #[async_trait]
    impl RowSource for ScriptedSource {
        async fn wait_for_rows(&mut self) -> Result<bool> {
            Ok(self.pages.iter().any(|p| !p.is_empty()))
        }

        async fn visible_rows(&mut self) -> Result<Vec<Record>> {
            self.passes += 1;
            Ok(self.pages.get(self.index).cloned().unwrap_or_default())
        }

        async fn advance(&mut self) -> Result<bool> {
            self.advances += 1;
            if self.index + 1 < self.pages.len() {
                self.index += 1;
                Ok(true)
            } else {
                Ok(self.endless_advance)
            }
        }
    }

    #[tokio::test]
    async fn test_no_rows_ever_is_no_data_found() {
        let source = ScriptedSource::paged(vec![]);
        let mut collector = TableCollector::new(source, CollectorPolicy::default());

        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, ScrapeError::NoDataFound));
    }

    #[tokio::test]
    async fn test_three_pages_of_two_rows_yield_six_records() {
        let source = ScriptedSource::paged(vec![
            vec![row("1", "a"), row("2", "b")],
            vec![row("3", "c"), row("4", "d")],
            vec![row("5", "e"), row("6", "f")],
        ]);
        let mut collector = TableCollector::new(source, CollectorPolicy::default());

        let collection = collector.collect().await.unwrap();
        assert_eq!(collection.len(), 6);
        // Two advances reach page 3, the third finds no next page.
        assert_eq!(collector.source.advances, 3);
    }

    #[tokio::test]
    async fn test_rerendered_rows_are_not_double_counted() {
        let source = ScriptedSource::paged(vec![
            vec![row("1", "a"), row("2", "b")],
            vec![row("1", "a"), row("2", "b"), row("3", "c")],
        ]);
        let mut collector = TableCollector::new(source, CollectorPolicy::default());

        let collection = collector.collect().await.unwrap();
        assert_eq!(collection.len(), 3);
    }

    #[tokio::test]
    async fn test_endless_scroll_converges_after_stable_threshold() {
        let source = ScriptedSource::endless(vec![
            vec![row("1", "a")],
            vec![row("2", "b")],
            vec![row("3", "c")],
        ]);
        let mut collector = TableCollector::new(source, CollectorPolicy::default());

        let collection = collector.collect().await.unwrap();
        assert_eq!(collection.len(), 3);
        // Three productive passes plus exactly stable_passes empty ones.
        assert_eq!(collector.source.passes, 3 + 2);
    }

    #[tokio::test]
    async fn test_single_empty_pass_does_not_end_collection() {
        // Page 2 re-renders page 1 (an empty pass), page 3 has fresh rows.
        let source = ScriptedSource::paged(vec![
            vec![row("1", "a")],
            vec![row("1", "a")],
            vec![row("2", "b")],
        ]);
        let mut collector = TableCollector::new(source, CollectorPolicy::default());

        let collection = collector.collect().await.unwrap();
        assert_eq!(collection.len(), 2);
    }

    #[tokio::test]
    async fn test_collect_is_idempotent_on_static_source() {
        let page = vec![row("1", "a"), row("2", "b")];

        let mut first =
            TableCollector::new(ScriptedSource::endless(vec![page.clone()]), CollectorPolicy::default());
        let mut second =
            TableCollector::new(ScriptedSource::endless(vec![page]), CollectorPolicy::default());

        let a = first.collect().await.unwrap();
        let b = second.collect().await.unwrap();
        assert_eq!(keys(&a), keys(&b));
    }

    #[tokio::test]
    async fn test_key_column_collapses_rows_with_same_id() {
        let source = ScriptedSource::paged(vec![
            vec![row("1", "a")],
            vec![row("1", "a (restocked)")],
        ]);
        let policy = CollectorPolicy {
            key_column: Some("ID".to_string()),
            ..CollectorPolicy::default()
        };
        let mut collector = TableCollector::new(source, policy);

        let collection = collector.collect().await.unwrap();
        assert_eq!(collection.len(), 1);
    }

    /// A source that never stops producing fresh rows; the pass cap is the
    /// only way out.
    struct UnboundedSource {
        counter: usize,
    }

    #[async_trait]
    impl RowSource for UnboundedSource {
        async fn wait_for_rows(&mut self) -> Result<bool> {
            Ok(true)
        }

        async fn visible_rows(&mut self) -> Result<Vec<Record>> {
            self.counter += 1;
            Ok(vec![row(&self.counter.to_string(), "generated")])
        }

        async fn advance(&mut self) -> Result<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_pass_cap_bounds_an_unbounded_source() {
        let policy = CollectorPolicy {
            max_passes: 5,
            ..CollectorPolicy::default()
        };
        let mut collector = TableCollector::new(UnboundedSource { counter: 0 }, policy);

        let collection = collector.collect().await.unwrap();
        assert_eq!(collection.len(), 5);
    }

    #[test]
    fn test_records_use_headers_then_positional_names() {
        let extract = ExtractedTable {
            headers: vec!["Name".to_string(), "Price".to_string()],
            rows: vec![vec![
                "Widget".to_string(),
                "9.99".to_string(),
                "extra".to_string(),
            ]],
        };
        let mut skipped = 0;

        let records = records_from_extract(extract, &mut skipped);
        assert_eq!(skipped, 0);
        assert_eq!(records[0].get("Name"), Some("Widget"));
        assert_eq!(records[0].get("Price"), Some("9.99"));
        assert_eq!(records[0].get("Column_3"), Some("extra"));
    }

    #[test]
    fn test_cellless_rows_are_skipped_and_counted() {
        let extract = ExtractedTable {
            headers: vec!["Name".to_string()],
            rows: vec![vec![], vec!["Widget".to_string()], vec![]],
        };
        let mut skipped = 0;

        let records = records_from_extract(extract, &mut skipped);
        assert_eq!(records.len(), 1);
        assert_eq!(skipped, 2);
    }
}

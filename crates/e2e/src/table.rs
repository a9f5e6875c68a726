//! Waiting for data tables to settle
//!
//! The application renders most modules as a table whose body loads
//! asynchronously behind a spinner and a placeholder row. A read is only
//! meaningful once the region is stable, so every read-after-write in the
//! suite goes through [`TableStabilizer::stabilize`] first.
//!
//! Only table visibility is a hard requirement. Spinner, placeholder and
//! network signals are best effort: the app is allowed to show an empty
//! state, and those outcomes are reported rather than raised.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;
use crate::page::{Page, RowSnapshot};
use crate::probe::Probe;
use crate::wait::poll_until;

/// Rows whose joined text is this short are still placeholders
const MIN_ROW_TEXT_LEN: usize = 5;

/// Where a table lives on the page and how its loading states look
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRegion {
    pub table: Locator,
    pub rows: Locator,
    #[serde(default)]
    pub spinner: Option<Locator>,
    /// Text the app renders in a single row when the result set is empty
    #[serde(default = "default_empty_sentinel")]
    pub empty_sentinel: String,
}

fn default_empty_sentinel() -> String {
    "No results".to_string()
}

impl TableRegion {
    pub fn new(table: Locator, rows: Locator) -> Self {
        Self {
            table,
            rows,
            spinner: None,
            empty_sentinel: default_empty_sentinel(),
        }
    }

    pub fn with_spinner(mut self, spinner: Locator) -> Self {
        self.spinner = Some(spinner);
        self
    }

    pub fn with_empty_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.empty_sentinel = sentinel.into();
        self
    }
}

impl Default for TableRegion {
    /// The shared data-table layout: `table`, `tbody tr`, `.animate-spin`
    fn default() -> Self {
        Self::new(Locator::css("table"), Locator::css("tbody tr")).with_spinner(Locator::css(".animate-spin"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilizeConfig {
    pub spinner_timeout: Duration,
    pub table_timeout: Duration,
    pub rows_timeout: Duration,
    pub network_idle_timeout: Duration,
    /// Fixed wait after everything else, for client-side re-renders
    pub grace: Duration,
    pub poll_interval: Duration,
}

impl Default for StabilizeConfig {
    fn default() -> Self {
        Self {
            spinner_timeout: Duration::from_secs(30),
            table_timeout: Duration::from_secs(30),
            rows_timeout: Duration::from_secs(40),
            network_idle_timeout: Duration::from_secs(30),
            grace: Duration::from_secs(3),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// What the stabilizer observed. Only a missing table is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilizeReport {
    pub spinner_cleared: bool,
    /// `Matches` when real data rows rendered, `Differs` with the first row
    /// text for an empty state or a stuck placeholder, `Absent` for no rows
    pub rows: Probe,
    pub network_idle: bool,
}

impl StabilizeReport {
    pub fn has_data(&self) -> bool {
        self.rows.matches()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableStabilizer {
    config: StabilizeConfig,
}

impl TableStabilizer {
    pub fn new(config: StabilizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StabilizeConfig {
        &self.config
    }

    /// Wait until `region` is ready to be read.
    pub async fn stabilize(&self, page: &dyn Page, region: &TableRegion) -> E2eResult<StabilizeReport> {
        let cfg = &self.config;

        let spinner_cleared = match &region.spinner {
            Some(spinner) => {
                let cleared = poll_until("spinner detached", cfg.spinner_timeout, cfg.poll_interval, || async move {
                    Ok::<_, E2eError>(!page.is_visible(spinner).await?)
                })
                .await;
                match cleared {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Spinner still visible, continuing: {}", e);
                        false
                    }
                }
            }
            None => true,
        };

        poll_until(
            &format!("{} visible", region.table),
            cfg.table_timeout,
            cfg.poll_interval,
            || page.is_visible(&region.table),
        )
        .await?;

        let rows = self.wait_for_rows(page, region).await?;
        let network_idle = page.wait_for_network_idle(cfg.network_idle_timeout).await?;
        if !network_idle {
            debug!("Network did not go idle within {:?}", cfg.network_idle_timeout);
        }

        if !cfg.grace.is_zero() {
            tokio::time::sleep(cfg.grace).await;
        }

        let report = StabilizeReport {
            spinner_cleared,
            rows,
            network_idle,
        };
        debug!("Table stabilized: {:?}", report);
        Ok(report)
    }

    async fn wait_for_rows(&self, page: &dyn Page, region: &TableRegion) -> E2eResult<Probe> {
        let cfg = &self.config;
        let loaded = poll_until("first row rendered", cfg.rows_timeout, cfg.poll_interval, || async move {
            let text = first_row_text(page, region).await?;
            Ok::<_, E2eError>(text.map(|t| is_data_row(&t, &region.empty_sentinel)).unwrap_or(false))
        })
        .await;

        match loaded {
            Ok(()) => Ok(Probe::Matches),
            Err(e) if e.is_timeout() => {
                let probe = match first_row_text(page, region).await? {
                    Some(text) => Probe::Differs(text),
                    None => Probe::Absent,
                };
                info!("Table has no data rows after {:?}: {:?}", cfg.rows_timeout, probe);
                Ok(probe)
            }
            Err(e) => Err(e),
        }
    }
}

fn is_data_row(text: &str, sentinel: &str) -> bool {
    text.chars().count() > MIN_ROW_TEXT_LEN && !text.contains(sentinel)
}

async fn first_row_text(page: &dyn Page, region: &TableRegion) -> E2eResult<Option<String>> {
    Ok(page
        .row_cells(&region.rows)
        .await?
        .into_iter()
        .next()
        .map(|cells| cells.join(" ").trim().to_string()))
}

/// Current rows of the table
pub async fn snapshot(page: &dyn Page, region: &TableRegion) -> E2eResult<Vec<RowSnapshot>> {
    page.row_cells(&region.rows).await
}

/// Cells of `column` for every row that has one
pub async fn column(page: &dyn Page, region: &TableRegion, column: usize) -> E2eResult<Vec<String>> {
    Ok(snapshot(page, region)
        .await?
        .into_iter()
        .filter_map(|row| row.into_iter().nth(column))
        .collect())
}

/// Number of rendered data rows. A lone empty-state row counts as zero.
pub async fn row_count(page: &dyn Page, region: &TableRegion) -> E2eResult<usize> {
    let rows = snapshot(page, region).await?;
    if rows.len() == 1 && rows[0].join(" ").contains(&region.empty_sentinel) {
        return Ok(0);
    }
    Ok(rows.len())
}

/// Check that `column` contains `needle` in each of the first `max_rows` rows.
///
/// Returns how many rows were checked; an empty table checks nothing.
pub async fn verify_column_contains(
    page: &dyn Page,
    region: &TableRegion,
    column: usize,
    needle: &str,
    max_rows: usize,
) -> E2eResult<usize> {
    if row_count(page, region).await? == 0 {
        info!("No rows to verify for '{}'", needle);
        return Ok(0);
    }

    let rows = snapshot(page, region).await?;
    let checked = rows.len().min(max_rows);
    info!("Verifying {} of {} rows contain '{}' in column {}", checked, rows.len(), needle, column);

    for (i, row) in rows.iter().take(checked).enumerate() {
        let cell = row.get(column).map(String::as_str).unwrap_or("");
        if !cell.contains(needle) {
            return Err(E2eError::AssertionFailed(format!(
                "Row {} does not contain '{}' in column {}. Found: '{}'",
                i, needle, column, cell
            )));
        }
    }
    Ok(checked)
}

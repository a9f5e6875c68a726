//! Declarative YAML suite specification
//!
//! One file describes one application module: where its table lives, which
//! filters it exposes, which columns may soft-pass sort checks, and the
//! scenarios to run against it in order.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};
use crate::filter::FilterControl;
use crate::locator::Locator;
use crate::pages::AppModule;
use crate::sort::{SortDirection, SortPolicy};
use crate::table::TableRegion;

/// A module suite parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSpec {
    /// Unique name for this suite
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Module the suite opens before its first scenario
    pub module: AppModule,

    /// Tags for filtering suites
    #[serde(default)]
    pub tags: Vec<String>,

    /// Table layout; the module default when omitted
    #[serde(default)]
    pub table: Option<TableRegion>,

    /// Filter controls; the module defaults when omitted
    #[serde(default)]
    pub filters: Option<Vec<FilterControl>>,

    /// Sort exemptions and rank table; the module default when omitted
    #[serde(default)]
    pub sort: Option<SortPolicy>,

    /// Steps run once after navigation, before the first scenario
    #[serde(default)]
    pub setup: Vec<Step>,

    /// Best-effort steps run after every scenario, whatever its verdict
    #[serde(default)]
    pub after_each: Vec<Step>,

    /// Best-effort steps run after the last scenario
    #[serde(default)]
    pub teardown: Vec<Step>,

    pub scenarios: Vec<Scenario>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Stable identifier, e.g. `CUST-004`
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub tags: Vec<String>,

    pub steps: Vec<Step>,
}

/// A single step in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Open a module (the suite's own when omitted) or a path under the base URL
    Navigate {
        #[serde(default)]
        module: Option<AppModule>,
        #[serde(default)]
        path: Option<String>,
    },

    /// Click an element
    Click { target: Locator },

    /// Click `target` until `until` shows up
    ClickUntil { target: Locator, until: Locator },

    /// Fill an input field
    Fill { target: Locator, value: String },

    /// Press a key on the focused element
    Press { key: String },

    /// Wait for an element to become visible
    WaitVisible {
        target: Locator,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
    },

    /// Stabilize the suite's table
    WaitTable,

    /// Wait for a fixed amount of time (use sparingly)
    Sleep { ms: u64 },

    /// Sort through a column header menu, then verify the order
    Sort {
        /// Header label
        header: String,
        /// Column index in the rendered row
        column: usize,
        direction: SortDirection,
        #[serde(default = "default_true")]
        verify: bool,
    },

    /// Verify a column order without touching the header
    VerifySort { column: usize, direction: SortDirection },

    /// Select one option of a named filter
    Filter { filter: String, option: String },

    /// Reset a named filter
    ClearFilter { filter: String },

    /// The first `max_rows` rows contain `value` in `column`
    AssertRowsContain {
        column: usize,
        value: String,
        #[serde(default = "default_max_rows")]
        max_rows: usize,
    },

    /// Some rendered row contains `text`
    AssertTableContains { text: String },

    /// The table shows its empty state
    AssertTableEmpty,

    /// Data row count within bounds
    AssertRowCount {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },

    /// Remember the current data row count
    MarkRowCount,

    /// Fewer data rows than at the last `mark_row_count`; an emptied table counts
    AssertRowCountDecreased,

    /// Every listed text appears in `target`
    AssertText { target: Locator, contains: Vec<String> },

    AssertVisible { target: Locator },

    AssertHidden { target: Locator },

    /// Pick a page size from the rows-per-page selector
    SelectRowsPerPage { size: usize },

    /// Go to the next page
    NextPage {
        #[serde(default)]
        expect_changed: bool,
    },

    /// Click an export control and check the downloaded file
    Export {
        trigger: Locator,
        #[serde(default)]
        expect_any: Vec<String>,
    },

    /// Skip the rest of the scenario unless `target` is present
    SkipUnless { target: Locator, reason: String },

    /// Record whether optional UI is present; never fails
    Probe {
        target: Locator,
        #[serde(default)]
        expect: Option<String>,
    },

    /// Take a screenshot
    Screenshot { name: String },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_wait_timeout() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_max_rows() -> usize {
    10
}

impl Step {
    /// Short label for logs and failure reports
    pub fn label(&self) -> String {
        match self {
            Step::Navigate { module, path } => match (module, path) {
                (_, Some(p)) => format!("navigate {}", p),
                (Some(m), None) => format!("navigate {}", m),
                (None, None) => "navigate".to_string(),
            },
            Step::Click { target } => format!("click {}", target),
            Step::ClickUntil { target, until } => format!("click {} until {}", target, until),
            Step::Fill { target, .. } => format!("fill {}", target),
            Step::Press { key } => format!("press {}", key),
            Step::WaitVisible { target, .. } => format!("wait for {}", target),
            Step::WaitTable => "wait for table".to_string(),
            Step::Sleep { ms } => format!("sleep {}ms", ms),
            Step::Sort { header, direction, .. } => format!("sort '{}' {}", header, direction),
            Step::VerifySort { column, direction } => format!("verify column {} {}", column, direction),
            Step::Filter { filter, option } => format!("filter '{}' = '{}'", filter, option),
            Step::ClearFilter { filter } => format!("clear filter '{}'", filter),
            Step::AssertRowsContain { column, value, .. } => format!("rows contain '{}' in column {}", value, column),
            Step::AssertTableContains { text } => format!("table contains '{}'", text),
            Step::AssertTableEmpty => "table empty".to_string(),
            Step::AssertRowCount { min, max } => format!("row count in {:?}..={:?}", min, max),
            Step::MarkRowCount => "mark row count".to_string(),
            Step::AssertRowCountDecreased => "row count decreased".to_string(),
            Step::AssertText { target, .. } => format!("text of {}", target),
            Step::AssertVisible { target } => format!("{} visible", target),
            Step::AssertHidden { target } => format!("{} hidden", target),
            Step::SelectRowsPerPage { size } => format!("rows per page {}", size),
            Step::NextPage { .. } => "next page".to_string(),
            Step::Export { trigger, .. } => format!("export via {}", trigger),
            Step::SkipUnless { target, .. } => format!("skip unless {}", target),
            Step::Probe { target, .. } => format!("probe {}", target),
            Step::Screenshot { name } => format!("screenshot {}", name),
            Step::Log { .. } => "log".to_string(),
        }
    }
}

impl SuiteSpec {
    /// Parse a suite from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let suite: Self = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all suites from a directory, sorted by file name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut suites = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            suites.push(Self::from_file(entry.path())?);
        }

        Ok(suites)
    }

    /// Filter suites by tag
    pub fn filter_by_tag<'a>(suites: &'a [Self], tag: &str) -> Vec<&'a Self> {
        suites.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    pub fn table_region(&self) -> Option<TableRegion> {
        match &self.table {
            Some(t) => Some(t.clone()),
            None if self.module.has_table() => Some(self.module.table_region()),
            None => None,
        }
    }

    pub fn filter_controls(&self) -> Vec<FilterControl> {
        self.filters.clone().unwrap_or_else(|| self.module.filters())
    }

    pub fn sort_policy(&self) -> SortPolicy {
        self.sort.clone().unwrap_or_else(|| self.module.sort_policy())
    }

    fn validate(&self) -> E2eResult<()> {
        let mut seen = std::collections::HashSet::new();
        for scenario in &self.scenarios {
            if !seen.insert(scenario.id.as_str()) {
                return Err(E2eError::SpecParse(format!(
                    "suite '{}' has duplicate scenario id '{}'",
                    self.name, scenario.id
                )));
            }
        }

        let filters = self.filter_controls();
        let has_table = self.table_region().is_some();
        let all_steps = self
            .setup
            .iter()
            .chain(self.after_each.iter())
            .chain(self.teardown.iter())
            .chain(self.scenarios.iter().flat_map(|s| s.steps.iter()));

        for step in all_steps {
            match step {
                Step::Filter { filter, .. } | Step::ClearFilter { filter } => {
                    if !filters.iter().any(|f| &f.name == filter) {
                        return Err(E2eError::SpecParse(format!(
                            "suite '{}' uses unknown filter '{}'",
                            self.name, filter
                        )));
                    }
                }
                Step::WaitTable
                | Step::Sort { .. }
                | Step::VerifySort { .. }
                | Step::AssertRowsContain { .. }
                | Step::AssertTableContains { .. }
                | Step::AssertTableEmpty
                | Step::AssertRowCount { .. }
                | Step::MarkRowCount
                | Step::AssertRowCountDecreased
                | Step::NextPage { .. }
                    if !has_table =>
                {
                    return Err(E2eError::SpecParse(format!(
                        "suite '{}' step '{}' needs a table",
                        self.name,
                        step.label()
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

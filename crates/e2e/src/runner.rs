//! Suite runner: serial scenarios over one shared page

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::SuiteConfig;
use crate::download::verify_download;
use crate::error::{E2eError, E2eResult};
use crate::filter::{FilterChoice, FilterControl, FilterController};
use crate::locator::Locator;
use crate::page::Page;
use crate::pages::{self, AppModule};
use crate::probe::{probe_text, probe_visible, Probe};
use crate::retry::ActionRetrier;
use crate::session::{self, SessionOrigin, SessionSettings};
use crate::sort::{verify_column_sorted, SortCheck, SortDirection, SortPolicy};
use crate::spec::{Scenario, Step, SuiteSpec};
use crate::table::{self, TableRegion, TableStabilizer};
use crate::wait::poll_until;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    /// A required precondition was legitimately absent
    Skipped { reason: String },
    Failed { step: String, error: String },
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub suite: String,
    pub id: String,
    pub title: String,
    #[serde(flatten)]
    pub verdict: Verdict,
    pub steps_run: usize,
    pub duration_ms: u64,
    /// Sort checks that soft-passed on exempt columns
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage_gaps: Vec<String>,
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}

/// Result of running all selected suites
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionOrigin>,
    pub results: Vec<ScenarioResult>,
}

impl RunSummary {
    fn push(&mut self, result: ScenarioResult) {
        self.total += 1;
        match result.verdict {
            Verdict::Passed => self.passed += 1,
            Verdict::Skipped { .. } => self.skipped += 1,
            Verdict::Failed { .. } => self.failed += 1,
        }
        self.results.push(result);
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Which scenarios to run
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub module: Option<AppModule>,
    pub scenario_id: Option<String>,
    pub tag: Option<String>,
}

impl Selection {
    fn suite_selected(&self, suite: &SuiteSpec) -> bool {
        self.module.map(|m| m == suite.module).unwrap_or(true)
    }

    fn scenario_selected(&self, suite: &SuiteSpec, scenario: &Scenario) -> bool {
        let id_ok = self
            .scenario_id
            .as_ref()
            .map(|id| scenario.id.eq_ignore_ascii_case(id))
            .unwrap_or(true);
        let tag_ok = self
            .tag
            .as_ref()
            .map(|t| suite.tags.contains(t) || scenario.tags.contains(t))
            .unwrap_or(true);
        id_ok && tag_ok
    }
}

/// Per-suite state shared by its scenarios
pub struct SuiteContext<'a> {
    pub page: &'a dyn Page,
    pub config: &'a SuiteConfig,
    pub session: SessionSettings,
    pub module: AppModule,
    pub region: Option<TableRegion>,
    pub filters: Vec<FilterControl>,
    pub sort_policy: SortPolicy,
    pub stabilizer: TableStabilizer,
    pub retrier: ActionRetrier,
    pub filter_controller: FilterController,
    coverage_gaps: Vec<String>,
    /// Row count recorded by `mark_row_count` in the current scenario
    marked_rows: Option<usize>,
}

impl<'a> SuiteContext<'a> {
    pub fn new(page: &'a dyn Page, config: &'a SuiteConfig, suite: &SuiteSpec) -> Self {
        let stabilizer = TableStabilizer::new(config.stabilize_config());
        let retrier = ActionRetrier::new(config.retry_policy());
        Self {
            page,
            config,
            session: config.session_settings(),
            module: suite.module,
            region: suite.table_region(),
            filters: suite.filter_controls(),
            sort_policy: suite.sort_policy(),
            filter_controller: FilterController::new(retrier.clone(), stabilizer.clone()),
            stabilizer,
            retrier,
            coverage_gaps: Vec::new(),
            marked_rows: None,
        }
    }

    fn region(&self) -> E2eResult<&TableRegion> {
        self.region
            .as_ref()
            .ok_or_else(|| E2eError::Config(format!("module '{}' has no table", self.module)))
    }

    fn filter(&self, name: &str) -> E2eResult<FilterControl> {
        self.filters
            .iter()
            .find(|f| f.name == name)
            .cloned()
            .ok_or_else(|| E2eError::Config(format!("unknown filter '{}'", name)))
    }

    async fn stabilize(&self) -> E2eResult<()> {
        if let Some(region) = &self.region {
            self.stabilizer.stabilize(self.page, region).await?;
        }
        Ok(())
    }

    /// Best-effort cleanup: clear recorded filters, then run `steps`.
    /// Failures are logged and never change a verdict.
    pub async fn cleanup(&mut self, phase: &str, steps: &[Step]) {
        if let Some(region) = self.region.clone() {
            self.filter_controller.clear_all(self.page, &region).await;
        }
        for step in steps {
            if let Err(e) = execute(self, step).await {
                warn!("{}: step '{}' failed: {}", phase, step.label(), e);
            }
        }
    }
}

/// What a step asks the runner to do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Skip(String),
}

/// Execute one step against the suite context.
pub async fn execute(ctx: &mut SuiteContext<'_>, step: &Step) -> E2eResult<StepOutcome> {
    let page = ctx.page;
    debug!("step: {}", step.label());

    match step {
        Step::Navigate { module, path } => {
            match path {
                Some(p) => page.goto(&ctx.session.url(p)).await?,
                None => {
                    let target = module.unwrap_or(ctx.module);
                    session::navigate(page, &ctx.session, target, &ctx.retrier).await?
                }
            }
        }

        Step::Click { target } => page.click(target).await?,

        Step::ClickUntil { target, until } => {
            ctx.retrier
                .run(&format!("click {}", target), &format!("{} visible", until), || page.click(target), || {
                    page.is_visible(until)
                })
                .await?;
        }

        Step::Fill { target, value } => page.fill(target, value).await?,

        Step::Press { key } => page.press(key).await?,

        Step::WaitVisible { target, timeout_ms } => {
            poll_until(
                &format!("{} visible", target),
                Duration::from_millis(*timeout_ms),
                ctx.retrier.policy().poll_interval,
                || page.is_visible(target),
            )
            .await?;
        }

        Step::WaitTable => ctx.stabilize().await?,

        Step::Sleep { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,

        Step::Sort {
            header,
            column,
            direction,
            verify,
        } => {
            let region = ctx.region()?.clone();
            let trigger = pages::sort_header(header);
            let menu = pages::sort_menu();
            info!("Sorting by {} ({})", header, direction);
            ctx.retrier
                .run(&format!("open sort menu '{}'", header), "sort menu visible", || page.click(&trigger), || {
                    page.is_visible(&menu)
                })
                .await?;
            page.click(&Locator::text(direction.menu_label()).first().within(&menu))
                .await?;
            ctx.stabilizer.stabilize(page, &region).await?;
            if *verify {
                let check = verify_column_sorted(page, &region, *column, *direction, &ctx.sort_policy).await?;
                record_sort(ctx, *column, *direction, check);
            }
        }

        Step::VerifySort { column, direction } => {
            let region = ctx.region()?;
            let check = verify_column_sorted(page, region, *column, *direction, &ctx.sort_policy).await?;
            record_sort(ctx, *column, *direction, check);
        }

        Step::Filter { filter, option } => {
            let control = ctx.filter(filter)?;
            let region = ctx.region()?.clone();
            ctx.filter_controller
                .apply(page, &control, &FilterChoice::Option(option.clone()), &region)
                .await?;
        }

        Step::ClearFilter { filter } => {
            let control = ctx.filter(filter)?;
            let region = ctx.region()?.clone();
            ctx.filter_controller
                .apply(page, &control, &FilterChoice::Clear, &region)
                .await?;
        }

        Step::AssertRowsContain {
            column,
            value,
            max_rows,
        } => {
            table::verify_column_contains(page, ctx.region()?, *column, value, *max_rows).await?;
        }

        Step::AssertTableContains { text } => {
            let rows = table::snapshot(page, ctx.region()?).await?;
            if !rows.iter().any(|r| r.iter().any(|c| c.contains(text.as_str()))) {
                return Err(E2eError::AssertionFailed(format!(
                    "no row contains '{}' ({} rows rendered)",
                    text,
                    rows.len()
                )));
            }
        }

        Step::AssertTableEmpty => {
            let count = table::row_count(page, ctx.region()?).await?;
            if count != 0 {
                return Err(E2eError::AssertionFailed(format!(
                    "expected empty table, found {} rows",
                    count
                )));
            }
        }

        Step::AssertRowCount { min, max } => {
            let count = table::row_count(page, ctx.region()?).await?;
            let low_ok = min.map(|m| count >= m).unwrap_or(true);
            let high_ok = max.map(|m| count <= m).unwrap_or(true);
            if !(low_ok && high_ok) {
                return Err(E2eError::AssertionFailed(format!(
                    "row count {} outside {:?}..={:?}",
                    count, min, max
                )));
            }
        }

        Step::MarkRowCount => {
            let count = table::row_count(page, ctx.region()?).await?;
            debug!("Marked {} rows", count);
            ctx.marked_rows = Some(count);
        }

        Step::AssertRowCountDecreased => {
            let before = ctx.marked_rows.ok_or_else(|| {
                E2eError::Config("row count was never marked in this scenario".to_string())
            })?;
            let after = table::row_count(page, ctx.region()?).await?;
            if after >= before && after != 0 {
                return Err(E2eError::AssertionFailed(format!(
                    "row count did not decrease: {} before, {} after",
                    before, after
                )));
            }
        }

        Step::AssertText { target, contains } => {
            let text = page.texts(target).await?.join(" ");
            if let Some(missing) = contains.iter().find(|c| !text.contains(c.as_str())) {
                return Err(E2eError::AssertionFailed(format!(
                    "{} does not contain '{}' (text: '{}')",
                    target, missing, text
                )));
            }
        }

        Step::AssertVisible { target } => {
            if probe_visible(page, target, ctx.config.probe_timeout()).await? == Probe::Absent {
                return Err(E2eError::ElementNotFound(target.describe()));
            }
        }

        Step::AssertHidden { target } => {
            poll_until(
                &format!("{} hidden", target),
                ctx.config.probe_timeout(),
                ctx.retrier.policy().poll_interval,
                || async move { Ok::<_, E2eError>(!page.is_visible(target).await?) },
            )
            .await?;
        }

        Step::SelectRowsPerPage { size } => {
            let region = ctx.region()?.clone();
            let selector = pages::rows_per_page();
            let option = Locator::role("option").named(size.to_string()).exact();
            ctx.retrier
                .run("open rows-per-page", "page size options visible", || page.click(&selector), || {
                    page.is_visible(&option)
                })
                .await?;
            page.click(&option).await?;
            ctx.stabilizer.stabilize(page, &region).await?;
        }

        Step::NextPage { expect_changed } => {
            let region = ctx.region()?.clone();
            let before = table::snapshot(page, &region).await?;
            page.click(&pages::next_page()).await?;
            ctx.stabilizer.stabilize(page, &region).await?;
            let after = table::snapshot(page, &region).await?;
            if *expect_changed && before.first() == after.first() {
                warn!("Next page shows the same first row; pagination may not have advanced");
            }
        }

        Step::Export { trigger, expect_any } => {
            let path = page
                .download(trigger, &ctx.config.download_dir, ctx.config.download_timeout())
                .await?;
            verify_download(&path, expect_any)?;
        }

        Step::SkipUnless { target, reason } => {
            if probe_visible(page, target, ctx.config.probe_timeout()).await? == Probe::Absent {
                return Ok(StepOutcome::Skip(reason.clone()));
            }
        }

        Step::Probe { target, expect } => {
            let probe = match expect {
                Some(text) => probe_text(page, target, text).await?,
                None => probe_visible(page, target, ctx.config.probe_timeout()).await?,
            };
            info!("Probe {}: {:?}", target, probe);
        }

        Step::Screenshot { name } => {
            let path = ctx.config.screenshot_dir().join(format!("{}.png", name));
            page.screenshot(&path).await?;
        }

        Step::Log { message } => info!("{}", message),
    }

    Ok(StepOutcome::Continue)
}

fn record_sort(ctx: &mut SuiteContext<'_>, column: usize, direction: SortDirection, check: SortCheck) {
    if let SortCheck::SoftPassed { observed, .. } = check {
        ctx.coverage_gaps.push(coverage_gap(column, direction, observed.len()));
    }
}

fn coverage_gap(column: usize, direction: SortDirection, values: usize) -> String {
    format!(
        "column {} {} sort order unverified on exempt column ({} values)",
        column, direction, values
    )
}

/// Runs suites serially against one page
pub struct SuiteRunner {
    config: SuiteConfig,
    selection: Selection,
}

impl SuiteRunner {
    pub fn new(config: SuiteConfig) -> Self {
        Self {
            config,
            selection: Selection::default(),
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Authenticate once, then run every selected suite
    pub async fn run_all(&self, page: &dyn Page, suites: &[SuiteSpec]) -> E2eResult<RunSummary> {
        let start = Instant::now();
        let origin = session::establish(page, &self.config.session_settings()).await?;

        let mut summary = RunSummary {
            session: Some(origin),
            ..Default::default()
        };

        for suite in suites.iter().filter(|s| self.selection.suite_selected(s)) {
            for result in self.run_suite(page, suite).await {
                summary.push(result);
            }
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            summary.passed, summary.failed, summary.skipped, summary.duration_ms
        );
        Ok(summary)
    }

    /// Run one suite. Never fails as a whole: setup errors fail each scenario.
    pub async fn run_suite(&self, page: &dyn Page, suite: &SuiteSpec) -> Vec<ScenarioResult> {
        let scenarios: Vec<&Scenario> = suite
            .scenarios
            .iter()
            .filter(|s| self.selection.scenario_selected(suite, s))
            .collect();
        if scenarios.is_empty() {
            return Vec::new();
        }

        info!("Suite '{}' ({} scenario(s))", suite.name, scenarios.len());
        let mut ctx = SuiteContext::new(page, &self.config, suite);

        let setup = self.setup(&mut ctx, suite).await;
        let mut results = Vec::with_capacity(scenarios.len());

        for scenario in scenarios {
            let result = match &setup {
                Ok(()) => {
                    let result = self.run_scenario(&mut ctx, suite, scenario).await;
                    ctx.cleanup("After scenario", &suite.after_each).await;
                    result
                }
                Err(e) => ScenarioResult {
                    suite: suite.name.clone(),
                    id: scenario.id.clone(),
                    title: scenario.title.clone(),
                    verdict: Verdict::Failed {
                        step: "setup".to_string(),
                        error: e.to_string(),
                    },
                    steps_run: 0,
                    duration_ms: 0,
                    coverage_gaps: Vec::new(),
                },
            };
            results.push(result);
        }

        ctx.cleanup("Teardown", &suite.teardown).await;
        results
    }

    async fn setup(&self, ctx: &mut SuiteContext<'_>, suite: &SuiteSpec) -> E2eResult<()> {
        session::navigate(ctx.page, &ctx.session, suite.module, &ctx.retrier).await?;
        for step in &suite.setup {
            execute(ctx, step).await.map_err(|e| E2eError::StepFailed {
                step: step.label(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    async fn run_scenario(&self, ctx: &mut SuiteContext<'_>, suite: &SuiteSpec, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        let mut steps_run = 0;
        let mut verdict = Verdict::Passed;
        ctx.coverage_gaps.clear();
        ctx.marked_rows = None;

        for step in &scenario.steps {
            steps_run += 1;
            match execute(ctx, step).await {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Skip(reason)) => {
                    verdict = Verdict::Skipped { reason };
                    break;
                }
                Err(e) => {
                    verdict = Verdict::Failed {
                        step: step.label(),
                        error: e.to_string(),
                    };
                    break;
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        match &verdict {
            Verdict::Passed => info!("✓ {} {} ({} ms)", scenario.id, scenario.title, duration_ms),
            Verdict::Skipped { reason } => info!("- {} {} skipped: {}", scenario.id, scenario.title, reason),
            Verdict::Failed { step, error } => {
                error!("✗ {} {} - {}: {}", scenario.id, scenario.title, step, error);
                self.capture_failure(ctx.page, suite, scenario).await;
            }
        }

        ScenarioResult {
            suite: suite.name.clone(),
            id: scenario.id.clone(),
            title: scenario.title.clone(),
            verdict,
            steps_run,
            duration_ms,
            coverage_gaps: std::mem::take(&mut ctx.coverage_gaps),
        }
    }

    async fn capture_failure(&self, page: &dyn Page, suite: &SuiteSpec, scenario: &Scenario) {
        let path = self
            .config
            .screenshot_dir()
            .join(format!("{}-{}-failure.png", suite.name, scenario.id));
        if let Err(e) = page.screenshot(&path).await {
            warn!("Could not capture failure screenshot: {}", e);
        }
    }

    /// Write run results to JSON file
    pub fn write_results(&self, summary: &RunSummary) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.results_path();
        let json = serde_json::to_string_pretty(summary)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

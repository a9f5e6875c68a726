//! Session bootstrap and full suite runs against the in-memory page
//!
//! Run with: cargo test --package omnigrowth-e2e --test suite_run

use std::path::Path;

use omnigrowth_e2e::config::SuiteConfig;
use omnigrowth_e2e::error::E2eError;
use omnigrowth_e2e::locator::Locator;
use omnigrowth_e2e::page::{Page, StorageState};
use omnigrowth_e2e::pages::{self, AppModule};
use omnigrowth_e2e::runner::{RunSummary, Selection, SuiteRunner, Verdict};
use omnigrowth_e2e::session::{self, SessionOrigin};
use omnigrowth_e2e::sort::SortDirection;
use omnigrowth_e2e::spec::{Step, SuiteSpec};
use omnigrowth_e2e::stub::{customer_fixture, ClickEffect, StubPage};
use omnigrowth_e2e::table::TableRegion;

const EMAIL: &str = "qa@example.com";
const PASSWORD: &str = "correct-horse";

fn config(dir: &Path) -> SuiteConfig {
    let mut config = SuiteConfig {
        base_url: "https://omnigrowth.test".into(),
        auth_state_path: dir.join(".auth/state.json"),
        output_dir: dir.join("results"),
        download_dir: dir.join("downloads"),
        ..Default::default()
    };
    config.credentials.email = EMAIL.into();
    config.credentials.password = Some(PASSWORD.into());

    let t = &mut config.timeouts;
    t.table_wait_ms = 1_000;
    t.rows_wait_ms = 1_000;
    t.spinner_wait_ms = 1_000;
    t.network_idle_ms = 500;
    t.grace_ms = 50;
    t.poll_interval_ms = 50;
    t.retry_attempt_ms = 300;
    t.login_ms = 1_000;
    t.probe_ms = 300;
    t.download_ms = 500;
    config
}

fn customers_page() -> StubPage {
    let region = TableRegion::default();
    let rfm = AppModule::Customers.filters().remove(0);
    let menu = pages::sort_menu();
    let desc = Locator::text("Desc").first().within(&menu);

    StubPage::new(&region, customer_fixture())
        .with_login(EMAIL, PASSWORD)
        .with_spinner_polls(2)
        .with_filter(&rfm, 1, &["Champions", "Loyal", "At Risk", "No Sales"], 2, true)
        .with_flaky_toggle(pages::sort_header("Total"), menu.clone(), 1)
        .with_element(desc.clone(), "Desc")
        .with_effect(
            desc.clone(),
            ClickEffect::Sort {
                column: 5,
                direction: SortDirection::Desc,
            },
        )
        .with_effect(desc, ClickEffect::Hide(menu))
        .with_element(Locator::role("button").named("Export").exact(), "Export")
}

const CUSTOMERS_SUITE: &str = r#"
name: customers
module: customers
tags: [smoke]
setup:
  - action: wait_table
scenarios:
  - id: CUST-001
    title: RFM filter narrows and restores rows
    steps:
      - action: filter
        filter: RFM
        option: Champions
      - action: assert_rows_contain
        column: 1
        value: Champions
      - action: assert_row_count
        min: 5
        max: 5
      - action: clear_filter
        filter: RFM
      - action: assert_row_count
        min: 20
  - id: CUST-002
    title: Total sorts descending
    tags: [sort]
    steps:
      - action: sort
        header: Total
        column: 5
        direction: desc
  - id: CUST-003
    title: Bulk actions when offered
    steps:
      - action: skip_unless
        target: { css: ".bulk-actions" }
        reason: bulk actions not offered
      - action: click
        target: { css: ".bulk-actions" }
  - id: CUST-004
    title: Unknown customer is listed
    steps:
      - action: assert_table_contains
        text: Nobody Here
  - id: CUST-005
    title: Export downloads a CSV
    steps:
      - action: export
        trigger: { role: button, name: Export, exact: true }
        expect_any: [Date, Customer]
"#;

/// Five-per-page selector and a next-page control over the customer table
fn with_pagination(page: StubPage) -> StubPage {
    let five = Locator::role("option").named("5").exact();
    page.with_flaky_toggle(pages::rows_per_page(), five.clone(), 1)
        .with_effect(five.clone(), ClickEffect::SetPageSize(5))
        .with_effect(five.clone(), ClickEffect::Hide(five))
        .with_element(pages::next_page(), "Next page")
        .with_effect(pages::next_page(), ClickEffect::NextPage)
}

const CLEANUP_SUITE: &str = r#"
name: customers
module: customers
setup:
  - action: wait_table
after_each:
  - action: press
    key: Escape
  - action: click
    target: { css: ".dialog-close" }
scenarios:
  - id: CUST-A
    title: Filter then fail
    steps:
      - action: filter
        filter: RFM
        option: Champions
      - action: assert_table_contains
        text: Nobody Here
  - id: CUST-B
    title: Every customer is listed again
    steps:
      - action: assert_row_count
        min: 20
"#;

const PAGINATION_SUITE: &str = r#"
name: customers
module: customers
setup:
  - action: wait_table
scenarios:
  - id: CUST-028
    title: Five rows per page, then the second page
    steps:
      - action: select_rows_per_page
        size: 5
      - action: assert_row_count
        min: 5
        max: 5
      - action: assert_table_contains
        text: Customer 04
      - action: next_page
        expect_changed: true
      - action: assert_row_count
        max: 5
      - action: assert_table_contains
        text: Customer 05
"#;

const SINGLE_PAGE_SUITE: &str = r#"
name: customers
module: customers
setup:
  - action: wait_table
scenarios:
  - id: CUST-029
    title: Next page on a single page
    steps:
      - action: next_page
        expect_changed: true
      - action: assert_row_count
        min: 20
"#;

const DELETE_SUITE: &str = r#"
name: customers
module: customers
setup:
  - action: wait_table
scenarios:
  - id: CUST-DEL-1
    title: Deleting a customer removes its row
    steps:
      - action: mark_row_count
      - action: click
        target: { role: button, name: Delete, exact: true }
      - action: wait_table
      - action: assert_row_count_decreased
  - id: CUST-DEL-2
    title: A delete that leaves the table untouched fails
    steps:
      - action: mark_row_count
      - action: click
        target: { role: button, name: Cancel, exact: true }
      - action: wait_table
      - action: assert_row_count_decreased
"#;

const LAYERS_SUITE: &str = r#"
name: battle_map
module: battle_map
scenarios:
  - id: BM-003
    title: Map layers menu opens
    steps:
      - action: click_until
        target: { role: button, name: Map Layers, exact: true }
        until: { text: RFM Segments, exact: true }
      - action: probe
        target: { text: RFM Segments, exact: true }
        expect: RFM
      - action: assert_visible
        target: { text: RFM Segments, exact: true }
"#;

fn verdict<'a>(summary: &'a RunSummary, id: &str) -> &'a Verdict {
    &summary
        .results
        .iter()
        .find(|r| r.id == id)
        .unwrap_or_else(|| panic!("no result for {}", id))
        .verdict
}

// --- Session bootstrap ---

#[tokio::test(start_paused = true)]
async fn login_once_then_reuse_saved_state() {
    let dir = tempfile::tempdir().unwrap();
    let settings = config(dir.path()).session_settings();

    let first = customers_page();
    let origin = session::establish(&first, &settings).await.unwrap();
    assert_eq!(origin, SessionOrigin::LoggedIn);
    assert!(first.is_authenticated());
    assert!(settings.state_path.exists());

    let second = customers_page();
    let origin = session::establish(&second, &settings).await.unwrap();
    assert_eq!(origin, SessionOrigin::Reused);
    assert!(second.is_authenticated());
    assert_eq!(second.input_value(&session::email_field()), None);
}

#[tokio::test(start_paused = true)]
async fn rejected_state_falls_back_to_login() {
    let dir = tempfile::tempdir().unwrap();
    let settings = config(dir.path()).session_settings();
    StorageState {
        origin: settings.base_url.clone(),
        cookies: "session=expired".into(),
        ..Default::default()
    }
    .save(&settings.state_path)
    .unwrap();

    let page = customers_page();
    let origin = session::establish(&page, &settings).await.unwrap();
    assert_eq!(origin, SessionOrigin::LoggedIn);
    assert_eq!(page.input_value(&session::email_field()).as_deref(), Some(EMAIL));
}

#[tokio::test(start_paused = true)]
async fn reuse_disabled_always_logs_in() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());

    session::establish(&customers_page(), &config.session_settings()).await.unwrap();
    config.reuse_auth = false;

    let origin = session::establish(&customers_page(), &config.session_settings()).await.unwrap();
    assert_eq!(origin, SessionOrigin::LoggedIn);
}

#[tokio::test(start_paused = true)]
async fn wrong_password_times_out_waiting_for_shell() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = config(dir.path()).session_settings();
    settings.password = Some("wrong".into());

    let err = session::establish(&customers_page(), &settings).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(!settings.state_path.exists());
}

#[tokio::test(start_paused = true)]
async fn missing_password_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = config(dir.path()).session_settings();
    settings.password = None;

    let err = session::establish(&customers_page(), &settings).await.unwrap_err();
    assert!(matches!(err, E2eError::Config(_)));
}

#[tokio::test(start_paused = true)]
async fn teams_is_reached_through_admin_menu() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let retrier = omnigrowth_e2e::ActionRetrier::new(config.retry_policy());

    // Admin starts hidden behind the collapsed sidebar
    let page = customers_page()
        .with_flaky_toggle(session::admin_menu(), session::teams_link(), 2)
        .with_hidden(session::admin_menu(), "Admin")
        .with_effect(
            session::shell_marker(),
            ClickEffect::Reveal {
                target: session::admin_menu(),
                clicks_needed: 1,
            },
        )
        .with_effect(session::teams_link(), ClickEffect::Navigate("https://omnigrowth.test/admin/teams".into()));
    page.set_authenticated(true);

    session::navigate(&page, &config.session_settings(), AppModule::Teams, &retrier)
        .await
        .unwrap();

    assert_eq!(page.clicks(&session::shell_marker()), 1);
    assert_eq!(page.clicks(&session::admin_menu()), 2);
    assert_eq!(page.current_url().await.unwrap(), "https://omnigrowth.test/admin/teams");
}

// --- Suite runs ---

#[tokio::test(start_paused = true)]
async fn customers_suite_reports_each_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let runner = SuiteRunner::new(config(dir.path()));
    let suite = SuiteSpec::from_yaml(CUSTOMERS_SUITE).unwrap();
    let page = customers_page().with_download_content("Date,Customer,Total\nJul 1,Ann,$10\n");

    let summary = runner.run_all(&page, &[suite]).await.unwrap();

    assert_eq!(summary.session, Some(SessionOrigin::LoggedIn));
    assert_eq!((summary.total, summary.passed, summary.failed, summary.skipped), (5, 3, 1, 1));
    assert_eq!(verdict(&summary, "CUST-001"), &Verdict::Passed);
    assert_eq!(verdict(&summary, "CUST-002"), &Verdict::Passed);
    assert!(matches!(verdict(&summary, "CUST-003"), Verdict::Skipped { reason } if reason == "bulk actions not offered"));
    match verdict(&summary, "CUST-004") {
        Verdict::Failed { step, error } => {
            assert_eq!(step, "table contains 'Nobody Here'");
            assert!(error.contains("Nobody Here"));
        }
        other => panic!("unexpected verdict {:?}", other),
    }
    assert_eq!(verdict(&summary, "CUST-005"), &Verdict::Passed);

    // Failure screenshot and teardown leave the page clean
    assert!(dir
        .path()
        .join("results/screenshots/customers-CUST-004-failure.png")
        .exists());
    assert_eq!(page.active_filter(), None);

    let path = runner.write_results(&summary).unwrap();
    let written: RunSummary = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written.total, 5);
    assert_eq!(written.results[0].id, "CUST-001");
}

#[tokio::test(start_paused = true)]
async fn selection_narrows_to_tagged_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let runner = SuiteRunner::new(config(dir.path())).with_selection(Selection {
        tag: Some("sort".into()),
        ..Default::default()
    });
    let suite = SuiteSpec::from_yaml(CUSTOMERS_SUITE).unwrap();

    let summary = runner.run_all(&customers_page(), &[suite]).await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.results[0].id, "CUST-002");
    assert!(summary.success());
}

#[tokio::test(start_paused = true)]
async fn other_module_selection_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let runner = SuiteRunner::new(config(dir.path())).with_selection(Selection {
        module: Some(AppModule::Stores),
        ..Default::default()
    });
    let suite = SuiteSpec::from_yaml(CUSTOMERS_SUITE).unwrap();

    let summary = runner.run_all(&customers_page(), &[suite]).await.unwrap();
    assert_eq!(summary.total, 0);
    assert!(summary.success());
}

#[tokio::test(start_paused = true)]
async fn setup_failure_fails_every_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let runner = SuiteRunner::new(config(dir.path()));
    let suite = SuiteSpec::from_yaml(CUSTOMERS_SUITE).unwrap();
    let page = customers_page().with_table_hidden();

    let summary = runner.run_all(&page, &[suite]).await.unwrap();
    assert_eq!(summary.failed, 5);
    for result in &summary.results {
        assert!(matches!(&result.verdict, Verdict::Failed { step, .. } if step == "setup"));
    }
}

#[tokio::test(start_paused = true)]
async fn filters_are_reset_after_a_failed_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let runner = SuiteRunner::new(config(dir.path()));
    let suite = SuiteSpec::from_yaml(CLEANUP_SUITE).unwrap();
    let page = customers_page();

    let summary = runner.run_all(&page, &[suite]).await.unwrap();

    assert!(matches!(verdict(&summary, "CUST-A"), Verdict::Failed { .. }));
    assert_eq!(verdict(&summary, "CUST-B"), &Verdict::Passed);
    assert_eq!(page.active_filter(), None);
    // after_each ran for both scenarios; the missing close button only warned
    assert_eq!(page.pressed_keys(), vec!["Escape".to_string(), "Escape".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn rows_per_page_and_next_page() {
    let dir = tempfile::tempdir().unwrap();
    let runner = SuiteRunner::new(config(dir.path()));
    let suite = SuiteSpec::from_yaml(PAGINATION_SUITE).unwrap();
    let page = with_pagination(customers_page());

    let summary = runner.run_all(&page, &[suite]).await.unwrap();

    assert_eq!(verdict(&summary, "CUST-028"), &Verdict::Passed);
    assert_eq!(page.clicks(&pages::rows_per_page()), 1);
    assert_eq!(page.clicks(&pages::next_page()), 1);
    assert_eq!(page.matching_row_count(), 20);
}

#[tokio::test(start_paused = true)]
async fn unchanged_next_page_only_warns() {
    let dir = tempfile::tempdir().unwrap();
    let runner = SuiteRunner::new(config(dir.path()));
    let suite = SuiteSpec::from_yaml(SINGLE_PAGE_SUITE).unwrap();
    let page = with_pagination(customers_page());

    let summary = runner.run_all(&page, &[suite]).await.unwrap();

    assert_eq!(verdict(&summary, "CUST-029"), &Verdict::Passed);
    assert_eq!(page.clicks(&pages::next_page()), 1);
}

#[tokio::test(start_paused = true)]
async fn delete_must_reduce_the_row_count() {
    let dir = tempfile::tempdir().unwrap();
    let runner = SuiteRunner::new(config(dir.path()));
    let suite = SuiteSpec::from_yaml(DELETE_SUITE).unwrap();
    let delete = Locator::role("button").named("Delete").exact();
    let page = customers_page()
        .with_element(delete.clone(), "Delete")
        .with_effect(delete, ClickEffect::RemoveFirstRow)
        .with_element(Locator::role("button").named("Cancel").exact(), "Cancel");

    let summary = runner.run_all(&page, &[suite]).await.unwrap();

    assert_eq!(verdict(&summary, "CUST-DEL-1"), &Verdict::Passed);
    match verdict(&summary, "CUST-DEL-2") {
        Verdict::Failed { step, error } => {
            assert_eq!(step, "row count decreased");
            assert!(error.contains("19 before, 19 after"), "{}", error);
        }
        other => panic!("unexpected verdict {:?}", other),
    }
    assert_eq!(page.matching_row_count(), 19);
}

#[tokio::test(start_paused = true)]
async fn click_until_retries_a_flaky_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let runner = SuiteRunner::new(config(dir.path()));
    let suite = SuiteSpec::from_yaml(LAYERS_SUITE).unwrap();
    let layers = Locator::role("button").named("Map Layers").exact();
    let page = customers_page().with_flaky_toggle(layers.clone(), Locator::text("RFM Segments").exact(), 2);

    let summary = runner.run_all(&page, &[suite]).await.unwrap();

    assert_eq!(verdict(&summary, "BM-003"), &Verdict::Passed);
    assert_eq!(page.clicks(&layers), 2);
}

#[test]
fn bundled_suites_parse() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("suites");
    let suites = SuiteSpec::load_all(&dir).unwrap();

    let modules: Vec<AppModule> = suites.iter().map(|s| s.module).collect();
    for module in AppModule::ALL {
        assert!(modules.contains(&module), "no suite for {}", module);
    }
    assert!(suites.iter().all(|s| !s.scenarios.is_empty()));

    let ids = |module: AppModule| -> Vec<String> {
        suites
            .iter()
            .filter(|s| s.module == module)
            .flat_map(|s| s.scenarios.iter().map(|sc| sc.id.clone()))
            .collect()
    };
    let battle_map = ids(AppModule::BattleMap);
    for id in ["BM-013", "BM-014", "BM-015", "BM-044", "BM-045", "BM-049"] {
        assert!(battle_map.iter().any(|b| b == id), "battle map lacks {}", id);
    }
    assert!(ids(AppModule::MonthlySummary).iter().any(|m| m == "MS-010"));

    // Delete flows must check the row count actually drops
    for (module, id) in [
        (AppModule::PhoneCalls, "PCM-010"),
        (AppModule::SalesMaterials, "SM-019"),
    ] {
        let scenario = suites
            .iter()
            .filter(|s| s.module == module)
            .flat_map(|s| s.scenarios.iter())
            .find(|sc| sc.id == id)
            .unwrap();
        assert!(scenario
            .steps
            .iter()
            .any(|step| matches!(step, Step::AssertRowCountDecreased)));
    }
}

//! Helper-layer behaviour against the in-memory page
//!
//! Run with: cargo test --package omnigrowth-e2e --test helpers

use std::cmp::Ordering;
use std::time::Duration;

use test_case::test_case;

use omnigrowth_e2e::error::E2eError;
use omnigrowth_e2e::filter::{FilterChoice, FilterControl, FilterController};
use omnigrowth_e2e::locator::Locator;
use omnigrowth_e2e::page::Page;
use omnigrowth_e2e::pages::{self, AppModule};
use omnigrowth_e2e::probe::{probe_text, Probe};
use omnigrowth_e2e::retry::{ActionRetrier, RetryPolicy};
use omnigrowth_e2e::sort::{verify_column_sorted, verify_sorted, ColumnValue, Normalizer, SortCheck, SortDirection};
use omnigrowth_e2e::stub::{customer_fixture, ClickEffect, StubPage};
use omnigrowth_e2e::table::{self, StabilizeConfig, TableRegion, TableStabilizer};

const SEGMENTS: [&str; 4] = ["Champions", "Loyal", "At Risk", "No Sales"];

fn stabilizer() -> TableStabilizer {
    TableStabilizer::new(StabilizeConfig {
        spinner_timeout: Duration::from_secs(2),
        table_timeout: Duration::from_secs(2),
        rows_timeout: Duration::from_secs(2),
        network_idle_timeout: Duration::from_secs(1),
        grace: Duration::from_millis(100),
        poll_interval: Duration::from_millis(50),
    })
}

fn retrier(attempts: u32) -> ActionRetrier {
    ActionRetrier::new(RetryPolicy {
        attempts,
        per_attempt_timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(50),
    })
}

fn rfm() -> FilterControl {
    AppModule::Customers.filters().remove(0)
}

fn strings(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

// --- Table stabilization ---

#[tokio::test(start_paused = true)]
async fn stabilize_twice_reads_the_same_rows() {
    let region = TableRegion::default();
    let page = StubPage::new(&region, customer_fixture())
        .with_spinner_polls(3)
        .with_placeholder_polls(2);
    let stabilizer = stabilizer();

    let first = stabilizer.stabilize(&page, &region).await.unwrap();
    let rows_first = table::snapshot(&page, &region).await.unwrap();
    let second = stabilizer.stabilize(&page, &region).await.unwrap();
    let rows_second = table::snapshot(&page, &region).await.unwrap();

    assert!(first.has_data());
    assert!(first.spinner_cleared);
    assert_eq!(first, second);
    assert_eq!(rows_first, rows_second);
    assert_eq!(rows_first.len(), 20);
}

#[tokio::test(start_paused = true)]
async fn stuck_spinner_does_not_fail_stabilization() {
    let region = TableRegion::default();
    let page = StubPage::new(&region, customer_fixture()).with_spinner_polls(10_000);

    let report = stabilizer().stabilize(&page, &region).await.unwrap();
    assert!(!report.spinner_cleared);
    assert!(report.has_data());
}

#[tokio::test(start_paused = true)]
async fn missing_table_is_a_timeout() {
    let region = TableRegion::default();
    let page = StubPage::new(&region, customer_fixture()).with_table_hidden();

    let err = stabilizer().stabilize(&page, &region).await.unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test(start_paused = true)]
async fn empty_state_is_reported_not_failed() {
    let region = TableRegion::default();
    let page = StubPage::new(&region, Vec::new());

    let report = stabilizer().stabilize(&page, &region).await.unwrap();
    assert!(!report.has_data());
    assert_eq!(report.rows, Probe::Differs("No results.".to_string()));
    assert_eq!(table::row_count(&page, &region).await.unwrap(), 0);
    assert_eq!(
        table::verify_column_contains(&page, &region, 1, "Champions", 10)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn stuck_placeholder_reports_no_data() {
    let region = TableRegion::default();
    let page = StubPage::new(&region, customer_fixture()).with_placeholder_polls(10_000);

    let report = stabilizer().stabilize(&page, &region).await.unwrap();
    assert!(!report.has_data());
}

#[tokio::test(start_paused = true)]
async fn busy_network_is_reported() {
    let region = TableRegion::default();
    let page = StubPage::new(&region, customer_fixture()).with_network_busy();

    let report = stabilizer().stabilize(&page, &region).await.unwrap();
    assert!(!report.network_idle);
    assert!(report.has_data());
}

#[tokio::test]
async fn optional_text_separates_match_difference_and_absence() {
    let badge = Locator::css(".segment-badge");
    let page = StubPage::new(&TableRegion::default(), customer_fixture()).with_element(badge.clone(), "Champions");

    assert_eq!(probe_text(&page, &badge, "Champ").await.unwrap(), Probe::Matches);
    assert_eq!(
        probe_text(&page, &badge, "Loyal").await.unwrap(),
        Probe::Differs("Champions".into())
    );
    assert_eq!(
        probe_text(&page, &Locator::css(".missing"), "Loyal").await.unwrap(),
        Probe::Absent
    );
}

// --- Normalization ---

#[test_case("Champions", "rank" ; "rank label")]
#[test_case("At Risk\n", "rank" ; "rank with newline")]
#[test_case("Jul 16, 2025", "timestamp" ; "month date")]
#[test_case("Jul 16, 2025, 10:34 PM", "timestamp" ; "month date with time")]
#[test_case("7/16/2025", "timestamp" ; "slash date")]
#[test_case("7/16/25", "timestamp" ; "short year")]
#[test_case("2025-07-16", "timestamp" ; "iso date")]
#[test_case("$1,234.50", "number" ; "currency")]
#[test_case("12.5%", "number" ; "percent")]
#[test_case("-", "text" ; "lone dash")]
#[test_case("", "text" ; "empty")]
#[test_case("   ", "text" ; "whitespace")]
#[test_case("N/A", "text" ; "not available")]
#[test_case("Café Olé", "text" ; "accented")]
#[test_case("13/45/2025", "number" ; "impossible date")]
fn normalize_is_total(raw: &str, kind: &str) {
    let normalizer = Normalizer::default();
    let value = normalizer.normalize(raw);

    let actual = match &value {
        ColumnValue::Rank(_) => "rank",
        ColumnValue::Timestamp(_) => "timestamp",
        ColumnValue::Number(_) => "number",
        ColumnValue::Text(_) => "text",
    };
    assert_eq!(actual, kind, "{:?} -> {:?}", raw, value);
    assert_eq!(value.compare(&normalizer.normalize(raw)), Ordering::Equal);
}

#[test]
fn text_folding_ignores_case_and_accents() {
    let normalizer = Normalizer::default();
    let a = normalizer.normalize("CAFÉ");
    let b = normalizer.normalize("café");
    assert_eq!(a.compare(&b), Ordering::Equal);
}

// --- Sort verification ---

#[test_case(&["$9.00", "$10.00", "$1,200.00"], SortDirection::Asc ; "currency ascending")]
#[test_case(&["$1,200.00", "$10.00", "$9.00"], SortDirection::Desc ; "currency descending")]
#[test_case(&["Jul 2, 2025", "Jul 10, 2025", "Aug 1, 2025"], SortDirection::Asc ; "dates ascending")]
#[test_case(&["12/31/24", "2025-01-02", "Jan 3, 2025"], SortDirection::Asc ; "mixed date formats")]
#[test_case(&["Champions", "Loyal", "Potential", "At Risk", "No Sales"], SortDirection::Desc ; "ranks descending")]
#[test_case(&["No Sales", "At Risk", "At Risk", "Champions"], SortDirection::Asc ; "ranks with ties")]
#[test_case(&["7", "12", "n/a"], SortDirection::Asc ; "digits before letters")]
fn sorted_columns_pass(cells: &[&str], direction: SortDirection) {
    let policy = AppModule::Stores.sort_policy();
    let check = verify_sorted(&strings(cells), 3, direction, &policy).unwrap();
    assert_eq!(check, SortCheck::Sorted);
}

#[test_case(&["-", "$10"], SortDirection::Asc ; "placeholder before amount")]
#[test_case(&["$10", "-"], SortDirection::Desc ; "amount before placeholder")]
#[test_case(&["$9.00", "$1,200.00", "N/A"], SortDirection::Asc ; "not available last")]
fn mixed_placeholder_columns_compare_as_text(cells: &[&str], direction: SortDirection) {
    let policy = AppModule::Customers.sort_policy();
    assert!(!policy.is_exempt(5));
    let check = verify_sorted(&strings(cells), 5, direction, &policy).unwrap();
    assert_eq!(check, SortCheck::Sorted);
}

#[test]
fn dates_are_not_compared_as_text() {
    let cells = strings(&["Aug 1, 2025", "Jul 2, 2025"]);
    let policy = AppModule::Visits.sort_policy();
    assert!(verify_sorted(&cells, 0, SortDirection::Asc, &policy).is_err());
    assert_eq!(
        verify_sorted(&cells, 0, SortDirection::Desc, &policy).unwrap(),
        SortCheck::Sorted
    );
}

#[test]
fn mismatch_reports_both_orders() {
    let cells = strings(&["$10.00", "$9.00", "$11.00"]);
    let err = verify_sorted(&cells, 5, SortDirection::Asc, &AppModule::Customers.sort_policy()).unwrap_err();
    match err {
        E2eError::SortMismatch {
            column,
            direction,
            observed,
            expected,
        } => {
            assert_eq!(column, 5);
            assert_eq!(direction, "asc");
            assert_eq!(observed, cells);
            assert_eq!(expected, strings(&["$9.00", "$10.00", "$11.00"]));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn single_value_is_too_few() {
    let check = verify_sorted(&strings(&["$1.00"]), 5, SortDirection::Desc, &Default::default()).unwrap();
    assert_eq!(check, SortCheck::TooFewValues);
}

#[test_case(0 ; "customer name")]
#[test_case(2 ; "email")]
#[test_case(3 ; "phone")]
#[test_case(4 ; "address")]
#[test_case(6 ; "last purchased")]
fn exempt_columns_never_hard_fail(column: usize) {
    let policy = AppModule::Customers.sort_policy();
    let mut cells: Vec<String> = customer_fixture().into_iter().map(|r| r[column].clone()).collect();
    cells.swap(0, 7);

    for direction in [SortDirection::Asc, SortDirection::Desc] {
        let check = verify_sorted(&cells, column, direction, &policy).unwrap();
        assert!(matches!(check, SortCheck::Sorted | SortCheck::SoftPassed { .. }));
    }
}

#[test_case(1 ; "segment")]
#[test_case(5 ; "total")]
fn unsorted_non_exempt_columns_fail(column: usize) {
    let policy = AppModule::Customers.sort_policy();
    let cells: Vec<String> = customer_fixture().into_iter().map(|r| r[column].clone()).collect();
    for direction in [SortDirection::Asc, SortDirection::Desc] {
        let err = verify_sorted(&cells, column, direction, &policy).unwrap_err();
        assert!(matches!(err, E2eError::SortMismatch { .. }));
    }
}

#[tokio::test(start_paused = true)]
async fn sorting_through_header_menu_verifies() {
    let region = TableRegion::default();
    let header = pages::sort_header("Total");
    let menu = pages::sort_menu();
    let desc = Locator::text("Desc").first().within(&menu);

    let page = StubPage::new(&region, customer_fixture())
        .with_flaky_toggle(header.clone(), menu.clone(), 2)
        .with_element(desc.clone(), "Desc")
        .with_effect(
            desc.clone(),
            ClickEffect::Sort {
                column: 5,
                direction: SortDirection::Desc,
            },
        )
        .with_effect(desc.clone(), ClickEffect::Hide(menu.clone()));

    let policy = AppModule::Customers.sort_policy();
    assert!(verify_column_sorted(&page, &region, 5, SortDirection::Desc, &policy).await.is_err());

    let attempts = retrier(3)
        .run("open sort menu", "menu visible", || page.click(&header), || page.is_visible(&menu))
        .await
        .unwrap();
    assert_eq!(attempts, 2);

    page.click(&desc).await.unwrap();
    stabilizer().stabilize(&page, &region).await.unwrap();

    let check = verify_column_sorted(&page, &region, 5, SortDirection::Desc, &policy).await.unwrap();
    assert_eq!(check, SortCheck::Sorted);
    assert!(!page.is_visible(&menu).await.unwrap());
}

// --- Action retrier ---

#[test_case(1 ; "first try")]
#[test_case(2 ; "second try")]
#[test_case(3 ; "last try")]
#[tokio::test(start_paused = true)]
async fn retrier_succeeds_within_budget(clicks_needed: u32) {
    let region = TableRegion::default();
    let trigger = Locator::role("button").named("Admin").exact();
    let target = Locator::css("a").has_text("Teams");
    let page = StubPage::new(&region, Vec::new()).with_flaky_toggle(trigger.clone(), target.clone(), clicks_needed);

    let attempt = retrier(3)
        .run("click Admin", "Teams visible", || page.click(&trigger), || page.is_visible(&target))
        .await
        .unwrap();

    assert_eq!(attempt, clicks_needed);
    assert_eq!(page.clicks(&trigger), clicks_needed);
}

#[tokio::test(start_paused = true)]
async fn retrier_exhausts_past_budget() {
    let region = TableRegion::default();
    let trigger = Locator::role("button").named("Admin").exact();
    let target = Locator::css("a").has_text("Teams");
    let page = StubPage::new(&region, Vec::new()).with_flaky_toggle(trigger.clone(), target.clone(), 4);

    let err = retrier(3)
        .run("click Admin", "Teams visible", || page.click(&trigger), || page.is_visible(&target))
        .await
        .unwrap_err();

    match err {
        E2eError::RetryExhausted {
            action,
            predicate,
            attempts,
            last_error,
        } => {
            assert_eq!(action, "click Admin");
            assert_eq!(predicate, "Teams visible");
            assert_eq!(attempts, 3);
            assert!(last_error.is_some());
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(page.clicks(&trigger), 3);
}

// --- Filter controller ---

#[tokio::test(start_paused = true)]
async fn filter_round_trip_restores_all_rows() {
    let region = TableRegion::default();
    let control = rfm();
    let page = StubPage::new(&region, customer_fixture()).with_filter(&control, 1, &SEGMENTS, 2, true);
    let mut controller = FilterController::new(retrier(3), stabilizer());

    stabilizer().stabilize(&page, &region).await.unwrap();
    assert_eq!(table::row_count(&page, &region).await.unwrap(), 20);

    let report = controller
        .apply(&page, &control, &FilterChoice::Option("Champions".into()), &region)
        .await
        .unwrap();
    assert!(report.has_data());
    assert_eq!(table::row_count(&page, &region).await.unwrap(), 5);
    assert_eq!(
        table::verify_column_contains(&page, &region, 1, "Champions", 10)
            .await
            .unwrap(),
        5
    );
    assert_eq!(controller.selection("RFM").map(|s| s.option.as_str()), Some("Champions"));
    assert!(!page.is_visible(&control.popover).await.unwrap());

    controller
        .apply(&page, &control, &FilterChoice::Clear, &region)
        .await
        .unwrap();
    assert_eq!(table::row_count(&page, &region).await.unwrap(), 20);
    assert!(controller.selection("RFM").is_none());
    assert_eq!(page.active_filter(), None);
}

#[tokio::test(start_paused = true)]
async fn filter_falls_back_to_text_options() {
    let region = TableRegion::default();
    let control = rfm();
    let page = StubPage::new(&region, customer_fixture()).with_filter(&control, 1, &SEGMENTS, 1, false);
    let mut controller = FilterController::new(retrier(3), stabilizer());

    controller
        .apply(&page, &control, &FilterChoice::Option("Loyal".into()), &region)
        .await
        .unwrap();
    assert_eq!(page.active_filter().as_deref(), Some("Loyal"));
    assert_eq!(table::row_count(&page, &region).await.unwrap(), 5);
}

#[tokio::test(start_paused = true)]
async fn unknown_option_is_reported() {
    let region = TableRegion::default();
    let control = rfm();
    let page = StubPage::new(&region, customer_fixture()).with_filter(&control, 1, &SEGMENTS, 1, true);
    let mut controller = FilterController::new(retrier(3), stabilizer());

    let err = controller
        .apply(&page, &control, &FilterChoice::Option("Whales".into()), &region)
        .await
        .unwrap_err();
    match err {
        E2eError::OptionNotFound { filter, option } => {
            assert_eq!(filter, "RFM");
            assert_eq!(option, "Whales");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(controller.selection("RFM").is_none());
}

#[tokio::test(start_paused = true)]
async fn clear_all_resets_every_filter() {
    let region = TableRegion::default();
    let control = rfm();
    let page = StubPage::new(&region, customer_fixture()).with_filter(&control, 1, &SEGMENTS, 1, true);
    let mut controller = FilterController::new(retrier(3), stabilizer());

    controller
        .apply(&page, &control, &FilterChoice::Option("At Risk".into()), &region)
        .await
        .unwrap();
    assert_eq!(page.matching_row_count(), 5);

    controller.clear_all(&page, &region).await;
    assert_eq!(page.matching_row_count(), 20);
    assert_eq!(controller.selections().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn search_with_no_match_shows_empty_state() {
    let region = TableRegion::default();
    let search = Locator::placeholder("Search customers...");
    let page = StubPage::new(&region, customer_fixture()).with_search_box(search.clone());

    page.fill(&search, "zzz-no-such-customer").await.unwrap();
    let report = stabilizer().stabilize(&page, &region).await.unwrap();

    assert!(!report.has_data());
    assert_eq!(table::row_count(&page, &region).await.unwrap(), 0);
}

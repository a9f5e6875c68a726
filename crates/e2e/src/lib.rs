//! OmniGrowthOS E2E Test Suite
//!
//! This crate drives the OmniGrowthOS web application through a real browser
//! and provides a resilient helper layer for its data-table pages:
//! - Waits for tables to settle (spinner gone, real rows, network quiet)
//! - Verifies column sort order against normalized cell values
//! - Applies and clears faceted filters through their popovers
//! - Retries flaky triggers until their effect shows up
//! - Logs in once and reuses the saved session across suites
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  SuiteRunner (serial, one page)             │
//! │    ├── session::establish() -> Reused | LoggedIn            │
//! │    ├── run_suite(SuiteSpec) -> [ScenarioResult]            │
//! │    └── write_results() -> results.json                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Helpers                                                    │
//! │    ├── TableStabilizer   spinner → table → rows → idle      │
//! │    ├── verify_sorted     Normalizer + SortPolicy            │
//! │    ├── FilterController  open → option → stabilize          │
//! │    └── ActionRetrier     action until predicate             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Page trait                                                 │
//! │    ├── ChromePage  (headless Chrome over CDP)               │
//! │    └── StubPage    (in-memory table, `stub` feature)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod chrome;
pub mod config;
pub mod download;
pub mod error;
pub mod filter;
pub mod health;
pub mod locator;
pub mod page;
pub mod pages;
pub mod probe;
pub mod retry;
pub mod runner;
pub mod session;
pub mod sort;
pub mod spec;
/// In-memory [`Page`] test double; enabled by the `stub` feature.
#[cfg(any(test, feature = "stub"))]
pub mod stub;
pub mod table;
pub mod wait;

pub use config::SuiteConfig;
pub use error::{E2eError, E2eResult};
pub use filter::{FilterChoice, FilterControl, FilterController};
pub use locator::Locator;
pub use page::{Page, StorageState};
pub use pages::AppModule;
pub use retry::{ActionRetrier, RetryPolicy};
pub use runner::{RunSummary, SuiteRunner};
pub use sort::{verify_sorted, SortDirection, SortPolicy};
pub use spec::{Scenario, Step, SuiteSpec};
pub use table::{TableRegion, TableStabilizer};

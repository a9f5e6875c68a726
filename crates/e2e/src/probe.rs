//! Three-valued probes for optional UI state
//!
//! Scenarios often need to ask "is this affordance here, and does it show what
//! we expect?" without treating absence as a failure. A [`Probe`] answers that
//! explicitly so the caller decides between pass, soft-pass and fail.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::E2eResult;
use crate::locator::Locator;
use crate::page::Page;
use crate::wait::poll_until;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "probe", content = "observed", rename_all = "snake_case")]
pub enum Probe {
    /// Present and matching the expectation
    Matches,
    /// Present but showing something else
    Differs(String),
    /// Not present at all
    Absent,
}

impl Probe {
    pub fn is_present(&self) -> bool {
        !matches!(self, Probe::Absent)
    }

    pub fn matches(&self) -> bool {
        matches!(self, Probe::Matches)
    }
}

/// Wait up to `timeout` for the locator to become visible.
pub async fn probe_visible(page: &dyn Page, locator: &Locator, timeout: Duration) -> E2eResult<Probe> {
    let appeared = poll_until(
        &format!("{} visible", locator),
        timeout,
        Duration::from_millis(250),
        || page.is_visible(locator),
    )
    .await;

    Ok(match appeared {
        Ok(()) => Probe::Matches,
        Err(e) if e.is_timeout() => Probe::Absent,
        Err(e) => return Err(e),
    })
}

/// Check whether the locator is visible and its text contains `expected`.
pub async fn probe_text(page: &dyn Page, locator: &Locator, expected: &str) -> E2eResult<Probe> {
    if !page.is_visible(locator).await? {
        return Ok(Probe::Absent);
    }
    Ok(match page.text(locator).await? {
        Some(text) if text.contains(expected) => Probe::Matches,
        Some(text) => Probe::Differs(text),
        None => Probe::Absent,
    })
}

//! Applying and clearing table filters
//!
//! A filter control is a trigger button that opens a popover listing options.
//! [`FilterController::apply`] selects exactly one option (or the clear entry)
//! and leaves the table stabilized. Whether the backend honoured the filter is
//! for the caller to assert, typically with
//! [`crate::table::verify_column_contains`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;
use crate::page::Page;
use crate::retry::ActionRetrier;
use crate::table::{StabilizeReport, TableRegion, TableStabilizer};
use crate::wait::poll_until;

/// Popover containers used by the app's filter menus
pub const POPOVER_CSS: &str = r#"div[role="dialog"], div[role="menu"], .popover-content"#;

/// A named filter trigger and the popover it opens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterControl {
    pub name: String,
    pub trigger: Locator,
    pub popover: Locator,
    /// Option text that resets the filter
    #[serde(default = "default_clear_option")]
    pub clear_option: String,
}

fn default_clear_option() -> String {
    "Clear filters".to_string()
}

impl FilterControl {
    pub fn new(name: impl Into<String>, trigger: Locator, popover: Locator) -> Self {
        Self {
            name: name.into(),
            trigger,
            popover,
            clear_option: default_clear_option(),
        }
    }

    /// Faceted filter button whose accessible name contains `name`
    ///
    /// The button label grows to include the selection (`RFM Champions`),
    /// so the name match is a substring match.
    pub fn faceted(name: impl Into<String>) -> Self {
        let name = name.into();
        let trigger = Locator::role("button").named(name.clone()).first();
        Self::new(name, trigger, Locator::css(POPOVER_CSS).first())
    }

    pub fn option_by_role(&self, option: &str) -> Locator {
        Locator::role("option").named(option).exact().within(&self.popover)
    }

    pub fn option_by_text(&self, option: &str) -> Locator {
        Locator::text(option).exact().within(&self.popover)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterChoice {
    Option(String),
    Clear,
}

/// The option last requested on a control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub filter: String,
    pub option: String,
}

#[derive(Debug, Clone)]
struct ActiveFilter {
    control: FilterControl,
    selection: FilterSelection,
}

#[derive(Debug, Clone, Default)]
pub struct FilterController {
    retrier: ActionRetrier,
    stabilizer: TableStabilizer,
    active: BTreeMap<String, ActiveFilter>,
}

impl FilterController {
    pub fn new(retrier: ActionRetrier, stabilizer: TableStabilizer) -> Self {
        Self {
            retrier,
            stabilizer,
            active: BTreeMap::new(),
        }
    }

    /// Selections requested and not yet cleared, one per control
    pub fn selections(&self) -> impl Iterator<Item = &FilterSelection> {
        self.active.values().map(|a| &a.selection)
    }

    pub fn selection(&self, filter: &str) -> Option<&FilterSelection> {
        self.active.get(filter).map(|a| &a.selection)
    }

    /// Open `control`, pick `choice`, then stabilize `region`.
    pub async fn apply(
        &mut self,
        page: &dyn Page,
        control: &FilterControl,
        choice: &FilterChoice,
        region: &TableRegion,
    ) -> E2eResult<StabilizeReport> {
        let option = match choice {
            FilterChoice::Option(name) => name.as_str(),
            FilterChoice::Clear => control.clear_option.as_str(),
        };
        info!("Filter '{}': selecting '{}'", control.name, option);

        self.retrier
            .run(
                &format!("open filter '{}'", control.name),
                &format!("{} visible", control.popover),
                || page.click(&control.trigger),
                || page.is_visible(&control.popover),
            )
            .await?;

        let target = self.find_option(page, control, option).await?;
        page.click(&target).await?;

        match choice {
            FilterChoice::Option(name) => {
                self.active.insert(
                    control.name.clone(),
                    ActiveFilter {
                        control: control.clone(),
                        selection: FilterSelection {
                            filter: control.name.clone(),
                            option: name.clone(),
                        },
                    },
                );
            }
            FilterChoice::Clear => {
                self.active.remove(&control.name);
            }
        }

        self.stabilizer.stabilize(page, region).await
    }

    /// Role-based exact match first, then exact text inside the popover
    async fn find_option(&self, page: &dyn Page, control: &FilterControl, option: &str) -> E2eResult<Locator> {
        let by_role = control.option_by_role(option);
        let by_text = control.option_by_text(option);

        let (role_ref, text_ref) = (&by_role, &by_text);
        let found = poll_until(
            &format!("option '{}' in filter '{}'", option, control.name),
            self.option_timeout(),
            self.retrier.policy().poll_interval,
            || async move {
                Ok::<_, E2eError>(page.is_visible(role_ref).await? || page.is_visible(text_ref).await?)
            },
        )
        .await;

        match found {
            Ok(()) if page.is_visible(&by_role).await? => Ok(by_role),
            Ok(()) => {
                info!("Option '{}' has no option role, using text match", option);
                Ok(by_text)
            }
            Err(e) if e.is_timeout() => Err(E2eError::OptionNotFound {
                filter: control.name.clone(),
                option: option.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    fn option_timeout(&self) -> Duration {
        self.retrier.policy().per_attempt_timeout
    }

    /// Clear every recorded selection. Failures are logged, not returned.
    pub async fn clear_all(&mut self, page: &dyn Page, region: &TableRegion) {
        let pending: Vec<FilterControl> = self.active.values().map(|a| a.control.clone()).collect();
        for control in pending {
            if let Err(e) = self.apply(page, &control, &FilterChoice::Clear, region).await {
                warn!("Teardown: could not clear filter '{}': {}", control.name, e);
                self.active.remove(&control.name);
            }
        }
    }
}

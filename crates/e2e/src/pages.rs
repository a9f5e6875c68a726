//! Application modules and their default layouts

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::E2eError;
use crate::filter::FilterControl;
use crate::locator::Locator;
use crate::sort::SortPolicy;
use crate::table::TableRegion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppModule {
    BattleMap,
    Customers,
    Stores,
    Teams,
    Visits,
    PhoneCalls,
    MonthlySummary,
    SalesMaterials,
}

impl AppModule {
    pub const ALL: [AppModule; 8] = [
        AppModule::BattleMap,
        AppModule::Customers,
        AppModule::Stores,
        AppModule::Teams,
        AppModule::Visits,
        AppModule::PhoneCalls,
        AppModule::MonthlySummary,
        AppModule::SalesMaterials,
    ];

    /// Direct URL path, `None` when the module is only reachable through a menu
    pub fn path(&self) -> Option<&'static str> {
        match self {
            AppModule::BattleMap => Some("/map"),
            AppModule::Customers => Some("/customers"),
            AppModule::Stores => Some("/stores"),
            AppModule::Visits => Some("/visits"),
            AppModule::PhoneCalls => Some("/phone-calls"),
            AppModule::MonthlySummary => Some("/your-business/monthly-summary"),
            AppModule::SalesMaterials => Some("/admin/sales-materials"),
            AppModule::Teams => None,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            AppModule::BattleMap => "battle_map",
            AppModule::Customers => "customers",
            AppModule::Stores => "stores",
            AppModule::Teams => "teams",
            AppModule::Visits => "visits",
            AppModule::PhoneCalls => "phone_calls",
            AppModule::MonthlySummary => "monthly_summary",
            AppModule::SalesMaterials => "sales_materials",
        }
    }

    /// Whether the module renders a data table
    pub fn has_table(&self) -> bool {
        !matches!(self, AppModule::BattleMap | AppModule::MonthlySummary)
    }

    /// Table layout shared by every data-table module
    pub fn table_region(&self) -> TableRegion {
        TableRegion::default()
    }

    /// Faceted filters exposed above the module's table
    pub fn filters(&self) -> Vec<FilterControl> {
        let names: &[&str] = match self {
            AppModule::Customers => &["RFM"],
            AppModule::Teams => &["Status", "Role"],
            AppModule::Stores => &["Status"],
            AppModule::Visits => &["Store"],
            AppModule::PhoneCalls => &["Creator"],
            AppModule::SalesMaterials => &["Creator"],
            AppModule::BattleMap | AppModule::MonthlySummary => &[],
        };
        names.iter().map(|n| FilterControl::faceted(*n)).collect()
    }

    /// Columns whose rendered order cannot be reproduced client-side
    pub fn sort_policy(&self) -> SortPolicy {
        match self {
            // Customer, Email, Phone, Address, Last purchased
            AppModule::Customers => SortPolicy::with_exempt([0, 2, 3, 4, 6]),
            // Username, Email
            AppModule::Teams => SortPolicy::with_exempt([0, 1]),
            _ => SortPolicy::default(),
        }
    }
}

impl fmt::Display for AppModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for AppModule {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        AppModule::ALL
            .into_iter()
            .find(|m| m.slug() == wanted)
            .ok_or_else(|| E2eError::Config(format!("unknown module '{}'", s)))
    }
}

/// Header button that opens a column's sort menu
pub fn sort_header(column_name: &str) -> Locator {
    Locator::css("th button").has_text(column_name).first()
}

/// The sort menu opened by a header button
pub fn sort_menu() -> Locator {
    Locator::css(r#"div[role="menu"], [id^="radix-"]"#).last()
}

/// Rows-per-page selector below a table
pub fn rows_per_page() -> Locator {
    Locator::role("combobox").last()
}

pub fn next_page() -> Locator {
    Locator::role("button").named("Next page").first()
}

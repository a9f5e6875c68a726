//! Sort verification over rendered table columns
//!
//! Rendered cells mix formats (currency, phone separators, locale dates,
//! category labels), and no column declares its type. Each cell is normalized
//! on its own into a [`ColumnValue`] using an ordered list of matchers:
//!
//! 1. rank table (substring match against the domain's category labels)
//! 2. date (`Jul 16, 2025`, `Jul 16, 2025, 10:34 PM`, `7/16/2025`, `2025-07-16`)
//! 3. number (everything except digits, `.` and `-` stripped)
//! 4. text (NFKD, lower-cased)
//!
//! The first matcher that accepts the cell wins, so normalization is total.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::error::{E2eError, E2eResult};
use crate::page::Page;
use crate::table::{self, TableRegion};

static MONTH_DATE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"([A-Z][a-z]{2})\s(\d{1,2}),\s(\d{4})(?:,?\s+(\d{1,2}:\d{2})\s?([AaPp][Mm]))?").ok()
});
static SLASH_DATE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2}|\d{4})\b").ok());
static ISO_DATE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})\b").ok());

fn captures<'a>(re: &Lazy<Option<Regex>>, cell: &'a str) -> Option<regex::Captures<'a>> {
    Option::as_ref(re).and_then(|re| re.captures(cell))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Label of the menu entry that requests this direction
    pub fn menu_label(&self) -> &'static str {
        match self {
            SortDirection::Asc => "Asc",
            SortDirection::Desc => "Desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("asc"),
            SortDirection::Desc => f.write_str("desc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub label: String,
    pub rank: u32,
}

/// Ordinal positions for categorical labels. Lookup walks the entries in
/// declaration order and takes the first label contained in the cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankTable {
    entries: Vec<RankEntry>,
}

impl RankTable {
    pub fn new<S: Into<String>>(entries: impl IntoIterator<Item = (S, u32)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(label, rank)| RankEntry {
                    label: label.into(),
                    rank,
                })
                .collect(),
        }
    }

    /// Five-level customer value scale, `No Sales` lowest
    pub fn rfm() -> Self {
        Self::new([
            ("Champions", 5),
            ("Loyal", 4),
            ("Potential", 3),
            ("At Risk", 2),
            ("No Sales", 1),
        ])
    }

    pub fn lookup(&self, cell: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| cell.contains(e.label.as_str()))
            .map(|e| e.rank)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RankTable {
    fn default() -> Self {
        Self::rfm()
    }
}

/// A cell normalized to its inferred semantic type
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Rank(u32),
    /// Milliseconds since the Unix epoch
    Timestamp(i64),
    Number(f64),
    Text(String),
}

impl ColumnValue {
    fn magnitude(&self) -> Option<f64> {
        match self {
            ColumnValue::Rank(r) => Some(f64::from(*r)),
            ColumnValue::Timestamp(t) => Some(*t as f64),
            ColumnValue::Number(n) => Some(*n),
            ColumnValue::Text(_) => None,
        }
    }

    /// String form used when a numeric value meets text
    fn as_text(&self) -> String {
        match self {
            ColumnValue::Rank(r) => r.to_string(),
            ColumnValue::Timestamp(t) => t.to_string(),
            ColumnValue::Number(n) => n.to_string(),
            ColumnValue::Text(t) => t.clone(),
        }
    }

    /// Numeric comparison when both sides are numeric, otherwise
    /// lexicographic on the string forms (`"-"` sorts before `"10"`).
    pub fn compare(&self, other: &ColumnValue) -> Ordering {
        match (self.magnitude(), other.magnitude()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            _ => self.as_text().cmp(&other.as_text()),
        }
    }

    fn same_as(&self, other: &ColumnValue) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    ranks: RankTable,
}

impl Normalizer {
    pub fn new(ranks: RankTable) -> Self {
        Self { ranks }
    }

    pub fn normalize(&self, raw: &str) -> ColumnValue {
        let cleaned = raw.replace(['\n', '\r'], " ");
        let cleaned = cleaned.trim();

        self.ranks
            .lookup(cleaned)
            .map(ColumnValue::Rank)
            .or_else(|| parse_timestamp(cleaned).map(ColumnValue::Timestamp))
            .or_else(|| parse_number(cleaned).map(ColumnValue::Number))
            .unwrap_or_else(|| ColumnValue::Text(fold_text(cleaned)))
    }
}

fn parse_timestamp(cell: &str) -> Option<i64> {
    if let Some(caps) = captures(&MONTH_DATE, cell) {
        let date_str = format!("{} {} {}", &caps[1], &caps[2], &caps[3]);
        let date = NaiveDate::parse_from_str(&date_str, "%b %d %Y").ok()?;
        let time = match (caps.get(4), caps.get(5)) {
            (Some(hm), Some(meridiem)) => NaiveTime::parse_from_str(
                &format!("{} {}", hm.as_str(), meridiem.as_str().to_uppercase()),
                "%I:%M %p",
            )
            .ok()?,
            _ => NaiveTime::MIN,
        };
        return Some(NaiveDateTime::new(date, time).and_utc().timestamp_millis());
    }

    if let Some(caps) = captures(&SLASH_DATE, cell) {
        let year: i32 = caps[3].parse().ok()?;
        let year = if caps[3].len() == 2 { 2000 + year } else { year };
        let date = NaiveDate::from_ymd_opt(year, caps[1].parse().ok()?, caps[2].parse().ok()?)?;
        return Some(date.and_time(NaiveTime::MIN).and_utc().timestamp_millis());
    }

    if let Some(caps) = captures(&ISO_DATE, cell) {
        let date = NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?)?;
        return Some(date.and_time(NaiveTime::MIN).and_utc().timestamp_millis());
    }

    None
}

fn parse_number(cell: &str) -> Option<f64> {
    let digits: String = cell
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn fold_text(cell: &str) -> String {
    cell.nfkd().collect::<String>().to_lowercase()
}

/// Which columns may soft-pass and how categorical labels rank
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortPolicy {
    /// Columns whose rendered collation is not reproducible client-side
    /// (names, addresses, phones). Mismatches there are logged, not failed.
    #[serde(default)]
    pub exempt_columns: BTreeSet<usize>,
    #[serde(default)]
    pub ranks: RankTable,
}

impl SortPolicy {
    pub fn with_exempt(columns: impl IntoIterator<Item = usize>) -> Self {
        Self {
            exempt_columns: columns.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn is_exempt(&self, column: usize) -> bool {
        self.exempt_columns.contains(&column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortCheck {
    Sorted,
    /// Fewer than two values, nothing to compare
    TooFewValues,
    /// Order differs on an exempt column
    SoftPassed {
        observed: Vec<String>,
        expected: Vec<String>,
    },
}

/// Verify that `cells` (DOM order) are sorted in `direction`.
pub fn verify_sorted(
    cells: &[String],
    column: usize,
    direction: SortDirection,
    policy: &SortPolicy,
) -> E2eResult<SortCheck> {
    if cells.len() < 2 {
        info!("Column {} ({}): fewer than two values, nothing to verify", column, direction);
        return Ok(SortCheck::TooFewValues);
    }

    let normalizer = Normalizer::new(policy.ranks.clone());
    let values: Vec<ColumnValue> = cells.iter().map(|c| normalizer.normalize(c)).collect();

    let mut order = stable_order(&values);
    if direction == SortDirection::Desc {
        order.reverse();
    }

    let sorted = order
        .iter()
        .zip(values.iter())
        .all(|(expected_idx, observed)| values[*expected_idx].same_as(observed));

    if sorted {
        info!("Column {} ({}) verified", column, direction);
        return Ok(SortCheck::Sorted);
    }

    let observed = cells.to_vec();
    let expected: Vec<String> = order.iter().map(|i| cells[*i].clone()).collect();

    if policy.is_exempt(column) {
        warn!(
            "Column {} ({}) order differs; soft-passing exempt column (coverage gap). observed={:?} expected={:?}",
            column, direction, observed, expected
        );
        return Ok(SortCheck::SoftPassed { observed, expected });
    }

    Err(E2eError::SortMismatch {
        column,
        direction: direction.to_string(),
        observed,
        expected,
    })
}

/// Indices of `values` in ascending order, ties kept in DOM order.
///
/// Mixed numeric/text columns do not form a total order, which `slice::sort_by`
/// may reject, so this is a plain insertion sort over the (short) page.
pub(crate) fn stable_order(values: &[ColumnValue]) -> Vec<usize> {
    let mut order: Vec<usize> = Vec::with_capacity(values.len());
    for idx in 0..values.len() {
        let mut pos = order.len();
        while pos > 0 && values[order[pos - 1]].compare(&values[idx]) == Ordering::Greater {
            pos -= 1;
        }
        order.insert(pos, idx);
    }
    order
}

/// Read `column` from the table and verify its order.
pub async fn verify_column_sorted(
    page: &dyn Page,
    region: &TableRegion,
    column: usize,
    direction: SortDirection,
    policy: &SortPolicy,
) -> E2eResult<SortCheck> {
    let cells = table::column(page, region, column).await?;
    verify_sorted(&cells, column, direction, policy)
}

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{FetchError, ReconError};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Inclusive reporting window. `start <= end` is enforced at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ReconError> {
        if start > end {
            return Err(ReconError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// `YYYY-MM-DD`, as the reporting API expects.
    pub fn start_param(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Everything a fetcher needs besides the keyword itself.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    /// Search Console property, e.g. `https://example.com/` or `sc-domain:example.com`.
    pub property: String,
    pub range: DateRange,
    /// Rows requested from the single bulk query.
    pub row_limit: u32,
}

pub const DEFAULT_ROW_LIMIT: u32 = 25_000;

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Aggregate metrics for one query string over the request's date range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub clicks: u64,
    pub impressions: u64,
    /// Average position; `None` means unknown.
    pub position: Option<f64>,
}

impl Metrics {
    pub const EMPTY: Metrics = Metrics {
        clicks: 0,
        impressions: 0,
        position: None,
    };
}

/// Case-fold a keyword for lookup. Never used for display.
pub fn fold_key(keyword: &str) -> String {
    keyword.to_lowercase()
}

/// Case-folded query string -> metrics, built from one bulk call.
///
/// Later inserts overwrite earlier ones when two case variants fold to
/// the same key.
#[derive(Debug, Clone, Default)]
pub struct BulkIndex {
    entries: HashMap<String, Metrics>,
}

impl BulkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, query: &str, metrics: Metrics) {
        self.entries.insert(fold_key(query), metrics);
    }

    /// Look up a keyword by its case-folded form.
    pub fn get(&self, keyword: &str) -> Option<&Metrics> {
        self.entries.get(&fold_key(keyword))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, Metrics)> for BulkIndex {
    fn from_iter<I: IntoIterator<Item = (&'a str, Metrics)>>(iter: I) -> Self {
        let mut index = BulkIndex::new();
        for (query, metrics) in iter {
            index.insert(query, metrics);
        }
        index
    }
}

// ---------------------------------------------------------------------------
// Output rows
// ---------------------------------------------------------------------------

/// Which fetch path produced a row. Rendered in the `found_by` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Bulk,
    Exact,
    None,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bulk => "bulk",
            Self::Exact => "exact",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One report row. Exactly one exists per input keyword.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub keyword: String,
    pub clicks: u64,
    pub impressions: u64,
    pub position: Option<f64>,
    #[serde(rename = "found_by")]
    pub provenance: Provenance,
}

impl MetricRow {
    pub fn new(keyword: impl Into<String>, metrics: Metrics, provenance: Provenance) -> Self {
        Self {
            keyword: keyword.into(),
            clicks: metrics.clicks,
            impressions: metrics.impressions,
            position: metrics.position,
            provenance,
        }
    }

    /// A row with no recorded data: zero counts, unknown position.
    pub fn unresolved(keyword: impl Into<String>) -> Self {
        Self::new(keyword, Metrics::EMPTY, Provenance::None)
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            clicks: self.clicks,
            impressions: self.impressions,
            position: self.position,
        }
    }
}

/// Terminal state of a keyword that missed the bulk index.
#[derive(Debug)]
pub enum MissOutcome {
    Found(Metrics),
    NotFound,
    Failed(FetchError),
}

impl MissOutcome {
    pub fn into_row(self, keyword: &str) -> MetricRow {
        match self {
            Self::Found(metrics) => MetricRow::new(keyword, metrics, Provenance::Exact),
            Self::NotFound | Self::Failed(_) => MetricRow::unresolved(keyword),
        }
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconSummary {
    pub total: usize,
    pub bulk: usize,
    pub exact: usize,
    /// Misses the exact lookup answered with zero rows.
    pub not_found: usize,
    /// Misses whose exact lookup errored. Also reported as `none` rows.
    pub failed: usize,
    pub bulk_index_size: usize,
    pub pauses: usize,
}

impl ReconSummary {
    /// Rows with provenance `none` (not found + failed).
    pub fn unresolved(&self) -> usize {
        self.not_found + self.failed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconReport {
    pub rows: Vec<MetricRow>,
    pub summary: ReconSummary,
}

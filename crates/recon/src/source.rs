//! The seam between the engine and whatever answers the two query modes.

use crate::error::FetchError;
use crate::model::{BulkIndex, Metrics, ReportRequest};

/// A reporting backend exposing a top-N query and an exact-match query.
///
/// Implementations hold no per-run state; everything run-specific lives
/// in [`crate::ReconSession`].
pub trait MetricsSource {
    /// One query for up to `request.row_limit` of the most active queries.
    fn fetch_bulk(&self, request: &ReportRequest) -> Result<BulkIndex, FetchError>;

    /// One query filtered to `keyword` exactly. `Ok(None)` means the
    /// backend recorded no traffic for that string in the range.
    fn fetch_exact(
        &self,
        request: &ReportRequest,
        keyword: &str,
    ) -> Result<Option<Metrics>, FetchError>;
}

impl<T: MetricsSource + ?Sized> MetricsSource for &T {
    fn fetch_bulk(&self, request: &ReportRequest) -> Result<BulkIndex, FetchError> {
        (**self).fetch_bulk(request)
    }

    fn fetch_exact(
        &self,
        request: &ReportRequest,
        keyword: &str,
    ) -> Result<Option<Metrics>, FetchError> {
        (**self).fetch_exact(request, keyword)
    }
}

impl<T: MetricsSource + ?Sized> MetricsSource for Box<T> {
    fn fetch_bulk(&self, request: &ReportRequest) -> Result<BulkIndex, FetchError> {
        (**self).fetch_bulk(request)
    }

    fn fetch_exact(
        &self,
        request: &ReportRequest,
        keyword: &str,
    ) -> Result<Option<Metrics>, FetchError> {
        (**self).fetch_exact(request, keyword)
    }
}

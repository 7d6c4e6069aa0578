//! `kwreport-recon` - reconcile a keyword list against a reporting API
//! that offers a top-N query and an exact-match query.
//!
//! Pure engine crate: the backend is reached through [`MetricsSource`].
//! No CLI, HTTP or file IO dependencies.

pub mod engine;
pub mod error;
pub mod model;
pub mod pacing;
pub mod source;

pub use engine::{reconcile, ReconSession};
pub use error::{FetchError, ReconError};
pub use model::{
    fold_key, BulkIndex, DateRange, MetricRow, Metrics, Provenance, ReconReport, ReconSummary,
    ReportRequest, DEFAULT_ROW_LIMIT,
};
pub use pacing::{PacingPolicy, Pause, ThreadSleep};
pub use source::MetricsSource;

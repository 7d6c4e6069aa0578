// File I/O operations

pub mod csv;
pub mod error;
pub mod keywords;
pub mod report;
pub mod xlsx;

pub use error::{LoadError, NormalizeError, WriteError};
pub use keywords::{load_keywords, normalize, KeywordColumn};
pub use report::{write_report, ReportFormat, WriteOutcome};

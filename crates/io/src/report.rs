//! Report writing with format selection by extension.
//!
//! `.xlsx` gets a workbook; everything else gets UTF-8 CSV with a BOM.
//! Spreadsheet output is best-effort: on any failure the rows are written
//! as CSV next to the requested path and the outcome says so. The CSV
//! fallback never replaces an existing file.

use std::path::{Path, PathBuf};

use kwreport_recon::MetricRow;

use crate::error::WriteError;

/// Column order of every report.
pub const HEADER: [&str; 5] = ["keyword", "clicks", "impressions", "position", "found_by"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Xlsx,
}

impl ReportFormat {
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("xlsx") | Some("xls") => Self::Xlsx,
            _ => Self::Csv,
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Xlsx => write!(f, "xlsx"),
        }
    }
}

/// Where the report actually went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub format: ReportFormat,
    /// A spreadsheet was requested but CSV was written instead.
    pub fell_back: bool,
}

/// Write `rows` to `path`. `-` writes CSV to stdout.
pub fn write_report(rows: &[MetricRow], path: &Path) -> Result<WriteOutcome, WriteError> {
    if path == Path::new("-") {
        let stdout = std::io::stdout();
        crate::csv::write_rows(rows, stdout.lock(), false, Path::new("stdout"))?;
        return Ok(WriteOutcome {
            path: path.to_path_buf(),
            format: ReportFormat::Csv,
            fell_back: false,
        });
    }

    match ReportFormat::for_path(path) {
        ReportFormat::Csv => {
            crate::csv::export(rows, path)?;
            Ok(WriteOutcome {
                path: path.to_path_buf(),
                format: ReportFormat::Csv,
                fell_back: false,
            })
        }
        ReportFormat::Xlsx => {
            let attempt = if is_legacy_xls(path) {
                Err("legacy .xls output is not supported".to_string())
            } else {
                crate::xlsx::export(rows, path)
            };
            match attempt {
                Ok(()) => Ok(WriteOutcome {
                    path: path.to_path_buf(),
                    format: ReportFormat::Xlsx,
                    fell_back: false,
                }),
                Err(reason) => {
                    let fallback = fallback_path(path);
                    tracing::warn!(
                        requested = %path.display(),
                        fallback = %fallback.display(),
                        %reason,
                        "spreadsheet output failed, writing CSV instead"
                    );
                    crate::csv::export(rows, &fallback)?;
                    Ok(WriteOutcome {
                        path: fallback,
                        format: ReportFormat::Csv,
                        fell_back: true,
                    })
                }
            }
        }
    }
}

/// CSV sibling of `path` that does not replace an existing file:
/// `report.csv`, else `report-1.csv`, `report-2.csv`, ...
fn fallback_path(path: &Path) -> PathBuf {
    let preferred = path.with_extension("csv");
    if !preferred.exists() {
        return preferred;
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    (1u32..)
        .map(|n| path.with_file_name(format!("{}-{}.csv", stem, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(preferred)
}

fn is_legacy_xls(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("xls"))
        .unwrap_or(false)
}

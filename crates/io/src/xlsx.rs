// Excel import/export

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use kwreport_recon::MetricRow;

use crate::error::LoadError;

/// File extensions read through calamine.
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

pub fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SPREADSHEET_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read the first worksheet as rows of display text. Empty cells become
/// empty strings so column positions line up with the header row.
pub fn import(path: &Path) -> Result<Vec<Vec<String>>, LoadError> {
    let spreadsheet_err = |message: String| LoadError::Spreadsheet {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path)
        .map_err(|e| spreadsheet_err(format!("failed to open: {}", e)))?;

    let Some(sheet_name) = workbook.sheet_names().first().cloned() else {
        return Err(spreadsheet_err("workbook contains no sheets".into()));
    };
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| spreadsheet_err(format!("failed to read sheet '{}': {}", sheet_name, e)))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // Integers without decimals: a keyword column of years or SKUs
        Data::Float(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        Data::Float(n) => format!("{}", n),
        Data::Int(n) => format!("{}", n),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) => format!("{}", dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

/// Write the report as a single-sheet workbook.
#[cfg(feature = "xlsx")]
pub fn export(rows: &[MetricRow], path: &Path) -> Result<(), String> {
    use rust_xlsxwriter::{Format, Workbook};

    use crate::report::HEADER;

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name("keywords")
        .map_err(|e| format!("Failed to create sheet: {}", e))?;

    let bold = Format::new().set_bold();
    for (col, name) in HEADER.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, *name, &bold)
            .map_err(|e| format!("Failed to write header: {}", e))?;
    }

    let mut keyword_width = HEADER[0].len();
    for (i, row) in rows.iter().enumerate() {
        let r = u32::try_from(i + 1).map_err(|_| "too many rows for a worksheet".to_string())?;
        let cell_err = |e: rust_xlsxwriter::XlsxError| format!("Failed to write row {}: {}", r, e);

        worksheet.write_string(r, 0, &row.keyword).map_err(cell_err)?;
        worksheet.write_number(r, 1, row.clicks as f64).map_err(cell_err)?;
        worksheet.write_number(r, 2, row.impressions as f64).map_err(cell_err)?;
        if let Some(position) = row.position {
            worksheet.write_number(r, 3, position).map_err(cell_err)?;
        }
        worksheet
            .write_string(r, 4, row.provenance.as_str())
            .map_err(cell_err)?;

        keyword_width = keyword_width.max(row.keyword.chars().count());
    }

    worksheet
        .set_column_width(0, (keyword_width + 2).min(80) as f64)
        .map_err(|e| format!("Failed to size column: {}", e))?;

    workbook
        .save(path)
        .map_err(|e| format!("Failed to save {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(not(feature = "xlsx"))]
pub fn export(_rows: &[MetricRow], _path: &Path) -> Result<(), String> {
    Err("spreadsheet output is not available in this build".to_string())
}

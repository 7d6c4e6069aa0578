//! Keyword list loading.
//!
//! Two layouts are accepted for delimited text:
//! - one keyword per line (first field of each record)
//! - a single line holding a comma-separated list
//!
//! Order is preserved and nothing is deduplicated. Blank entries are
//! skipped. Spreadsheets are read from their first worksheet.

use std::path::Path;
use std::str::FromStr;

use crate::error::{LoadError, NormalizeError};

/// Header spellings recognized by [`KeywordColumn::Detect`], compared
/// after trimming and case-folding.
pub const KNOWN_KEYWORD_HEADERS: &[&str] = &[
    "keyword",
    "keywords",
    "query",
    "queries",
    "search term",
    "關鍵字",
    "關鍵詞",
];

/// Which column holds the keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeywordColumn {
    /// First field of every record; no header row.
    #[default]
    First,
    /// First record is a header; use the column with this name.
    Named(String),
    /// Use the header if it matches [`KNOWN_KEYWORD_HEADERS`], else `First`.
    Detect,
}

impl FromStr for KeywordColumn {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.to_lowercase().as_str() {
            "" | "first" => Self::First,
            "detect" | "auto" => Self::Detect,
            _ => Self::Named(trimmed.to_string()),
        })
    }
}

/// Index of a known keyword header in `header`, if any.
pub fn detect_keyword_header(header: &[String]) -> Option<usize> {
    header.iter().position(|cell| {
        let folded = cell.trim().to_lowercase();
        KNOWN_KEYWORD_HEADERS.contains(&folded.as_str())
    })
}

/// Load keywords from a CSV/text file or a spreadsheet.
pub fn load_keywords(path: &Path, column: &KeywordColumn) -> Result<Vec<String>, LoadError> {
    let records = if crate::xlsx::is_spreadsheet(path) {
        crate::xlsx::import(path)?
    } else {
        crate::csv::import(path)?
    };
    let keywords = keywords_from_records(&records, column, path)?;
    tracing::info!(path = %path.display(), count = keywords.len(), "keywords loaded");
    Ok(keywords)
}

/// Apply column selection and layout detection to parsed records.
pub fn keywords_from_records(
    records: &[Vec<String>],
    column: &KeywordColumn,
    path: &Path,
) -> Result<Vec<String>, LoadError> {
    match column {
        KeywordColumn::First => Ok(first_column(records)),
        KeywordColumn::Named(name) => {
            let wanted = name.trim().to_lowercase();
            let header = records.first().map(Vec::as_slice).unwrap_or(&[]);
            let idx = header
                .iter()
                .position(|cell| cell.trim().to_lowercase() == wanted)
                .ok_or_else(|| LoadError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name.clone(),
                })?;
            Ok(column_below_header(records, idx))
        }
        KeywordColumn::Detect => {
            match records.first().and_then(|header| detect_keyword_header(header)) {
                Some(idx) => Ok(column_below_header(records, idx)),
                None => {
                    tracing::debug!(path = %path.display(), "no keyword header found, using first column");
                    Ok(first_column(records))
                }
            }
        }
    }
}

fn first_column(records: &[Vec<String>]) -> Vec<String> {
    if let [only] = records {
        // A single record is a comma-separated list, whether the CSV
        // reader split it into fields or it arrived as one quoted cell.
        if only.len() > 1 {
            return non_blank(only.iter().map(String::as_str));
        }
        if let Some(cell) = only.first() {
            if cell.contains(',') {
                return non_blank(cell.split(','));
            }
        }
    }

    non_blank(records.iter().filter_map(|r| r.first()).map(String::as_str))
}

fn column_below_header(records: &[Vec<String>], idx: usize) -> Vec<String> {
    non_blank(
        records
            .iter()
            .skip(1)
            .filter_map(|r| r.get(idx))
            .map(String::as_str),
    )
}

fn non_blank<'a>(parts: impl Iterator<Item = &'a str>) -> Vec<String> {
    parts
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rewrite any accepted keyword source as one keyword per line.
/// Returns the number of keywords written.
pub fn normalize(
    input: &Path,
    output: &Path,
    column: &KeywordColumn,
) -> Result<usize, NormalizeError> {
    use crate::error::WriteError;

    let keywords = load_keywords(input, column)?;

    let file = std::fs::File::create(output).map_err(|source| WriteError::Create {
        path: output.to_path_buf(),
        source,
    })?;
    let mut out = std::io::BufWriter::new(file);
    let csv_err = |e: &dyn std::fmt::Display| WriteError::Csv {
        path: output.to_path_buf(),
        message: e.to_string(),
    };

    std::io::Write::write_all(&mut out, b"\xEF\xBB\xBF").map_err(|e| csv_err(&e))?;
    let mut writer = ::csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(::csv::Terminator::Any(b'\n'))
        .from_writer(out);
    for keyword in &keywords {
        writer.write_record([keyword]).map_err(|e| csv_err(&e))?;
    }
    writer.flush().map_err(|e| csv_err(&e))?;

    Ok(keywords.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn load_str(content: &str, column: &KeywordColumn) -> Vec<String> {
        let records = crate::csv::parse_records(content, Path::new("mem")).unwrap();
        keywords_from_records(&records, column, Path::new("mem")).unwrap()
    }

    fn first(content: &str) -> Vec<String> {
        load_str(content, &KeywordColumn::First)
    }

    #[test]
    fn single_line_comma_list() {
        assert_eq!(first("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn single_quoted_cell_comma_list() {
        assert_eq!(first("\"seo, rust tools ,  ,crates\"\n"), vec!["seo", "rust tools", "crates"]);
    }

    #[test]
    fn one_per_line() {
        assert_eq!(first("a\nb\nc"), vec!["a", "b", "c"]);
    }

    #[test]
    fn single_keyword() {
        assert_eq!(first("  lonely keyword \n"), vec!["lonely keyword"]);
    }

    #[test]
    fn header_row_is_not_special_in_first_mode() {
        assert_eq!(first("keyword\nalpha\nbeta\n"), vec!["keyword", "alpha", "beta"]);
    }

    #[test]
    fn multi_line_uses_first_field_only() {
        assert_eq!(first("a,x\nb,y\n"), vec!["a", "b"]);
    }

    #[test]
    fn blanks_skipped_duplicates_kept_order_preserved() {
        assert_eq!(first("b\n  \na\n\nb\n"), vec!["b", "a", "b"]);
    }

    #[test]
    fn empty_source_yields_nothing() {
        assert!(first("").is_empty());
    }

    #[test]
    fn named_column() {
        let got = load_str(
            "id,Search Term,volume\n1,rust book,10\n2,,5\n3,cargo,1\n",
            &KeywordColumn::Named("search term".into()),
        );
        assert_eq!(got, vec!["rust book", "cargo"]);
    }

    #[test]
    fn named_column_missing() {
        let records = crate::csv::parse_records("a,b\n1,2\n", Path::new("mem")).unwrap();
        let err = keywords_from_records(&records, &KeywordColumn::Named("kw".into()), Path::new("mem"))
            .unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { column, .. } if column == "kw"));
    }

    #[test]
    fn detect_known_header() {
        let got = load_str("rank,關鍵字\n1,咖啡\n2,茶\n", &KeywordColumn::Detect);
        assert_eq!(got, vec!["咖啡", "茶"]);
    }

    #[test]
    fn detect_falls_back_to_first_column() {
        let got = load_str("alpha\nbeta\n", &KeywordColumn::Detect);
        assert_eq!(got, vec!["alpha", "beta"]);
    }

    #[test]
    fn known_header_table_lookup() {
        let header = vec!["Volume".to_string(), " Keywords ".to_string()];
        assert_eq!(detect_keyword_header(&header), Some(1));
        assert_eq!(detect_keyword_header(&["url".to_string()]), None);
    }

    #[test]
    fn parse_column_setting() {
        assert_eq!("first".parse::<KeywordColumn>().unwrap(), KeywordColumn::First);
        assert_eq!("AUTO".parse::<KeywordColumn>().unwrap(), KeywordColumn::Detect);
        assert_eq!(
            " Query ".parse::<KeywordColumn>().unwrap(),
            KeywordColumn::Named("Query".into())
        );
    }

    #[test]
    fn load_from_bom_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kw.csv");
        fs::write(&path, b"\xEF\xBB\xBFfirst kw\nsecond kw\n").unwrap();
        let got = load_keywords(&path, &KeywordColumn::First).unwrap();
        assert_eq!(got, vec!["first kw", "second kw"]);
    }

    #[test]
    fn normalize_comma_list_to_lines() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("all.csv");
        let output = dir.path().join("normalized.csv");
        fs::write(&input, "\"a, b, c\"").unwrap();

        let count = normalize(&input, &output, &KeywordColumn::First).unwrap();
        assert_eq!(count, 3);

        let reread = load_keywords(&output, &KeywordColumn::First).unwrap();
        assert_eq!(reread, vec!["a", "b", "c"]);
    }
}

// CSV import/export

use std::borrow::Cow;
use std::io::{Read, Write};
use std::path::Path;

use kwreport_recon::MetricRow;

use crate::error::{LoadError, WriteError};
use crate::report::HEADER;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Read a text file, honoring a UTF-8 or UTF-16 byte-order mark.
///
/// Without a BOM the content must be valid UTF-8. Malformed input is an
/// error rather than being decoded with replacement characters.
pub fn read_file_as_utf8(path: &Path) -> Result<String, LoadError> {
    let mut file = std::fs::File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    decode(&bytes)
        .map(Cow::into_owned)
        .map_err(|encoding| LoadError::Decode {
            path: path.to_path_buf(),
            encoding,
        })
}

fn decode(bytes: &[u8]) -> Result<Cow<'_, str>, &'static str> {
    let (encoding, bom_len) =
        encoding_rs::Encoding::for_bom(bytes).unwrap_or((encoding_rs::UTF_8, 0));
    encoding
        .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
        .ok_or(encoding.name())
}

/// Parse CSV text into records. No header handling; ragged rows allowed.
pub fn parse_records(content: &str, path: &Path) -> Result<Vec<Vec<String>>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok(records)
}

pub fn import(path: &Path) -> Result<Vec<Vec<String>>, LoadError> {
    let content = read_file_as_utf8(path)?;
    parse_records(&content, path)
}

/// Write report rows as CSV: header first, then one line per row.
///
/// `bom` prefixes the output with a UTF-8 byte-order mark so spreadsheet
/// applications pick the right encoding.
pub fn write_rows<W: Write>(
    rows: &[MetricRow],
    mut out: W,
    bom: bool,
    label: &Path,
) -> Result<(), WriteError> {
    let csv_err = |e: &dyn std::fmt::Display| WriteError::Csv {
        path: label.to_path_buf(),
        message: e.to_string(),
    };

    if bom {
        out.write_all(UTF8_BOM).map_err(|e| csv_err(&e))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);

    writer.write_record(HEADER).map_err(|e| csv_err(&e))?;
    for row in rows {
        writer.serialize(row).map_err(|e| csv_err(&e))?;
    }
    writer.flush().map_err(|e| csv_err(&e))?;
    Ok(())
}

pub fn export(rows: &[MetricRow], path: &Path) -> Result<(), WriteError> {
    let file = std::fs::File::create(path).map_err(|source| WriteError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    write_rows(rows, std::io::BufWriter::new(file), true, path)
}

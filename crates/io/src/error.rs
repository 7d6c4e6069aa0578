use std::path::PathBuf;

use thiserror::Error;

/// The keyword source could not be turned into a keyword list.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not valid {encoding} text", path.display())]
    Decode { path: PathBuf, encoding: &'static str },
    #[error("cannot parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("{}: no column named '{column}' in header row", path.display())]
    MissingColumn { path: PathBuf, column: String },
    #[error("cannot read spreadsheet {}: {message}", path.display())]
    Spreadsheet { path: PathBuf, message: String },
}

/// The report could not be written, not even as CSV.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot create {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV write error for {}: {message}", path.display())]
    Csv { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

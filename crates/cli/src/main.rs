// kwreport CLI - Search Console metrics for an arbitrary keyword list

mod exit_codes;
mod gsc;
mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kwreport_config::{ConfigError, Settings};
use kwreport_io::{KeywordColumn, LoadError, NormalizeError, WriteError};
use kwreport_recon::{FetchError, ReconError};

use exit_codes::{
    auth_exit_code, fetch_exit_code, recon_exit_code, EXIT_LOAD, EXIT_SUCCESS, EXIT_USAGE, EXIT_WRITE,
};
use gsc::AuthError;
use report::ReportArgs;

#[derive(Parser)]
#[command(name = "kwreport")]
#[command(about = "Clicks, impressions and position from Google Search Console for a keyword list")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file [default: <config dir>/kwreport/config.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Log request details
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch metrics for every keyword and write the report
    #[command(after_help = "\
Examples:
  kwreport report --property https://example.com/ --keywords kw.csv \\
      --start-date 2024-01-01 --end-date 2024-03-31 --service-account sa.json
  kwreport report --property sc-domain:example.com --keywords kw.xlsx --days 90 \\
      --oauth-client client_secret.json -o report.xlsx
  kwreport report --property sc-domain:example.com --keywords kw.csv --days 28 --mock -o -")]
    Report(ReportArgs),

    /// Rewrite a keyword list as one keyword per line
    #[command(after_help = "\
Examples:
  kwreport normalize all_keywords.csv
  kwreport normalize export.xlsx keywords.csv --keyword-column detect")]
    Normalize {
        /// Keyword source (CSV/text or spreadsheet)
        input: PathBuf,

        /// Destination [default: <input stem>_normalized.csv]
        output: Option<PathBuf>,

        /// Keyword column: 'first', 'detect', or a header name
        #[arg(long, value_name = "NAME", default_value = "first")]
        keyword_column: KeywordColumn,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  kwreport-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  kwreport-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

/// Logs go to stderr. `--quiet`/`--verbose` win over `RUST_LOG`.
fn init_logging(quiet: bool, verbose: bool) {
    let filter = if quiet {
        EnvFilter::new("kwreport=warn")
    } else if verbose {
        EnvFilter::new("kwreport=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kwreport=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let result = match cli.command {
        Commands::Report(args) => {
            Settings::load(cli.config.as_deref())
                .map_err(CliError::config)
                .and_then(|settings| report::cmd_report(args, settings))
        }
        Commands::Normalize {
            input,
            output,
            keyword_column,
        } => cmd_normalize(input, output, keyword_column),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn config(err: ConfigError) -> Self {
        Self { code: EXIT_USAGE, message: format!("config: {}", err), hint: None }
    }

    pub fn load(err: LoadError) -> Self {
        let hint = match &err {
            LoadError::MissingColumn { .. } => {
                Some("use --keyword-column first, or name a header present in the file".to_string())
            }
            LoadError::Decode { .. } => Some("save the keyword list as UTF-8".to_string()),
            _ => None,
        };
        Self { code: EXIT_LOAD, message: format!("load: {}", err), hint }
    }

    pub fn write(err: WriteError) -> Self {
        Self { code: EXIT_WRITE, message: format!("write: {}", err), hint: None }
    }

    pub fn auth(err: AuthError) -> Self {
        let hint = match &err {
            AuthError::NoCredentials => Some(
                "pass --service-account KEY.json or --oauth-client CLIENT.json (or --mock for a dry run)"
                    .to_string(),
            ),
            AuthError::Exchange { .. } => {
                Some("check the key is active and the delegated user (if any) is allowed".to_string())
            }
            _ => None,
        };
        Self { code: auth_exit_code(&err), message: format!("auth: {}", err), hint }
    }

    pub fn fetch(err: FetchError) -> Self {
        Self { code: fetch_exit_code(&err), message: format!("fetch: {}", err), hint: None }
    }

    pub fn recon(err: ReconError) -> Self {
        let hint = match &err {
            ReconError::Bulk(FetchError::Auth { .. }) => {
                Some("the account needs at least restricted access to the property".to_string())
            }
            ReconError::Bulk(FetchError::RateLimited { .. }) => {
                Some("quota exhausted; retry later or lower --row-limit".to_string())
            }
            _ => None,
        };
        Self { code: recon_exit_code(&err), message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// normalize
// ============================================================================

fn default_normalized_path(input: &std::path::Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "keywords".to_string());
    input.with_file_name(format!("{}_normalized.csv", stem))
}

fn cmd_normalize(
    input: PathBuf,
    output: Option<PathBuf>,
    column: KeywordColumn,
) -> Result<(), CliError> {
    let output = output.unwrap_or_else(|| default_normalized_path(&input));
    let count = kwreport_io::normalize(&input, &output, &column).map_err(|e| match e {
        NormalizeError::Load(e) => CliError::load(e),
        NormalizeError::Write(e) => CliError::write(e),
    })?;
    tracing::info!(count, path = %output.display(), "keywords normalized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_report_flags() {
        let cli = Cli::try_parse_from([
            "kwreport", "report",
            "--property", "sc-domain:example.com",
            "--keywords", "kw.csv",
            "--days", "28",
            "--mock",
            "-o", "-",
            "--quiet",
        ])
        .unwrap();
        assert!(cli.quiet);
        match cli.command {
            Commands::Report(args) => {
                assert_eq!(args.days, Some(28));
                assert!(args.mock);
                assert_eq!(args.output, Some(PathBuf::from("-")));
            }
            _ => panic!("expected report"),
        }
    }

    #[test]
    fn test_days_conflicts_with_explicit_dates() {
        let err = Cli::try_parse_from([
            "kwreport", "report",
            "--keywords", "kw.csv",
            "--days", "28",
            "--start-date", "2024-01-01",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn test_default_normalized_path() {
        assert_eq!(
            default_normalized_path(Path::new("/data/all_keywords.csv")),
            PathBuf::from("/data/all_keywords_normalized.csv")
        );
        assert_eq!(
            default_normalized_path(Path::new("export.xlsx")),
            PathBuf::from("export_normalized.csv")
        );
    }

    #[test]
    fn test_error_messages_name_phase() {
        let err = CliError::load(LoadError::MissingColumn {
            path: PathBuf::from("kw.csv"),
            column: "query".into(),
        });
        assert_eq!(err.code, EXIT_LOAD);
        assert!(err.message.starts_with("load: "));
        assert!(err.hint.is_some());

        let err = CliError::auth(AuthError::NoCredentials);
        assert_eq!(err.code, exit_codes::EXIT_FETCH_NOT_AUTH);
        assert!(err.message.starts_with("auth: "));

        let err = CliError::recon(ReconError::Bulk(FetchError::Rejected {
            status: 400,
            message: "bad date".into(),
        }));
        assert_eq!(err.code, exit_codes::EXIT_FETCH_VALIDATION);
        assert!(err.message.starts_with("bulk query failed: "));
    }
}

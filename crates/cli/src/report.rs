//! `kwreport report` - keyword metrics from Search Console.

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::Args;

use kwreport_config::Settings;
use kwreport_io::KeywordColumn;
use kwreport_recon::{
    DateRange, MetricsSource, PacingPolicy, ReconReport, ReconSession, ReportRequest,
};

use crate::gsc::{select_credentials, Authenticator, MockSource, SearchConsoleClient, TokenSource};
use crate::CliError;

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Search Console property (URL-prefix or sc-domain:)
    #[arg(long)]
    pub property: Option<String>,

    /// Keyword list: CSV/text (one per line, or one comma-separated line) or a spreadsheet
    #[arg(long, value_name = "PATH")]
    pub keywords: PathBuf,

    /// First day of the range (YYYY-MM-DD, inclusive)
    #[arg(long, value_name = "DATE", conflicts_with = "days")]
    pub start_date: Option<String>,

    /// Last day of the range (YYYY-MM-DD, inclusive)
    #[arg(long, value_name = "DATE", conflicts_with = "days")]
    pub end_date: Option<String>,

    /// Use the last N days, ending today
    #[arg(long, value_name = "N")]
    pub days: Option<u32>,

    /// Service account key file
    #[arg(long, value_name = "PATH")]
    pub service_account: Option<PathBuf>,

    /// User to impersonate with the service account (domain-wide delegation)
    #[arg(long, value_name = "EMAIL")]
    pub delegated_user: Option<String>,

    /// OAuth client-secret file for interactive authorization
    #[arg(long, value_name = "PATH")]
    pub oauth_client: Option<PathBuf>,

    /// Rows requested from the bulk query [default: 25000]
    #[arg(long, value_name = "N")]
    pub row_limit: Option<u32>,

    /// Report path (.csv or .xlsx; '-' for CSV on stdout) [default: gsc_keyword_report.csv]
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Keyword column: 'first', 'detect', or a header name [default: first]
    #[arg(long, value_name = "NAME")]
    pub keyword_column: Option<String>,

    /// Use generated data instead of calling the API
    #[arg(long)]
    pub mock: bool,
}

impl ReportArgs {
    /// Flags override file values.
    fn apply_to(&self, mut settings: Settings) -> Settings {
        if let Some(property) = &self.property {
            settings.property = Some(property.clone());
        }
        if let Some(row_limit) = self.row_limit {
            settings.row_limit = row_limit;
        }
        if let Some(output) = &self.output {
            settings.output = output.clone();
        }
        if let Some(column) = &self.keyword_column {
            settings.keyword_column = column.clone();
        }
        if let Some(path) = &self.service_account {
            settings.auth.service_account = Some(path.clone());
        }
        if let Some(user) = &self.delegated_user {
            settings.auth.delegated_user = Some(user.clone());
        }
        if let Some(path) = &self.oauth_client {
            settings.auth.oauth_client = Some(path.clone());
        }
        settings
    }
}

/// Resolve `--start-date/--end-date` or `--days` into a range.
pub(crate) fn resolve_date_range(
    start: Option<&str>,
    end: Option<&str>,
    days: Option<u32>,
    today: NaiveDate,
) -> Result<DateRange, CliError> {
    if let Some(days) = days {
        if days == 0 {
            return Err(CliError::args("--days must be at least 1"));
        }
        let start = today
            .checked_sub_signed(chrono::Duration::days(i64::from(days) - 1))
            .ok_or_else(|| CliError::args(format!("--days {} is out of range", days)))?;
        return DateRange::new(start, today).map_err(|e| CliError::args(e.to_string()));
    }

    let (Some(start), Some(end)) = (start, end) else {
        return Err(CliError::args("missing date range")
            .with_hint("pass --start-date and --end-date, or --days N"));
    };
    let start_date = parse_date("--start-date", start)?;
    let end_date = parse_date("--end-date", end)?;

    DateRange::new(start_date, end_date).map_err(|_| {
        CliError::args(format!(
            "--start-date ({}) must not be after --end-date ({})",
            start_date, end_date,
        ))
    })
}

fn parse_date(flag: &str, value: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::args(format!("invalid {} date {:?}: {}", flag, value, e)))
}

pub fn cmd_report(args: ReportArgs, settings: Settings) -> Result<(), CliError> {
    let settings = args.apply_to(settings);

    let property = settings
        .property
        .clone()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| {
            CliError::args("missing --property")
                .with_hint("e.g. --property https://example.com/ or --property sc-domain:example.com")
        })?;
    // Configured days only apply when no dates were passed
    let days = match (&args.start_date, &args.end_date) {
        (None, None) => args.days.or(settings.days),
        _ => args.days,
    };
    let range = resolve_date_range(
        args.start_date.as_deref(),
        args.end_date.as_deref(),
        days,
        Local::now().date_naive(),
    )?;
    if settings.row_limit == 0 {
        return Err(CliError::args("--row-limit must be at least 1"));
    }

    let column: KeywordColumn = settings.keyword_column.parse().unwrap_or_default();
    let keywords = kwreport_io::load_keywords(&args.keywords, &column).map_err(CliError::load)?;
    if keywords.is_empty() {
        tracing::warn!(path = %args.keywords.display(), "keyword list is empty");
        let outcome = kwreport_io::write_report(&[], &settings.output).map_err(CliError::write)?;
        tracing::info!(path = %outcome.path.display(), "empty report written");
        return Ok(());
    }

    let request = ReportRequest {
        property,
        range,
        row_limit: settings.row_limit,
    };

    let (source, pacing) = if args.mock {
        tracing::info!("mock mode: no credentials or network used");
        let source: Box<dyn MetricsSource> = Box::new(MockSource::new(&keywords));
        (source, PacingPolicy::disabled())
    } else {
        let credentials = select_credentials(&settings.auth).map_err(CliError::auth)?;
        let authenticator = Authenticator::new(&settings.http).map_err(CliError::auth)?;
        let grant = authenticator.authenticate(&credentials).map_err(CliError::auth)?;
        let tokens = TokenSource::new(authenticator, grant);
        let client = SearchConsoleClient::new(tokens, &settings.http).map_err(CliError::fetch)?;
        let pacing = PacingPolicy {
            batch: settings.pacing.batch,
            pause: settings.pacing.pause(),
        };
        let source: Box<dyn MetricsSource> = Box::new(client);
        (source, pacing)
    };

    tracing::info!(
        property = %request.property,
        range = %request.range,
        keywords = keywords.len(),
        "starting report"
    );
    let ReconReport { rows, summary } = ReconSession::new(source, request, pacing)
        .and_then(|mut session| session.reconcile(&keywords))
        .map_err(CliError::recon)?;

    let outcome = kwreport_io::write_report(&rows, &settings.output).map_err(CliError::write)?;
    tracing::info!(
        path = %outcome.path.display(),
        format = %outcome.format,
        rows = rows.len(),
        bulk = summary.bulk,
        exact = summary.exact,
        none = summary.unresolved(),
        "report written"
    );
    if outcome.fell_back {
        eprintln!(
            "note: spreadsheet output unavailable, wrote CSV to {}",
            outcome.path.display()
        );
    }

    Ok(())
}

use chrono::NaiveDate;
use thiserror::Error;

/// Failure talking to the reporting API.
///
/// Fatal when raised by the bulk query; degraded to a `none` row when
/// raised by an exact-match lookup.
#[derive(Debug, Error)]
pub enum FetchError {
    /// 401/403 from upstream.
    #[error("auth failed ({status}): {message}")]
    Auth { status: u16, message: String },
    /// 400 from upstream.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// 429 after all retries.
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },
    /// 5xx after all retries, or any other non-success status.
    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },
    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Success status with an unreadable body.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Upstream { status: 500..=599, .. } | Self::Transport(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ReconError {
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("row limit must be at least 1")]
    InvalidRowLimit,
    /// The single bulk query failed; the run cannot continue.
    #[error("bulk query failed: {0}")]
    Bulk(#[source] FetchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(FetchError::Transport("timeout".into()).is_transient());
        assert!(FetchError::RateLimited { attempts: 2 }.is_transient());
        assert!(FetchError::Upstream { status: 503, message: String::new() }.is_transient());
        assert!(!FetchError::Upstream { status: 404, message: String::new() }.is_transient());
        assert!(!FetchError::Auth { status: 401, message: String::new() }.is_transient());
    }

    #[test]
    fn bulk_error_message_names_phase() {
        let err = ReconError::Bulk(FetchError::Auth { status: 403, message: "forbidden".into() });
        assert_eq!(err.to_string(), "bulk query failed: auth failed (403): forbidden");
    }
}

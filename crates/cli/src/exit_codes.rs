//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, bad config)   |
//! | 3-9     | files            | Keyword input and report output          |
//! | 50-59   | fetch            | Search Console credentials and queries   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the mapping functions below

use kwreport_recon::{FetchError, ReconError};

use crate::gsc::AuthError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
#[allow(dead_code)]
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, invalid dates, unreadable or invalid config.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Files (3-9)
// =============================================================================

/// Keyword list could not be opened, decoded or parsed.
pub const EXIT_LOAD: u8 = 3;

/// Report could not be written, even after the CSV fallback.
pub const EXIT_WRITE: u8 = 4;

// =============================================================================
// Fetch (50-59) - Search Console
// =============================================================================

/// No credentials supplied, or a named credentials file is missing/invalid.
pub const EXIT_FETCH_NOT_AUTH: u8 = 50;

/// Auth rejected: token exchange failed, or 401/403 from the API.
pub const EXIT_FETCH_AUTH: u8 = 51;

/// Bad request rejected by upstream (400).
pub const EXIT_FETCH_VALIDATION: u8 = 52;

/// Rate limited after retries (429).
pub const EXIT_FETCH_RATE_LIMIT: u8 = 53;

/// Upstream error (5xx), network failure, or unreadable response.
pub const EXIT_FETCH_UPSTREAM: u8 = 54;

// =============================================================================
// Mapping
// =============================================================================

pub fn fetch_exit_code(err: &FetchError) -> u8 {
    match err {
        FetchError::Auth { .. } => EXIT_FETCH_AUTH,
        FetchError::Rejected { .. } => EXIT_FETCH_VALIDATION,
        FetchError::RateLimited { .. } => EXIT_FETCH_RATE_LIMIT,
        FetchError::Upstream { .. } | FetchError::Transport(_) | FetchError::Decode(_) => {
            EXIT_FETCH_UPSTREAM
        }
    }
}

pub fn auth_exit_code(err: &AuthError) -> u8 {
    if err.is_missing() {
        EXIT_FETCH_NOT_AUTH
    } else {
        EXIT_FETCH_AUTH
    }
}

pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::InvalidDateRange { .. } | ReconError::InvalidRowLimit => EXIT_USAGE,
        ReconError::Bulk(fetch) => fetch_exit_code(fetch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_fetch_codes() {
        let upstream = |status| FetchError::Upstream { status, message: String::new() };
        assert_eq!(fetch_exit_code(&FetchError::Auth { status: 401, message: String::new() }), 51);
        assert_eq!(fetch_exit_code(&FetchError::Rejected { status: 400, message: String::new() }), 52);
        assert_eq!(fetch_exit_code(&FetchError::RateLimited { attempts: 4 }), 53);
        assert_eq!(fetch_exit_code(&upstream(503)), 54);
        assert_eq!(fetch_exit_code(&FetchError::Transport("reset".into())), 54);
        assert_eq!(fetch_exit_code(&FetchError::Decode("eof".into())), 54);
    }

    #[test]
    fn test_auth_codes() {
        assert_eq!(auth_exit_code(&AuthError::NoCredentials), EXIT_FETCH_NOT_AUTH);
        assert_eq!(
            auth_exit_code(&AuthError::MissingFile { path: PathBuf::from("sa.json") }),
            EXIT_FETCH_NOT_AUTH
        );
        assert_eq!(
            auth_exit_code(&AuthError::Exchange { status: 400, message: "invalid_grant".into() }),
            EXIT_FETCH_AUTH
        );
        assert_eq!(auth_exit_code(&AuthError::Key("bad pem".into())), EXIT_FETCH_AUTH);
    }

    #[test]
    fn test_recon_codes() {
        assert_eq!(recon_exit_code(&ReconError::InvalidRowLimit), EXIT_USAGE);
        assert_eq!(
            recon_exit_code(&ReconError::Bulk(FetchError::RateLimited { attempts: 4 })),
            EXIT_FETCH_RATE_LIMIT
        );
    }

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_LOAD,
            EXIT_WRITE,
            EXIT_FETCH_NOT_AUTH,
            EXIT_FETCH_AUTH,
            EXIT_FETCH_VALIDATION,
            EXIT_FETCH_RATE_LIMIT,
            EXIT_FETCH_UPSTREAM,
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}

//! HTTP plumbing shared by the Search Console client and the token
//! exchanges: one blocking client, retry with exponential backoff, and
//! classification of upstream statuses into [`FetchError`].

use std::thread;
use std::time::Duration;

use kwreport_recon::FetchError;

// ── Constants ───────────────────────────────────────────────────────

pub(crate) const USER_AGENT: &str = concat!("kwreport/", env!("CARGO_PKG_VERSION"));

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

// ── FetchClient ─────────────────────────────────────────────────────

/// Blocking HTTP client that handles retry, backoff, and error
/// classification.
///
/// Callers pass a request-building closure that is invoked once per
/// attempt, plus the number of retries allowed after the first attempt.
pub(crate) struct FetchClient {
    pub(crate) http: reqwest::blocking::Client,
    backoff: Duration,
}

impl FetchClient {
    pub(crate) fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            backoff: INITIAL_BACKOFF,
        })
    }

    /// Start backoff at `backoff` instead of one second.
    pub(crate) fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Send with retry + exponential backoff and parse the JSON body.
    ///
    /// 401/403, 400 and other 4xx fail immediately. 429, 5xx and
    /// transport errors are retried; 429 honors `Retry-After`.
    pub(crate) fn request_with_retry(
        &self,
        max_retries: u32,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<serde_json::Value, FetchError> {
        let mut backoff = self.backoff;
        let attempts = max_retries + 1;

        for attempt in 0..=max_retries {
            let last = attempt == max_retries;

            match build_request(&self.http).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    if status == 401 || status == 403 {
                        return Err(FetchError::Auth {
                            status,
                            message: error_message(resp, status),
                        });
                    }

                    if status == 400 {
                        return Err(FetchError::Rejected {
                            status,
                            message: error_message(resp, status),
                        });
                    }

                    if (400..500).contains(&status) && status != 429 {
                        return Err(FetchError::Upstream {
                            status,
                            message: error_message(resp, status),
                        });
                    }

                    if status == 429 || status >= 500 {
                        if last {
                            return Err(if status == 429 {
                                FetchError::RateLimited { attempts }
                            } else {
                                FetchError::Upstream {
                                    status,
                                    message: format!(
                                        "{} after {} attempts",
                                        error_message(resp, status),
                                        attempts,
                                    ),
                                }
                            });
                        }

                        let wait = if status == 429 {
                            retry_after(&resp).unwrap_or(backoff)
                        } else {
                            backoff
                        };
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_retries,
                            wait_ms = wait.as_millis() as u64,
                            status,
                            "retrying request"
                        );
                        thread::sleep(wait);
                        backoff *= 2;
                        continue;
                    }

                    // Success: read as text first so a BOM-prefixed body
                    // still parses
                    let text = resp
                        .text()
                        .map_err(|e| FetchError::Decode(format!("failed to read response body: {}", e)))?;
                    return parse_json(&text);
                }
                Err(e) => {
                    if last {
                        return Err(FetchError::Transport(format!(
                            "{} (after {} attempts)",
                            e, attempts,
                        )));
                    }

                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries,
                        wait_ms = backoff.as_millis() as u64,
                        error = %e,
                        "retrying request"
                    );
                    thread::sleep(backoff);
                    backoff *= 2;
                }
            }
        }

        unreachable!("retry loop returns on its last attempt")
    }
}

// ── Response helpers ────────────────────────────────────────────────

pub(crate) fn parse_json(text: &str) -> Result<serde_json::Value, FetchError> {
    let trimmed = text.trim_start_matches('\u{feff}');
    serde_json::from_str(trimmed).map_err(|e| {
        FetchError::Decode(format!(
            "invalid JSON: {} (body: {})",
            e,
            truncate(trimmed, 200),
        ))
    })
}

fn retry_after(resp: &reqwest::blocking::Response) -> Option<Duration> {
    resp.headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn error_message(resp: reqwest::blocking::Response, status: u16) -> String {
    let body: serde_json::Value = resp.json().unwrap_or(serde_json::Value::Null);
    google_error_message(&body, status)
}

/// Pull a message out of a Google API or OAuth error body.
///
/// API errors look like `{"error": {"code": 403, "message": "..."}}`;
/// token endpoint errors like `{"error": "invalid_grant",
/// "error_description": "..."}`.
pub(crate) fn google_error_message(body: &serde_json::Value, status: u16) -> String {
    if let Some(msg) = body["error"]["message"].as_str() {
        return msg.to_string();
    }
    if let Some(desc) = body["error_description"].as_str() {
        return match body["error"].as_str() {
            Some(code) => format!("{}: {}", code, desc),
            None => desc.to_string(),
        };
    }
    if let Some(code) = body["error"].as_str() {
        return code.to_string();
    }
    format!("HTTP {}", status)
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

//! Search Console `searchAnalytics.query` client.
//!
//! Implements both fetch modes of [`MetricsSource`]: one top-N bulk query
//! and per-keyword exact-match queries against the same endpoint.

use serde::Deserialize;
use serde_json::json;

use kwreport_config::HttpSettings;
use kwreport_recon::{BulkIndex, FetchError, Metrics, MetricsSource, ReportRequest};

use super::auth::{AuthError, TokenSource};
use super::common::FetchClient;

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<ApiRow>,
}

/// Clicks and impressions may arrive as JSON floats.
#[derive(Debug, Deserialize)]
struct ApiRow {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    clicks: f64,
    #[serde(default)]
    impressions: f64,
    #[serde(default)]
    position: Option<f64>,
}

impl ApiRow {
    fn metrics(&self) -> Metrics {
        Metrics {
            clicks: round_count(self.clicks),
            impressions: round_count(self.impressions),
            position: self.position.filter(|p| p.is_finite()),
        }
    }
}

fn round_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

// ── Request bodies ──────────────────────────────────────────────────

fn bulk_body(request: &ReportRequest) -> serde_json::Value {
    json!({
        "startDate": request.range.start_param(),
        "endDate": request.range.end_param(),
        "dimensions": ["query"],
        "rowLimit": request.row_limit,
    })
}

fn exact_body(request: &ReportRequest, keyword: &str) -> serde_json::Value {
    json!({
        "startDate": request.range.start_param(),
        "endDate": request.range.end_param(),
        "dimensions": ["query"],
        "dimensionFilterGroups": [{
            "groupType": "and",
            "filters": [{
                "dimension": "query",
                "operator": "equals",
                "expression": keyword,
            }],
        }],
        "rowLimit": 1,
    })
}

/// Path of the query endpoint for `property`, with the property
/// percent-encoded as a single path segment.
pub(crate) fn query_path(property: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(property.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    format!("/webmasters/v3/sites/{}/searchAnalytics/query", encoded)
}

/// A token that could not be renewed surfaces as an auth failure of the
/// call that needed it.
fn renewal_failed(err: AuthError) -> FetchError {
    match err {
        AuthError::Exchange { status, message } => FetchError::Auth {
            status,
            message: format!("token renewal rejected: {}", message),
        },
        AuthError::Transport(message) => FetchError::Transport(message),
        other => FetchError::Auth {
            status: 401,
            message: other.to_string(),
        },
    }
}

fn parse_response(body: serde_json::Value) -> Result<QueryResponse, FetchError> {
    if body.is_null() {
        return Ok(QueryResponse::default());
    }
    serde_json::from_value(body).map_err(|e| FetchError::Decode(format!("unexpected response shape: {}", e)))
}

// ── Client ──────────────────────────────────────────────────────────

pub struct SearchConsoleClient {
    fetch: FetchClient,
    tokens: TokenSource,
    base_url: String,
    bulk_retries: u32,
    exact_retries: u32,
}

impl SearchConsoleClient {
    pub fn new(tokens: TokenSource, http: &HttpSettings) -> Result<Self, FetchError> {
        Ok(Self {
            fetch: FetchClient::new(http.timeout())?,
            tokens,
            base_url: http.api_base.trim_end_matches('/').to_string(),
            bulk_retries: http.bulk_retries,
            exact_retries: http.exact_retries,
        })
    }

    /// Client against an arbitrary base URL with default retry counts
    /// and no backoff delay.
    #[cfg(test)]
    pub fn with_base_url(tokens: TokenSource, base_url: String) -> Self {
        let defaults = HttpSettings::default();
        Self {
            fetch: FetchClient::new(defaults.timeout())
                .expect("http client")
                .with_backoff(std::time::Duration::ZERO),
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            bulk_retries: defaults.bulk_retries,
            exact_retries: defaults.exact_retries,
        }
    }

    /// POST `body` to the property's query endpoint. A 401 renews the
    /// token and repeats the call once.
    fn query(
        &self,
        property: &str,
        body: &serde_json::Value,
        retries: u32,
    ) -> Result<QueryResponse, FetchError> {
        let url = format!("{}{}", self.base_url, query_path(property));
        let token = self.tokens.bearer().map_err(renewal_failed)?;
        let send = |bearer: &str| {
            self.fetch.request_with_retry(retries, |http| {
                http.post(&url).bearer_auth(bearer).json(body)
            })
        };

        let value = match send(token.secret()) {
            Err(FetchError::Auth { status: 401, message }) if self.tokens.can_renew() => {
                tracing::info!(%message, "access token rejected, renewing");
                let token = self.tokens.renew().map_err(renewal_failed)?;
                send(token.secret())?
            }
            other => other?,
        };
        parse_response(value)
    }
}

impl MetricsSource for SearchConsoleClient {
    fn fetch_bulk(&self, request: &ReportRequest) -> Result<BulkIndex, FetchError> {
        tracing::debug!(
            property = %request.property,
            range = %request.range,
            row_limit = request.row_limit,
            "bulk query"
        );
        let response = self.query(&request.property, &bulk_body(request), self.bulk_retries)?;

        let mut index = BulkIndex::new();
        for row in &response.rows {
            if let Some(query) = row.keys.first() {
                index.insert(query, row.metrics());
            }
        }
        Ok(index)
    }

    fn fetch_exact(&self, request: &ReportRequest, keyword: &str) -> Result<Option<Metrics>, FetchError> {
        tracing::debug!(keyword, "exact-match query");
        let response = self.query(
            &request.property,
            &exact_body(request, keyword),
            self.exact_retries,
        )?;
        Ok(response.rows.first().map(ApiRow::metrics))
    }
}

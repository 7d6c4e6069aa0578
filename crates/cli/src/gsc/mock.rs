//! Offline [`MetricsSource`] for `--mock` runs.
//!
//! Deterministic: the same keyword list always produces the same bulk
//! index and exact-match answers.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use kwreport_recon::{fold_key, BulkIndex, FetchError, Metrics, MetricsSource, ReportRequest};

const SEED: u64 = 42;

pub struct MockSource {
    bulk: BulkIndex,
    exact: HashMap<String, Metrics>,
}

impl MockSource {
    /// Roughly two thirds of `keywords` land in the bulk index; half of
    /// the rest get an exact-match answer.
    pub fn new(keywords: &[String]) -> Self {
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut bulk = BulkIndex::new();
        let mut exact = HashMap::new();

        for keyword in keywords {
            let in_bulk = rng.gen_range(0..3) < 2;
            let metrics = random_metrics(&mut rng);
            if in_bulk {
                bulk.insert(keyword, metrics);
            } else if rng.gen_bool(0.5) {
                exact.insert(fold_key(keyword), metrics);
            }
        }

        Self { bulk, exact }
    }
}

fn random_metrics(rng: &mut StdRng) -> Metrics {
    let impressions = rng.gen_range(1..=5_000u64);
    let clicks = rng.gen_range(0..=impressions / 10);
    let position = (rng.gen_range(1.0..80.0f64) * 10.0).round() / 10.0;
    Metrics {
        clicks,
        impressions,
        position: Some(position),
    }
}

impl MetricsSource for MockSource {
    fn fetch_bulk(&self, request: &ReportRequest) -> Result<BulkIndex, FetchError> {
        tracing::debug!(property = %request.property, "mock bulk query");
        Ok(self.bulk.clone())
    }

    fn fetch_exact(&self, _request: &ReportRequest, keyword: &str) -> Result<Option<Metrics>, FetchError> {
        Ok(self.exact.get(&fold_key(keyword)).copied())
    }
}

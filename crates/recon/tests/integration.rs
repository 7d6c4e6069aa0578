use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::NaiveDate;
use proptest::prelude::*;

use kwreport_recon::{
    fold_key, BulkIndex, DateRange, FetchError, MetricRow, Metrics, MetricsSource, PacingPolicy,
    Pause, Provenance, ReconSession, ReportRequest,
};

// -------------------------------------------------------------------------
// Fixtures
// -------------------------------------------------------------------------

/// Backend answering from two fixed tables. Keywords listed in `broken`
/// fail their exact lookup with an upstream error.
#[derive(Debug)]
struct Tables {
    bulk: Vec<(String, Metrics)>,
    exact: HashMap<String, Metrics>,
    broken: HashSet<String>,
}

impl MetricsSource for Tables {
    fn fetch_bulk(&self, _request: &ReportRequest) -> Result<BulkIndex, FetchError> {
        Ok(self.bulk.iter().map(|(q, m)| (q.as_str(), *m)).collect())
    }

    fn fetch_exact(
        &self,
        _request: &ReportRequest,
        keyword: &str,
    ) -> Result<Option<Metrics>, FetchError> {
        if self.broken.contains(keyword) {
            return Err(FetchError::Upstream { status: 503, message: "unavailable".into() });
        }
        Ok(self.exact.get(keyword).copied())
    }
}

struct NoSleep;

impl Pause for NoSleep {
    fn pause(&mut self, _duration: Duration) {}
}

fn request() -> ReportRequest {
    ReportRequest {
        property: "sc-domain:example.com".into(),
        range: DateRange::new(
            NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
        )
        .unwrap(),
        row_limit: 25_000,
    }
}

fn run(source: &Tables, keywords: &[String]) -> kwreport_recon::ReconReport {
    ReconSession::with_pause(source, request(), PacingPolicy::default(), NoSleep)
        .unwrap()
        .reconcile(keywords)
        .unwrap()
}

fn metrics(clicks: u64, impressions: u64, position: f64) -> Metrics {
    Metrics { clicks, impressions, position: Some(position) }
}

// -------------------------------------------------------------------------
// Scenarios
// -------------------------------------------------------------------------

#[test]
fn end_to_end_three_keywords() {
    let source = Tables {
        bulk: vec![("foo".into(), metrics(10, 100, 2.5))],
        exact: HashMap::from([("bar".to_string(), metrics(0, 5, 40.0))]),
        broken: HashSet::new(),
    };
    let keywords = vec!["foo".to_string(), "bar".to_string(), "baz".to_string()];

    let report = run(&source, &keywords);

    let summary: Vec<_> = report
        .rows
        .iter()
        .map(|r| (r.keyword.as_str(), r.clicks, r.impressions, r.position, r.provenance))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("foo", 10, 100, Some(2.5), Provenance::Bulk),
            ("bar", 0, 5, Some(40.0), Provenance::Exact),
            ("baz", 0, 0, None, Provenance::None),
        ]
    );
}

#[test]
fn mixed_case_variants_in_bulk_keep_last() {
    let source = Tables {
        bulk: vec![
            ("Coffee Beans".into(), metrics(1, 10, 9.0)),
            ("coffee beans".into(), metrics(4, 40, 3.0)),
        ],
        exact: HashMap::new(),
        broken: HashSet::new(),
    };

    let report = run(&source, &["COFFEE BEANS".to_string()]);
    assert_eq!(report.rows[0].clicks, 4);
    assert_eq!(report.rows[0].keyword, "COFFEE BEANS");
    assert_eq!(report.summary.bulk_index_size, 1);
}

#[test]
fn every_exact_failure_is_contained() {
    let keywords: Vec<String> = (0..75).map(|i| format!("kw{i}")).collect();
    let source = Tables {
        bulk: Vec::new(),
        exact: HashMap::new(),
        broken: keywords.iter().cloned().collect(),
    };

    let report = run(&source, &keywords);
    assert_eq!(report.rows.len(), 75);
    assert_eq!(report.summary.failed, 75);
    assert_eq!(report.summary.pauses, 1);
    assert!(report.rows.iter().all(|r| *r == MetricRow::unresolved(r.keyword.clone())));
}

// -------------------------------------------------------------------------
// Properties
// -------------------------------------------------------------------------

fn arb_metrics() -> impl Strategy<Value = Metrics> {
    (0u64..1000, 0u64..100_000, 1.0f64..100.0).prop_map(|(c, i, p)| metrics(c, i, p))
}

fn arb_case() -> impl Strategy<Value = (Vec<String>, Tables)> {
    let keyword = "[a-zA-Z ]{1,8}";
    (
        prop::collection::vec(keyword, 1..40),
        prop::collection::vec((keyword, arb_metrics()), 0..30),
        prop::collection::vec((keyword, arb_metrics()), 0..30),
        prop::collection::vec(keyword, 0..5),
    )
        .prop_map(|(keywords, bulk, exact, broken)| {
            let tables = Tables {
                bulk,
                exact: exact.into_iter().collect(),
                broken: broken.into_iter().collect(),
            };
            (keywords, tables)
        })
}

proptest! {
    #[test]
    fn one_row_per_keyword_in_input_order((keywords, source) in arb_case()) {
        let report = run(&source, &keywords);
        prop_assert_eq!(report.rows.len(), keywords.len());
        for (row, keyword) in report.rows.iter().zip(&keywords) {
            prop_assert_eq!(&row.keyword, keyword);
        }
        let s = &report.summary;
        prop_assert_eq!(s.bulk + s.exact + s.not_found + s.failed, keywords.len());
    }

    #[test]
    fn bulk_hits_carry_index_metrics_verbatim((keywords, source) in arb_case()) {
        let index: BulkIndex = source.bulk.iter().map(|(q, m)| (q.as_str(), *m)).collect();
        let report = run(&source, &keywords);
        for row in &report.rows {
            match index.get(&row.keyword) {
                Some(expected) => {
                    prop_assert_eq!(row.provenance, Provenance::Bulk);
                    prop_assert_eq!(row.metrics(), *expected);
                }
                None => prop_assert_ne!(row.provenance, Provenance::Bulk),
            }
        }
    }

    #[test]
    fn none_rows_are_empty((keywords, source) in arb_case()) {
        let report = run(&source, &keywords);
        for row in report.rows.iter().filter(|r| r.provenance == Provenance::None) {
            prop_assert_eq!(row.clicks, 0);
            prop_assert_eq!(row.impressions, 0);
            prop_assert_eq!(row.position, None);
        }
    }

    #[test]
    fn rerun_is_identical((keywords, source) in arb_case()) {
        prop_assert_eq!(run(&source, &keywords).rows, run(&source, &keywords).rows);
    }

    #[test]
    fn pauses_follow_miss_count((keywords, source) in arb_case(), extra in 0usize..160) {
        let mut keywords = keywords;
        keywords.extend((0..extra).map(|i| format!("zz-unmatched-{i}")));
        let report = run(&source, &keywords);
        let misses = keywords
            .iter()
            .filter(|k| !source.bulk.iter().any(|(q, _)| fold_key(q) == fold_key(k)))
            .count();
        let expected = if misses == 0 { 0 } else { (misses - 1) / 50 };
        prop_assert_eq!(report.summary.pauses, expected);
    }
}

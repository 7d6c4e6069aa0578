use crate::error::ReconError;
use crate::model::{
    BulkIndex, MetricRow, MissOutcome, Provenance, ReconReport, ReconSummary, ReportRequest,
};
use crate::pacing::{Pacer, PacingPolicy, Pause, ThreadSleep};
use crate::source::MetricsSource;

/// Exact-match progress is logged every this many lookups.
pub const PROGRESS_EVERY: usize = 50;

/// State for one report run: the authenticated source, the pacer and,
/// once fetched, the bulk index.
pub struct ReconSession<S, P = ThreadSleep> {
    source: S,
    request: ReportRequest,
    pacer: Pacer<P>,
    bulk: Option<BulkIndex>,
}

impl<S: MetricsSource> ReconSession<S, ThreadSleep> {
    pub fn new(
        source: S,
        request: ReportRequest,
        policy: PacingPolicy,
    ) -> Result<Self, ReconError> {
        Self::with_pause(source, request, policy, ThreadSleep)
    }
}

impl<S: MetricsSource, P: Pause> ReconSession<S, P> {
    pub fn with_pause(
        source: S,
        request: ReportRequest,
        policy: PacingPolicy,
        sleeper: P,
    ) -> Result<Self, ReconError> {
        if request.row_limit == 0 {
            return Err(ReconError::InvalidRowLimit);
        }
        Ok(Self {
            source,
            request,
            pacer: Pacer::with_pause(policy, sleeper),
            bulk: None,
        })
    }

    pub fn request(&self) -> &ReportRequest {
        &self.request
    }

    pub fn bulk_index(&self) -> Option<&BulkIndex> {
        self.bulk.as_ref()
    }

    pub fn pacer(&self) -> &Pacer<P> {
        &self.pacer
    }

    /// Issue the bulk query once per session. Failure is fatal.
    pub fn load_bulk(&mut self) -> Result<&BulkIndex, ReconError> {
        if self.bulk.is_none() {
            tracing::info!(
                property = %self.request.property,
                range = %self.request.range,
                row_limit = self.request.row_limit,
                "fetching bulk query rows"
            );
            let index = self
                .source
                .fetch_bulk(&self.request)
                .map_err(ReconError::Bulk)?;
            tracing::info!(queries = index.len(), "bulk index built");
            self.bulk = Some(index);
        }
        Ok(self.bulk.get_or_insert_with(BulkIndex::new))
    }

    /// Resolve every keyword to exactly one row, in input order.
    ///
    /// Bulk hits come straight from the index; misses are looked up one
    /// at a time with pacing. A failed lookup becomes a `none` row.
    pub fn reconcile(&mut self, keywords: &[String]) -> Result<ReconReport, ReconError> {
        let mut summary = ReconSummary {
            total: keywords.len(),
            ..ReconSummary::default()
        };

        if keywords.is_empty() {
            tracing::warn!("no keywords to reconcile");
            return Ok(ReconReport {
                rows: Vec::new(),
                summary,
            });
        }

        let index = self.load_bulk()?;
        summary.bulk_index_size = index.len();

        let mut slots: Vec<Option<MetricRow>> = Vec::with_capacity(keywords.len());
        let mut misses: Vec<usize> = Vec::new();
        for (pos, keyword) in keywords.iter().enumerate() {
            match index.get(keyword) {
                Some(metrics) => {
                    summary.bulk += 1;
                    slots.push(Some(MetricRow::new(keyword.as_str(), *metrics, Provenance::Bulk)));
                }
                None => {
                    misses.push(pos);
                    slots.push(None);
                }
            }
        }

        tracing::info!(
            bulk = summary.bulk,
            misses = misses.len(),
            "resolving bulk misses with exact-match lookups"
        );

        self.pacer.reset_batch();
        let pauses_before = self.pacer.pauses();
        let total_misses = misses.len();
        for (done, pos) in misses.into_iter().enumerate() {
            let keyword = &keywords[pos];
            self.pacer.before_call();

            let outcome = match self.source.fetch_exact(&self.request, keyword) {
                Ok(Some(metrics)) => {
                    summary.exact += 1;
                    MissOutcome::Found(metrics)
                }
                Ok(None) => {
                    summary.not_found += 1;
                    MissOutcome::NotFound
                }
                Err(e) => {
                    tracing::warn!(keyword = %keyword, error = %e, "exact-match lookup failed");
                    summary.failed += 1;
                    MissOutcome::Failed(e)
                }
            };
            slots[pos] = Some(outcome.into_row(keyword));

            let done = done + 1;
            if done % PROGRESS_EVERY == 0 || done == total_misses {
                tracing::info!(done, total = total_misses, "exact-match progress");
            }
        }
        summary.pauses = self.pacer.pauses() - pauses_before;

        let rows: Vec<MetricRow> = slots.into_iter().flatten().collect();
        debug_assert_eq!(rows.len(), keywords.len());

        tracing::info!(
            total = summary.total,
            bulk = summary.bulk,
            exact = summary.exact,
            not_found = summary.not_found,
            failed = summary.failed,
            "reconciliation finished"
        );

        Ok(ReconReport { rows, summary })
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

/// One-shot reconciliation with a fresh session and real sleeps.
pub fn reconcile<S: MetricsSource>(
    source: S,
    keywords: &[String],
    request: ReportRequest,
    policy: PacingPolicy,
) -> Result<ReconReport, ReconError> {
    ReconSession::new(source, request, policy)?.reconcile(keywords)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::*;
    use crate::error::FetchError;
    use crate::model::{DateRange, Metrics};

    #[derive(Default)]
    struct Scripted {
        bulk: Vec<(&'static str, Metrics)>,
        exact: HashMap<&'static str, Metrics>,
        failing: Vec<&'static str>,
        bulk_fails: bool,
        bulk_calls: Cell<usize>,
        exact_calls: RefCell<Vec<String>>,
    }

    impl MetricsSource for Scripted {
        fn fetch_bulk(&self, _request: &ReportRequest) -> Result<BulkIndex, FetchError> {
            self.bulk_calls.set(self.bulk_calls.get() + 1);
            if self.bulk_fails {
                return Err(FetchError::Auth { status: 401, message: "expired".into() });
            }
            Ok(self.bulk.iter().map(|(q, m)| (*q, *m)).collect())
        }

        fn fetch_exact(
            &self,
            _request: &ReportRequest,
            keyword: &str,
        ) -> Result<Option<Metrics>, FetchError> {
            self.exact_calls.borrow_mut().push(keyword.to_string());
            if self.failing.iter().any(|f| *f == keyword) {
                return Err(FetchError::Transport("connection reset".into()));
            }
            Ok(self.exact.get(keyword).copied())
        }
    }

    #[derive(Default)]
    struct CountPauses(usize);

    impl Pause for CountPauses {
        fn pause(&mut self, _duration: Duration) {
            self.0 += 1;
        }
    }

    fn request() -> ReportRequest {
        let day = |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        ReportRequest {
            property: "https://example.com/".into(),
            range: DateRange::new(day("2025-10-01"), day("2025-10-31")).unwrap(),
            row_limit: 25_000,
        }
    }

    fn session(source: &Scripted) -> ReconSession<&Scripted, CountPauses> {
        ReconSession::with_pause(source, request(), PacingPolicy::default(), CountPauses::default())
            .unwrap()
    }

    fn kws(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn m(clicks: u64, impressions: u64, position: f64) -> Metrics {
        Metrics { clicks, impressions, position: Some(position) }
    }

    #[test]
    fn foo_bar_baz_scenario() {
        let source = Scripted {
            bulk: vec![("foo", m(10, 100, 2.5))],
            exact: HashMap::from([("bar", m(0, 5, 40.0))]),
            ..Default::default()
        };

        let report = session(&source).reconcile(&kws(&["foo", "bar", "baz"])).unwrap();

        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.rows[0], MetricRow::new("foo", m(10, 100, 2.5), Provenance::Bulk));
        assert_eq!(report.rows[1], MetricRow::new("bar", m(0, 5, 40.0), Provenance::Exact));
        assert_eq!(report.rows[2], MetricRow::unresolved("baz"));
        assert_eq!(report.summary.bulk, 1);
        assert_eq!(report.summary.exact, 1);
        assert_eq!(report.summary.not_found, 1);
        assert_eq!(*source.exact_calls.borrow(), vec!["bar", "baz"]);
    }

    #[test]
    fn input_order_is_preserved_across_provenance() {
        let source = Scripted {
            bulk: vec![("b", m(1, 1, 1.0)), ("d", m(2, 2, 2.0))],
            exact: HashMap::from([("c", m(3, 3, 3.0))]),
            ..Default::default()
        };

        let report = session(&source).reconcile(&kws(&["a", "b", "c", "d"])).unwrap();
        let order: Vec<_> = report.rows.iter().map(|r| r.keyword.as_str()).collect();
        let found: Vec<_> = report.rows.iter().map(|r| r.provenance).collect();

        assert_eq!(order, vec!["a", "b", "c", "d"]);
        assert_eq!(
            found,
            vec![Provenance::None, Provenance::Bulk, Provenance::Exact, Provenance::Bulk]
        );
    }

    #[test]
    fn lookup_is_case_insensitive_but_display_is_not() {
        let source = Scripted {
            bulk: vec![("rust tutorial", m(7, 70, 1.5))],
            ..Default::default()
        };

        let report = session(&source).reconcile(&kws(&["Rust Tutorial"])).unwrap();
        assert_eq!(report.rows[0].keyword, "Rust Tutorial");
        assert_eq!(report.rows[0].provenance, Provenance::Bulk);
        assert!(source.exact_calls.borrow().is_empty());
    }

    #[test]
    fn duplicate_keywords_each_get_a_row() {
        let source = Scripted::default();
        let report = session(&source).reconcile(&kws(&["x", "x", "X"])).unwrap();
        assert_eq!(report.rows.len(), 3);
        assert_eq!(source.exact_calls.borrow().len(), 3);
    }

    #[test]
    fn exact_failure_degrades_one_row() {
        let source = Scripted {
            exact: HashMap::from([("ok", m(1, 2, 3.0))]),
            failing: vec!["broken"],
            ..Default::default()
        };

        let report = session(&source).reconcile(&kws(&["broken", "ok"])).unwrap();
        assert_eq!(report.rows[0], MetricRow::unresolved("broken"));
        assert_eq!(report.rows[1].provenance, Provenance::Exact);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.unresolved(), 1);
    }

    #[test]
    fn bulk_failure_is_fatal() {
        let source = Scripted { bulk_fails: true, ..Default::default() };
        let err = session(&source).reconcile(&kws(&["a"])).unwrap_err();
        assert!(matches!(err, ReconError::Bulk(FetchError::Auth { status: 401, .. })));
        assert!(source.exact_calls.borrow().is_empty());
    }

    #[test]
    fn pauses_only_between_exact_batches() {
        let source = Scripted {
            bulk: vec![("hit", m(1, 1, 1.0))],
            ..Default::default()
        };
        let mut keywords: Vec<String> = (0..120).map(|i| format!("miss {i}")).collect();
        keywords.push("hit".into());

        let mut session = session(&source);
        let report = session.reconcile(&keywords).unwrap();

        assert_eq!(report.summary.pauses, 2);
        assert_eq!(session.pacer().sleeper().0, 2);
        assert_eq!(source.bulk_calls.get(), 1);
    }

    #[test]
    fn bulk_is_fetched_once_per_session() {
        let source = Scripted {
            bulk: vec![("a", m(1, 1, 1.0))],
            ..Default::default()
        };
        let mut session = session(&source);
        let first = session.reconcile(&kws(&["a", "b"])).unwrap();
        let second = session.reconcile(&kws(&["a", "b"])).unwrap();

        assert_eq!(first.rows, second.rows);
        assert_eq!(source.bulk_calls.get(), 1);
    }

    #[test]
    fn pause_count_restarts_when_session_is_reused() {
        let source = Scripted::default();
        let mut session = session(&source);

        let first: Vec<String> = (0..45).map(|i| format!("first {i}")).collect();
        let second: Vec<String> = (0..10).map(|i| format!("second {i}")).collect();

        assert_eq!(session.reconcile(&first).unwrap().summary.pauses, 0);
        assert_eq!(session.reconcile(&second).unwrap().summary.pauses, 0);
        assert_eq!(session.pacer().sleeper().0, 0);

        let third: Vec<String> = (0..51).map(|i| format!("third {i}")).collect();
        assert_eq!(session.reconcile(&third).unwrap().summary.pauses, 1);
    }

    #[test]
    fn empty_keyword_list_skips_network() {
        let source = Scripted::default();
        let report = session(&source).reconcile(&[]).unwrap();
        assert!(report.rows.is_empty());
        assert_eq!(source.bulk_calls.get(), 0);
    }

    #[test]
    fn zero_row_limit_is_rejected() {
        let source = Scripted::default();
        let mut req = request();
        req.row_limit = 0;
        let err = ReconSession::new(&source, req, PacingPolicy::default()).err().unwrap();
        assert!(matches!(err, ReconError::InvalidRowLimit));
    }
}

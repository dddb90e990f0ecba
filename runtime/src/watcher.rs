//! One watch cycle: fetch, extract, compare, deliver.
//!
//! Failures are contained within the cycle and routed to the operational
//! sink. The snapshot is only touched once a document has been extracted, and
//! it stays committed even when delivery fails.

use std::sync::Arc;

use statwatch::{ChangeEngine, MetricValue, ValueParseError};
use tracing::{info, warn};

use crate::acquisition::{ExtractError, Extractor, FetchError, HttpClient};
use crate::notify::{ChannelId, Notifier, NotifyError, OpsSink};

/// A failure inside one cycle.
#[derive(thiserror::Error, Debug)]
pub enum CycleError {
    #[error("failed to fetch api: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to read page: {0}")]
    Extract(#[from] ExtractError),

    #[error("skipped {} unreadable value(s): {}", .0.len(), list_errors(.0))]
    Values(Vec<ValueParseError>),

    #[error("send message failed: {0}")]
    Delivery(#[from] NotifyError),
}

fn list_errors(errors: &[ValueParseError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A report was produced and delivered.
    Delivered,
    /// Nothing worth reporting.
    Unchanged,
    /// A report was produced but delivery failed.
    Undelivered,
    /// Fetch or extraction failed; the snapshot was not touched.
    Aborted,
}

/// Drives cycles for one source and one destination.
pub struct Watcher<V> {
    engine: ChangeEngine<V>,
    http: HttpClient,
    url: String,
    extractor: Box<dyn Extractor>,
    notifier: Arc<dyn Notifier>,
    destination: ChannelId,
    ops: OpsSink,
    cycles: u64,
}

impl<V: MetricValue> Watcher<V> {
    /// Create a watcher that only logs operational errors.
    pub fn new(
        engine: ChangeEngine<V>,
        http: HttpClient,
        url: impl Into<String>,
        extractor: Box<dyn Extractor>,
        notifier: Arc<dyn Notifier>,
        destination: ChannelId,
    ) -> Self {
        Self {
            engine,
            http,
            url: url.into(),
            extractor,
            notifier,
            destination,
            ops: OpsSink::log_only(),
            cycles: 0,
        }
    }

    /// Route operational errors to `ops`.
    pub fn with_ops(mut self, ops: OpsSink) -> Self {
        self.ops = ops;
        self
    }

    pub fn engine(&self) -> &ChangeEngine<V> {
        &self.engine
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one full cycle. Never fails; problems go to the operational sink.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycles += 1;
        info!("cycle {} updating from {}", self.cycles, self.url);

        let body = match self.http.get(&self.url).await {
            Ok(body) => body,
            Err(e) => {
                self.ops.report(&CycleError::from(e)).await;
                return CycleOutcome::Aborted;
            }
        };

        let triples = match self.extractor.extract(&body) {
            Ok(triples) => triples,
            Err(e) => {
                self.ops.report(&CycleError::from(e)).await;
                return CycleOutcome::Aborted;
            }
        };

        let result = self.engine.process_snapshot(triples);
        if !result.comparison.parse_errors.is_empty() {
            let err = CycleError::Values(result.comparison.parse_errors.clone());
            self.ops.report(&err).await;
        }

        if !result.has_update {
            info!("no change.");
            return CycleOutcome::Unchanged;
        }

        info!(
            "have change; sending update ({} changed value(s)).",
            result.comparison.entries.len()
        );
        let mode = self.engine.style().emphasis.into();
        match self
            .notifier
            .send(&self.destination, &result.rendered_text, mode)
            .await
        {
            Ok(()) => CycleOutcome::Delivered,
            Err(e) => {
                warn!(
                    "report of {} chars to {} was not delivered",
                    result.rendered_text.chars().count(),
                    self.destination
                );
                self.ops.report(&CycleError::from(e)).await;
                CycleOutcome::Undelivered
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::acquisition::{SelectorSet, StatPageExtractor};
    use crate::notify::testing::RecordingNotifier;
    use crate::notify::FormatMode;
    use statwatch::{CategoryNormalizer, Numeric, Opaque, ReportStyle};
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn page(groups: &[(&str, &[(&str, &str)])]) -> String {
        let mut html = String::from(r#"<html><body><div id="stat">"#);
        for (category, entries) in groups {
            html.push_str(&format!(r#"<div class="tag"><strong>{category}</strong>"#));
            for (term, value) in *entries {
                html.push_str(&format!("<dl><dt>{term}</dt><dd>{value}</dd></dl>"));
            }
            html.push_str("</div>");
        }
        html.push_str("</div></body></html>");
        html
    }

    async fn serve(server: &MockServer, status: u16, body: String) {
        server.reset().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    fn watcher<V: MetricValue>(
        server: &MockServer,
        notifier: Arc<RecordingNotifier>,
    ) -> Watcher<V> {
        let engine = ChangeEngine::new(CategoryNormalizer::new(), ReportStyle::default());
        let http = HttpClient::new(Duration::from_secs(5))
            .unwrap()
            .with_max_retries(0);
        let extractor = StatPageExtractor::new(SelectorSet::default()).unwrap();
        Watcher::new(
            engine,
            http,
            server.uri(),
            Box::new(extractor),
            notifier.clone(),
            ChannelId::new("main"),
        )
        .with_ops(OpsSink::new(notifier, ChannelId::new("ops")))
    }

    async fn sent_to(rec: &RecordingNotifier, dest: &str) -> Vec<String> {
        rec.messages()
            .await
            .into_iter()
            .filter(|(d, _, _)| d.as_str() == dest)
            .map(|(_, text, _)| text)
            .collect()
    }

    #[tokio::test]
    async fn test_first_cycle_is_silent_then_changes_are_sent() {
        let server = MockServer::start().await;
        let rec = Arc::new(RecordingNotifier::default());
        let mut w: Watcher<Numeric> = watcher(&server, rec.clone());

        serve(&server, 200, page(&[("confirmed", &[("cases", "100")])])).await;
        assert_eq!(w.run_cycle().await, CycleOutcome::Unchanged);
        assert!(rec.messages().await.is_empty());

        serve(&server, 200, page(&[("confirmed", &[("cases", "105")])])).await;
        assert_eq!(w.run_cycle().await, CycleOutcome::Delivered);

        let msgs = rec.messages().await;
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].0, ChannelId::new("main"));
        assert_eq!(
            msgs[0].1,
            "*Data update*\nconfirmed's cases increased by 5 (105)\n\n*confirmed*\n  — cases: *105*\n"
        );
        assert_eq!(msgs[0].2, FormatMode::Markdown);

        assert_eq!(w.run_cycle().await, CycleOutcome::Unchanged);
        assert_eq!(rec.messages().await.len(), 1);
        assert_eq!(w.cycles(), 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_without_touching_snapshot() {
        let server = MockServer::start().await;
        let rec = Arc::new(RecordingNotifier::default());
        let mut w: Watcher<Numeric> = watcher(&server, rec.clone());

        serve(&server, 200, page(&[("A", &[("x", "1")])])).await;
        w.run_cycle().await;
        let before = w.engine().snapshot().clone();

        serve(&server, 500, String::new()).await;
        assert_eq!(w.run_cycle().await, CycleOutcome::Aborted);
        assert_eq!(w.engine().snapshot(), &before);

        let ops = sent_to(&rec, "ops").await;
        assert_eq!(ops.len(), 1);
        assert!(ops[0].contains("failed to fetch api"));
        assert!(sent_to(&rec, "main").await.is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_page_aborts() {
        let server = MockServer::start().await;
        let rec = Arc::new(RecordingNotifier::default());
        let mut w: Watcher<Opaque> = watcher(&server, rec.clone());

        serve(&server, 200, "<html><body>Service Unavailable</body></html>".into()).await;
        assert_eq!(w.run_cycle().await, CycleOutcome::Aborted);
        assert!(w.engine().snapshot().is_empty());

        let ops = sent_to(&rec, "ops").await;
        assert_eq!(ops.len(), 1);
        assert!(ops[0].contains("failed to read page"));
    }

    #[tokio::test]
    async fn test_unreadable_values_are_reported_and_skipped() {
        let server = MockServer::start().await;
        let rec = Arc::new(RecordingNotifier::default());
        let mut w: Watcher<Numeric> = watcher(&server, rec.clone());

        serve(&server, 200, page(&[("A", &[("x", "1"), ("y", "2")])])).await;
        w.run_cycle().await;

        serve(&server, 200, page(&[("A", &[("x", "n/a"), ("y", "3")])])).await;
        assert_eq!(w.run_cycle().await, CycleOutcome::Delivered);

        let ops = sent_to(&rec, "ops").await;
        assert_eq!(ops.len(), 1);
        assert!(ops[0].contains("skipped 1 unreadable value(s)"));
        assert!(ops[0].contains("\"n/a\""));

        let main = sent_to(&rec, "main").await;
        assert_eq!(main.len(), 1);
        assert!(main[0].contains("A's y increased by 1 (3)"));
        assert_eq!(w.engine().snapshot().get("A", "x"), Some(&Numeric(1)));
    }

    #[tokio::test]
    async fn test_failed_delivery_is_not_resent_next_cycle() {
        let server = MockServer::start().await;
        let rec = Arc::new(RecordingNotifier::failing());
        let mut w: Watcher<Opaque> = watcher(&server, rec.clone());

        serve(&server, 200, page(&[("A", &[("x", "old")])])).await;
        w.run_cycle().await;

        serve(&server, 200, page(&[("A", &[("x", "new")])])).await;
        assert_eq!(w.run_cycle().await, CycleOutcome::Undelivered);
        assert_eq!(w.run_cycle().await, CycleOutcome::Unchanged);

        assert_eq!(sent_to(&rec, "main").await.len(), 1);
        // One attempt for the delivery failure; the failing sink itself is not retried.
        let ops = sent_to(&rec, "ops").await;
        assert_eq!(ops.len(), 1);
        assert!(ops[0].contains("send message failed"));
        assert_eq!(
            w.engine().snapshot().get("A", "x"),
            Some(&Opaque("new".into()))
        );
    }
}

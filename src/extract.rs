/// Incremental log-to-metric extraction: feed raw output chunks in, get
/// typed milestone events out.
use crate::metrics::{Metric, MetricRecord, SessionSignals};
use crate::patterns::{self, StreamSource, METRIC_PATTERNS};
use tokio::sync::mpsc;

/// Events raised while scanning dev-server output. Each fires at most once
/// per session.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionEvent {
    /// A timing milestone was observed for the first time.
    MetricObserved { metric: Metric, value: f64 },
    /// The server reported ready. Follows `MetricObserved` for startUp.
    ServerReady,
    /// Dependency prebundling finished. Follows `MetricObserved` for prebundle.
    DependenciesBundled,
}

/// Scans dev-server output and owns the session's metric record and signals.
///
/// Events are pushed synchronously during [`feed`](Self::feed), metric event
/// before its derived event. The write-once record guarantees no milestone
/// event ever fires twice.
pub struct ExtractionEngine {
    record: MetricRecord,
    signals: SessionSignals,
    events: mpsc::UnboundedSender<ExtractionEvent>,
}

impl ExtractionEngine {
    /// Create an engine and the receiving end of its event stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExtractionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            record: MetricRecord::default(),
            signals: SessionSignals::default(),
            events,
        };
        (engine, rx)
    }

    /// Scan one chunk of subprocess output.
    ///
    /// Chunks are matched as received; partial lines are not buffered across
    /// calls. Never fails: a chunk nothing matches is simply ignored.
    pub fn feed(&mut self, chunk: &str, source: StreamSource) {
        let text = console::strip_ansi_codes(chunk);

        if source == StreamSource::Stdout && self.signals.server_url().is_none() {
            if let Some(url) = patterns::match_server_url(&text) {
                tracing::debug!(url, "local server url detected");
                self.signals.set_server_url(url.to_string());
            }
        }
        if source == StreamSource::Stderr
            && !self.signals.deps_hash_consistent()
            && patterns::match_hash_consistent(&text)
        {
            tracing::debug!("dependency hash reported consistent");
            self.signals.set_deps_hash_consistent();
        }

        for pattern in METRIC_PATTERNS.iter().filter(|p| p.source == source) {
            if self.record.get(pattern.metric).is_some() {
                continue;
            }
            if let Some(value) = pattern.extract(&text) {
                self.observe(pattern.metric, value);
            }
        }
    }

    /// Record the locally measured page-load duration.
    ///
    /// Page load is not parsed from the log; it is written here directly,
    /// under the same write-once rule as parsed milestones.
    pub fn record_page_load(&mut self, value: f64) {
        if self.record.get(Metric::PageLoad).is_none() {
            self.observe(Metric::PageLoad, value);
        }
    }

    fn observe(&mut self, metric: Metric, value: f64) {
        if !self.record.set(metric, value) {
            return;
        }
        tracing::debug!(metric = metric.as_str(), value, "milestone observed");
        // Receiver drop only happens at session teardown; late sends are moot
        let _ = self
            .events
            .send(ExtractionEvent::MetricObserved { metric, value });
        match metric {
            Metric::StartUp => {
                let _ = self.events.send(ExtractionEvent::ServerReady);
            }
            Metric::Prebundle => {
                let _ = self.events.send(ExtractionEvent::DependenciesBundled);
            }
            _ => {}
        }
    }

    pub fn record(&self) -> &MetricRecord {
        &self.record
    }

    pub fn server_url(&self) -> Option<&str> {
        self.signals.server_url()
    }

    pub fn deps_hash_consistent(&self) -> bool {
        self.signals.deps_hash_consistent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ExtractionEvent>) -> Vec<ExtractionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_start_up_emits_metric_then_server_ready() {
        let (mut engine, mut rx) = ExtractionEngine::new();
        engine.feed("VITE v5.4.2  ready in 123.4ms\n", StreamSource::Stdout);

        assert_eq!(engine.record().start_up, Some(123.4));
        assert_eq!(
            drain(&mut rx),
            vec![
                ExtractionEvent::MetricObserved {
                    metric: Metric::StartUp,
                    value: 123.4
                },
                ExtractionEvent::ServerReady,
            ]
        );
    }

    #[test]
    fn test_prebundle_emits_metric_then_dependencies_bundled() {
        let (mut engine, mut rx) = ExtractionEngine::new();
        engine.feed(
            "vite:deps dependencies bundled in 203.11ms\n",
            StreamSource::Stderr,
        );

        assert_eq!(
            drain(&mut rx),
            vec![
                ExtractionEvent::MetricObserved {
                    metric: Metric::Prebundle,
                    value: 203.11
                },
                ExtractionEvent::DependenciesBundled,
            ]
        );
    }

    #[test]
    fn test_duplicate_match_keeps_first_value_and_stays_silent() {
        let (mut engine, mut rx) = ExtractionEngine::new();
        engine.feed("ready in 100ms", StreamSource::Stdout);
        drain(&mut rx);

        engine.feed("ready in 999ms", StreamSource::Stdout);
        assert_eq!(engine.record().start_up, Some(100.0));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_unmatched_chunk_emits_nothing() {
        let (mut engine, mut rx) = ExtractionEngine::new();
        engine.feed("hello world", StreamSource::Stdout);
        engine.feed("hello world", StreamSource::Stderr);

        assert_eq!(engine.record(), &MetricRecord::default());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_matchers_are_routed_by_stream() {
        let (mut engine, mut rx) = ExtractionEngine::new();
        // A startUp-shaped line on the wrong stream is ignored
        engine.feed("ready in 100ms", StreamSource::Stderr);
        assert_eq!(engine.record().start_up, None);
        // And stderr shapes are not matched on stdout
        engine.feed("vite:deps scan completed in 51ms", StreamSource::Stdout);
        assert_eq!(engine.record().scan_dependencies, None);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_signals_do_not_emit_events() {
        let (mut engine, mut rx) = ExtractionEngine::new();
        engine.feed("➜  Local:   http://localhost:5173/\n", StreamSource::Stdout);
        engine.feed("vite:deps hash is consistent. Skipping.\n", StreamSource::Stderr);

        assert_eq!(engine.server_url(), Some("http://localhost:5173/"));
        assert!(engine.deps_hash_consistent());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_server_url_is_write_once() {
        let (mut engine, _rx) = ExtractionEngine::new();
        engine.feed("Local: http://localhost:5173/", StreamSource::Stdout);
        engine.feed("Local: http://localhost:4000/", StreamSource::Stdout);
        assert_eq!(engine.server_url(), Some("http://localhost:5173/"));
    }

    #[test]
    fn test_ansi_sequences_are_stripped_before_matching() {
        let (mut engine, mut rx) = ExtractionEngine::new();
        engine.feed(
            "\x1b[32mready\x1b[0m in \x1b[33m99.9\x1b[0m ms\n",
            StreamSource::Stdout,
        );
        assert_eq!(engine.record().start_up, Some(99.9));
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn test_multiple_milestones_in_one_chunk() {
        let (mut engine, mut rx) = ExtractionEngine::new();
        let chunk = "vite:config config file loaded in 45.2ms\n\
                     vite:deps scan completed in 51.23ms\n";
        engine.feed(chunk, StreamSource::Stderr);

        assert_eq!(engine.record().load_config, Some(45.2));
        assert_eq!(engine.record().scan_dependencies, Some(51.23));
        // Both fire exactly once; cross-metric order within a chunk is
        // the matcher invocation order, which callers must not rely on.
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events.contains(&ExtractionEvent::MetricObserved {
            metric: Metric::LoadConfig,
            value: 45.2
        }));
        assert!(events.contains(&ExtractionEvent::MetricObserved {
            metric: Metric::ScanDependencies,
            value: 51.23
        }));
    }

    #[test]
    fn test_record_page_load_is_write_once_and_emits() {
        let (mut engine, mut rx) = ExtractionEngine::new();
        engine.record_page_load(42.0);
        engine.record_page_load(77.0);

        assert_eq!(engine.record().page_load, Some(42.0));
        assert_eq!(
            drain(&mut rx),
            vec![ExtractionEvent::MetricObserved {
                metric: Metric::PageLoad,
                value: 42.0
            }]
        );
    }

    #[test]
    fn test_feed_survives_dropped_receiver() {
        let (mut engine, rx) = ExtractionEngine::new();
        drop(rx);
        engine.feed("ready in 10ms", StreamSource::Stdout);
        assert_eq!(engine.record().start_up, Some(10.0));
    }
}

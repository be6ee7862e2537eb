/// Milestone detection: match chunks of vite debug output against the fixed
/// set of startup milestone shapes.
///
/// With `--debug deps,config,esbuild` the dev server writes lines like:
/// - stdout: `VITE v5.4.2  ready in 312 ms`, `➜  Local:   http://localhost:5173/`
/// - stderr: `vite:config config file loaded in 45.2ms`,
///   `vite:deps scan completed in 51.23ms`,
///   `vite:deps dependencies bundled in 203.11ms`,
///   `vite:deps hash is consistent. Skipping.`,
///   `vite:esbuild 34ms init tsconfck`
///
/// Matching is case-insensitive with flexible whitespace and operates on
/// whatever chunk was received; a chunk nothing matches is not an error.
use crate::metrics::Metric;
use regex::Regex;
use std::sync::LazyLock;

/// Which subprocess stream a pattern listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

/// One recognized milestone shape: a regex whose first capture group is the
/// duration in milliseconds.
pub struct MetricPattern {
    pub metric: Metric,
    pub source: StreamSource,
    regex: Regex,
}

impl MetricPattern {
    fn new(metric: Metric, source: StreamSource, pattern: &str) -> Self {
        Self {
            metric,
            source,
            regex: Regex::new(pattern).unwrap(),
        }
    }

    /// Extract the duration from a chunk of output, if present.
    pub fn extract(&self, text: &str) -> Option<f64> {
        extract_duration(&self.regex, text)
    }
}

/// Milestone patterns, one per timed startup phase. The table is the single
/// place new milestones or format changes land.
pub static METRIC_PATTERNS: LazyLock<Vec<MetricPattern>> = LazyLock::new(|| {
    vec![
        MetricPattern::new(
            Metric::StartUp,
            StreamSource::Stdout,
            r"(?i)ready\s+in.*?([\d.]+)\s*ms",
        ),
        MetricPattern::new(
            Metric::ScanDependencies,
            StreamSource::Stderr,
            r"(?i)vite:deps.*?scan\s*completed.*?([\d.]+)\s*ms",
        ),
        MetricPattern::new(
            Metric::Prebundle,
            StreamSource::Stderr,
            r"(?i)vite:deps.*?dependencies\s*bundled.*?([\d.]+)\s*ms",
        ),
        MetricPattern::new(
            Metric::LoadConfig,
            StreamSource::Stderr,
            r"(?i)vite:config.+?loaded.+?([\d.]+)ms",
        ),
        MetricPattern::new(
            Metric::InitTsconfck,
            StreamSource::Stderr,
            r"(?i)vite:esbuild.*?([\d.]+)ms.*?tsconfck",
        ),
    ]
});

/// Local-URL line on stdout, e.g. `➜  Local:   http://localhost:5173/`.
static SERVER_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)local:.*?(http\S+)").unwrap());

/// `vite:deps` reporting its dependency hash as consistent (cache reuse).
static HASH_CONSISTENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)vite:deps.*?hash.+?consistent").unwrap());

/// Parse the first capture group as fractional milliseconds.
///
/// A capture that fails to parse (e.g. a stray `...` token) is a no-match.
fn extract_duration(regex: &Regex, text: &str) -> Option<f64> {
    regex.captures(text)?.get(1)?.as_str().parse::<f64>().ok()
}

/// Extract the server's local URL from a chunk, if present.
pub fn match_server_url(text: &str) -> Option<&str> {
    Some(SERVER_URL.captures(text)?.get(1)?.as_str())
}

/// Whether a chunk reports the dependency hash as consistent.
pub fn match_hash_consistent(text: &str) -> bool {
    HASH_CONSISTENT.is_match(text)
}

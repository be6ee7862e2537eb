/// Write-once timing record and session signals for one measurement run.
///
/// The record is monotonically filled: the first observed value for a
/// milestone sticks, later matches for the same milestone are ignored.

/// A named phase boundary in the dev server's startup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    StartUp,
    ScanDependencies,
    LoadConfig,
    InitTsconfck,
    Prebundle,
    PageLoad,
}

impl Metric {
    /// Label used in status lines.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::StartUp => "server start up",
            Metric::ScanDependencies => "scan dependencies",
            Metric::LoadConfig => "load config",
            Metric::InitTsconfck => "init tsconfck",
            Metric::Prebundle => "pre bundle",
            Metric::PageLoad => "page load",
        }
    }

    /// Stable identifier for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::StartUp => "startUp",
            Metric::ScanDependencies => "scanDependencies",
            Metric::LoadConfig => "loadConfig",
            Metric::InitTsconfck => "initTsconfck",
            Metric::Prebundle => "prebundle",
            Metric::PageLoad => "pageLoad",
        }
    }
}

/// Milestone durations for one session, in milliseconds.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MetricRecord {
    pub start_up: Option<f64>,
    pub scan_dependencies: Option<f64>,
    pub load_config: Option<f64>,
    pub init_tsconfck: Option<f64>,
    pub prebundle: Option<f64>,
    pub page_load: Option<f64>,
}

impl MetricRecord {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::StartUp => self.start_up,
            Metric::ScanDependencies => self.scan_dependencies,
            Metric::LoadConfig => self.load_config,
            Metric::InitTsconfck => self.init_tsconfck,
            Metric::Prebundle => self.prebundle,
            Metric::PageLoad => self.page_load,
        }
    }

    /// Record a milestone duration. Returns `false` (leaving the existing
    /// value untouched) if the milestone was already recorded.
    pub fn set(&mut self, metric: Metric, value: f64) -> bool {
        let slot = match metric {
            Metric::StartUp => &mut self.start_up,
            Metric::ScanDependencies => &mut self.scan_dependencies,
            Metric::LoadConfig => &mut self.load_config,
            Metric::InitTsconfck => &mut self.init_tsconfck,
            Metric::Prebundle => &mut self.prebundle,
            Metric::PageLoad => &mut self.page_load,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }
}

/// Non-timing signals observed from the dev server, each set at most once.
#[derive(Debug, Default, Clone)]
pub struct SessionSignals {
    server_url: Option<String>,
    deps_hash_consistent: bool,
}

impl SessionSignals {
    /// The local URL the server reported, if observed yet.
    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    /// Record the local URL. First observation wins.
    pub fn set_server_url(&mut self, url: String) -> bool {
        if self.server_url.is_some() {
            return false;
        }
        self.server_url = Some(url);
        true
    }

    /// Whether the server reported its dependency hash as consistent.
    pub fn deps_hash_consistent(&self) -> bool {
        self.deps_hash_consistent
    }

    /// Latch the hash-consistency flag. Returns `false` if already latched.
    pub fn set_deps_hash_consistent(&mut self) -> bool {
        if self.deps_hash_consistent {
            return false;
        }
        self.deps_hash_consistent = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRICS: [Metric; 6] = [
        Metric::StartUp,
        Metric::ScanDependencies,
        Metric::LoadConfig,
        Metric::InitTsconfck,
        Metric::Prebundle,
        Metric::PageLoad,
    ];

    #[test]
    fn test_record_starts_empty() {
        let record = MetricRecord::default();
        for metric in ALL_METRICS {
            assert_eq!(record.get(metric), None);
        }
    }

    #[test]
    fn test_set_and_get_each_metric() {
        for (i, metric) in ALL_METRICS.into_iter().enumerate() {
            let mut record = MetricRecord::default();
            let value = 10.5 + i as f64;
            assert!(record.set(metric, value));
            assert_eq!(record.get(metric), Some(value));
        }
    }

    #[test]
    fn test_set_is_write_once() {
        let mut record = MetricRecord::default();
        assert!(record.set(Metric::StartUp, 123.4));
        assert!(!record.set(Metric::StartUp, 999.9));
        assert_eq!(record.get(Metric::StartUp), Some(123.4));
    }

    #[test]
    fn test_metrics_are_independent() {
        let mut record = MetricRecord::default();
        record.set(Metric::Prebundle, 50.0);
        assert_eq!(record.get(Metric::Prebundle), Some(50.0));
        assert_eq!(record.get(Metric::StartUp), None);
        assert_eq!(record.get(Metric::PageLoad), None);
    }

    #[test]
    fn test_zero_duration_still_counts_as_set() {
        let mut record = MetricRecord::default();
        assert!(record.set(Metric::LoadConfig, 0.0));
        assert!(!record.set(Metric::LoadConfig, 12.0));
        assert_eq!(record.get(Metric::LoadConfig), Some(0.0));
    }

    #[test]
    fn test_server_url_set_once() {
        let mut signals = SessionSignals::default();
        assert_eq!(signals.server_url(), None);
        assert!(signals.set_server_url("http://localhost:5173/".to_string()));
        assert!(!signals.set_server_url("http://localhost:4000/".to_string()));
        assert_eq!(signals.server_url(), Some("http://localhost:5173/"));
    }

    #[test]
    fn test_hash_consistent_latches() {
        let mut signals = SessionSignals::default();
        assert!(!signals.deps_hash_consistent());
        assert!(signals.set_deps_hash_consistent());
        assert!(!signals.set_deps_hash_consistent());
        assert!(signals.deps_hash_consistent());
    }
}

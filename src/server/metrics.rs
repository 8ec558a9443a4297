//! Request and prediction metrics in Prometheus text exposition format.
//!
//! Values live in a single snapshot behind a lock. In multi-process mode every
//! update also writes this process's snapshot into the shared directory, so a
//! scrape served by any process renders the sum of every snapshot found there.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const PREDICTIONS_TOTAL: &str = "model_predictions_total";
pub const PREDICTION_DURATION: &str = "model_prediction_duration_seconds";

/// Histogram bucket upper bounds, in seconds.
pub const LATENCY_BUCKETS: [f64; 11] = [
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

const SNAPSHOT_PREFIX: &str = "irisml_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Counter,
    Histogram,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Histogram => "histogram",
        }
    }
}

struct MetricDef {
    name: &'static str,
    help: &'static str,
    kind: MetricKind,
}

const DEFINITIONS: [MetricDef; 4] = [
    MetricDef {
        name: HTTP_REQUESTS_TOTAL,
        help: "Total HTTP requests by method, endpoint and status",
        kind: MetricKind::Counter,
    },
    MetricDef {
        name: HTTP_REQUEST_DURATION,
        help: "HTTP request latency in seconds",
        kind: MetricKind::Histogram,
    },
    MetricDef {
        name: PREDICTIONS_TOTAL,
        help: "Predictions served by predicted class",
        kind: MetricKind::Counter,
    },
    MetricDef {
        name: PREDICTION_DURATION,
        help: "Model scoring latency in seconds",
        kind: MetricKind::Histogram,
    },
];

/// Per-series histogram state. `buckets` are non-cumulative counts aligned
/// with [`LATENCY_BUCKETS`]; observations above the last bound only count
/// toward `count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramData {
    pub buckets: Vec<u64>,
    pub sum: f64,
    pub count: u64,
}

impl HistogramData {
    fn observe(&mut self, value: f64) {
        if self.buckets.len() != LATENCY_BUCKETS.len() {
            self.buckets.resize(LATENCY_BUCKETS.len(), 0);
        }
        if let Some(idx) = LATENCY_BUCKETS.iter().position(|&bound| value <= bound) {
            self.buckets[idx] += 1;
        }
        self.sum += value;
        self.count += 1;
    }

    fn merge(&mut self, other: &HistogramData) {
        if self.buckets.len() < other.buckets.len() {
            self.buckets.resize(other.buckets.len(), 0);
        }
        for (slot, value) in self.buckets.iter_mut().zip(&other.buckets) {
            *slot += value;
        }
        self.sum += other.sum;
        self.count += other.count;
    }
}

/// All series of all metrics, keyed by metric name then rendered labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, BTreeMap<String, u64>>,
    pub histograms: BTreeMap<String, BTreeMap<String, HistogramData>>,
}

impl MetricsSnapshot {
    fn merge(&mut self, other: &MetricsSnapshot) {
        for (name, series) in &other.counters {
            let target = self.counters.entry(name.clone()).or_default();
            for (labels, value) in series {
                *target.entry(labels.clone()).or_default() += value;
            }
        }
        for (name, series) in &other.histograms {
            let target = self.histograms.entry(name.clone()).or_default();
            for (labels, data) in series {
                target.entry(labels.clone()).or_default().merge(data);
            }
        }
    }

    /// Counter value for one series, `0` when absent.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .get(name)
            .and_then(|series| series.get(&format_labels(labels)))
            .copied()
            .unwrap_or(0)
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for def in &DEFINITIONS {
            out.push_str(&format!("# HELP {} {}\n", def.name, def.help));
            out.push_str(&format!("# TYPE {} {}\n", def.name, def.kind.as_str()));
            match def.kind {
                MetricKind::Counter => {
                    for (labels, value) in self.counters.get(def.name).into_iter().flatten() {
                        out.push_str(&format!("{}{} {}\n", def.name, wrap(labels), value));
                    }
                }
                MetricKind::Histogram => {
                    for (labels, data) in self.histograms.get(def.name).into_iter().flatten() {
                        render_histogram(&mut out, def.name, labels, data);
                    }
                }
            }
        }
        out
    }
}

fn render_histogram(out: &mut String, name: &str, labels: &str, data: &HistogramData) {
    let mut cumulative = 0u64;
    for (idx, bound) in LATENCY_BUCKETS.iter().enumerate() {
        cumulative += data.buckets.get(idx).copied().unwrap_or(0);
        let le = join_labels(labels, &format!("le=\"{bound}\""));
        out.push_str(&format!("{name}_bucket{{{le}}} {cumulative}\n"));
    }
    let le = join_labels(labels, "le=\"+Inf\"");
    out.push_str(&format!("{name}_bucket{{{le}}} {}\n", data.count));
    out.push_str(&format!("{name}_sum{} {}\n", wrap(labels), data.sum));
    out.push_str(&format!("{name}_count{} {}\n", wrap(labels), data.count));
}

fn wrap(labels: &str) -> String {
    if labels.is_empty() {
        String::new()
    } else {
        format!("{{{labels}}}")
    }
}

fn join_labels(labels: &str, extra: &str) -> String {
    if labels.is_empty() {
        extra.to_string()
    } else {
        format!("{labels},{extra}")
    }
}

/// Render label pairs as `k="v",k2="v2"` with Prometheus escaping.
pub fn format_labels(labels: &[(&str, &str)]) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Process-wide metrics store.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    snapshot: RwLock<MetricsSnapshot>,
    multiproc_dir: Option<PathBuf>,
    // Serializes snapshot files so a stale copy never overwrites a newer one.
    flush_lock: Mutex<()>,
}

impl MetricsRegistry {
    /// Create a registry; `multiproc_dir` enables multi-process aggregation.
    pub fn new(multiproc_dir: Option<PathBuf>) -> Self {
        Self {
            snapshot: RwLock::new(MetricsSnapshot::default()),
            multiproc_dir,
            flush_lock: Mutex::new(()),
        }
    }

    pub fn is_multiprocess(&self) -> bool {
        self.multiproc_dir.is_some()
    }

    /// Count one finished HTTP request and its latency.
    pub fn record_request(&self, method: &str, endpoint: &str, status: u16, seconds: f64) {
        let status = status.to_string();
        let counter_labels = format_labels(&[
            ("method", method),
            ("endpoint", endpoint),
            ("status", &status),
        ]);
        let latency_labels = format_labels(&[("method", method), ("endpoint", endpoint)]);
        let mut snapshot = self.write();
        *snapshot
            .counters
            .entry(HTTP_REQUESTS_TOTAL.to_string())
            .or_default()
            .entry(counter_labels)
            .or_default() += 1;
        snapshot
            .histograms
            .entry(HTTP_REQUEST_DURATION.to_string())
            .or_default()
            .entry(latency_labels)
            .or_default()
            .observe(seconds);
        drop(snapshot);
        self.persist();
    }

    /// Count one prediction outcome (`"0"`, `"1"`, `"2"` or `"error"`) and
    /// its scoring latency.
    pub fn record_prediction(&self, class_label: &str, seconds: f64) {
        let labels = format_labels(&[("class", class_label)]);
        let mut snapshot = self.write();
        *snapshot
            .counters
            .entry(PREDICTIONS_TOTAL.to_string())
            .or_default()
            .entry(labels)
            .or_default() += 1;
        snapshot
            .histograms
            .entry(PREDICTION_DURATION.to_string())
            .or_default()
            .entry(String::new())
            .or_default()
            .observe(seconds);
        drop(snapshot);
        self.persist();
    }

    /// Copy of this process's values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Render the exposition text, aggregating across processes when enabled.
    pub fn export(&self) -> String {
        let Some(dir) = &self.multiproc_dir else {
            return self.snapshot().render();
        };
        if !self.persist() {
            return self.snapshot().render();
        }
        aggregate_dir(dir).render()
    }

    /// Write this process's snapshot file when multi-process mode is on.
    /// Returns `false` only when the write failed.
    fn persist(&self) -> bool {
        let Some(dir) = &self.multiproc_dir else {
            return true;
        };
        let _flush = self
            .flush_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match write_snapshot(dir, &self.snapshot()) {
            Ok(()) => true,
            Err(err) => {
                warn!(dir = %dir.display(), "failed to write metrics snapshot: {err}");
                false
            }
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MetricsSnapshot> {
        self.snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(format!("{SNAPSHOT_PREFIX}{}.json", std::process::id()))
}

fn write_snapshot(dir: &Path, snapshot: &MetricsSnapshot) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let bytes = serde_json::to_vec(snapshot).map_err(std::io::Error::other)?;
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(&bytes)?;
    file.persist(snapshot_path(dir)).map_err(|err| err.error)?;
    Ok(())
}

/// Sum every snapshot file in `dir`. Unreadable files are skipped.
fn aggregate_dir(dir: &Path) -> MetricsSnapshot {
    let mut total = MetricsSnapshot::default();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return total;
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(".json"))
        })
        .collect();
    paths.sort();
    for path in paths {
        let parsed = std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<MetricsSnapshot>(&bytes).ok());
        if let Some(snapshot) = parsed {
            total.merge(&snapshot);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn counts_requests_by_labels() {
        let registry = MetricsRegistry::new(None);
        registry.record_request("GET", "/health", 200, 0.0005);
        registry.record_request("GET", "/health", 200, 0.002);
        registry.record_request("POST", "/predict", 422, 0.001);
        let snapshot = registry.snapshot();
        assert_eq!(
            snapshot.counter(
                HTTP_REQUESTS_TOTAL,
                &[("method", "GET"), ("endpoint", "/health"), ("status", "200")]
            ),
            2
        );
        assert_eq!(
            snapshot.counter(
                HTTP_REQUESTS_TOTAL,
                &[("method", "POST"), ("endpoint", "/predict"), ("status", "422")]
            ),
            1
        );
    }

    #[test]
    fn histogram_renders_cumulative_buckets() {
        let registry = MetricsRegistry::new(None);
        registry.record_prediction("0", 0.0005);
        registry.record_prediction("error", 0.03);
        registry.record_prediction("1", 10.0);
        let text = registry.export();
        assert!(text.contains("# TYPE model_predictions_total counter"));
        assert!(text.contains("model_predictions_total{class=\"error\"} 1"));
        assert!(text.contains("model_prediction_duration_seconds_bucket{le=\"0.001\"} 1"));
        assert!(text.contains("model_prediction_duration_seconds_bucket{le=\"0.05\"} 2"));
        assert!(text.contains("model_prediction_duration_seconds_bucket{le=\"2.5\"} 2"));
        assert!(text.contains("model_prediction_duration_seconds_bucket{le=\"+Inf\"} 3"));
        assert!(text.contains("model_prediction_duration_seconds_count 3"));
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(format_labels(&[("a", "x\"y")]), "a=\"x\\\"y\"");
    }

    #[test]
    fn multiprocess_export_sums_snapshots() {
        let dir = tempdir().unwrap();
        let mut other = MetricsSnapshot::default();
        other
            .counters
            .entry(PREDICTIONS_TOTAL.to_string())
            .or_default()
            .insert(format_labels(&[("class", "0")]), 4);
        std::fs::write(
            dir.path().join("irisml_999999.json"),
            serde_json::to_vec(&other).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("irisml_bad.json"), b"nope").unwrap();

        let registry = MetricsRegistry::new(Some(dir.path().to_path_buf()));
        assert!(registry.is_multiprocess());
        registry.record_prediction("0", 0.001);
        let text = registry.export();
        assert!(text.contains("model_predictions_total{class=\"0\"} 5"));
        assert!(snapshot_path(dir.path()).is_file());
    }

    #[test]
    fn recorded_values_are_visible_without_export() {
        let dir = tempdir().unwrap();
        let registry = MetricsRegistry::new(Some(dir.path().to_path_buf()));
        for _ in 0..5 {
            registry.record_prediction("0", 0.001);
        }
        registry.record_request("POST", "/predict", 200, 0.002);

        assert!(snapshot_path(dir.path()).is_file());
        let aggregated = aggregate_dir(dir.path());
        assert_eq!(aggregated.counter(PREDICTIONS_TOTAL, &[("class", "0")]), 5);
        assert_eq!(
            aggregated.counter(
                HTTP_REQUESTS_TOTAL,
                &[("method", "POST"), ("endpoint", "/predict"), ("status", "200")]
            ),
            1
        );
        assert_eq!(aggregated, registry.snapshot());
    }
}

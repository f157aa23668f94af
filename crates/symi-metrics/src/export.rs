//! In-process metric collection.
//!
//! [`InMemoryRecorder`] keeps every series the bridge records so a run can be
//! summarised at exit (`symi --metrics-output json`) or inspected from tests.
//! Series are keyed by name and label set; [`MetricsSnapshot`] folds the
//! label sets back together per metric name.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder,
    SharedString, Unit,
};
use parking_lot::Mutex;
use serde::Serialize;

// ============================================================================
// Cells
// ============================================================================

#[derive(Debug, Default)]
struct CounterCell(AtomicU64);

impl CounterFn for CounterCell {
    fn increment(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn absolute(&self, value: u64) {
        self.0.fetch_max(value, Ordering::Relaxed);
    }
}

/// Gauge value stored as `f64` bits.
#[derive(Debug, Default)]
struct GaugeCell(AtomicU64);

impl GaugeCell {
    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn update(&self, f: impl Fn(f64) -> f64) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some(f(f64::from_bits(bits)).to_bits())
            });
    }
}

impl GaugeFn for GaugeCell {
    fn increment(&self, value: f64) {
        self.update(|v| v + value);
    }

    fn decrement(&self, value: f64) {
        self.update(|v| v - value);
    }

    fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct HistogramCell(Mutex<Vec<f64>>);

impl HistogramFn for HistogramCell {
    fn record(&self, value: f64) {
        self.0.lock().push(value);
    }
}

// ============================================================================
// Recorder
// ============================================================================

#[derive(Debug, Default)]
struct Series {
    counters: Mutex<HashMap<Key, Arc<CounterCell>>>,
    gauges: Mutex<HashMap<Key, Arc<GaugeCell>>>,
    histograms: Mutex<HashMap<Key, Arc<HistogramCell>>>,
    descriptions: Mutex<BTreeMap<String, String>>,
}

/// A `metrics` recorder that keeps everything in memory.
///
/// Clones share storage, so one clone can be installed globally while another
/// is kept for reading.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecorder {
    series: Arc<Series>,
}

fn has_label(key: &Key, label: &str, value: &str) -> bool {
    key.labels().any(|l| l.key() == label && l.value() == value)
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of every `name` counter carrying `label = value`.
    pub fn counter_with(&self, name: &str, label: &str, value: &str) -> u64 {
        self.series
            .counters
            .lock()
            .iter()
            .filter(|(key, _)| key.name() == name && has_label(key, label, value))
            .map(|(_, cell)| cell.0.load(Ordering::Relaxed))
            .sum()
    }

    /// Current value of the `name` gauge carrying `label = value`.
    pub fn gauge_with(&self, name: &str, label: &str, value: &str) -> Option<f64> {
        self.series
            .gauges
            .lock()
            .iter()
            .find(|(key, _)| key.name() == name && has_label(key, label, value))
            .map(|(_, cell)| cell.get())
    }

    /// Description registered for `name`, if any.
    pub fn description(&self, name: &str) -> Option<String> {
        self.series.descriptions.lock().get(name).cloned()
    }

    /// Totals per metric name.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::default();
        for (key, cell) in self.series.counters.lock().iter() {
            *snapshot.counters.entry(key.name().to_string()).or_default() +=
                cell.0.load(Ordering::Relaxed);
        }
        for (key, cell) in self.series.gauges.lock().iter() {
            *snapshot.gauges.entry(key.name().to_string()).or_default() += cell.get();
        }
        for (key, cell) in self.series.histograms.lock().iter() {
            let values = cell.0.lock();
            let summary = snapshot
                .histograms
                .entry(key.name().to_string())
                .or_default();
            for &value in values.iter() {
                summary.add(value);
            }
        }
        snapshot
    }

    fn describe(&self, key: KeyName, description: SharedString) {
        self.series
            .descriptions
            .lock()
            .insert(key.as_str().to_string(), description.to_string());
    }
}

impl Recorder for InMemoryRecorder {
    fn describe_counter(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_gauge(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_histogram(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        let cell = Arc::clone(self.series.counters.lock().entry(key.clone()).or_default());
        Counter::from_arc(cell)
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        let cell = Arc::clone(self.series.gauges.lock().entry(key.clone()).or_default());
        Gauge::from_arc(cell)
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        let cell = Arc::clone(self.series.histograms.lock().entry(key.clone()).or_default());
        Histogram::from_arc(cell)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Count, sum and range of recorded values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl HistogramSummary {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Point-in-time totals, summed across label sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, f64>,
    pub histograms: BTreeMap<String, HistogramSummary>,
}

impl MetricsSnapshot {
    /// Pretty-printed JSON, stamped with the current time.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let stamped = MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            ..self.clone()
        };
        serde_json::to_string_pretty(&stamped)
    }

    /// Human-readable listing, one metric per line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.counters {
            out.push_str(&format!("{name} {value}\n"));
        }
        for (name, value) in &self.gauges {
            out.push_str(&format!("{name} {value}\n"));
        }
        for (name, summary) in &self.histograms {
            out.push_str(&format!(
                "{name} count={} mean={:.2} min={:.2} max={:.2}\n",
                summary.count,
                summary.mean(),
                summary.min,
                summary.max
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::with_local_recorder;

    #[test]
    fn test_counters_are_kept_per_label_set() {
        let recorder = InMemoryRecorder::new();
        with_local_recorder(&recorder, || {
            metrics::counter!("symi.test.frames", "gateway" => "a").increment(2);
            metrics::counter!("symi.test.frames", "gateway" => "b").increment(3);
            metrics::counter!("symi.test.frames", "gateway" => "a").increment(1);
        });

        assert_eq!(recorder.counter_with("symi.test.frames", "gateway", "a"), 3);
        assert_eq!(recorder.counter_with("symi.test.frames", "gateway", "b"), 3);
        assert_eq!(recorder.counter_with("symi.test.frames", "gateway", "c"), 0);
        assert_eq!(recorder.snapshot().counters["symi.test.frames"], 6);
    }

    #[test]
    fn test_gauge_tracks_last_value() {
        let recorder = InMemoryRecorder::new();
        with_local_recorder(&recorder, || {
            let gauge = metrics::gauge!("symi.test.devices", "gateway" => "a");
            gauge.set(4.0);
            gauge.increment(2.0);
            gauge.decrement(1.0);
        });
        assert_eq!(recorder.gauge_with("symi.test.devices", "gateway", "a"), Some(5.0));
        assert_eq!(recorder.gauge_with("symi.test.devices", "gateway", "b"), None);
    }

    #[test]
    fn test_histogram_summary() {
        let recorder = InMemoryRecorder::new();
        with_local_recorder(&recorder, || {
            for ms in [2.0, 8.0, 5.0] {
                metrics::histogram!("symi.test.write_ms").record(ms);
            }
        });

        let summary = recorder.snapshot().histograms["symi.test.write_ms"];
        assert_eq!(summary.count, 3);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 8.0);
        assert_eq!(summary.mean(), 5.0);
    }

    #[test]
    fn test_snapshot_renders() {
        let recorder = InMemoryRecorder::new();
        with_local_recorder(&recorder, || {
            metrics::counter!("symi.test.connects").increment(1);
        });
        let snapshot = recorder.snapshot();

        assert_eq!(snapshot.to_text(), "symi.test.connects 1\n");
        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["counters"]["symi.test.connects"], 1);
        assert!(!json["timestamp"].as_str().unwrap().is_empty());
    }
}

//! In-process metrics registry.
//!
//! Series values live in atomics; the map of series is only write-locked
//! the first time a series is seen.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use crate::sink::{Labels, TelemetrySink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

/// A point-in-time reading of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub kind: MetricKind,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

type SeriesKey = (String, Vec<(String, String)>);

/// Gauges hold `f64` bits, counters hold a plain count.
#[derive(Default)]
struct Series {
    gauges: BTreeMap<SeriesKey, Arc<AtomicU64>>,
    counters: BTreeMap<SeriesKey, Arc<AtomicU64>>,
}

/// Thread-safe sink that keeps the latest value of every series.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    series: Arc<RwLock<Series>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a gauge, if it was ever set.
    pub fn gauge(&self, name: &str, labels: Labels<'_>) -> Option<f64> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        series
            .gauges
            .get(&key(name, labels))
            .map(|v| f64::from_bits(v.load(Ordering::Relaxed)))
    }

    /// Current value of a counter. Unseen counters read as zero.
    pub fn counter(&self, name: &str, labels: Labels<'_>) -> u64 {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        series
            .counters
            .get(&key(name, labels))
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// All series, grouped by name then labels.
    pub fn samples(&self) -> Vec<Sample> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        let gauges = series.gauges.iter().map(|((name, labels), v)| Sample {
            name: name.clone(),
            kind: MetricKind::Gauge,
            labels: labels.clone(),
            value: f64::from_bits(v.load(Ordering::Relaxed)),
        });
        let counters = series.counters.iter().map(|((name, labels), v)| Sample {
            name: name.clone(),
            kind: MetricKind::Counter,
            labels: labels.clone(),
            value: v.load(Ordering::Relaxed) as f64,
        });
        let mut samples: Vec<Sample> = gauges.chain(counters).collect();
        samples.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
        samples
    }

    fn slot(&self, kind: MetricKind, name: &str, labels: Labels<'_>) -> Arc<AtomicU64> {
        let key = key(name, labels);
        {
            let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
            let map = match kind {
                MetricKind::Gauge => &series.gauges,
                MetricKind::Counter => &series.counters,
            };
            if let Some(slot) = map.get(&key) {
                return Arc::clone(slot);
            }
        }

        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        let map = match kind {
            MetricKind::Gauge => &mut series.gauges,
            MetricKind::Counter => &mut series.counters,
        };
        trace!(name, kind = kind.as_str(), "new series");
        Arc::clone(map.entry(key).or_default())
    }
}

impl TelemetrySink for MetricsRegistry {
    fn set_gauge(&self, name: &str, labels: Labels<'_>, value: f64) {
        self.slot(MetricKind::Gauge, name, labels)
            .store(value.to_bits(), Ordering::Relaxed);
    }

    fn increment_counter(&self, name: &str, labels: Labels<'_>) {
        self.slot(MetricKind::Counter, name, labels)
            .fetch_add(1, Ordering::Relaxed);
    }
}

fn key(name: &str, labels: Labels<'_>) -> SeriesKey {
    let mut labels: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    labels.sort();
    (name.to_string(), labels)
}

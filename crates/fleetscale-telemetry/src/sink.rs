//! The telemetry port.

/// Label pairs attached to one series.
pub type Labels<'a> = &'a [(&'a str, &'a str)];

/// Where fleet gauges and counters go.
///
/// Implementations must be cheap and non-blocking; they are called from
/// inside a reconciliation cycle.
pub trait TelemetrySink: Send + Sync {
    fn set_gauge(&self, name: &str, labels: Labels<'_>, value: f64);

    fn increment_counter(&self, name: &str, labels: Labels<'_>);
}

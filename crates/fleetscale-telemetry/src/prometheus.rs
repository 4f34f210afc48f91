//! Prometheus text exposition format.

use std::fmt::Write;

use crate::registry::Sample;
use crate::reporter::describe;

/// Render samples into Prometheus text format.
///
/// Samples must be grouped by name (as [`MetricsRegistry::samples`]
/// returns them); HELP and TYPE lines are written once per group.
///
/// [`MetricsRegistry::samples`]: crate::registry::MetricsRegistry::samples
pub fn render_prometheus(samples: &[Sample]) -> String {
    let mut out = String::new();
    let mut current: Option<&str> = None;

    for sample in samples {
        if current != Some(sample.name.as_str()) {
            if let Some(help) = describe(&sample.name) {
                let _ = writeln!(out, "# HELP {} {}", sample.name, help);
            }
            let _ = writeln!(out, "# TYPE {} {}", sample.name, sample.kind.as_str());
            current = Some(sample.name.as_str());
        }

        out.push_str(&sample.name);
        if !sample.labels.is_empty() {
            let labels: Vec<String> = sample
                .labels
                .iter()
                .map(|(k, v)| format!("{k}=\"{}\"", escape(v)))
                .collect();
            let _ = write!(out, "{{{}}}", labels.join(","));
        }
        let _ = writeln!(out, " {}", sample.value);
    }

    out
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

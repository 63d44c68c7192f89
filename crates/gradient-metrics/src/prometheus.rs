//! Prometheus text exposition format.
//!
//! Renders a metrics snapshot into the Prometheus text exposition
//! format for scraping by a Prometheus server or compatible agent.

use crate::collector::MetricsSnapshot;

/// Render a metrics snapshot into Prometheus text format.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    out.push_str("# HELP gradient_state_entered_total Times a release entered a lifecycle state.\n");
    out.push_str("# TYPE gradient_state_entered_total counter\n");
    for (release, state, entered, _, _) in &snapshot.states {
        out.push_str(&format!(
            "gradient_state_entered_total{{release=\"{release}\",state=\"{state}\"}} {entered}\n"
        ));
    }

    out.push_str("# HELP gradient_state_duration_seconds Time spent executing state actions.\n");
    out.push_str("# TYPE gradient_state_duration_seconds summary\n");
    for (release, state, _, seconds, timings) in &snapshot.states {
        out.push_str(&format!(
            "gradient_state_duration_seconds_sum{{release=\"{release}\",state=\"{state}\"}} {seconds:.6}\n"
        ));
        out.push_str(&format!(
            "gradient_state_duration_seconds_count{{release=\"{release}\",state=\"{state}\"}} {timings}\n"
        ));
    }

    out.push_str("# HELP gradient_admission_total Admission decisions by outcome.\n");
    out.push_str("# TYPE gradient_admission_total counter\n");
    for (decision, count) in &snapshot.admission {
        out.push_str(&format!(
            "gradient_admission_total{{decision=\"{decision}\"}} {count}\n"
        ));
    }

    out.push_str("# HELP gradient_active_releases Releases currently managed.\n");
    out.push_str("# TYPE gradient_active_releases gauge\n");
    out.push_str(&format!(
        "gradient_active_releases {}\n",
        snapshot.active_releases
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            states: vec![
                ("api".to_string(), "deploy".to_string(), 2, 1.5, 2),
                ("api".to_string(), "monitor".to_string(), 1, 30.25, 1),
            ],
            admission: vec![("deployed".to_string(), 4)],
            active_releases: 2,
        }
    }

    #[test]
    fn render_empty() {
        let output = render_prometheus(&MetricsSnapshot {
            states: vec![],
            admission: vec![],
            active_releases: 0,
        });
        // Type declarations and the gauge are always present.
        assert!(output.contains("# TYPE gradient_state_entered_total counter"));
        assert!(output.contains("gradient_active_releases 0"));
    }

    #[test]
    fn render_states_and_admission() {
        let output = render_prometheus(&test_snapshot());

        assert!(output.contains("gradient_state_entered_total{release=\"api\",state=\"deploy\"} 2"));
        assert!(output.contains(
            "gradient_state_duration_seconds_sum{release=\"api\",state=\"monitor\"} 30.250000"
        ));
        assert!(output.contains(
            "gradient_state_duration_seconds_count{release=\"api\",state=\"deploy\"} 2"
        ));
        assert!(output.contains("gradient_admission_total{decision=\"deployed\"} 4"));
        assert!(output.contains("gradient_active_releases 2"));
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let output = render_prometheus(&test_snapshot());

        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name_and_labels, value) = line.rsplit_once(' ').unwrap();
            assert!(!name_and_labels.is_empty());
            assert!(value.parse::<f64>().is_ok(), "value not numeric: {line}");
        }
    }
}

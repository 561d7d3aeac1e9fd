//! Output Formatting
//!
//! Human-readable and CSV renderings of a [`Report`].

use crate::report::Report;

/// Format a report for terminal display
pub fn format_human_output(report: &Report) -> String {
    let unit = &report.meta.unit;
    let mut output = String::new();

    output.push('\n');
    output.push_str("topcraft memory results\n");
    output.push_str(&"=".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "command: {}  repeat: {}\n\n",
        report.meta.command.join(" "),
        report.meta.repeat
    ));

    if !report.results.is_empty() {
        let width = report
            .results
            .iter()
            .map(|r| r.label.len())
            .max()
            .unwrap_or(5)
            .max(5);

        output.push_str(&format!(
            "  {:<width$}  {:>12}  {:>12}  {:>12}  {:>12}\n",
            "Label", "worst", "mean", "std dev", "min",
        ));
        output.push_str(&format!("  {}\n", "-".repeat(width + 56)));

        for result in &report.results {
            output.push_str(&format!(
                "  {:<width$}  {:>12}  {:>12}  {:>12}  {:>12}\n",
                result.label,
                format!("{:.3}{}", result.worst, unit),
                format!("{:.3}{}", result.mean, unit),
                format!("{:.3}{}", result.std_dev, unit),
                format!("{:.3}{}", result.min, unit),
            ));
        }
    }

    if let Some(trend) = &report.trend {
        let point_width = trend
            .points
            .iter()
            .map(|p| p.to_string().len())
            .max()
            .unwrap_or(1)
            .max(5);

        output.push_str(&format!("  {:>point_width$}", "point"));
        for series in &trend.series {
            output.push_str(&format!("  {:>14}", series.label));
        }
        output.push('\n');

        for (idx, point) in trend.points.iter().enumerate() {
            output.push_str(&format!("  {:>point_width$}", point));
            for series in &trend.series {
                let cell = series
                    .values
                    .get(idx)
                    .copied()
                    .flatten()
                    .map(|v| format!("{:.3}{}", v, unit))
                    .unwrap_or_else(|| "-".to_string());
                output.push_str(&format!("  {:>14}", cell));
            }
            output.push('\n');
        }
    }

    output
}

/// Generate a CSV report. Repeated runs give one row per label, trend runs
/// one row per point.
pub fn generate_csv_report(report: &Report) -> String {
    let mut output = String::new();

    if let Some(trend) = &report.trend {
        output.push_str("point");
        for series in &trend.series {
            output.push(',');
            output.push_str(&escape_csv(&series.label));
        }
        output.push('\n');

        for (idx, point) in trend.points.iter().enumerate() {
            output.push_str(&point.to_string());
            for series in &trend.series {
                output.push(',');
                if let Some(Some(value)) = series.values.get(idx) {
                    output.push_str(&format!("{:.6}", value));
                }
            }
            output.push('\n');
        }
        return output;
    }

    output.push_str("label,unit,worst,mean,median,std_dev,min,p90,samples\n");
    for result in &report.results {
        output.push_str(&format!(
            "{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{}\n",
            escape_csv(&result.label),
            report.meta.unit,
            result.worst,
            result.mean,
            result.median,
            result.std_dev,
            result.min,
            result.p90,
            result.samples,
        ));
    }
    output
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{LabelResult, ReportMeta, SystemInfo, TrendReport, TrendSeries};

    fn meta() -> ReportMeta {
        ReportMeta {
            version: "0.1.0".to_string(),
            timestamp: chrono::Utc::now(),
            command: vec!["true".to_string()],
            repeat: 2,
            unit: "MiB".to_string(),
            system: SystemInfo {
                os: "linux".to_string(),
                arch: "x86_64".to_string(),
                memory_gb: 16.0,
            },
        }
    }

    fn run_report() -> Report {
        Report {
            meta: meta(),
            results: vec![LabelResult {
                label: "memory".to_string(),
                worst: 3.0,
                mean: 2.0,
                median: 2.0,
                std_dev: 1.414,
                min: 1.0,
                p90: 2.8,
                samples: 2,
                values: vec![1.0, 3.0],
            }],
            trend: None,
        }
    }

    #[test]
    fn test_human_output_lists_labels() {
        let text = format_human_output(&run_report());
        assert!(text.contains("memory"));
        assert!(text.contains("3.000MiB"));
        assert!(text.contains("repeat: 2"));
    }

    #[test]
    fn test_csv_run_rows() {
        let csv = generate_csv_report(&run_report());
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("memory,MiB,3.000000,2.000000"));
        assert!(lines[1].ends_with(",2"));
    }

    #[test]
    fn test_csv_trend_rows() {
        let report = Report {
            meta: meta(),
            results: Vec::new(),
            trend: Some(TrendReport {
                points: vec![10, 20],
                series: vec![TrendSeries {
                    label: "a, b".to_string(),
                    values: vec![Some(1.0)],
                }],
            }),
        };
        let csv = generate_csv_report(&report);
        assert_eq!(csv, "point,\"a, b\"\n10,1.000000\n20,\n");
    }

    fn late_label_report() -> Report {
        Report {
            meta: meta(),
            results: Vec::new(),
            trend: Some(TrendReport {
                points: vec![1, 2],
                series: vec![
                    TrendSeries {
                        label: "early".to_string(),
                        values: vec![Some(1.0), Some(2.0)],
                    },
                    TrendSeries {
                        label: "late".to_string(),
                        values: vec![None, Some(7.0)],
                    },
                ],
            }),
        }
    }

    #[test]
    fn test_csv_trend_late_label_stays_in_its_column() {
        let csv = generate_csv_report(&late_label_report());
        assert_eq!(csv, "point,early,late\n1,1.000000,\n2,2.000000,7.000000\n");
    }

    #[test]
    fn test_human_trend_late_label_stays_in_its_row() {
        let text = format_human_output(&late_label_report());
        let row = |point: &str| {
            let prefix = format!("{point} ");
            text.lines()
                .find(|l| l.trim_start().starts_with(&prefix))
                .unwrap()
        };
        let first = row("1");
        let second = row("2");
        assert!(first.trim_end().ends_with('-'));
        assert!(!first.contains("7.000MiB"));
        assert!(second.contains("7.000MiB"));
    }
}

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{GroupField, Metric, TimeSeries, TrendProjection, UNKNOWN_LABEL};

pub fn group_name(labels: &[String]) -> String {
    if labels.is_empty() {
        "All households".to_string()
    } else {
        labels.join(" / ")
    }
}

pub fn group_header(fields: &[GroupField]) -> String {
    if fields.is_empty() {
        "group".to_string()
    } else {
        fields
            .iter()
            .map(|field| field.as_str())
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

pub struct ReportContext<'a> {
    pub scope: &'a str,
    pub fields: &'a [GroupField],
    pub metric: Metric,
    pub record_count: usize,
    pub generated_at: DateTime<Utc>,
}

pub fn build_report(
    context: &ReportContext<'_>,
    series: &[TimeSeries],
    projection: &TrendProjection,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Household Target Trends");
    let _ = writeln!(
        output,
        "Generated for {} at {} from {} records",
        context.scope,
        context.generated_at.format("%Y-%m-%d %H:%M UTC"),
        context.record_count
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Grouped by {}, trend metric: {}.",
        group_header(context.fields),
        context.metric.label()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Period Summary");

    if series.is_empty() {
        let _ = writeln!(output, "No records matched this selection.");
    } else {
        let mut rows = series.to_vec();
        rows.sort_by(|a, b| a.labels.cmp(&b.labels).then(a.period.cmp(&b.period)));
        let _ = writeln!(
            output,
            "| {} | period | households | achievement rate | avg predicted income |",
            group_header(context.fields)
        );
        let _ = writeln!(output, "| --- | ---: | ---: | ---: | ---: |");
        for row in rows {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {:.1}% | {:.2} |",
                group_name(&row.labels),
                row.period,
                row.count,
                row.achievement_rate,
                row.avg_magnitude
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Group Trends");

    if projection.groups.is_empty() {
        let _ = writeln!(output, "No group has enough periods to fit a trend.");
    } else {
        for group in &projection.groups {
            let forecast = match &group.forecast {
                Some(forecast) => format!(
                    "forecast {:.2} at period {} (step {})",
                    forecast.value, forecast.period, forecast.interval
                ),
                None => "no forecast".to_string(),
            };
            let _ = writeln!(
                output,
                "- {}: slope {:.3} per period over {}..{}, {}",
                group_name(&group.labels),
                group.actual.slope,
                group.actual.start.period,
                group.actual.end.period,
                forecast
            );
        }
    }

    if !projection.unfitted.is_empty() {
        let names: Vec<String> = projection.unfitted.iter().map(|l| group_name(l)).collect();
        let _ = writeln!(output);
        let _ = writeln!(output, "Too few periods to fit: {}", names.join(", "));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overall Trend");

    match &projection.overall {
        Some(line) => {
            let _ = writeln!(
                output,
                "value = {:.3} * period + {:.3}, from {:.2} at period {} to {:.2} at period {}",
                line.slope,
                line.intercept,
                line.start.value,
                line.start.period,
                line.end.value,
                line.end.period
            );
        }
        None => {
            let _ = writeln!(output, "Not enough distinct periods for an overall trend.");
        }
    }

    if series.iter().any(|s| s.labels.iter().any(|l| l == UNKNOWN_LABEL)) {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Records missing a grouping value are reported under \"{UNKNOWN_LABEL}\"."
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, series_points};
    use crate::models::PredictionRecord;
    use crate::trend::{project_all, ForecastPolicy};
    use chrono::TimeZone;

    fn record(cluster: Option<&str>, month: i64, income: f64) -> PredictionRecord {
        PredictionRecord {
            cluster: cluster.map(str::to_string),
            evaluation_month: month,
            prediction: Some(1.0),
            predicted_income: Some(income),
            ..PredictionRecord::default()
        }
    }

    fn context(fields: &[GroupField]) -> ReportContext<'_> {
        ReportContext {
            scope: "Central",
            fields,
            metric: Metric::AvgMagnitude,
            record_count: 4,
            generated_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn report_lists_summary_trends_and_overall_line() {
        let records = vec![
            record(Some("7"), 3, 100.0),
            record(Some("7"), 6, 200.0),
            record(Some("9"), 3, 150.0),
            record(None, 6, 50.0),
        ];
        let fields = [GroupField::Cluster];
        let series = aggregate(&records, &fields);
        let points = series_points(&series, Metric::AvgMagnitude);
        let projection = project_all(&points, ForecastPolicy::PositiveOnly);

        let report = build_report(&context(&fields), &series, &projection);

        assert!(report.contains("Generated for Central at 2026-03-01 09:30 UTC from 4 records"));
        assert!(report.contains("| 7 | 3 | 1 | 100.0% | 100.00 |"));
        assert!(report.contains(
            "- 7: slope 33.333 per period over 3..6, forecast 300.00 at period 9 (step 3)"
        ));
        assert!(report.contains("Too few periods to fit: 9, Unknown"));
        assert!(report.contains("## Overall Trend"));
        assert!(report.contains("reported under \"Unknown\""));
    }

    #[test]
    fn empty_selection_is_reported() {
        let projection = project_all(&Default::default(), ForecastPolicy::PositiveOnly);
        let report = build_report(&context(&[]), &[], &projection);
        assert!(report.contains("No records matched this selection."));
        assert!(report.contains("No group has enough periods to fit a trend."));
        assert!(report.contains("Not enough distinct periods for an overall trend."));
    }
}

use std::collections::{BTreeMap, HashMap};

use crate::models::{
    GroupField, MapPoint, Metric, PredictionRecord, TimeSeries, TrendPoint, UNKNOWN_LABEL,
};

#[derive(Debug, Default)]
struct GroupAccumulator {
    count: usize,
    achieved_sum: f64,
    magnitude_sum: f64,
}

impl GroupAccumulator {
    fn add(&mut self, record: &PredictionRecord) {
        self.count += 1;
        self.achieved_sum += finite_or_zero(record.prediction);
        self.magnitude_sum += finite_or_zero(record.predicted_income);
    }

    fn finalize(self, labels: Vec<String>, period: i64) -> TimeSeries {
        let count = self.count as f64;
        TimeSeries {
            labels,
            period,
            count: self.count,
            achieved_sum: self.achieved_sum,
            magnitude_sum: self.magnitude_sum,
            achievement_rate: self.achieved_sum / count * 100.0,
            avg_magnitude: self.magnitude_sum / count,
        }
    }
}

// Missing and NaN values still count toward the group size but add nothing
// to the sums, so they pull the mean toward zero.
fn finite_or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Buckets records by the requested categorical fields plus the evaluation
/// period and reduces each bucket to its summary statistics.
pub fn aggregate(records: &[PredictionRecord], fields: &[GroupField]) -> Vec<TimeSeries> {
    let mut groups: HashMap<(Vec<String>, i64), GroupAccumulator> = HashMap::new();

    for record in records {
        let labels = fields
            .iter()
            .map(|field| record.label(*field).unwrap_or(UNKNOWN_LABEL).to_string())
            .collect();
        groups
            .entry((labels, record.evaluation_month))
            .or_default()
            .add(record);
    }

    groups
        .into_iter()
        .map(|((labels, period), acc)| acc.finalize(labels, period))
        .collect()
}

pub fn series_points(
    series: &[TimeSeries],
    metric: Metric,
) -> BTreeMap<Vec<String>, Vec<TrendPoint>> {
    let mut grouped: BTreeMap<Vec<String>, Vec<TrendPoint>> = BTreeMap::new();

    for entry in series {
        grouped
            .entry(entry.labels.clone())
            .or_default()
            .push(TrendPoint::new(entry.period, entry.value(metric)));
    }

    for points in grouped.values_mut() {
        points.sort_by_key(|point| point.period);
    }

    grouped
}

/// Records that can be placed on a map; anything without finite coordinates
/// is left out.
pub fn map_points(records: &[PredictionRecord]) -> Vec<MapPoint> {
    let label = |value: &Option<String>| {
        value.clone().unwrap_or_else(|| UNKNOWN_LABEL.to_string())
    };

    records
        .iter()
        .filter_map(|record| {
            let (latitude, longitude) = record.coordinates()?;
            Some(MapPoint {
                id: record.id.clone(),
                region: label(&record.region),
                district: label(&record.district),
                village: label(&record.village),
                latitude,
                longitude,
                altitude: record.altitude.filter(|v| v.is_finite()),
                prediction: record.prediction,
                probability: record.probability,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        cluster: Option<&str>,
        month: i64,
        achieved: f64,
        income: Option<f64>,
    ) -> PredictionRecord {
        PredictionRecord {
            region: Some("Central".to_string()),
            cluster: cluster.map(str::to_string),
            evaluation_month: month,
            prediction: Some(achieved),
            predicted_income: income,
            ..PredictionRecord::default()
        }
    }

    fn sample() -> Vec<PredictionRecord> {
        vec![
            record(Some("A"), 3, 1.0, Some(100.0)),
            record(Some("A"), 3, 0.0, Some(300.0)),
            record(Some("A"), 6, 1.0, Some(250.0)),
            record(Some("B"), 3, 1.0, Some(80.0)),
            record(None, 3, 0.0, Some(40.0)),
            record(Some("B"), 6, 0.0, None),
        ]
    }

    fn sorted(mut series: Vec<TimeSeries>) -> Vec<TimeSeries> {
        series.sort_by(|a, b| a.labels.cmp(&b.labels).then(a.period.cmp(&b.period)));
        series
    }

    #[test]
    fn groups_by_fields_and_period() {
        let series = sorted(aggregate(&sample(), &[GroupField::Cluster]));
        assert_eq!(series.len(), 5);

        let first = &series[0];
        assert_eq!(first.labels, vec!["A".to_string()]);
        assert_eq!(first.period, 3);
        assert_eq!(first.count, 2);
        assert_eq!(first.achievement_rate, 50.0);
        assert_eq!(first.avg_magnitude, 200.0);

        let unknown = series
            .iter()
            .find(|s| s.labels == vec![UNKNOWN_LABEL.to_string()])
            .unwrap();
        assert_eq!(unknown.count, 1);
    }

    #[test]
    fn counts_partition_the_input() {
        let records = sample();
        let series = aggregate(&records, &[GroupField::Region, GroupField::Cluster]);
        let total: usize = series.iter().map(|s| s.count).sum();
        assert_eq!(total, records.len());
        assert!(series.iter().all(|s| s.count > 0));
    }

    #[test]
    fn achievement_rate_stays_within_bounds() {
        for entry in aggregate(&sample(), &[GroupField::Cluster]) {
            assert!((0.0..=100.0).contains(&entry.achievement_rate));
        }
    }

    #[test]
    fn input_order_does_not_matter() {
        let records = sample();
        let mut reversed = records.clone();
        reversed.reverse();
        let mut rotated = records.clone();
        rotated.rotate_left(2);

        let expected = sorted(aggregate(&records, &[GroupField::Cluster]));
        assert_eq!(sorted(aggregate(&reversed, &[GroupField::Cluster])), expected);
        assert_eq!(sorted(aggregate(&rotated, &[GroupField::Cluster])), expected);
    }

    #[test]
    fn missing_magnitude_counts_but_adds_zero() {
        let records = vec![
            record(Some("B"), 6, 1.0, Some(90.0)),
            record(Some("B"), 6, 0.0, None),
            record(Some("B"), 6, 0.0, Some(f64::NAN)),
        ];
        let series = aggregate(&records, &[GroupField::Cluster]);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].count, 3);
        assert_eq!(series[0].avg_magnitude, 30.0);
    }

    #[test]
    fn empty_input_yields_no_series() {
        assert!(aggregate(&[], &[GroupField::Cluster]).is_empty());
    }

    #[test]
    fn no_fields_groups_by_period_only() {
        let series = sorted(aggregate(&sample(), &[]));
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].period, 3);
        assert_eq!(series[0].count, 4);
        assert!(series[0].labels.is_empty());
    }

    #[test]
    fn series_points_are_sorted_per_group() {
        let series = aggregate(&sample(), &[GroupField::Cluster]);
        let grouped = series_points(&series, Metric::AchievementRate);

        let a = &grouped[&vec!["A".to_string()]];
        assert_eq!(a, &vec![TrendPoint::new(3, 50.0), TrendPoint::new(6, 100.0)]);
        assert_eq!(grouped.len(), 3);
    }

    #[test]
    fn nan_coordinates_are_left_off_the_map_but_still_counted() {
        let mut mapped = record(Some("A"), 3, 1.0, Some(100.0));
        mapped.latitude = Some(0.35);
        mapped.longitude = Some(32.58);
        let mut unmapped = record(Some("A"), 3, 0.0, Some(50.0));
        unmapped.latitude = Some(f64::NAN);
        unmapped.longitude = Some(f64::NAN);
        let records = vec![mapped, unmapped];

        let points = map_points(&records);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].latitude, 0.35);

        let series = aggregate(&records, &[GroupField::Cluster]);
        assert_eq!(series[0].count, 2);
        assert_eq!(series[0].magnitude_sum, 150.0);
    }
}

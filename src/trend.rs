//! Ordinary least-squares trend lines and one-step forecasts over
//! period-indexed series.

use std::collections::BTreeMap;

use crate::models::{Forecast, GroupTrend, TrendLine, TrendPoint, TrendProjection};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Fit {
    slope: f64,
    intercept: f64,
}

impl Fit {
    fn at(&self, period: i64) -> f64 {
        self.slope * period as f64 + self.intercept
    }

    fn line(&self, from: i64, to: i64) -> TrendLine {
        TrendLine {
            slope: self.slope,
            intercept: self.intercept,
            start: TrendPoint::new(from, self.at(from)),
            end: TrendPoint::new(to, self.at(to)),
        }
    }
}

fn least_squares(points: &[TrendPoint]) -> Option<Fit> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|p| p.period as f64).sum();
    let sum_y: f64 = points.iter().map(|p| p.value).sum();
    let sum_xy: f64 = points.iter().map(|p| p.period as f64 * p.value).sum();
    let sum_x_squared: f64 = points.iter().map(|p| (p.period as f64).powi(2)).sum();

    let denominator = n * sum_x_squared - sum_x.powi(2);
    if denominator == 0.0 {
        return None;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    if !slope.is_finite() || !intercept.is_finite() {
        return None;
    }

    Some(Fit { slope, intercept })
}

/// Smallest positive gap between distinct periods, the step a group is
/// sampled at.
pub fn infer_interval(periods: &[i64]) -> Option<i64> {
    let mut distinct = periods.to_vec();
    distinct.sort_unstable();
    distinct.dedup();

    let gaps: Option<Vec<i64>> = distinct
        .windows(2)
        .map(|pair| pair[1].checked_sub(pair[0]))
        .collect();
    gaps?.into_iter().min()
}

fn sorted_points(points: &[TrendPoint]) -> Vec<TrendPoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|point| point.period);
    sorted
}

fn forecast_from(fit: Fit, points: &[TrendPoint]) -> Option<Forecast> {
    let periods: Vec<i64> = points.iter().map(|p| p.period).collect();
    let interval = infer_interval(&periods)?;
    let last = *periods.iter().max()?;
    let period = last.checked_add(interval)?;

    Some(Forecast {
        period,
        value: fit.at(period),
        interval,
        segment: fit.line(last, period),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForecastPolicy {
    #[default]
    PositiveOnly,
    Unfiltered,
}

/// Fits one group's points and projects one interval past the last
/// observation, dropping forecasts that are not strictly positive.
pub fn fit_group(points: &[TrendPoint]) -> Option<(TrendLine, Option<Forecast>)> {
    fit_group_with(points, ForecastPolicy::PositiveOnly)
}

pub fn fit_group_with(
    points: &[TrendPoint],
    policy: ForecastPolicy,
) -> Option<(TrendLine, Option<Forecast>)> {
    let points = sorted_points(points);
    let fit = least_squares(&points)?;
    let first = points.first()?.period;
    let last = points.last()?.period;

    let forecast = forecast_from(fit, &points);
    let forecast = match policy {
        ForecastPolicy::PositiveOnly => forecast.filter(|forecast| forecast.value > 0.0),
        ForecastPolicy::Unfiltered => forecast,
    };
    Some((fit.line(first, last), forecast))
}

pub fn fit_overall(points: &[TrendPoint]) -> Option<TrendLine> {
    let fit = least_squares(points)?;
    let first = points.iter().map(|p| p.period).min()?;
    let last = points.iter().map(|p| p.period).max()?;
    Some(fit.line(first, last))
}

pub fn project_all(
    series: &BTreeMap<Vec<String>, Vec<TrendPoint>>,
    policy: ForecastPolicy,
) -> TrendProjection {
    let mut groups = Vec::new();
    let mut unfitted = Vec::new();

    for (labels, points) in series {
        match fit_group_with(points, policy) {
            Some((actual, forecast)) => groups.push(GroupTrend {
                labels: labels.clone(),
                points: points.clone(),
                actual,
                forecast,
            }),
            None => unfitted.push(labels.clone()),
        }
    }

    let pooled: Vec<TrendPoint> = series.values().flatten().copied().collect();

    TrendProjection {
        groups,
        unfitted,
        overall: fit_overall(&pooled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(pairs: &[(i64, f64)]) -> Vec<TrendPoint> {
        pairs.iter().map(|&(p, v)| TrendPoint::new(p, v)).collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn two_points_give_exact_line() {
        let (line, forecast) = fit_group(&points(&[(1, 10.0), (2, 20.0)])).unwrap();
        assert!(close(line.slope, 10.0));
        assert!(close(line.intercept, 0.0));
        assert_eq!(line.start, TrendPoint::new(1, 10.0));
        assert_eq!(line.end.period, 2);

        let forecast = forecast.unwrap();
        assert_eq!(forecast.period, 3);
        assert!(close(forecast.value, 30.0));
    }

    #[test]
    fn thin_or_flat_domains_cannot_be_fitted() {
        assert!(fit_group(&points(&[(4, 10.0)])).is_none());
        assert!(fit_group(&points(&[(4, 10.0), (4, 12.0), (4, 15.0)])).is_none());
        assert!(fit_group(&[]).is_none());
        assert!(fit_overall(&points(&[(4, 10.0), (4, 12.0)])).is_none());
    }

    #[test]
    fn interval_is_smallest_gap() {
        assert_eq!(infer_interval(&[3, 6, 12]), Some(3));
        assert_eq!(infer_interval(&[12, 3, 6, 6]), Some(3));
        assert_eq!(infer_interval(&[5, 9]), Some(4));
        assert_eq!(infer_interval(&[5, 5]), None);
    }

    #[test]
    fn forecast_steps_by_inferred_interval() {
        let (_, forecast) = fit_group(&points(&[(12, 40.0), (3, 10.0), (6, 20.0)])).unwrap();
        let forecast = forecast.unwrap();
        assert_eq!(forecast.interval, 3);
        assert_eq!(forecast.period, 15);
        assert_eq!(forecast.segment.start.period, 12);
        assert_eq!(forecast.segment.end.period, 15);
    }

    #[test]
    fn non_positive_forecasts_are_filtered() {
        let falling = points(&[(1, 20.0), (2, 10.0)]);
        let (line, forecast) = fit_group(&falling).unwrap();
        assert!(close(line.slope, -10.0));
        assert!(forecast.is_none());

        let (_, unfiltered) = fit_group_with(&falling, ForecastPolicy::Unfiltered).unwrap();
        let unfiltered = unfiltered.unwrap();
        assert_eq!(unfiltered.period, 3);
        assert!(close(unfiltered.value, 0.0));
    }

    #[test]
    fn unfiltered_projection_keeps_falling_forecasts() {
        let mut series = BTreeMap::new();
        series.insert(vec!["A".to_string()], points(&[(1, 20.0), (2, 10.0), (3, 4.0)]));

        let filtered = project_all(&series, ForecastPolicy::PositiveOnly);
        assert!(filtered.groups[0].forecast.is_none());

        let unfiltered = project_all(&series, ForecastPolicy::Unfiltered);
        let forecast = unfiltered.groups[0].forecast.as_ref().unwrap();
        assert_eq!(forecast.period, 4);
        assert!(forecast.value < 0.0);
    }

    #[test]
    fn extreme_periods_yield_no_forecast_instead_of_overflowing() {
        assert_eq!(infer_interval(&[i64::MIN, i64::MAX]), None);
        assert_eq!(infer_interval(&[i64::MIN, 0, i64::MAX]), Some(i64::MAX));

        let (_, forecast) =
            fit_group_with(&points(&[(0, 1.0), (i64::MAX, 2.0)]), ForecastPolicy::Unfiltered)
                .unwrap();
        assert!(forecast.is_none());
    }

    #[test]
    fn overall_trend_pools_every_group() {
        let mut series = BTreeMap::new();
        series.insert(vec!["A".to_string()], points(&[(1, 10.0), (2, 20.0)]));
        series.insert(vec!["B".to_string()], points(&[(3, 30.0), (4, 40.0)]));
        series.insert(vec!["C".to_string()], points(&[(2, 25.0)]));

        let projection = project_all(&series, ForecastPolicy::PositiveOnly);
        assert_eq!(projection.groups.len(), 2);
        assert_eq!(projection.unfitted, vec![vec!["C".to_string()]]);

        let overall = projection.overall.unwrap();
        assert_eq!(overall.start.period, 1);
        assert_eq!(overall.end.period, 4);
        let pooled = points(&[(1, 10.0), (2, 20.0), (3, 30.0), (4, 40.0), (2, 25.0)]);
        let expected = fit_overall(&pooled).unwrap();
        assert!(close(overall.slope, expected.slope));
        assert!(close(overall.intercept, expected.intercept));
    }
}

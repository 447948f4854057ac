use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_LABEL: &str = "Unknown";

/// One evaluated household at one evaluation period, as served by the
/// predictions API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionRecord {
    #[serde(default, alias = "household_id", deserialize_with = "lenient_label")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_label")]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "lenient_label")]
    pub district: Option<String>,
    #[serde(default, deserialize_with = "lenient_label")]
    pub cluster: Option<String>,
    #[serde(default, deserialize_with = "lenient_label")]
    pub village: Option<String>,
    #[serde(default, deserialize_with = "lenient_label")]
    pub cohort: Option<String>,
    #[serde(default, deserialize_with = "lenient_label")]
    pub cycle: Option<String>,
    #[serde(deserialize_with = "lenient_period")]
    pub evaluation_month: i64,
    /// Binary outcome flag, 1 when the household reached its target.
    #[serde(default, alias = "achieved", deserialize_with = "lenient_f64")]
    pub prediction: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub probability: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub predicted_income: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub altitude: Option<f64>,
}

impl PredictionRecord {
    pub fn label(&self, field: GroupField) -> Option<&str> {
        let value = match field {
            GroupField::Region => &self.region,
            GroupField::District => &self.district,
            GroupField::Cluster => &self.cluster,
            GroupField::Village => &self.village,
            GroupField::Cohort => &self.cohort,
            GroupField::Cycle => &self.cycle,
        };
        value.as_deref()
    }

    /// Latitude and longitude, only when both are finite and on the globe.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let latitude = self.latitude.filter(|v| v.is_finite() && v.abs() <= 90.0)?;
        let longitude = self.longitude.filter(|v| v.is_finite() && v.abs() <= 180.0)?;
        Some((latitude, longitude))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupField {
    Region,
    District,
    Cluster,
    Village,
    Cohort,
    Cycle,
}

impl GroupField {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupField::Region => "region",
            GroupField::District => "district",
            GroupField::Cluster => "cluster",
            GroupField::Village => "village",
            GroupField::Cohort => "cohort",
            GroupField::Cycle => "cycle",
        }
    }
}

impl fmt::Display for GroupField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "region" => Ok(GroupField::Region),
            "district" => Ok(GroupField::District),
            "cluster" => Ok(GroupField::Cluster),
            "village" => Ok(GroupField::Village),
            "cohort" => Ok(GroupField::Cohort),
            "cycle" => Ok(GroupField::Cycle),
            other => Err(format!("unknown group field `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    #[default]
    AvgMagnitude,
    AchievementRate,
}

impl Metric {
    pub fn label(self) -> &'static str {
        match self {
            Metric::AvgMagnitude => "average predicted income",
            Metric::AchievementRate => "achievement rate (%)",
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "income" | "avg_magnitude" | "magnitude" => Ok(Metric::AvgMagnitude),
            "achievement" | "achievement_rate" | "rate" => Ok(Metric::AchievementRate),
            other => Err(format!("unknown metric `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    /// One label per requested group field, in request order.
    pub labels: Vec<String>,
    pub period: i64,
    pub count: usize,
    pub achieved_sum: f64,
    pub magnitude_sum: f64,
    pub achievement_rate: f64,
    pub avg_magnitude: f64,
}

impl TimeSeries {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::AvgMagnitude => self.avg_magnitude,
            Metric::AchievementRate => self.achievement_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period: i64,
    pub value: f64,
}

impl TrendPoint {
    pub fn new(period: i64, value: f64) -> Self {
        Self { period, value }
    }
}

/// `value = slope * period + intercept`, with the endpoints used to draw it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    pub start: TrendPoint,
    pub end: TrendPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub period: i64,
    pub value: f64,
    /// Inferred sampling interval used to step past the last observation.
    pub interval: i64,
    /// Segment from the last observed period to the forecast period.
    pub segment: TrendLine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTrend {
    pub labels: Vec<String>,
    pub points: Vec<TrendPoint>,
    pub actual: TrendLine,
    pub forecast: Option<Forecast>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendProjection {
    pub groups: Vec<GroupTrend>,
    /// Groups with too little data to fit a line.
    pub unfitted: Vec<Vec<String>>,
    pub overall: Option<TrendLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub id: Option<String>,
    pub region: String,
    pub district: String,
    pub village: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub prediction: Option<f64>,
    pub probability: Option<f64>,
}

/// Selection sent to the API as comma-joined query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub cohorts: Vec<String>,
    pub regions: Vec<String>,
    pub districts: Vec<String>,
    pub clusters: Vec<String>,
    pub cycles: Vec<String>,
    pub evaluation_months: Vec<i64>,
    pub villages: Vec<String>,
}

impl Filters {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let lists: [(&'static str, &Vec<String>); 6] = [
            ("cohort", &self.cohorts),
            ("region", &self.regions),
            ("district", &self.districts),
            ("cluster", &self.clusters),
            ("cycle", &self.cycles),
            ("village", &self.villages),
        ];

        for (name, values) in lists {
            if !values.is_empty() {
                pairs.push((name, values.join(",")));
            }
        }

        if !self.evaluation_months.is_empty() {
            let months: Vec<String> = self
                .evaluation_months
                .iter()
                .map(|month| month.to_string())
                .collect();
            pairs.push(("evaluation_month", months.join(",")));
        }

        pairs
    }

    pub fn matches(&self, record: &PredictionRecord) -> bool {
        fn admits(values: &[String], value: Option<&str>) -> bool {
            values.is_empty() || value.is_some_and(|v| values.iter().any(|want| want == v))
        }

        admits(&self.cohorts, record.cohort.as_deref())
            && admits(&self.regions, record.region.as_deref())
            && admits(&self.districts, record.district.as_deref())
            && admits(&self.clusters, record.cluster.as_deref())
            && admits(&self.cycles, record.cycle.as_deref())
            && admits(&self.villages, record.village.as_deref())
            && (self.evaluation_months.is_empty()
                || self.evaluation_months.contains(&record.evaluation_month))
    }

    /// Narrows the server-side region filter to the scope's region.
    pub fn scoped(&self, scope: &RegionScope) -> Filters {
        let mut filters = self.clone();
        if let RegionScope::Region(region) = scope {
            filters.regions = vec![region.clone()];
        }
        filters
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RegionScope {
    #[default]
    All,
    Region(String),
}

impl RegionScope {
    pub fn admits(&self, record: &PredictionRecord) -> bool {
        match self {
            RegionScope::All => true,
            RegionScope::Region(region) => record
                .region
                .as_deref()
                .is_some_and(|value| value.eq_ignore_ascii_case(region)),
        }
    }

    pub fn describe(&self) -> &str {
        match self {
            RegionScope::All => "all regions",
            RegionScope::Region(region) => region,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FilterOptions {
    #[serde(default, deserialize_with = "lenient_labels")]
    pub cohorts: Vec<String>,
    #[serde(default, deserialize_with = "lenient_labels")]
    pub regions: Vec<String>,
    #[serde(default, deserialize_with = "lenient_labels")]
    pub districts: Vec<String>,
    #[serde(default, deserialize_with = "lenient_labels")]
    pub clusters: Vec<String>,
    #[serde(default, deserialize_with = "lenient_labels")]
    pub cycles: Vec<String>,
    #[serde(default, deserialize_with = "lenient_labels")]
    pub evaluation_months: Vec<String>,
    #[serde(default, deserialize_with = "lenient_labels")]
    pub villages: Vec<String>,
}

struct LenientNumber;

impl<'de> Visitor<'de> for LenientNumber {
    type Value = Option<f64>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number, a numeric string or null")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Some(if v { 1.0 } else { 0.0 }))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    // Unparseable strings count as absent.
    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(v.trim().parse::<f64>().ok())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

struct LenientLabel;

impl<'de> Visitor<'de> for LenientLabel {
    type Value = Option<String>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string, a number or null")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if v.is_finite() && v.fract() == 0.0 {
            Ok(Some(format!("{}", v as i64)))
        } else {
            Ok(Some(v.to_string()))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let trimmed = v.trim();
        Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

struct Label(Option<String>);

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LenientLabel).map(Label)
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    deserializer.deserialize_any(LenientNumber)
}

fn lenient_label<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    deserializer.deserialize_any(LenientLabel)
}

fn lenient_labels<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let labels: Option<Vec<Label>> = Option::deserialize(deserializer)?;
    Ok(labels
        .unwrap_or_default()
        .into_iter()
        .filter_map(|label| label.0)
        .collect())
}

fn lenient_period<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match deserializer.deserialize_any(LenientNumber)? {
        Some(value) if value.is_finite() && value.fract() == 0.0 => Ok(value as i64),
        Some(value) => Err(de::Error::custom(format!(
            "evaluation_month must be an integer, got {value}"
        ))),
        None => Err(de::Error::custom("evaluation_month is required")),
    }
}

// src/models.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CalendarError;
pub use crate::services::calendar::QuarterLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Quarterly,
    Annual,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Granularity::Quarterly => write!(f, "quarterly"),
            Granularity::Annual => write!(f, "annual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Eps,
    Revenue,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Metric::Eps => write!(f, "EPS"),
            Metric::Revenue => write!(f, "Revenue"),
        }
    }
}

/// Canonical period label: `YYYYQn` for quarters, `YYYY` for fiscal years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeriodLabel {
    Quarter(QuarterLabel),
    Year(i32),
}

impl PeriodLabel {
    pub fn granularity(&self) -> Granularity {
        match self {
            PeriodLabel::Quarter(_) => Granularity::Quarterly,
            PeriodLabel::Year(_) => Granularity::Annual,
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            PeriodLabel::Quarter(q) => q.year,
            PeriodLabel::Year(y) => *y,
        }
    }

    pub fn as_quarter(&self) -> Option<QuarterLabel> {
        match self {
            PeriodLabel::Quarter(q) => Some(*q),
            PeriodLabel::Year(_) => None,
        }
    }
}

impl fmt::Display for PeriodLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PeriodLabel::Quarter(q) => write!(f, "{}", q),
            PeriodLabel::Year(y) => write!(f, "{}", y),
        }
    }
}

impl FromStr for PeriodLabel {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() == 4 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            let year = trimmed
                .parse::<i32>()
                .map_err(|_| CalendarError::UnparsablePeriod(s.to_string()))?;
            return Ok(PeriodLabel::Year(year));
        }
        trimmed.parse::<QuarterLabel>().map(PeriodLabel::Quarter)
    }
}

impl Serialize for PeriodLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeriodLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Which of the three classes a data point falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointClass {
    Historical,
    Forecast,
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodDataPoint {
    pub period: PeriodLabel,
    pub reported: Option<f64>,
    pub estimate: Option<f64>,
}

impl PeriodDataPoint {
    pub fn new(period: PeriodLabel, reported: Option<f64>, estimate: Option<f64>) -> Self {
        PeriodDataPoint {
            period,
            reported: reported.filter(|v| v.is_finite()),
            estimate: estimate.filter(|v| v.is_finite()),
        }
    }

    pub fn class(&self) -> PointClass {
        match (self.reported, self.estimate) {
            (Some(_), _) => PointClass::Historical,
            (None, Some(_)) => PointClass::Forecast,
            (None, None) => PointClass::Discarded,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub historical: Vec<PeriodDataPoint>,
    pub forecast: Vec<PeriodDataPoint>,
    pub discarded: Vec<PeriodDataPoint>,
}

pub fn partition(points: &[PeriodDataPoint]) -> Partition {
    let mut out = Partition::default();
    for point in points {
        match point.class() {
            PointClass::Historical => out.historical.push(*point),
            PointClass::Forecast => out.forecast.push(*point),
            PointClass::Discarded => out.discarded.push(*point),
        }
    }
    out
}

/// One extraction pass for a (ticker, metric, granularity). Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSeries {
    pub granularity: Granularity,
    pub points: Vec<PeriodDataPoint>,
    /// `(min, max)` axis domain the bar values were decoded against, if any.
    pub scale: Option<(f64, f64)>,
}

impl PeriodSeries {
    /// Builds a series, dropping points that carry neither a reported nor an estimate value.
    pub fn new(
        granularity: Granularity,
        points: Vec<PeriodDataPoint>,
        scale: Option<(f64, f64)>,
    ) -> Self {
        let points = points
            .into_iter()
            .filter(|p| p.class() != PointClass::Discarded)
            .collect();
        PeriodSeries {
            granularity,
            points,
            scale,
        }
    }

    pub fn empty(granularity: Granularity) -> Self {
        PeriodSeries {
            granularity,
            points: Vec::new(),
            scale: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, period: &PeriodLabel) -> Option<&PeriodDataPoint> {
        self.points.iter().find(|p| &p.period == period)
    }

    pub fn historical(&self) -> Vec<PeriodDataPoint> {
        partition(&self.points).historical
    }

    pub fn forecast(&self) -> Vec<PeriodDataPoint> {
        partition(&self.points).forecast
    }

    /// True when labels are strictly ascending or strictly descending.
    pub fn is_ordered(&self) -> bool {
        let labels: Vec<&PeriodLabel> = self.points.iter().map(|p| &p.period).collect();
        let ascending = labels.windows(2).all(|w| w[0] < w[1]);
        let descending = labels.windows(2).all(|w| w[0] > w[1]);
        ascending || descending
    }
}

/// Flat estimate record as handed over by an external provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRecord {
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default, deserialize_with = "deserialize_calendar_date")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub eps_estimate: Option<f64>,
    #[serde(default)]
    pub eps_actual: Option<f64>,
    #[serde(default)]
    pub revenue_estimate: Option<f64>,
    #[serde(default)]
    pub revenue_actual: Option<f64>,
}

impl EstimateRecord {
    /// A record with neither key describes "the current quarter" of a scanner feed.
    pub fn is_keyless(&self) -> bool {
        self.end_date.is_none()
            && self
                .period
                .as_deref()
                .map(|p| p.trim().is_empty())
                .unwrap_or(true)
    }
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and `YYYY-MM-DD HH:MM:SS`, keeping only the date.
fn deserialize_calendar_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_calendar_date(text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", text))),
    }
}

pub fn parse_calendar_date(text: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .map(|dt| dt.date())
        .ok()
}

/// Records from one provider; providers are merged in the order they are listed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderRecords {
    pub provider: String,
    #[serde(default)]
    pub records: Vec<EstimateRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuarterMode {
    /// Next unreported quarter.
    #[default]
    Forecast,
    /// Last reported quarter.
    Reported,
}

impl FromStr for QuarterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forecast" => Ok(QuarterMode::Forecast),
            "reported" => Ok(QuarterMode::Reported),
            other => Err(format!(
                "invalid quarter mode '{}', expected forecast or reported",
                other
            )),
        }
    }
}

/// Rendered sections for one ticker. Any of them may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkupBundle {
    #[serde(default)]
    pub eps_quarterly: Option<String>,
    #[serde(default)]
    pub eps_annual: Option<String>,
    #[serde(default)]
    pub revenue_quarterly: Option<String>,
    #[serde(default)]
    pub revenue_annual: Option<String>,
}

impl MarkupBundle {
    pub fn section(&self, metric: Metric, granularity: Granularity) -> Option<&str> {
        let slot = match (metric, granularity) {
            (Metric::Eps, Granularity::Quarterly) => &self.eps_quarterly,
            (Metric::Eps, Granularity::Annual) => &self.eps_annual,
            (Metric::Revenue, Granularity::Quarterly) => &self.revenue_quarterly,
            (Metric::Revenue, Granularity::Annual) => &self.revenue_annual,
        };
        slot.as_deref()
    }

    pub fn set_section(&mut self, metric: Metric, granularity: Granularity, markup: String) {
        let slot = match (metric, granularity) {
            (Metric::Eps, Granularity::Quarterly) => &mut self.eps_quarterly,
            (Metric::Eps, Granularity::Annual) => &mut self.eps_annual,
            (Metric::Revenue, Granularity::Quarterly) => &mut self.revenue_quarterly,
            (Metric::Revenue, Granularity::Annual) => &mut self.revenue_annual,
        };
        *slot = Some(markup);
    }
}

/// Final flat record for one ticker. Revenue figures are in millions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciledRow {
    pub ticker: String,
    pub current_quarter: Option<QuarterLabel>,

    pub eps_q_estimate: Option<f64>,
    pub eps_q_actual: Option<f64>,
    pub eps_beat_pct: Option<f64>,
    pub revenue_q_estimate: Option<f64>,
    pub revenue_q_actual: Option<f64>,
    pub revenue_beat_pct: Option<f64>,

    pub eps_same_q_last_year: Option<f64>,
    pub eps_yoy_pct: Option<f64>,
    pub revenue_same_q_last_year: Option<f64>,
    pub revenue_yoy_pct: Option<f64>,

    pub eps_prior_q: Option<f64>,
    pub revenue_prior_q: Option<f64>,
    pub revenue_prior_q_yoy_pct: Option<f64>,

    pub anchor_year: Option<i32>,
    pub eps_fy_estimate: Option<f64>,
    pub eps_fy_actual: Option<f64>,
    pub eps_fy_last_year: Option<f64>,
    pub eps_fy_two_years_ago: Option<f64>,
    pub revenue_fy_estimate: Option<f64>,
    pub revenue_fy_actual: Option<f64>,
    pub revenue_fy_last_year: Option<f64>,
    pub revenue_fy_two_years_ago: Option<f64>,
    pub revenue_fy_yoy_last_year: Option<f64>,
    pub revenue_fy_yoy_this_year: Option<f64>,

    // Consensus estimates for the comparison periods.
    pub eps_same_q_last_year_estimate: Option<f64>,
    pub revenue_same_q_last_year_estimate: Option<f64>,
    pub eps_prior_q_estimate: Option<f64>,
    pub revenue_prior_q_estimate: Option<f64>,
    pub eps_fy_annual_estimate: Option<f64>,
    pub eps_fy_last_year_estimate: Option<f64>,
    pub eps_fy_two_years_ago_estimate: Option<f64>,
    pub revenue_fy_annual_estimate: Option<f64>,
    pub revenue_fy_last_year_estimate: Option<f64>,
    pub revenue_fy_two_years_ago_estimate: Option<f64>,
}

impl ReconciledRow {
    pub fn empty(ticker: &str) -> Self {
        ReconciledRow {
            ticker: ticker.to_string(),
            ..Default::default()
        }
    }
}

// src/services/reconcile.rs
//! Period reconciliation: joins extracted series with provider estimates, picks the
//! current quarter, and resolves the comparison periods around it.

use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::BTreeMap;

use crate::error::{CalendarError, ReconcileError};
use crate::models::{
    EstimateRecord, Granularity, Metric, PeriodLabel, PeriodSeries, ProviderRecords,
    QuarterLabel, QuarterMode,
};
use crate::services::calculations::quorum_sum;
use crate::services::merge::{merge_providers, record_quarter};

/// The four extracted series of one ticker. Missing sections are empty series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSet {
    pub eps_quarterly: PeriodSeries,
    pub eps_annual: PeriodSeries,
    pub revenue_quarterly: PeriodSeries,
    pub revenue_annual: PeriodSeries,
}

impl Default for SeriesSet {
    fn default() -> Self {
        SeriesSet {
            eps_quarterly: PeriodSeries::empty(Granularity::Quarterly),
            eps_annual: PeriodSeries::empty(Granularity::Annual),
            revenue_quarterly: PeriodSeries::empty(Granularity::Quarterly),
            revenue_annual: PeriodSeries::empty(Granularity::Annual),
        }
    }
}

impl SeriesSet {
    pub fn get(&self, metric: Metric, granularity: Granularity) -> &PeriodSeries {
        match (metric, granularity) {
            (Metric::Eps, Granularity::Quarterly) => &self.eps_quarterly,
            (Metric::Eps, Granularity::Annual) => &self.eps_annual,
            (Metric::Revenue, Granularity::Quarterly) => &self.revenue_quarterly,
            (Metric::Revenue, Granularity::Annual) => &self.revenue_annual,
        }
    }

    pub fn set(&mut self, metric: Metric, series: PeriodSeries) {
        let slot = match (metric, series.granularity) {
            (Metric::Eps, Granularity::Quarterly) => &mut self.eps_quarterly,
            (Metric::Eps, Granularity::Annual) => &mut self.eps_annual,
            (Metric::Revenue, Granularity::Quarterly) => &mut self.revenue_quarterly,
            (Metric::Revenue, Granularity::Annual) => &mut self.revenue_annual,
        };
        *slot = series;
    }
}

/// EPS and revenue figures for one period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Figures {
    pub eps_estimate: Option<f64>,
    pub eps_actual: Option<f64>,
    pub revenue_estimate: Option<f64>,
    pub revenue_actual: Option<f64>,
}

impl Figures {
    /// The period counts as reported when either metric has an actual.
    pub fn reported(&self) -> Option<f64> {
        self.eps_actual.or(self.revenue_actual)
    }

    pub fn estimate(&self) -> Option<f64> {
        self.eps_estimate.or(self.revenue_estimate)
    }

    fn fill_gaps(&mut self, other: &Figures) {
        self.eps_estimate = self.eps_estimate.or(other.eps_estimate);
        self.eps_actual = self.eps_actual.or(other.eps_actual);
        self.revenue_estimate = self.revenue_estimate.or(other.revenue_estimate);
        self.revenue_actual = self.revenue_actual.or(other.revenue_actual);
    }

    fn set_from_series(&mut self, metric: Metric, reported: Option<f64>, estimate: Option<f64>) {
        match metric {
            Metric::Eps => {
                self.eps_actual = reported;
                self.eps_estimate = estimate;
            }
            Metric::Revenue => {
                self.revenue_actual = reported;
                self.revenue_estimate = estimate;
            }
        }
    }

    fn from_record(record: &EstimateRecord) -> Self {
        Figures {
            eps_estimate: record.eps_estimate,
            eps_actual: record.eps_actual,
            revenue_estimate: record.revenue_estimate,
            revenue_actual: record.revenue_actual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuarterEntry {
    pub label: QuarterLabel,
    pub end_date: NaiveDate,
    pub figures: Figures,
}

/// Quarterly figures keyed by canonical label, ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuarterTable {
    entries: BTreeMap<QuarterLabel, QuarterEntry>,
}

impl QuarterTable {
    /// Builds the table from extracted quarterly series, then lets provider records fill
    /// whatever the extraction left empty.
    pub fn build(series: &SeriesSet, records: &[EstimateRecord]) -> Result<Self, CalendarError> {
        let mut table = QuarterTable::default();
        for metric in [Metric::Eps, Metric::Revenue] {
            for point in &series.get(metric, Granularity::Quarterly).points {
                let Some(label) = point.period.as_quarter() else {
                    continue;
                };
                table
                    .entry(label, None)
                    .figures
                    .set_from_series(metric, point.reported, point.estimate);
            }
        }

        for record in records {
            let label = match (record_quarter(record), record.end_date) {
                (Some(label), _) => label,
                (None, Some(date)) => QuarterLabel::from_date(date),
                (None, None) => {
                    let period = record.period.clone().unwrap_or_default();
                    return Err(CalendarError::UnparsablePeriod(period));
                }
            };
            let entry = table.entry(label, record.end_date);
            entry.figures.fill_gaps(&Figures::from_record(record));
        }
        Ok(table)
    }

    fn entry(&mut self, label: QuarterLabel, end_date: Option<NaiveDate>) -> &mut QuarterEntry {
        let entry = self.entries.entry(label).or_insert_with(|| QuarterEntry {
            label,
            end_date: label.end_date(),
            figures: Figures::default(),
        });
        if let Some(date) = end_date {
            entry.end_date = date;
        }
        entry
    }

    pub fn get(&self, label: QuarterLabel) -> Option<&QuarterEntry> {
        self.entries.get(&label)
    }

    pub fn figures(&self, label: QuarterLabel) -> Figures {
        self.get(label).map(|e| e.figures).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &QuarterEntry> {
        self.entries.values()
    }

    /// Picks the current quarter under `mode`.
    pub fn select_current(&self, mode: QuarterMode) -> Result<QuarterLabel, ReconcileError> {
        let latest_reported = self
            .entries
            .values()
            .filter(|e| e.figures.reported().is_some())
            .max_by_key(|e| (e.end_date, e.label));

        match mode {
            QuarterMode::Forecast => {
                let next_unreported = self
                    .entries
                    .values()
                    .filter(|e| latest_reported.map_or(true, |r| e.label > r.label))
                    .find(|e| e.figures.reported().is_none() && e.figures.estimate().is_some());
                next_unreported
                    .or(latest_reported)
                    .map(|e| e.label)
                    .ok_or(ReconcileError::NoCurrentQuarter)
            }
            QuarterMode::Reported => latest_reported
                .map(|e| e.label)
                .ok_or(ReconcileError::NoCurrentQuarter),
        }
    }

    /// Quorum rollup of one year's quarterly estimates for `metric`.
    pub fn full_year_estimate(&self, year: i32, metric: Metric) -> Option<f64> {
        let estimates: Vec<Option<f64>> = QuarterLabel::quarters_of(year)
            .iter()
            .map(|q| {
                let figures = self.figures(*q);
                match metric {
                    Metric::Eps => figures.eps_estimate,
                    Metric::Revenue => figures.revenue_estimate,
                }
            })
            .collect();
        quorum_sum(&estimates)
    }
}

/// Annual figures keyed by calendar year.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnualTable {
    years: BTreeMap<i32, Figures>,
}

impl AnnualTable {
    pub fn build(series: &SeriesSet) -> Self {
        let mut table = AnnualTable::default();
        for metric in [Metric::Eps, Metric::Revenue] {
            for point in &series.get(metric, Granularity::Annual).points {
                if let PeriodLabel::Year(year) = point.period {
                    table
                        .years
                        .entry(year)
                        .or_default()
                        .set_from_series(metric, point.reported, point.estimate);
                }
            }
        }
        table
    }

    pub fn figures(&self, year: i32) -> Figures {
        self.years.get(&year).copied().unwrap_or_default()
    }

    /// The current quarter's year when the annual data has it, else the latest reported year.
    pub fn anchor_year(&self, current: Option<QuarterLabel>) -> Option<i32> {
        if let Some(year) = current.map(|q| q.year).filter(|y| self.years.contains_key(y)) {
            return Some(year);
        }
        self.years
            .iter()
            .rev()
            .find(|(_, figures)| figures.reported().is_some())
            .map(|(year, _)| *year)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReconcileOptions {
    pub mode: QuarterMode,
    /// Pins the current quarter instead of selecting it by mode.
    pub target_quarter: Option<QuarterLabel>,
}

/// Everything the row builder needs, before percentages are derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub current_quarter: QuarterLabel,
    pub current: Figures,
    pub same_quarter_last_year: Figures,
    pub prior_quarter: Figures,
    pub prior_quarter_last_year: Figures,
    pub anchor_year: Option<i32>,
    pub this_year: Figures,
    pub last_year: Figures,
    pub two_years_ago: Figures,
    pub eps_fy_estimate: Option<f64>,
    pub revenue_fy_estimate: Option<f64>,
}

pub fn reconcile(
    ticker: &str,
    series: &SeriesSet,
    providers: &[ProviderRecords],
    options: &ReconcileOptions,
) -> Result<Reconciliation, ReconcileError> {
    let merged = merge_providers(providers);
    let quarters = QuarterTable::build(series, &merged.records)?;
    let annual = AnnualTable::build(series);
    debug!(
        "[{}] {} quarter(s), {} provider record(s)",
        ticker,
        quarters.len(),
        merged.records.len()
    );

    let current_quarter = match options.target_quarter {
        Some(target) => target,
        None => quarters.select_current(options.mode)?,
    };
    info!("[{}] current quarter: {} ({:?} mode)", ticker, current_quarter, options.mode);

    let mut current = quarters.figures(current_quarter);
    if quarters.get(current_quarter).is_none() {
        if let Some(snapshot) = &merged.snapshot {
            info!("[{}] {} absent from series, using scanner snapshot", ticker, current_quarter);
            current = Figures::from_record(snapshot);
        } else {
            warn!("[{}] {} has no figures from any source", ticker, current_quarter);
        }
    }

    let prior = current_quarter.prior();
    let anchor_year = annual.anchor_year(Some(current_quarter));
    let rollup_year = anchor_year.unwrap_or(current_quarter.year);
    let this_year = annual.figures(rollup_year);

    // Full-year estimates are always the quarterly quorum rollup. The annual series estimate
    // stays on `this_year` and is reported separately.
    let eps_fy_estimate = quarters.full_year_estimate(rollup_year, Metric::Eps);
    let revenue_fy_estimate = quarters.full_year_estimate(rollup_year, Metric::Revenue);

    Ok(Reconciliation {
        current_quarter,
        current,
        same_quarter_last_year: quarters.figures(current_quarter.same_quarter_last_year()),
        prior_quarter: quarters.figures(prior),
        prior_quarter_last_year: quarters.figures(prior.same_quarter_last_year()),
        anchor_year,
        this_year,
        last_year: annual.figures(rollup_year - 1),
        two_years_ago: annual.figures(rollup_year - 2),
        eps_fy_estimate,
        revenue_fy_estimate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PeriodDataPoint;

    fn ql(year: i32, quarter: u8) -> QuarterLabel {
        QuarterLabel::new(year, quarter).unwrap()
    }

    fn quarterly(points: &[(QuarterLabel, Option<f64>, Option<f64>)]) -> PeriodSeries {
        PeriodSeries::new(
            Granularity::Quarterly,
            points
                .iter()
                .map(|(q, r, e)| PeriodDataPoint::new(PeriodLabel::Quarter(*q), *r, *e))
                .collect(),
            None,
        )
    }

    fn annual(points: &[(i32, Option<f64>, Option<f64>)]) -> PeriodSeries {
        PeriodSeries::new(
            Granularity::Annual,
            points
                .iter()
                .map(|(y, r, e)| PeriodDataPoint::new(PeriodLabel::Year(*y), *r, *e))
                .collect(),
            None,
        )
    }

    fn eps_history() -> SeriesSet {
        SeriesSet {
            eps_quarterly: quarterly(&[
                (ql(2024, 1), Some(1.0), Some(0.9)),
                (ql(2024, 2), Some(1.1), Some(1.0)),
                (ql(2024, 3), Some(1.2), Some(1.2)),
                (ql(2024, 4), Some(1.3), Some(1.25)),
                (ql(2025, 1), None, Some(1.4)),
                (ql(2025, 2), None, Some(1.5)),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn forecast_mode_picks_first_unreported_quarter() {
        let table = QuarterTable::build(&eps_history(), &[]).unwrap();
        assert_eq!(table.select_current(QuarterMode::Forecast), Ok(ql(2025, 1)));
        assert_eq!(table.select_current(QuarterMode::Reported), Ok(ql(2024, 4)));
    }

    #[test]
    fn forecast_mode_falls_back_to_latest_reported() {
        let series = SeriesSet {
            eps_quarterly: quarterly(&[
                (ql(2024, 3), Some(1.2), None),
                (ql(2024, 4), Some(1.3), Some(1.2)),
            ]),
            ..Default::default()
        };
        let table = QuarterTable::build(&series, &[]).unwrap();
        assert_eq!(table.select_current(QuarterMode::Forecast), Ok(ql(2024, 4)));
    }

    #[test]
    fn empty_input_has_no_current_quarter() {
        let table = QuarterTable::build(&SeriesSet::default(), &[]).unwrap();
        assert_eq!(
            table.select_current(QuarterMode::Forecast),
            Err(ReconcileError::NoCurrentQuarter)
        );
        assert_eq!(
            table.select_current(QuarterMode::Reported),
            Err(ReconcileError::NoCurrentQuarter)
        );
    }

    #[test]
    fn reported_mode_uses_latest_end_date() {
        let records = vec![EstimateRecord {
            period: Some("2024Q3".to_string()),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 15),
            eps_actual: Some(2.0),
            ..Default::default()
        }];
        let series = SeriesSet {
            eps_quarterly: quarterly(&[(ql(2024, 4), Some(1.3), None)]),
            ..Default::default()
        };
        let table = QuarterTable::build(&series, &records).unwrap();
        assert_eq!(table.select_current(QuarterMode::Reported), Ok(ql(2024, 3)));
    }

    #[test]
    fn extracted_values_take_precedence_over_providers() {
        let records = vec![EstimateRecord {
            period: Some("Q1 2025".to_string()),
            eps_estimate: Some(9.0),
            revenue_estimate: Some(480.0),
            ..Default::default()
        }];
        let table = QuarterTable::build(&eps_history(), &records).unwrap();
        let figures = table.figures(ql(2025, 1));
        assert_eq!(figures.eps_estimate, Some(1.4));
        assert_eq!(figures.revenue_estimate, Some(480.0));
    }

    #[test]
    fn unparsable_provider_period_is_an_error() {
        let records = vec![EstimateRecord {
            period: Some("next quarter".to_string()),
            eps_estimate: Some(1.0),
            ..Default::default()
        }];
        assert_eq!(
            QuarterTable::build(&SeriesSet::default(), &records),
            Err(CalendarError::UnparsablePeriod("next quarter".to_string()))
        );
    }

    #[test]
    fn full_year_rollup_honors_quorum() {
        let series = SeriesSet {
            revenue_quarterly: quarterly(&[
                (ql(2025, 1), None, Some(100.0)),
                (ql(2025, 2), None, Some(110.0)),
                (ql(2026, 1), None, Some(120.0)),
                (ql(2026, 2), None, Some(130.0)),
                (ql(2026, 3), None, Some(140.0)),
            ]),
            ..Default::default()
        };
        let table = QuarterTable::build(&series, &[]).unwrap();
        assert_eq!(table.full_year_estimate(2025, Metric::Revenue), None);
        assert_eq!(table.full_year_estimate(2026, Metric::Revenue), Some(390.0));
    }

    #[test]
    fn anchor_year_prefers_current_quarter_year() {
        let series = SeriesSet {
            eps_annual: annual(&[
                (2023, Some(4.0), Some(3.9)),
                (2024, Some(4.6), Some(4.5)),
                (2025, None, Some(5.1)),
            ]),
            ..Default::default()
        };
        let table = AnnualTable::build(&series);
        assert_eq!(table.anchor_year(Some(ql(2025, 1))), Some(2025));
        assert_eq!(table.anchor_year(Some(ql(2027, 1))), Some(2024));
        assert_eq!(AnnualTable::default().anchor_year(Some(ql(2025, 1))), None);
    }

    #[test]
    fn reconciles_comparison_periods() {
        let mut series = eps_history();
        series.eps_annual = annual(&[
            (2023, Some(4.0), None),
            (2024, Some(4.6), Some(4.5)),
            (2025, None, Some(5.8)),
        ]);
        let result = reconcile("TEST", &series, &[], &ReconcileOptions::default()).unwrap();
        assert_eq!(result.current_quarter, ql(2025, 1));
        assert_eq!(result.current.eps_estimate, Some(1.4));
        assert_eq!(result.same_quarter_last_year.eps_actual, Some(1.0));
        assert_eq!(result.prior_quarter.eps_actual, Some(1.3));
        assert_eq!(result.anchor_year, Some(2025));
        assert_eq!(result.this_year.eps_estimate, Some(5.8));
        assert_eq!(result.eps_fy_estimate, None);
        assert_eq!(result.last_year.eps_actual, Some(4.6));
        assert_eq!(result.two_years_ago.eps_actual, Some(4.0));
    }

    #[test]
    fn annual_estimate_does_not_bypass_the_quorum() {
        let series = SeriesSet {
            eps_quarterly: quarterly(&[
                (ql(2024, 4), Some(1.3), Some(1.2)),
                (ql(2025, 1), None, Some(1.5)),
            ]),
            eps_annual: annual(&[(2024, Some(4.6), None), (2025, None, Some(6.0))]),
            ..Default::default()
        };
        let result = reconcile("TEST", &series, &[], &ReconcileOptions::default()).unwrap();
        assert_eq!(result.anchor_year, Some(2025));
        assert_eq!(result.this_year.eps_estimate, Some(6.0));
        assert_eq!(result.eps_fy_estimate, None);

        let mut full = series.clone();
        full.eps_quarterly = quarterly(&[
            (ql(2024, 4), Some(1.3), Some(1.2)),
            (ql(2025, 1), None, Some(1.5)),
            (ql(2025, 2), None, Some(1.5)),
            (ql(2025, 3), None, Some(2.0)),
        ]);
        let result = reconcile("TEST", &full, &[], &ReconcileOptions::default()).unwrap();
        assert_eq!(result.eps_fy_estimate, Some(5.0));
    }

    #[test]
    fn snapshot_fills_a_pinned_quarter_missing_from_the_series() {
        let providers = vec![ProviderRecords {
            provider: "scanner".to_string(),
            records: vec![EstimateRecord {
                eps_estimate: Some(1.7),
                revenue_estimate: Some(640.0),
                ..Default::default()
            }],
        }];
        let options = ReconcileOptions {
            mode: QuarterMode::Forecast,
            target_quarter: Some(ql(2025, 3)),
        };
        let result = reconcile("TEST", &eps_history(), &providers, &options).unwrap();
        assert_eq!(result.current_quarter, ql(2025, 3));
        assert_eq!(result.current.eps_estimate, Some(1.7));
        assert_eq!(result.current.revenue_estimate, Some(640.0));

        let pinned_present = ReconcileOptions {
            target_quarter: Some(ql(2025, 1)),
            ..options
        };
        let result = reconcile("TEST", &eps_history(), &providers, &pinned_present).unwrap();
        assert_eq!(result.current.eps_estimate, Some(1.4));
        assert_eq!(result.current.revenue_estimate, None);
    }
}

// src/services/table.rs
//! Table extraction: period header cells and value cells share one flat set of positioned
//! elements. Periods are matched to values by horizontal position, then values are split
//! into rows by count.

use log::{debug, info, warn};
use regex::Regex;
use scraper::{ElementRef, Html};

use crate::error::ExtractionError;
use crate::models::{Granularity, PeriodDataPoint, PeriodLabel, PeriodSeries};
use crate::services::labels::{classify_label, is_period_label};
use crate::services::markup::{element_text, has_class_token, parse_value, selector};

const CELL: &str = r#"[class*="value-"]"#;
const LEFT_PATTERN: &str = r"left:\s*(-?[0-9]*\.?[0-9]+)px";

/// Inputs for table extraction that do not come from the markup itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableSettings {
    /// A period is kept only if some value cell is closer than this, in pixels.
    pub proximity_px: f64,
    /// Annual periods after this year never carry a reported figure.
    pub current_year: i32,
}

impl TableSettings {
    pub fn new(proximity_px: f64, current_year: i32) -> Self {
        TableSettings { proximity_px, current_year }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PeriodCell {
    label: PeriodLabel,
    x: f64,
}

/// Horizontal position of a cell from `data-x`, falling back to an inline `left: Npx`.
fn cell_x(cell: &ElementRef, left: &Regex) -> Option<f64> {
    if let Some(x) = cell.value().attr("data-x").and_then(|v| v.trim().parse::<f64>().ok()) {
        return Some(x);
    }
    let style = cell.value().attr("style")?;
    left.captures(style)?.get(1)?.as_str().parse().ok()
}

/// True when the markup carries positioned value cells.
pub fn is_table_markup(markup: &str) -> bool {
    let document = Html::parse_fragment(markup);
    let Ok(cells) = selector(CELL) else {
        return false;
    };
    document.select(&cells).any(|el| has_class_token(&el, "value-"))
}

pub fn extract_table(
    markup: &str,
    granularity: Granularity,
    settings: &TableSettings,
) -> Result<PeriodSeries, ExtractionError> {
    let document = Html::parse_fragment(markup);
    let left = Regex::new(LEFT_PATTERN)?;
    let cells: Vec<ElementRef> = document
        .select(&selector(CELL)?)
        .filter(|el| has_class_token(el, "value-"))
        .collect();

    let mut periods: Vec<PeriodCell> = Vec::new();
    // Positions of cells that parsed to a number, for the proximity check.
    let mut data_xs: Vec<f64> = Vec::new();
    // Every non-label cell in document order, for the row partition.
    let mut values: Vec<Option<f64>> = Vec::new();

    for cell in &cells {
        let text = element_text(cell);
        let x = cell_x(cell, &left);

        if let Some(label) = classify_label(&text, granularity) {
            match x {
                Some(x) if !periods.iter().any(|p| p.label == label) => {
                    periods.push(PeriodCell { label, x })
                }
                Some(_) => debug!("Duplicate period cell '{}'", text),
                None => debug!("Period cell '{}' has no position", text),
            }
            continue;
        }
        if is_period_label(&text) {
            // A label of the other granularity is neither a period nor a value here.
            continue;
        }

        let value = if text.contains('%') { None } else { parse_value(&text) };
        if let (Some(_), Some(x)) = (value, x) {
            data_xs.push(x);
        }
        values.push(value);
    }

    if periods.is_empty() {
        return Err(ExtractionError::NoPeriodLabels { granularity });
    }
    if values.is_empty() {
        return Err(ExtractionError::NoValueCells);
    }

    periods.sort_by(|a, b| a.x.total_cmp(&b.x));
    let total = periods.len();
    let retained: Vec<PeriodCell> = periods
        .into_iter()
        .filter(|p| data_xs.iter().any(|x| (x - p.x).abs() < settings.proximity_px))
        .collect();
    if retained.len() < total {
        warn!(
            "Dropped {} {} period(s) with no value within {}px",
            total - retained.len(),
            granularity,
            settings.proximity_px
        );
    }

    let n = retained.len();
    if n == 0 || values.len() % n != 0 {
        return Err(ExtractionError::RowPartitionMismatch {
            values: values.len(),
            periods: n,
        });
    }

    let has_estimates = values.len() >= 2 * n;
    let points: Vec<PeriodDataPoint> = retained
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let mut reported = values[idx];
            let estimate = if has_estimates { values[n + idx] } else { None };
            if let PeriodLabel::Year(year) = cell.label {
                if year > settings.current_year && reported.is_some() {
                    debug!("Nulling reported value for future year {}", year);
                    reported = None;
                }
            }
            PeriodDataPoint::new(cell.label, reported, estimate)
        })
        .collect();

    let series = PeriodSeries::new(granularity, points, None);
    info!(
        "Extracted {} historical, {} forecast from table",
        series.historical().len(),
        series.forecast().len()
    );
    Ok(series)
}

// src/services/chart.rs
//! Bar chart extraction: axis labels and gridlines give the frame, each column's colored
//! bars give the reported and estimate values for the period at the same index.

use log::{debug, info, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{ColumnLabelCountMismatch, ExtractionError};
use crate::models::{Granularity, PeriodDataPoint, PeriodLabel, PeriodSeries};
use crate::services::labels::filter_labels;
use crate::services::markup::{element_text, has_class_token, selector};
use crate::services::scale::ValueScale;

const PERIOD_AXIS: &str = r#"[class*="horizontalScaleValue"]"#;
const VALUE_AXIS: &str = r#"[class*="verticalScaleValue"]"#;
const COLUMN: &str = r#"div[class*="column-"]"#;
const BAR: &str = r#"[class*="bar-"]"#;
// Anchored on the declaration start so `max-height`/`min-height` never match.
const HEIGHT_PATTERN: &str = r"(?:^|;)\s*height:\s*(?:max\(\s*)?(-?[0-9]*\.?[0-9]+)%";

const REPORTED_TOKENS: [&str; 2] = ["#3179f5", "rgb(49,121,245)"];
const ESTIMATE_TOKENS: [&str; 4] = [
    "#ebebeb",
    "#a8a8a8",
    "rgb(235,235,235)",
    "rgb(168,168,168)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarRole {
    Reported,
    Estimate,
    Unknown,
}

/// Maps a bar's inline style to its role by color token. Anything else is `Unknown`.
pub fn classify_color(style: &str) -> BarRole {
    let normalized: String = style
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if REPORTED_TOKENS.iter().any(|t| normalized.contains(t)) {
        BarRole::Reported
    } else if ESTIMATE_TOKENS.iter().any(|t| normalized.contains(t)) {
        BarRole::Estimate
    } else {
        BarRole::Unknown
    }
}

/// Column `i` paired with label `i`, truncated to the shorter side.
#[derive(Debug)]
pub struct ColumnAlignment<T> {
    pub pairs: Vec<(T, PeriodLabel)>,
    pub mismatch: Option<ColumnLabelCountMismatch>,
}

pub fn align_columns<T>(columns: Vec<T>, labels: &[PeriodLabel]) -> ColumnAlignment<T> {
    let mismatch = (columns.len() != labels.len()).then(|| ColumnLabelCountMismatch {
        columns: columns.len(),
        labels: labels.len(),
    });
    let pairs = columns.into_iter().zip(labels.iter().copied()).collect();
    ColumnAlignment { pairs, mismatch }
}

/// Reported and estimate values decoded from one column.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColumnValues {
    pub reported: Option<f64>,
    pub estimate: Option<f64>,
}

fn read_column(
    column: &ElementRef,
    bars: &Selector,
    height: &Regex,
    scale: &ValueScale,
) -> ColumnValues {
    let mut values = ColumnValues::default();
    for bar in column.select(bars) {
        let style = bar.value().attr("style").unwrap_or("");
        let Some(height_pct) = height
            .captures(style)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
        else {
            continue;
        };
        let value = scale.value_at(height_pct);
        match classify_color(style) {
            BarRole::Reported => values.reported = Some(value),
            BarRole::Estimate => values.estimate = Some(value),
            BarRole::Unknown => debug!("Ignoring bar with unknown color: {}", style),
        }
    }
    values
}

/// True when the markup has at least one column container holding a bar.
pub fn is_chart_markup(markup: &str) -> bool {
    let document = Html::parse_fragment(markup);
    let (Ok(columns), Ok(bars)) = (selector(COLUMN), selector(BAR)) else {
        return false;
    };
    document
        .select(&columns)
        .filter(|el| has_class_token(el, "column-"))
        .any(|column| column.select(&bars).next().is_some())
}

/// Extracts a series from a rendered bar chart section.
pub fn extract_chart(markup: &str, granularity: Granularity) -> Result<PeriodSeries, ExtractionError> {
    let document = Html::parse_fragment(markup);

    let raw_labels: Vec<String> = document
        .select(&selector(PERIOD_AXIS)?)
        .map(|el| element_text(&el))
        .filter(|text| !text.is_empty())
        .collect();
    let labels = filter_labels(&raw_labels, granularity);
    if labels.is_empty() {
        return Err(ExtractionError::NoPeriodLabels { granularity });
    }

    let gridlines: Vec<String> = document
        .select(&selector(VALUE_AXIS)?)
        .map(|el| element_text(&el))
        .collect();
    let scale = ValueScale::resolve(&gridlines)?;
    info!(
        "Found {} {} periods, scale: {}..{}",
        labels.len(),
        granularity,
        scale.min,
        scale.max
    );

    let columns: Vec<ElementRef> = document
        .select(&selector(COLUMN)?)
        .filter(|el| has_class_token(el, "column-"))
        .collect();
    if columns.is_empty() {
        return Err(ExtractionError::NoColumns);
    }

    let alignment = align_columns(columns, &labels);
    if let Some(mismatch) = alignment.mismatch {
        warn!("Column/label count mismatch: {}", mismatch);
    }

    let bars = selector(BAR)?;
    let height = Regex::new(HEIGHT_PATTERN)?;
    let points: Vec<PeriodDataPoint> = alignment
        .pairs
        .iter()
        .map(|(column, period)| {
            let values = read_column(column, &bars, &height, &scale);
            PeriodDataPoint::new(*period, values.reported, values.estimate)
        })
        .collect();

    let series = PeriodSeries::new(granularity, points, Some(scale.domain()));
    if !series.is_ordered() {
        warn!("Extracted {} labels are not in calendar order", granularity);
    }
    info!(
        "Extracted {} historical, {} forecast",
        series.historical().len(),
        series.forecast().len()
    );
    Ok(series)
}

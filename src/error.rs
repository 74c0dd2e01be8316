// src/error.rs
use std::fmt;
use thiserror::Error;

use crate::models::Granularity;

/// Pipeline stage a failure is attributed to in per-ticker warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Scale,
    Labels,
    Columns,
    Reconciliation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Scale => "scale",
            Stage::Labels => "labels",
            Stage::Columns => "columns",
            Stage::Reconciliation => "reconciliation",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("axis had {found} distinct gridline value(s), need at least 2")]
    ScaleUnavailable { found: usize },
    #[error("no {granularity} period labels found")]
    NoPeriodLabels { granularity: Granularity },
    #[error("no chart columns found")]
    NoColumns,
    #[error("no value cells found")]
    NoValueCells,
    #[error("{values} value cell(s) cannot be partitioned across {periods} period(s)")]
    RowPartitionMismatch { values: usize, periods: usize },
    #[error("invalid selector '{0}'")]
    Selector(String),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl ExtractionError {
    pub fn stage(&self) -> Stage {
        match self {
            ExtractionError::ScaleUnavailable { .. } => Stage::Scale,
            ExtractionError::NoPeriodLabels { .. } => Stage::Labels,
            ExtractionError::NoColumns
            | ExtractionError::NoValueCells
            | ExtractionError::RowPartitionMismatch { .. }
            | ExtractionError::Selector(_)
            | ExtractionError::Pattern(_) => Stage::Columns,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("unparsable period label '{0}'")]
    UnparsablePeriod(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("no current quarter could be selected")]
    NoCurrentQuarter,
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

/// Column count and label count disagreed; extraction continued on the shorter of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLabelCountMismatch {
    pub columns: usize,
    pub labels: usize,
}

impl fmt::Display for ColumnLabelCountMismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} column(s) vs {} label(s), truncated to {}",
            self.columns,
            self.labels,
            self.columns.min(self.labels)
        )
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed provider records: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("snapshot not available: {0}")]
    NotFound(String),
    #[error("no markup source configured")]
    Unconfigured,
}

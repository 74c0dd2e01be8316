// src/services/scale.rs
use log::debug;

use crate::error::ExtractionError;
use crate::services::markup::{parse_value, round2};

/// Numeric domain recovered from the gridline labels of a value axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueScale {
    /// Sorted, de-duplicated gridline values.
    pub ticks: Vec<f64>,
    pub min: f64,
    pub max: f64,
}

impl ValueScale {
    /// Resolves a domain from raw gridline label strings. Unparseable labels are skipped;
    /// fewer than two distinct values leaves nothing to interpolate against.
    pub fn resolve<S: AsRef<str>>(labels: &[S]) -> Result<Self, ExtractionError> {
        let mut ticks: Vec<f64> = labels
            .iter()
            .filter_map(|label| parse_value(label.as_ref()))
            .collect();
        ticks.sort_by(|a, b| a.total_cmp(b));
        ticks.dedup();

        if ticks.len() < 2 {
            return Err(ExtractionError::ScaleUnavailable { found: ticks.len() });
        }

        let min = ticks[0];
        let max = ticks[ticks.len() - 1];
        debug!("Resolved value scale {}..{} from {} gridlines", min, max, ticks.len());
        Ok(ValueScale { ticks, min, max })
    }

    /// Converts a bar height percentage (clamped to 0..=100) into a value, rounded to cents.
    pub fn value_at(&self, height_pct: f64) -> f64 {
        let fraction = height_pct.clamp(0.0, 100.0) / 100.0;
        round2(fraction * (self.max - self.min) + self.min)
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

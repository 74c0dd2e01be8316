// src/services/labels.rs
use log::debug;
use std::collections::HashSet;

use crate::models::{Granularity, PeriodLabel};
use crate::services::calendar::parse_axis_quarter;
use crate::services::markup::clean_text;

/// Classifies one axis string under the lexical grammar of `granularity`.
pub fn classify_label(raw: &str, granularity: Granularity) -> Option<PeriodLabel> {
    let text = clean_text(raw);
    match granularity {
        Granularity::Quarterly => parse_axis_quarter(&text).map(PeriodLabel::Quarter),
        Granularity::Annual => parse_year(&text).map(PeriodLabel::Year),
    }
}

/// True when the text is a period label of either granularity.
pub fn is_period_label(raw: &str) -> bool {
    classify_label(raw, Granularity::Quarterly).is_some()
        || classify_label(raw, Granularity::Annual).is_some()
}

fn parse_year(text: &str) -> Option<i32> {
    if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        text.parse().ok()
    } else {
        None
    }
}

/// Keeps the labels matching `granularity`, canonicalized, in first-seen order.
/// Labels of the other granularity are rejected outright, never re-interpreted.
pub fn filter_labels<S: AsRef<str>>(raw: &[S], granularity: Granularity) -> Vec<PeriodLabel> {
    let mut seen = HashSet::new();
    let mut labels = Vec::new();
    for text in raw {
        match classify_label(text.as_ref(), granularity) {
            Some(label) => {
                if seen.insert(label) {
                    labels.push(label);
                }
            }
            None => debug!("Rejected axis label '{}' for {}", text.as_ref(), granularity),
        }
    }
    labels
}

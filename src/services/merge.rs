// src/services/merge.rs
//! Folds several providers' estimate records into one collection. The first provider's
//! values win per field; later providers only fill gaps.

use log::debug;

use crate::models::{EstimateRecord, ProviderRecords, QuarterLabel};

/// Merged keyed records plus the merged "current quarter" snapshot, if any provider sent one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedEstimates {
    pub records: Vec<EstimateRecord>,
    pub snapshot: Option<EstimateRecord>,
}

/// Canonical quarter of a record's period text, if it parses.
pub fn record_quarter(record: &EstimateRecord) -> Option<QuarterLabel> {
    record.period.as_deref().and_then(|p| p.parse().ok())
}

/// Textual join key: the canonical quarter when the period parses (or is implied by the end
/// date), otherwise the trimmed period text.
pub fn period_key(record: &EstimateRecord) -> Option<String> {
    if let Some(quarter) = record_quarter(record) {
        return Some(quarter.to_string());
    }
    if let Some(date) = record.end_date {
        return Some(QuarterLabel::from_date(date).to_string());
    }
    record
        .period
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// Copies every field of `source` into `target` where `target` has none.
pub fn fill_gaps(target: &mut EstimateRecord, source: &EstimateRecord) {
    if target.period.is_none() {
        target.period = source.period.clone();
    }
    target.end_date = target.end_date.or(source.end_date);
    target.eps_estimate = target.eps_estimate.or(source.eps_estimate);
    target.eps_actual = target.eps_actual.or(source.eps_actual);
    target.revenue_estimate = target.revenue_estimate.or(source.revenue_estimate);
    target.revenue_actual = target.revenue_actual.or(source.revenue_actual);
}

/// Drops non-finite figures so that a provider's NaN never blocks a later provider's value.
fn sanitize(record: &EstimateRecord) -> EstimateRecord {
    let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
    EstimateRecord {
        period: record.period.clone(),
        end_date: record.end_date,
        eps_estimate: finite(record.eps_estimate),
        eps_actual: finite(record.eps_actual),
        revenue_estimate: finite(record.revenue_estimate),
        revenue_actual: finite(record.revenue_actual),
    }
}

pub fn merge_providers(providers: &[ProviderRecords]) -> MergedEstimates {
    let mut merged = MergedEstimates::default();

    for (rank, provider) in providers.iter().enumerate() {
        let mut unmatched: Vec<EstimateRecord> = Vec::new();

        for record in provider.records.iter().map(sanitize) {
            if record.is_keyless() {
                match merged.snapshot.as_mut() {
                    Some(snapshot) => fill_gaps(snapshot, &record),
                    None => merged.snapshot = Some(record),
                }
                continue;
            }
            if rank == 0 {
                merged.records.push(record);
                continue;
            }

            // Pass 1: the end date is authoritative when both sides carry one.
            let by_date = record.end_date.and_then(|date| {
                merged.records.iter().position(|r| r.end_date == Some(date))
            });
            match by_date {
                Some(idx) => fill_gaps(&mut merged.records[idx], &record),
                None => unmatched.push(record),
            }
        }

        // Pass 2: whatever the dates could not place is joined on the period key.
        for record in unmatched {
            let key = period_key(&record);
            let by_period = key.as_ref().and_then(|key| {
                merged
                    .records
                    .iter()
                    .position(|r| period_key(r).as_ref() == Some(key))
            });
            match by_period {
                Some(idx) => fill_gaps(&mut merged.records[idx], &record),
                None => {
                    debug!(
                        "{}: appending unmatched record {:?}",
                        provider.provider,
                        key.unwrap_or_default()
                    );
                    merged.records.push(record);
                }
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(period: &str, end: Option<(i32, u32, u32)>) -> EstimateRecord {
        EstimateRecord {
            period: Some(period.to_string()),
            end_date: end.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            ..Default::default()
        }
    }

    fn provider(name: &str, records: Vec<EstimateRecord>) -> ProviderRecords {
        ProviderRecords { provider: name.to_string(), records }
    }

    #[test]
    fn later_provider_fills_null_on_same_end_date() {
        let a = EstimateRecord {
            eps_estimate: Some(1.1),
            ..record("2025Q2", Some((2025, 6, 30)))
        };
        let b = EstimateRecord {
            eps_estimate: Some(9.9),
            revenue_estimate: Some(500.0),
            ..record("Q2 2025", Some((2025, 6, 30)))
        };
        let merged = merge_providers(&[provider("a", vec![a]), provider("b", vec![b])]);
        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.records[0].revenue_estimate, Some(500.0));
        assert_eq!(merged.records[0].eps_estimate, Some(1.1));
        assert_eq!(merged.records[0].period.as_deref(), Some("2025Q2"));
    }

    #[test]
    fn falls_back_to_period_key_when_dates_differ_or_are_missing() {
        let a = record("2025Q1", Some((2025, 3, 31)));
        let b = EstimateRecord {
            eps_actual: Some(2.0),
            ..record("2025-Q1", None)
        };
        let merged = merge_providers(&[provider("a", vec![a]), provider("b", vec![b])]);
        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.records[0].eps_actual, Some(2.0));
    }

    #[test]
    fn unmatched_records_are_appended_in_provider_order() {
        let a = record("2025Q1", None);
        let b = EstimateRecord {
            revenue_estimate: Some(10.0),
            ..record("2025Q3", None)
        };
        let merged = merge_providers(&[provider("a", vec![a]), provider("b", vec![b])]);
        let keys: Vec<Option<String>> = merged.records.iter().map(period_key).collect();
        assert_eq!(keys, vec![Some("2025Q1".to_string()), Some("2025Q3".to_string())]);
    }

    #[test]
    fn keyless_records_become_the_snapshot() {
        let scan_a = EstimateRecord { eps_estimate: Some(1.0), ..Default::default() };
        let scan_b = EstimateRecord {
            eps_estimate: Some(2.0),
            revenue_estimate: Some(300.0),
            ..Default::default()
        };
        let merged = merge_providers(&[provider("a", vec![scan_a]), provider("b", vec![scan_b])]);
        assert!(merged.records.is_empty());
        let snapshot = merged.snapshot.unwrap();
        assert_eq!(snapshot.eps_estimate, Some(1.0));
        assert_eq!(snapshot.revenue_estimate, Some(300.0));
    }

    #[test]
    fn nan_values_do_not_block_later_providers() {
        let a = EstimateRecord {
            eps_estimate: Some(f64::NAN),
            ..record("2025Q2", Some((2025, 6, 30)))
        };
        let b = EstimateRecord {
            eps_estimate: Some(1.5),
            ..record("2025Q2", Some((2025, 6, 30)))
        };
        let merged = merge_providers(&[provider("a", vec![a]), provider("b", vec![b])]);
        assert_eq!(merged.records[0].eps_estimate, Some(1.5));
    }

    #[test]
    fn derives_period_key_from_end_date() {
        let r = record("FY25 Q2", Some((2025, 5, 15)));
        assert_eq!(period_key(&r), Some("2025Q2".to_string()));
        assert_eq!(period_key(&record(" custom ", None)), Some("custom".to_string()));
    }
}

// src/services/row.rs
use crate::models::ReconciledRow;
use crate::services::calculations::{beat_pct, yoy_pct};
use crate::services::reconcile::Reconciliation;

/// Column headers, in the order `to_record` emits fields.
pub const HEADERS: [&str; 36] = [
    "ticker",
    "Current quarter",
    "EPS Q estimate",
    "EPS Q actual",
    "EPS beat %",
    "Revenue Q estimate",
    "Revenue Q actual",
    "Revenue Q beat %",
    "EPS same Q last year",
    "EPS YoY %",
    "Revenue same Q last year",
    "Revenue YoY %",
    "EPS prior Q actual",
    "Revenue prior Q actual",
    "Revenue prior Q YoY %",
    "Anchor year",
    "EPS full Y estimate",
    "EPS full Y actual",
    "EPS full Y last year",
    "EPS full Y two years ago",
    "Revenue full Y estimate",
    "Revenue full Y actual",
    "Revenue full Y last year",
    "Revenue full Y two years ago",
    "Revenue Y YoY last year",
    "Revenue Y YoY this year",
    "EPS same Q last year estimate",
    "Revenue same Q last year estimate",
    "EPS prior Q estimate",
    "Revenue prior Q estimate",
    "EPS full Y annual estimate",
    "EPS full Y last year estimate",
    "EPS full Y two years ago estimate",
    "Revenue full Y annual estimate",
    "Revenue full Y last year estimate",
    "Revenue full Y two years ago estimate",
];

pub fn build_row(ticker: &str, rec: &Reconciliation) -> ReconciledRow {
    let current = &rec.current;
    let last_year_q = &rec.same_quarter_last_year;

    ReconciledRow {
        ticker: ticker.to_string(),
        current_quarter: Some(rec.current_quarter),

        eps_q_estimate: current.eps_estimate,
        eps_q_actual: current.eps_actual,
        eps_beat_pct: beat_pct(current.eps_actual, current.eps_estimate),
        revenue_q_estimate: current.revenue_estimate,
        revenue_q_actual: current.revenue_actual,
        revenue_beat_pct: beat_pct(current.revenue_actual, current.revenue_estimate),

        eps_same_q_last_year: last_year_q.eps_actual,
        // Growth is reported-only; an unreported quarter has no YoY.
        eps_yoy_pct: yoy_pct(current.eps_actual, last_year_q.eps_actual),
        revenue_same_q_last_year: last_year_q.revenue_actual,
        revenue_yoy_pct: yoy_pct(current.revenue_actual, last_year_q.revenue_actual),

        eps_prior_q: rec.prior_quarter.eps_actual,
        revenue_prior_q: rec.prior_quarter.revenue_actual,
        revenue_prior_q_yoy_pct: yoy_pct(
            rec.prior_quarter.revenue_actual,
            rec.prior_quarter_last_year.revenue_actual,
        ),

        anchor_year: rec.anchor_year,
        eps_fy_estimate: rec.eps_fy_estimate,
        eps_fy_actual: rec.this_year.eps_actual,
        eps_fy_last_year: rec.last_year.eps_actual,
        eps_fy_two_years_ago: rec.two_years_ago.eps_actual,
        revenue_fy_estimate: rec.revenue_fy_estimate,
        revenue_fy_actual: rec.this_year.revenue_actual,
        revenue_fy_last_year: rec.last_year.revenue_actual,
        revenue_fy_two_years_ago: rec.two_years_ago.revenue_actual,
        revenue_fy_yoy_last_year: yoy_pct(
            rec.last_year.revenue_actual,
            rec.two_years_ago.revenue_actual,
        ),
        revenue_fy_yoy_this_year: yoy_pct(rec.revenue_fy_estimate, rec.last_year.revenue_actual),

        eps_same_q_last_year_estimate: last_year_q.eps_estimate,
        revenue_same_q_last_year_estimate: last_year_q.revenue_estimate,
        eps_prior_q_estimate: rec.prior_quarter.eps_estimate,
        revenue_prior_q_estimate: rec.prior_quarter.revenue_estimate,
        eps_fy_annual_estimate: rec.this_year.eps_estimate,
        eps_fy_last_year_estimate: rec.last_year.eps_estimate,
        eps_fy_two_years_ago_estimate: rec.two_years_ago.eps_estimate,
        revenue_fy_annual_estimate: rec.this_year.revenue_estimate,
        revenue_fy_last_year_estimate: rec.last_year.revenue_estimate,
        revenue_fy_two_years_ago_estimate: rec.two_years_ago.revenue_estimate,
    }
}

/// Two decimals, or an empty string for a missing or non-finite value.
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}", v),
        _ => String::new(),
    }
}

/// Flattens a row into text fields matching `HEADERS`.
pub fn to_record(row: &ReconciledRow) -> Vec<String> {
    let mut fields = vec![
        row.ticker.clone(),
        row.current_quarter.map(|q| q.to_string()).unwrap_or_default(),
    ];
    fields.extend(
        [
            row.eps_q_estimate,
            row.eps_q_actual,
            row.eps_beat_pct,
            row.revenue_q_estimate,
            row.revenue_q_actual,
            row.revenue_beat_pct,
            row.eps_same_q_last_year,
            row.eps_yoy_pct,
            row.revenue_same_q_last_year,
            row.revenue_yoy_pct,
            row.eps_prior_q,
            row.revenue_prior_q,
            row.revenue_prior_q_yoy_pct,
        ]
        .into_iter()
        .map(format_value),
    );
    fields.push(row.anchor_year.map(|y| y.to_string()).unwrap_or_default());
    fields.extend(
        [
            row.eps_fy_estimate,
            row.eps_fy_actual,
            row.eps_fy_last_year,
            row.eps_fy_two_years_ago,
            row.revenue_fy_estimate,
            row.revenue_fy_actual,
            row.revenue_fy_last_year,
            row.revenue_fy_two_years_ago,
            row.revenue_fy_yoy_last_year,
            row.revenue_fy_yoy_this_year,
            row.eps_same_q_last_year_estimate,
            row.revenue_same_q_last_year_estimate,
            row.eps_prior_q_estimate,
            row.revenue_prior_q_estimate,
            row.eps_fy_annual_estimate,
            row.eps_fy_last_year_estimate,
            row.eps_fy_two_years_ago_estimate,
            row.revenue_fy_annual_estimate,
            row.revenue_fy_last_year_estimate,
            row.revenue_fy_two_years_ago_estimate,
        ]
        .into_iter()
        .map(format_value),
    );
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuarterLabel;
    use crate::services::reconcile::Figures;

    fn reconciliation() -> Reconciliation {
        Reconciliation {
            current_quarter: QuarterLabel::new(2025, 1).unwrap(),
            current: Figures {
                eps_estimate: Some(1.0),
                eps_actual: Some(1.25),
                revenue_estimate: Some(500.0),
                revenue_actual: None,
            },
            same_quarter_last_year: Figures {
                eps_estimate: Some(0.95),
                eps_actual: Some(1.0),
                revenue_actual: Some(400.0),
                ..Default::default()
            },
            prior_quarter: Figures {
                eps_actual: Some(1.05),
                revenue_actual: Some(480.0),
                ..Default::default()
            },
            prior_quarter_last_year: Figures {
                revenue_actual: Some(0.0),
                ..Default::default()
            },
            anchor_year: Some(2025),
            this_year: Figures {
                eps_estimate: Some(4.5),
                ..Default::default()
            },
            last_year: Figures {
                revenue_estimate: Some(1950.0),
                revenue_actual: Some(2000.0),
                ..Default::default()
            },
            two_years_ago: Figures {
                revenue_actual: Some(1600.0),
                ..Default::default()
            },
            eps_fy_estimate: Some(4.4),
            revenue_fy_estimate: Some(2500.0),
        }
    }

    #[test]
    fn derives_percentages_null_safely() {
        let row = build_row("ACME", &reconciliation());
        assert_eq!(row.eps_beat_pct, Some(25.0));
        assert_eq!(row.revenue_beat_pct, None);
        assert_eq!(row.eps_yoy_pct, Some(25.0));
        assert_eq!(row.revenue_yoy_pct, None);
        assert_eq!(row.revenue_prior_q_yoy_pct, None);
        assert_eq!(row.revenue_fy_yoy_last_year, Some(25.0));
        assert_eq!(row.revenue_fy_yoy_this_year, Some(25.0));
    }

    #[test]
    fn unreported_quarter_has_no_yoy() {
        let mut rec = reconciliation();
        rec.current = Figures {
            eps_estimate: Some(1.5),
            revenue_estimate: Some(500.0),
            ..Default::default()
        };
        let row = build_row("ACME", &rec);
        assert_eq!(row.eps_q_estimate, Some(1.5));
        assert_eq!(row.eps_yoy_pct, None);
        assert_eq!(row.revenue_yoy_pct, None);
    }

    #[test]
    fn carries_comparison_period_estimates() {
        let row = build_row("ACME", &reconciliation());
        assert_eq!(row.eps_same_q_last_year_estimate, Some(0.95));
        assert_eq!(row.eps_fy_annual_estimate, Some(4.5));
        assert_eq!(row.eps_fy_estimate, Some(4.4));
        assert_eq!(row.revenue_fy_last_year_estimate, Some(1950.0));
        assert_eq!(row.revenue_prior_q_estimate, None);

        let record = to_record(&row);
        assert_eq!(HEADERS[26], "EPS same Q last year estimate");
        assert_eq!(record[26], "0.95");
        assert_eq!(HEADERS[30], "EPS full Y annual estimate");
        assert_eq!(record[30], "4.50");
    }

    #[test]
    fn formats_fixed_two_decimals_or_empty() {
        assert_eq!(format_value(Some(1.0)), "1.00");
        assert_eq!(format_value(Some(-0.456)), "-0.46");
        assert_eq!(format_value(None), "");
        assert_eq!(format_value(Some(f64::NAN)), "");
    }

    #[test]
    fn record_lines_up_with_headers() {
        let row = build_row("ACME", &reconciliation());
        let record = to_record(&row);
        assert_eq!(record.len(), HEADERS.len());
        assert_eq!(record[0], "ACME");
        assert_eq!(record[1], "2025Q1");
        assert_eq!(record[2], "1.00");
        assert_eq!(record[6], "");
        assert_eq!(record[15], "2025");

        let empty = to_record(&ReconciledRow::empty("FAIL"));
        assert_eq!(empty.len(), HEADERS.len());
        assert!(empty[1..].iter().all(String::is_empty));
    }
}

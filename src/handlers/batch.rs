// src/handlers/batch.rs
use log::{error, info};
use serde::Deserialize;
use std::sync::Arc;
use warp::Rejection;

use super::error::ApiError;
use crate::config::{current_market_year, AppConfig};
use crate::models::ReconciledRow;
use crate::services::export::to_csv_string;
use crate::services::pipeline::{run_batch, PipelineSettings};
use crate::services::reconcile::ReconcileOptions;

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    pub tickers: String,
}

/// Splits `A, b,,C` into `["A", "B", "C"]`.
pub fn parse_tickers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}

pub async fn batch(query: BatchQuery, config: Arc<AppConfig>) -> Result<impl warp::Reply, Rejection> {
    let tickers = parse_tickers(&query.tickers);
    if tickers.is_empty() {
        return Err(warp::reject::custom(ApiError::bad_request("no tickers given")));
    }
    info!("Handling batch request for {} ticker(s)", tickers.len());

    let source = config.markup_source().map_err(|e| {
        error!("Batch request without markup source: {}", e);
        warp::reject::custom(ApiError::unavailable(e.to_string()))
    })?;
    let settings = PipelineSettings {
        table: config.table_settings(current_market_year()),
        options: ReconcileOptions {
            mode: config.quarter_mode,
            target_quarter: None,
        },
    };

    let outcomes = run_batch(&tickers, source, config.concurrency, config.retry, settings).await;
    let rows: Vec<ReconciledRow> = outcomes.into_iter().map(|o| o.row).collect();
    let csv = to_csv_string(&rows).map_err(|e| {
        error!("Failed to render CSV: {}", e);
        warp::reject::custom(ApiError::new(e.to_string()))
    })?;

    Ok(warp::reply::with_header(csv, "content-type", "text/csv"))
}

// src/handlers/reconcile.rs
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::Rejection;

use super::error::ApiError;
use crate::config::{current_market_year, AppConfig};
use crate::models::{MarkupBundle, ProviderRecords, QuarterLabel, QuarterMode, ReconciledRow};
use crate::services::pipeline::{process_ticker, PipelineSettings};
use crate::services::reconcile::ReconcileOptions;

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub ticker: String,
    #[serde(default)]
    pub sections: MarkupBundle,
    #[serde(default)]
    pub providers: Vec<ProviderRecords>,
    #[serde(default)]
    pub mode: Option<QuarterMode>,
    #[serde(default)]
    pub target_quarter: Option<QuarterLabel>,
    #[serde(default)]
    pub current_year: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub row: ReconciledRow,
    pub warnings: Vec<String>,
}

pub async fn reconcile(
    request: ReconcileRequest,
    config: Arc<AppConfig>,
) -> Result<impl warp::Reply, Rejection> {
    let ticker = request.ticker.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(warp::reject::custom(ApiError::bad_request("ticker is required")));
    }
    info!("Handling reconcile request for {}", ticker);

    let year = request.current_year.unwrap_or_else(current_market_year);
    let settings = PipelineSettings {
        table: config.table_settings(year),
        options: ReconcileOptions {
            mode: request.mode.unwrap_or(config.quarter_mode),
            target_quarter: request.target_quarter,
        },
    };

    let sections = request.sections;
    let providers = request.providers;
    let outcome = tokio::task::spawn_blocking(move || {
        process_ticker(&ticker, &sections, &providers, &settings)
    })
    .await
    .map_err(|e| warp::reject::custom(ApiError::new(e.to_string())))?;

    Ok(warp::reply::json(&ReconcileResponse {
        row: outcome.row,
        warnings: outcome.warnings.iter().map(ToString::to_string).collect(),
    }))
}

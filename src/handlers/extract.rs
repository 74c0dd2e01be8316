// src/handlers/extract.rs
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;
use warp::Rejection;

use super::error::ApiError;
use crate::config::{current_market_year, AppConfig};
use crate::models::Granularity;
use crate::services::extract::extract_section;

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub markup: String,
    pub granularity: Granularity,
    /// Overrides the market clock for the future-year rule.
    #[serde(default)]
    pub current_year: Option<i32>,
}

pub async fn extract(
    request: ExtractRequest,
    config: Arc<AppConfig>,
) -> Result<impl warp::Reply, Rejection> {
    info!("Handling extract request for a {} section", request.granularity);
    let year = request.current_year.unwrap_or_else(current_market_year);
    match extract_section(&request.markup, request.granularity, &config.table_settings(year)) {
        Ok(series) => Ok(warp::reply::json(&series)),
        Err(e) => {
            warn!("Extraction failed at {} stage: {}", e.stage(), e);
            Err(warp::reject::custom(ApiError::bad_request(format!(
                "{}: {}",
                e.stage(),
                e
            ))))
        }
    }
}

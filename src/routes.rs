// src/routes.rs
use std::convert::Infallible;
use std::sync::Arc;
use log::info;
use warp::filters::body::BodyDeserializeError;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::config::AppConfig;
use crate::handlers::batch::{batch, BatchQuery};
use crate::handlers::error::ApiError;
use crate::handlers::extract::extract;
use crate::handlers::reconcile::reconcile;

const MAX_BODY_BYTES: u64 = 8 * 1024 * 1024;

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;

    if err.is_not_found() {
        code = warp::http::StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(api_error) = err.find::<ApiError>() {
        code = api_error.status;
        message = api_error.message.clone();
    } else if let Some(body_error) = err.find::<BodyDeserializeError>() {
        code = warp::http::StatusCode::BAD_REQUEST;
        message = body_error.to_string();
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        code = warp::http::StatusCode::BAD_REQUEST;
        message = "Invalid query string".to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = warp::http::StatusCode::METHOD_NOT_ALLOWED;
        message = "Method Not Allowed".to_string();
    } else {
        code = warp::http::StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error".to_string();
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": message,
        })),
        code,
    ))
}

pub fn routes(config: Arc<AppConfig>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    info!("Configuring routes...");

    let config_filter = warp::any().map(move || config.clone());

    let extract_route = warp::path!("api" / "v1" / "extract")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(config_filter.clone())
        .and_then(extract);

    let reconcile_route = warp::path!("api" / "v1" / "reconcile")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(config_filter.clone())
        .and_then(reconcile);

    let batch_route = warp::path!("api" / "v1" / "batch")
        .and(warp::get())
        .and(warp::query::<BatchQuery>())
        .and(config_filter.clone())
        .and_then(batch);

    info!("All routes configured successfully.");

    extract_route
        .or(reconcile_route)
        .or(batch_route)
        .recover(handle_rejection)
}

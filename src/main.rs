use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

use earnings_recon::config::AppConfig;
use earnings_recon::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize the logger
    env_logger::init();
    info!("Logger initialized. Starting the application...");

    let config = Arc::new(AppConfig::from_env()?);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!("Will bind to: {}", addr);

    // Set up CORS
    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET", "POST"]);

    let api = routes::routes(config).with(cors);
    info!("Routes configured successfully with CORS.");

    info!("Starting server on {}", addr);
    warp::serve(api).run(addr).await;
    Ok(())
}

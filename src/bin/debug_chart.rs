use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use std::env;
use std::fs;

use earnings_recon::config::{current_market_year, AppConfig};
use earnings_recon::models::Granularity;
use earnings_recon::services::extract::{detect_section, extract_section};

/// Usage: debug_chart <section.html> [quarterly|annual]
fn main() -> Result<()> {
    env_logger::init();
    let config = AppConfig::from_env()?;

    let mut args = env::args().skip(1);
    let path = args
        .next()
        .ok_or_else(|| anyhow!("usage: debug_chart <section.html> [quarterly|annual]"))?;
    let granularity = match args.next().as_deref() {
        None | Some("quarterly") => Granularity::Quarterly,
        Some("annual") => Granularity::Annual,
        Some(other) => return Err(anyhow!("unknown granularity '{}'", other)),
    };

    let markup = fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    info!("Debugging {} ({} bytes) as {}", path, markup.len(), granularity);

    match detect_section(&markup) {
        Some(kind) => info!("Detected section kind: {:?}", kind),
        None => warn!("Markup has neither bar columns nor value cells"),
    }

    let settings = config.table_settings(current_market_year());
    let series = extract_section(&markup, granularity, &settings)
        .map_err(|e| anyhow!("{} stage: {}", e.stage(), e))?;

    if let Some((min, max)) = series.scale {
        info!("Scale: {}..{}", min, max);
    }
    for point in &series.points {
        info!(
            "{:>8}  reported={:<10} estimate={:<10} {:?}",
            point.period.to_string(),
            point.reported.map(|v| v.to_string()).unwrap_or_default(),
            point.estimate.map(|v| v.to_string()).unwrap_or_default(),
            point.class()
        );
    }
    println!("{}", serde_json::to_string_pretty(&series)?);
    Ok(())
}

// src/services/pipeline.rs
//! Per-ticker pipeline (acquire, extract, reconcile, build row) and the batch worker pool.

use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{ReconcileError, Stage};
use crate::models::{Granularity, MarkupBundle, Metric, ProviderRecords, ReconciledRow};
use crate::services::extract::extract_section;
use crate::services::fetch::{
    fetch_bundle, fetch_with_retry, MarkupSource, RetryPolicy, SECTIONS,
};
use crate::services::reconcile::{reconcile, ReconcileOptions, SeriesSet};
use crate::services::row::build_row;
use crate::services::table::TableSettings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub table: TableSettings,
    pub options: ReconcileOptions,
}

/// A non-fatal failure of one stage for one ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct StageWarning {
    pub ticker: String,
    pub section: Option<(Metric, Granularity)>,
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for StageWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.section {
            Some((metric, granularity)) => write!(
                f,
                "[{}] {} {}: {}: {}",
                self.ticker, metric, granularity, self.stage, self.message
            ),
            None => write!(f, "[{}] {}: {}", self.ticker, self.stage, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerOutcome {
    pub row: ReconciledRow,
    pub warnings: Vec<StageWarning>,
}

impl TickerOutcome {
    fn failed(ticker: &str, warning: StageWarning) -> Self {
        TickerOutcome {
            row: ReconciledRow::empty(ticker),
            warnings: vec![warning],
        }
    }
}

/// Extracts every available section, then reconciles. Never fails: problems surface as
/// warnings and empty fields.
pub fn process_ticker(
    ticker: &str,
    bundle: &MarkupBundle,
    providers: &[ProviderRecords],
    settings: &PipelineSettings,
) -> TickerOutcome {
    let mut warnings = Vec::new();
    let mut series = SeriesSet::default();

    for (metric, granularity) in SECTIONS {
        let Some(markup) = bundle.section(metric, granularity) else {
            debug!("[{}] no {} {} section", ticker, metric, granularity);
            continue;
        };
        match extract_section(markup, granularity, &settings.table) {
            Ok(extracted) => series.set(metric, extracted),
            Err(e) => {
                let warning = StageWarning {
                    ticker: ticker.to_string(),
                    section: Some((metric, granularity)),
                    stage: e.stage(),
                    message: e.to_string(),
                };
                warn!("{}", warning);
                warnings.push(warning);
            }
        }
    }

    let row = match reconcile(ticker, &series, providers, &settings.options) {
        Ok(reconciliation) => build_row(ticker, &reconciliation),
        Err(e) => {
            match &e {
                ReconcileError::Calendar(inner) => error!("[{}] {}", ticker, inner),
                ReconcileError::NoCurrentQuarter => warn!("[{}] {}, skipping", ticker, e),
            }
            warnings.push(StageWarning {
                ticker: ticker.to_string(),
                section: None,
                stage: Stage::Reconciliation,
                message: e.to_string(),
            });
            ReconciledRow::empty(ticker)
        }
    };

    TickerOutcome { row, warnings }
}

/// Acquires a ticker's sections and provider records, then runs the pipeline on the
/// blocking pool.
pub async fn acquire_and_process(
    source: Arc<dyn MarkupSource>,
    ticker: String,
    retry: RetryPolicy,
    settings: PipelineSettings,
) -> TickerOutcome {
    let (bundle, failures) = fetch_bundle(source.as_ref(), &ticker, &retry).await;
    let mut fetch_warnings: Vec<StageWarning> = failures
        .into_iter()
        .map(|failure| StageWarning {
            ticker: ticker.clone(),
            section: Some((failure.metric, failure.granularity)),
            stage: Stage::Fetch,
            message: failure.error.to_string(),
        })
        .collect();

    let what = format!("[{}] provider records", ticker);
    let fetched = fetch_with_retry(&what, &retry, || source.fetch_providers(&ticker)).await;
    let providers = match fetched {
        Ok(providers) => providers,
        Err(e) => {
            fetch_warnings.push(StageWarning {
                ticker: ticker.clone(),
                section: None,
                stage: Stage::Fetch,
                message: e.to_string(),
            });
            Vec::new()
        }
    };
    for warning in &fetch_warnings {
        warn!("{}", warning);
    }

    let worker_ticker = ticker.clone();
    let joined = tokio::task::spawn_blocking(move || {
        process_ticker(&worker_ticker, &bundle, &providers, &settings)
    })
    .await;

    match joined {
        Ok(mut outcome) => {
            fetch_warnings.append(&mut outcome.warnings);
            outcome.warnings = fetch_warnings;
            outcome
        }
        Err(e) => {
            error!("[{}] pipeline task failed: {}", ticker, e);
            TickerOutcome::failed(
                &ticker,
                StageWarning {
                    ticker: ticker.clone(),
                    section: None,
                    stage: Stage::Reconciliation,
                    message: e.to_string(),
                },
            )
        }
    }
}

/// Runs up to `concurrency` tickers at once. Outcomes come back in input order.
pub async fn run_batch(
    tickers: &[String],
    source: Arc<dyn MarkupSource>,
    concurrency: usize,
    retry: RetryPolicy,
    settings: PipelineSettings,
) -> Vec<TickerOutcome> {
    info!("Processing {} ticker(s), {} at a time", tickers.len(), concurrency);
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (idx, ticker) in tickers.iter().enumerate() {
        let source = Arc::clone(&source);
        let permits = Arc::clone(&permits);
        let ticker = ticker.clone();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            (idx, acquire_and_process(source, ticker, retry, settings).await)
        });
    }

    let mut slots: Vec<Option<TickerOutcome>> = vec![None; tickers.len()];
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok((idx, outcome)) => slots[idx] = Some(outcome),
            Err(e) => error!("Ticker task error: {}", e),
        }
    }

    let outcomes: Vec<TickerOutcome> = slots
        .into_iter()
        .zip(tickers)
        .map(|(slot, ticker)| {
            slot.unwrap_or_else(|| {
                TickerOutcome::failed(
                    ticker,
                    StageWarning {
                        ticker: ticker.clone(),
                        section: None,
                        stage: Stage::Fetch,
                        message: "task did not complete".to_string(),
                    },
                )
            })
        })
        .collect();
    let failed = outcomes.iter().filter(|o| o.row.current_quarter.is_none()).count();
    info!("Batch done: {} row(s), {} without a current quarter", outcomes.len(), failed);
    outcomes
}

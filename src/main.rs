use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crypto_forecast_core::config::Config;
use crypto_forecast_core::domain::Instrument;
use crypto_forecast_core::model_store::ModelArtifactStore;
use crypto_forecast_core::source::coingecko::CoinGeckoSource;
use crypto_forecast_core::source::rate_limit::RateLimiter;
use crypto_forecast_core::source::DataSourceFactory;
use crypto_forecast_core::store::forecast_store::InMemoryForecastStore;
use crypto_forecast_core::store::market_data::InMemoryMarketDataStore;
use crypto_forecast_core::store::master_data::InMemoryMasterDataStore;
use crypto_forecast_core::store::{ForecastStore, MarketDataStore, MasterDataStore};
use crypto_forecast_core::surface::{
    run_forecast_invocation, run_ingestion_invocation, ForecastInvocationRequest, IngestionInvocationRequest,
};

#[derive(Parser, Debug)]
#[command(version, about = "BTC/ETH historical ingestion and AR(p) forecasting")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pulls historical OHLCV bars for the given instruments into the
    /// market-data store.
    Ingest {
        /// Instrument codes, e.g. --instruments BTC ETH
        #[arg(long, num_args = 1.., required = true)]
        instruments: Vec<String>,
        /// Start date (inclusive), YYYY-MM-DD
        #[arg(long)]
        start: NaiveDate,
        /// End date (inclusive), YYYY-MM-DD
        #[arg(long)]
        end: NaiveDate,
        /// Data source id override (defaults to the configured default)
        #[arg(long)]
        source: Option<String>,
        #[arg(long, default_value = "false")]
        launch_new_instruments: bool,
    },
    /// Runs the AR(p) forecast for one instrument over a date or range.
    Forecast {
        #[arg(long)]
        instrument: String,
        /// Start date, or the only date in single-date mode
        #[arg(long)]
        start: Option<NaiveDate>,
        /// End date; omit for single-date mode
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Use today (UTC) instead of --start
        #[arg(long, default_value = "false")]
        current: bool,
        #[arg(long, default_value = "false")]
        include_details: bool,
        /// AR(p) artifact version; omit to use the active version
        #[arg(long)]
        model_version: Option<String>,
    },
    /// Rescans the artifacts directory for AR(p) model files.
    ReloadModels,
    /// Prints model-cache and per-instrument store statistics.
    Stats,
}

struct Runtime {
    config: Config,
    factory: Arc<DataSourceFactory>,
    market_store: Arc<dyn MarketDataStore>,
    master_store: Arc<dyn MasterDataStore>,
    forecast_store: Arc<dyn ForecastStore>,
    model_store: Arc<ModelArtifactStore>,
}

fn build_runtime(config: Config) -> Result<Runtime> {
    let rate_limiter = RateLimiter::new(config.rate_limit_requests_per_sec, config.rate_limit_burst);
    let coingecko = CoinGeckoSource::new(
        &config.coingecko_api_key,
        config.vs_currency.clone(),
        rate_limiter,
        config.http_timeout,
        config.http_max_retries,
    )
    .context("failed to build coingecko client")?;

    let mut factory = DataSourceFactory::new();
    factory.register(Arc::new(coingecko), true);

    let model_store = Arc::new(ModelArtifactStore::new(config.artifacts_dir.clone()));

    Ok(Runtime {
        config,
        factory: Arc::new(factory),
        market_store: Arc::new(InMemoryMarketDataStore::new()),
        master_store: Arc::new(InMemoryMasterDataStore::new()),
        forecast_store: Arc::new(InMemoryForecastStore::new()),
        model_store,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let runtime = build_runtime(config)?;

    match args.command {
        Command::Ingest {
            instruments,
            start,
            end,
            source,
            launch_new_instruments,
        } => {
            let tuning = runtime.config.ingestion_tuning();
            let response = run_ingestion_invocation(
                runtime.factory,
                runtime.market_store,
                IngestionInvocationRequest {
                    instrument_codes: instruments,
                    start_date: start,
                    end_date: end,
                    launch_new_instruments,
                    resource: source,
                },
                tuning,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Forecast {
            instrument,
            start,
            end,
            current,
            include_details,
            model_version,
        } => {
            runtime
                .model_store
                .reload()
                .await
                .context("failed to load model artifacts")?;
            let start_date = start.unwrap_or_else(|| chrono::Utc::now().date_naive());
            let response = run_forecast_invocation(
                runtime.market_store,
                runtime.master_store,
                runtime.forecast_store,
                runtime.factory,
                runtime.model_store,
                ForecastInvocationRequest {
                    instrument_code: instrument,
                    is_current_date: current,
                    start_date,
                    end_date: end,
                    include_calculation_details: include_details,
                    arima_model_version: model_version,
                },
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::ReloadModels => {
            let count = runtime
                .model_store
                .reload()
                .await
                .context("failed to reload model artifacts")?;
            println!(
                "reloaded {count} model artifact(s) from {}",
                runtime.config.artifacts_dir.display()
            );
        }
        Command::Stats => {
            runtime.model_store.reload().await.ok();
            let stats = runtime.model_store.stats().await;
            println!("model cache: {stats:?}");
            for instrument in Instrument::ALL {
                let latest = runtime.market_store.latest(instrument).await?;
                let earliest = runtime.market_store.earliest(instrument).await?;
                println!(
                    "{instrument}: earliest={:?} latest={:?}",
                    earliest.map(|b| b.timestamp),
                    latest.map(|b| b.timestamp),
                );
            }
        }
    }

    Ok(())
}

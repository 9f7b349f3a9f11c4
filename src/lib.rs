//! Historical OHLCV ingestion and AR(p) expected-return forecasting for BTC
//! and ETH. See `SPEC_FULL.md` for the full component breakdown (C1-C8).

pub mod config;
pub mod domain;
pub mod error;
pub mod forecast_engine;
pub mod ingestion;
pub mod master_prep;
pub mod model_store;
pub mod source;
pub mod store;
pub mod surface;
pub mod validation;

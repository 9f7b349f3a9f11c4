pub mod bar;
pub mod forecast;
pub mod instrument;
pub mod master_data;
pub mod model;
pub mod money;
pub mod quality;
pub mod time_range;

pub use bar::{MarketDataUpdated, MarketInstrument, Ohlcv};
pub use forecast::{ForecastDiagnostics, ForecastResult, ForecastStatus};
pub use instrument::Instrument;
pub use master_data::MasterDataRecord;
pub use model::ArModel;
pub use money::{Price, SignedAmount};
pub use quality::{DataQualityMetrics, QualityLevel};
pub use time_range::TimeRange;

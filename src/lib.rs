//! Algogem core crate.
//!
//! Local building blocks for a personal crypto-trading toolkit:
//! - symbol-partitioned append-only price history on SQLite, with
//!   gap-avoiding incremental appends and range reads
//! - deterministic lagged-log-return feature pipeline over raw price tables
//! - provider row ingest and a small trading session environment

mod dataset;
mod env;
mod ingest;
mod observability;
mod price_store;
mod symbol;

pub use dataset::{
    assert_sample_schema_compatible, build_sample_schema, Dataset, DatasetError, SampleColumn,
    SampleDType, SampleRow, SampleSchema, SampleTable, SAMPLE_SCHEMA_VERSION,
};
pub use env::{
    parse_window, CandleWindow, EnvError, PriceProvider, ProviderError, TradingEnv,
};
pub use ingest::{
    price_record_from_csv, price_records_from_csv_reader, price_records_from_json, IngestError,
};
pub use observability::{
    init_logging, log_app_start, log_store_selected, logging_config_from_env, LogFormat,
    LoggingConfig, LoggingInitError,
};
pub use price_store::{AppendOutcome, PriceRecord, PriceStore, StoreError};
pub use symbol::{parse_symbol, Symbol, SymbolError};

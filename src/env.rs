//! Trading session environment: one store path, one symbol, one window.
//!
//! The environment owns the "fetch everything available, append only what's
//! new" workflow. The market-data provider is a trait seam; the HTTP client
//! implementing it lives outside this crate.

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::dataset::Dataset;
use crate::price_store::{AppendOutcome, PriceRecord, PriceStore, StoreError};
use crate::symbol::{parse_symbol, Symbol, SymbolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandleWindow {
    Daily,
    Hourly,
    Minute,
}

impl CandleWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "D",
            Self::Hourly => "H",
            Self::Minute => "M",
        }
    }
}

pub fn parse_window(input: &str) -> Result<CandleWindow, EnvError> {
    match input.trim().to_ascii_uppercase().as_str() {
        "D" => Ok(CandleWindow::Daily),
        "H" => Ok(CandleWindow::Hourly),
        "M" => Ok(CandleWindow::Minute),
        _ => Err(EnvError::InvalidWindow(input.trim().to_string())),
    }
}

#[derive(Debug, Error)]
#[error("provider request failed: {0}")]
pub struct ProviderError(pub String);

/// Upstream market-data collaborator. Implementations decide how history is
/// fetched, paginated, and rate-limited; the environment only consumes the
/// ordered rows.
pub trait PriceProvider {
    fn fetch_history(
        &self,
        symbol: Symbol,
        window: CandleWindow,
    ) -> Result<Vec<PriceRecord>, ProviderError>;
}

#[derive(Debug, Error)]
pub enum EnvError {
    #[error(transparent)]
    Symbol(#[from] SymbolError),
    #[error("time window must be one of D, H, M; got {0}")]
    InvalidWindow(String),
    #[error("environment is not fully configured: missing {0}")]
    Unconfigured(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub struct TradingEnv {
    store: PriceStore,
    symbol: Option<Symbol>,
    window: Option<CandleWindow>,
}

impl TradingEnv {
    /// Binds the environment to an explicit container path. The container is
    /// opened eagerly so path problems surface here, not mid-session.
    pub fn new(store_path: impl Into<PathBuf>) -> Result<Self, EnvError> {
        let store = PriceStore::open(store_path)?;
        Ok(Self {
            store,
            symbol: None,
            window: None,
        })
    }

    pub fn store(&self) -> &PriceStore {
        &self.store
    }

    pub fn symbol(&self) -> Option<Symbol> {
        self.symbol
    }

    pub fn window(&self) -> Option<CandleWindow> {
        self.window
    }

    pub fn set_symbol(&mut self, symbol: &str) -> Result<(), EnvError> {
        self.symbol = Some(parse_symbol(symbol)?);
        Ok(())
    }

    pub fn set_window(&mut self, window: &str) -> Result<(), EnvError> {
        self.window = Some(parse_window(window)?);
        Ok(())
    }

    /// Fetches all available history for the configured symbol and window and
    /// appends whatever the store does not already cover. Overlapping
    /// refetches are safe; the caller observes a no-op via the outcome.
    pub fn update_historical(
        &self,
        provider: &dyn PriceProvider,
    ) -> Result<AppendOutcome, EnvError> {
        let (symbol, window) = self.configured()?;

        info!(
            component = "env",
            event = "env.sync.start",
            symbol = symbol.as_str(),
            window = window.as_str()
        );

        let rows = provider.fetch_history(symbol, window)?;
        let outcome = self.store.append(symbol, &rows)?;

        match &outcome {
            AppendOutcome::NoNewRows => info!(
                component = "env",
                event = "env.sync.no_new_rows",
                symbol = symbol.as_str()
            ),
            AppendOutcome::Appended {
                rows,
                skipped_existing,
            } => info!(
                component = "env",
                event = "env.sync.appended",
                symbol = symbol.as_str(),
                rows = rows,
                skipped_existing = skipped_existing
            ),
        }

        Ok(outcome)
    }

    /// Loads stored history into a fresh dataset, either a timestamp range
    /// (inclusive bounds) or everything available.
    pub fn load_stored(&self, range: Option<(i64, i64)>) -> Result<Dataset, EnvError> {
        let (symbol, _) = self.configured()?;

        let rows = match range {
            Some((start_ts_ms_utc, end_ts_ms_utc)) => {
                self.store.read_range(symbol, start_ts_ms_utc, end_ts_ms_utc)?
            }
            None => self.store.read_all(symbol)?,
        };

        info!(
            component = "env",
            event = "env.load.finish",
            symbol = symbol.as_str(),
            rows = rows.len()
        );

        Ok(Dataset::from_raw(rows))
    }

    fn configured(&self) -> Result<(Symbol, CandleWindow), EnvError> {
        let symbol = self.symbol.ok_or(EnvError::Unconfigured("symbol"))?;
        let window = self.window.ok_or(EnvError::Unconfigured("window"))?;
        Ok((symbol, window))
    }
}

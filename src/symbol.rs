//! Closed symbol set for the local price store.
//!
//! The store only tracks BTC and ETH. Text from callers goes through
//! [`parse_symbol`]; past that boundary an unknown symbol cannot exist.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    Btc,
    Eth,
}

impl Symbol {
    pub const ALL: [Symbol; 2] = [Symbol::Btc, Symbol::Eth];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Btc => "BTC",
            Self::Eth => "ETH",
        }
    }

    /// Stable partition id in the persisted container layout.
    pub fn partition_id(self) -> i64 {
        match self {
            Self::Btc => 1,
            Self::Eth => 2,
        }
    }

    pub fn from_partition_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::Btc),
            2 => Some(Self::Eth),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("unsupported symbol: {0}")]
    Unsupported(String),
}

/// Case-insensitive parse of a ticker symbol.
pub fn parse_symbol(input: &str) -> Result<Symbol, SymbolError> {
    match input.trim().to_ascii_uppercase().as_str() {
        "BTC" => Ok(Symbol::Btc),
        "ETH" => Ok(Symbol::Eth),
        _ => Err(SymbolError::Unsupported(input.trim().to_string())),
    }
}

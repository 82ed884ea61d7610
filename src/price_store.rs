//! Symbol-partitioned append-only price history on SQLite.
//!
//! One container file holds every symbol, partitioned by a stable integer id
//! in the `prices` table. Appends are gap-avoiding: candidate rows already
//! covered by the stored extent are dropped, so repeated overlapping fetches
//! never duplicate or reorder history. Every operation opens its own
//! connection and releases it before returning; no handle outlives a call.
//! Single-writer use is assumed, not enforced.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::symbol::Symbol;

const EXPECTED_COLUMNS: [&str; 7] = [
    "symbol_id",
    "ts_ms_utc",
    "open",
    "high",
    "low",
    "close",
    "volume",
];

/// One OHLCV bar keyed by its UTC open timestamp in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub ts_ms_utc: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Result of an append call. `NoNewRows` is a successful no-op, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppendOutcome {
    NoNewRows,
    Appended { rows: u64, skipped_existing: u64 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage container at {path} is not usable: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },
    #[error("invalid range: start {start_ts_ms_utc} must be before end {end_ts_ms_utc}")]
    InvalidRange {
        start_ts_ms_utc: i64,
        end_ts_ms_utc: i64,
    },
    #[error("invalid UTC timestamp: {0}")]
    InvalidTimestamp(i64),
    #[error("price record at {ts_ms_utc} has non-finite {field}")]
    SchemaMismatch { ts_ms_utc: i64, field: &'static str },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to one container file. Holds only the path; connections are scoped
/// to individual operations.
#[derive(Debug, Clone)]
pub struct PriceStore {
    path: PathBuf,
}

impl PriceStore {
    /// Opens a container, creating the file and `prices` table if absent.
    ///
    /// Fails with [`StoreError::StorageUnavailable`] when the path exists but
    /// is not a container of this format.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let store = Self { path };
        let conn = store.connect()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
        )
        .map_err(|err| store.unavailable(err))?;
        store.ensure_container(&conn)?;
        drop(conn);

        info!(
            component = "price_store",
            event = "store.open",
            path = %store.path.display()
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inclusive [min, max] stored timestamp range, or `None` when the symbol
    /// has no rows yet.
    pub fn extent(&self, symbol: Symbol) -> Result<Option<(i64, i64)>, StoreError> {
        let conn = self.connect()?;
        extent_on(&conn, symbol)
    }

    /// Appends candidate rows, dropping any whose timestamp is inside or
    /// before the stored extent. The filter is computed once per call from
    /// the current extent, which is sufficient for a single writer.
    ///
    /// Candidates must be strictly ascending by timestamp and carry finite
    /// numeric fields.
    pub fn append(&self, symbol: Symbol, rows: &[PriceRecord]) -> Result<AppendOutcome, StoreError> {
        validate_candidate_rows(rows)?;

        let mut conn = self.connect()?;
        let known_max = extent_on(&conn, symbol)?.map(|(_, max)| max);
        let fresh: Vec<&PriceRecord> = match known_max {
            Some(max) => rows.iter().filter(|row| row.ts_ms_utc > max).collect(),
            None => rows.iter().collect(),
        };
        let skipped_existing = (rows.len() - fresh.len()) as u64;

        if fresh.is_empty() {
            info!(
                component = "price_store",
                event = "store.append.no_new_rows",
                symbol = symbol.as_str(),
                candidates = rows.len()
            );
            return Ok(AppendOutcome::NoNewRows);
        }

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO prices (
                    symbol_id,
                    ts_ms_utc,
                    open,
                    high,
                    low,
                    close,
                    volume
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )?;

            for row in &fresh {
                stmt.execute(params![
                    symbol.partition_id(),
                    row.ts_ms_utc,
                    row.open,
                    row.high,
                    row.low,
                    row.close,
                    row.volume,
                ])?;
            }
        }
        tx.commit()?;

        info!(
            component = "price_store",
            event = "store.append.finish",
            symbol = symbol.as_str(),
            appended = fresh.len(),
            skipped_existing = skipped_existing
        );

        Ok(AppendOutcome::Appended {
            rows: fresh.len() as u64,
            skipped_existing,
        })
    }

    /// Rows with `start <= ts <= end`, ascending. Empty when the symbol has
    /// no data in the range.
    pub fn read_range(
        &self,
        symbol: Symbol,
        start_ts_ms_utc: i64,
        end_ts_ms_utc: i64,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        validate_ts(start_ts_ms_utc)?;
        validate_ts(end_ts_ms_utc)?;
        if start_ts_ms_utc >= end_ts_ms_utc {
            return Err(StoreError::InvalidRange {
                start_ts_ms_utc,
                end_ts_ms_utc,
            });
        }

        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "
            SELECT ts_ms_utc, open, high, low, close, volume
            FROM prices
            WHERE symbol_id = ?1
              AND ts_ms_utc >= ?2
              AND ts_ms_utc <= ?3
            ORDER BY ts_ms_utc ASC
            ",
        )?;
        let rows = stmt
            .query_map(
                params![symbol.partition_id(), start_ts_ms_utc, end_ts_ms_utc],
                record_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            component = "price_store",
            event = "store.read.range",
            symbol = symbol.as_str(),
            start_ts_ms_utc = start_ts_ms_utc,
            end_ts_ms_utc = end_ts_ms_utc,
            rows = rows.len()
        );
        Ok(rows)
    }

    /// Everything stored for the symbol, equivalent to a range read over its
    /// full extent. Empty when nothing is stored.
    pub fn read_all(&self, symbol: Symbol) -> Result<Vec<PriceRecord>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "
            SELECT ts_ms_utc, open, high, low, close, volume
            FROM prices
            WHERE symbol_id = ?1
            ORDER BY ts_ms_utc ASC
            ",
        )?;
        let rows = stmt
            .query_map(params![symbol.partition_id()], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            component = "price_store",
            event = "store.read.all",
            symbol = symbol.as_str(),
            rows = rows.len()
        );
        Ok(rows)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Connection::open(&self.path).map_err(|err| self.unavailable(err))
    }

    fn ensure_container(&self, conn: &Connection) -> Result<(), StoreError> {
        let columns = table_columns(conn, "prices").map_err(|err| self.unavailable(err))?;
        match columns {
            None => {
                conn.execute_batch(
                    "
                    CREATE TABLE prices (
                        symbol_id INTEGER NOT NULL,
                        ts_ms_utc INTEGER NOT NULL,
                        open REAL NOT NULL,
                        high REAL NOT NULL,
                        low REAL NOT NULL,
                        close REAL NOT NULL,
                        volume REAL NOT NULL,
                        PRIMARY KEY(symbol_id, ts_ms_utc)
                    ) WITHOUT ROWID;
                    ",
                )
                .map_err(|err| self.unavailable(err))?;
                Ok(())
            }
            Some(found) => {
                if found == EXPECTED_COLUMNS {
                    Ok(())
                } else {
                    Err(StoreError::StorageUnavailable {
                        path: self.path.clone(),
                        reason: format!("prices table has unexpected columns {found:?}"),
                    })
                }
            }
        }
    }

    fn unavailable(&self, err: impl std::fmt::Display) -> StoreError {
        StoreError::StorageUnavailable {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}

fn extent_on(conn: &Connection, symbol: Symbol) -> Result<Option<(i64, i64)>, StoreError> {
    let bounds: Option<(Option<i64>, Option<i64>)> = conn
        .query_row(
            "SELECT MIN(ts_ms_utc), MAX(ts_ms_utc) FROM prices WHERE symbol_id = ?1",
            params![symbol.partition_id()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(match bounds {
        Some((Some(min), Some(max))) => Some((min, max)),
        _ => None,
    })
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PriceRecord> {
    Ok(PriceRecord {
        ts_ms_utc: row.get(0)?,
        open: row.get(1)?,
        high: row.get(2)?,
        low: row.get(3)?,
        close: row.get(4)?,
        volume: row.get(5)?,
    })
}

fn validate_candidate_rows(rows: &[PriceRecord]) -> Result<(), StoreError> {
    for row in rows {
        validate_ts(row.ts_ms_utc)?;
        for (field, value) in [
            ("open", row.open),
            ("high", row.high),
            ("low", row.low),
            ("close", row.close),
            ("volume", row.volume),
        ] {
            if !value.is_finite() {
                return Err(StoreError::SchemaMismatch {
                    ts_ms_utc: row.ts_ms_utc,
                    field,
                });
            }
        }
    }

    for pair in rows.windows(2) {
        if pair[0].ts_ms_utc >= pair[1].ts_ms_utc {
            return Err(StoreError::InvalidRange {
                start_ts_ms_utc: pair[0].ts_ms_utc,
                end_ts_ms_utc: pair[1].ts_ms_utc,
            });
        }
    }

    Ok(())
}

fn validate_ts(ts_ms_utc: i64) -> Result<(), StoreError> {
    Utc.timestamp_millis_opt(ts_ms_utc)
        .single()
        .map(|_| ())
        .ok_or(StoreError::InvalidTimestamp(ts_ms_utc))
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Option<Vec<String>>> {
    let pragma = format!("PRAGMA table_info({table})");
    let mut stmt = conn.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(if columns.is_empty() {
        None
    } else {
        Some(columns)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts_ms_utc: i64, close: f64) -> PriceRecord {
        PriceRecord {
            ts_ms_utc,
            open: close - 1.0,
            high: close + 0.5,
            low: close - 1.5,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn candidate_rows_must_be_strictly_ascending() {
        let rows = vec![record(2_000, 100.0), record(1_000, 101.0)];
        let err = validate_candidate_rows(&rows).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidRange {
                start_ts_ms_utc: 2_000,
                end_ts_ms_utc: 1_000,
            }
        ));

        let rows = vec![record(1_000, 100.0), record(1_000, 101.0)];
        assert!(matches!(
            validate_candidate_rows(&rows).unwrap_err(),
            StoreError::InvalidRange { .. }
        ));
    }

    #[test]
    fn candidate_rows_must_carry_finite_fields() {
        let mut bad = record(1_000, 100.0);
        bad.volume = f64::NAN;
        let err = validate_candidate_rows(&[bad]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::SchemaMismatch {
                ts_ms_utc: 1_000,
                field: "volume",
            }
        ));

        let mut bad = record(1_000, 100.0);
        bad.close = f64::INFINITY;
        assert!(matches!(
            validate_candidate_rows(&[bad]).unwrap_err(),
            StoreError::SchemaMismatch { field: "close", .. }
        ));
    }

    #[test]
    fn out_of_range_timestamps_are_rejected() {
        assert!(matches!(
            validate_ts(i64::MAX).unwrap_err(),
            StoreError::InvalidTimestamp(_)
        ));
        validate_ts(1_704_067_200_000).unwrap();
    }
}

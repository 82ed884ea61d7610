//! Raw/sample dataset pair and the lagged-log-return feature pipeline.
//!
//! The sample table is never edited in place: it is always the output of
//! recomputing from the raw table and the current lag setting, so the same
//! inputs always yield a bit-identical table.

use std::io;

use csv::Writer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::price_store::PriceRecord;

pub const SAMPLE_SCHEMA_VERSION: u32 = 1;

const CLOSE_IDX: usize = 0;
const RETURNS_IDX: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleDType {
    F64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleColumn {
    pub name: String,
    pub dtype: SampleDType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<SampleColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    pub ts_ms_utc: i64,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTable {
    pub schema: SampleSchema,
    pub rows: Vec<SampleRow>,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(
        "invalid lag count {nlags}: must be greater than 1 and at most {max_allowed} for {available} log-return rows"
    )]
    InvalidLagCount {
        nlags: usize,
        available: usize,
        max_allowed: usize,
    },
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Raw price snapshot plus the sample table derived from it.
///
/// Three reachable states: log-returns only (`nlags` unset), or lagged with
/// `nlags = k > 1`. Replacing the raw table always resets to log-returns.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    raw: Vec<PriceRecord>,
    nlags: Option<usize>,
    sample: SampleTable,
}

impl Dataset {
    pub fn from_raw(raw: Vec<PriceRecord>) -> Self {
        let sample = log_returns_sample(&raw);
        log_recompute(raw.len(), &sample, None);
        Self {
            raw,
            nlags: None,
            sample,
        }
    }

    pub fn raw(&self) -> &[PriceRecord] {
        &self.raw
    }

    pub fn nlags(&self) -> Option<usize> {
        self.nlags
    }

    pub fn sample(&self) -> &SampleTable {
        &self.sample
    }

    pub fn schema(&self) -> &SampleSchema {
        &self.sample.schema
    }

    /// Replaces the raw table, discarding any lag setting.
    pub fn set_raw(&mut self, raw: Vec<PriceRecord>) {
        self.raw = raw;
        self.nlags = None;
        self.sample = log_returns_sample(&self.raw);
        log_recompute(self.raw.len(), &self.sample, None);
    }

    /// Sets or clears the lag count and recomputes the sample.
    ///
    /// The lagged table is always rebuilt from the raw table's log-return
    /// sample, never from an already-lagged sample, so lag drops do not
    /// compound. At least one row must survive the drop of the first `k`
    /// rows; `k` of 0 or 1 is rejected outright.
    pub fn set_nlags(&mut self, nlags: Option<usize>) -> Result<(), DatasetError> {
        let base = log_returns_sample(&self.raw);

        let Some(k) = nlags else {
            self.nlags = None;
            self.sample = base;
            log_recompute(self.raw.len(), &self.sample, None);
            return Ok(());
        };

        let available = base.rows.len();
        if k <= 1 || available < k + 1 {
            return Err(DatasetError::InvalidLagCount {
                nlags: k,
                available,
                max_allowed: available.saturating_sub(1),
            });
        }

        self.sample = lagged_sample(&base, k);
        self.nlags = Some(k);
        log_recompute(self.raw.len(), &self.sample, Some(k));
        Ok(())
    }

    /// Writes the current sample as CSV: timestamp column first, then the
    /// schema columns in order.
    pub fn write_sample_csv<W: io::Write>(&self, writer: W) -> Result<(), DatasetError> {
        let mut out = Writer::from_writer(writer);

        let mut header = vec!["ts_ms_utc".to_string()];
        header.extend(self.sample.schema.columns.iter().map(|c| c.name.clone()));
        out.write_record(&header)?;

        for row in &self.sample.rows {
            let mut record = vec![row.ts_ms_utc.to_string()];
            record.extend(row.values.iter().map(|v| v.to_string()));
            out.write_record(&record)?;
        }

        out.flush()?;
        Ok(())
    }
}

/// Column list and fingerprint for a sample table with the given lag count.
pub fn build_sample_schema(nlags: Option<usize>) -> SampleSchema {
    let mut columns = vec![
        SampleColumn {
            name: "close".to_string(),
            dtype: SampleDType::F64,
        },
        SampleColumn {
            name: "returns".to_string(),
            dtype: SampleDType::F64,
        },
    ];
    if let Some(nlags) = nlags {
        for lag in 1..=nlags {
            columns.push(SampleColumn {
                name: format!("returns_{lag}"),
                dtype: SampleDType::F64,
            });
        }
    }

    let fingerprint = schema_fingerprint(nlags, &columns);
    SampleSchema {
        version: SAMPLE_SCHEMA_VERSION,
        fingerprint,
        columns,
    }
}

/// Guards a consumer against a sample produced under a different schema.
pub fn assert_sample_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &SampleSchema,
) -> Result<(), DatasetError> {
    if expected_version != actual.version {
        return Err(DatasetError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(DatasetError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

fn log_returns_sample(raw: &[PriceRecord]) -> SampleTable {
    let schema = build_sample_schema(None);
    let mut rows = Vec::with_capacity(raw.len().saturating_sub(1));

    // The first raw row has no previous close and is dropped.
    for pair in raw.windows(2) {
        let ret = (pair[1].close / pair[0].close).ln();
        rows.push(SampleRow {
            ts_ms_utc: pair[1].ts_ms_utc,
            values: vec![pair[1].close, ret],
        });
    }

    SampleTable { schema, rows }
}

fn lagged_sample(base: &SampleTable, nlags: usize) -> SampleTable {
    let schema = build_sample_schema(Some(nlags));
    let returns: Vec<f64> = base.rows.iter().map(|row| row.values[RETURNS_IDX]).collect();

    let mut rows = Vec::with_capacity(base.rows.len().saturating_sub(nlags));
    for (idx, row) in base.rows.iter().enumerate().skip(nlags) {
        let mut values = vec![row.values[CLOSE_IDX], row.values[RETURNS_IDX]];
        for lag in 1..=nlags {
            values.push(returns[idx - lag]);
        }
        rows.push(SampleRow {
            ts_ms_utc: row.ts_ms_utc,
            values,
        });
    }

    SampleTable { schema, rows }
}

fn log_recompute(raw_rows: usize, sample: &SampleTable, nlags: Option<usize>) {
    info!(
        component = "dataset",
        event = "dataset.recompute",
        raw_rows = raw_rows,
        sample_rows = sample.rows.len(),
        nlags = ?nlags
    );
}

fn schema_fingerprint(nlags: Option<usize>, columns: &[SampleColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{SAMPLE_SCHEMA_VERSION};"));
    match nlags {
        Some(nlags) => hasher.update(format!("nlags:{nlags};")),
        None => hasher.update("nlags:none;"),
    }
    hasher.update("columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}

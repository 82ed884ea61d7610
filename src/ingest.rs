//! Parsing of provider-shaped price rows into [`PriceRecord`]s.
//!
//! Providers hand history over either as CSV (`ts,open,high,low,close,volume`
//! per line, no header) or as a JSON array of 6-element arrays whose numeric
//! fields may be numbers or strings. Row-shape problems surface as typed
//! errors instead of silently skewing the stored history.

use std::io;

use csv::StringRecord;
use serde_json::Value;
use thiserror::Error;

use crate::price_store::PriceRecord;

const EXPECTED_COLUMNS: usize = 6;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("price record has {found} columns, expected {expected}")]
    InvalidRecordColumns { found: usize, expected: usize },
    #[error("failed to parse field {field} value '{value}'")]
    ParseField { field: &'static str, value: String },
    #[error("unexpected provider payload: {0}")]
    InvalidPayload(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub fn price_record_from_csv(record: &StringRecord) -> Result<PriceRecord, IngestError> {
    if record.len() != EXPECTED_COLUMNS {
        return Err(IngestError::InvalidRecordColumns {
            found: record.len(),
            expected: EXPECTED_COLUMNS,
        });
    }

    Ok(PriceRecord {
        ts_ms_utc: parse_i64(record, 0, "ts_ms_utc")?,
        open: parse_f64(record, 1, "open")?,
        high: parse_f64(record, 2, "high")?,
        low: parse_f64(record, 3, "low")?,
        close: parse_f64(record, 4, "close")?,
        volume: parse_f64(record, 5, "volume")?,
    })
}

pub fn price_records_from_csv_reader<R: io::Read>(
    reader: R,
) -> Result<Vec<PriceRecord>, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        rows.push(price_record_from_csv(&record)?);
    }
    Ok(rows)
}

pub fn price_records_from_json(payload: &Value) -> Result<Vec<PriceRecord>, IngestError> {
    let rows = payload
        .as_array()
        .ok_or_else(|| IngestError::InvalidPayload("expected top-level array".to_string()))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(price_record_from_json_row(row)?);
    }
    Ok(out)
}

fn price_record_from_json_row(value: &Value) -> Result<PriceRecord, IngestError> {
    let row = value
        .as_array()
        .ok_or_else(|| IngestError::InvalidPayload("expected row to be an array".to_string()))?;
    if row.len() != EXPECTED_COLUMNS {
        return Err(IngestError::InvalidRecordColumns {
            found: row.len(),
            expected: EXPECTED_COLUMNS,
        });
    }

    Ok(PriceRecord {
        ts_ms_utc: json_i64(&row[0], "ts_ms_utc")?,
        open: json_f64(&row[1], "open")?,
        high: json_f64(&row[2], "high")?,
        low: json_f64(&row[3], "low")?,
        close: json_f64(&row[4], "close")?,
        volume: json_f64(&row[5], "volume")?,
    })
}

fn parse_i64(record: &StringRecord, idx: usize, field: &'static str) -> Result<i64, IngestError> {
    let raw = record.get(idx).unwrap_or_default();
    raw.parse::<i64>().map_err(|_| IngestError::ParseField {
        field,
        value: raw.to_string(),
    })
}

fn parse_f64(record: &StringRecord, idx: usize, field: &'static str) -> Result<f64, IngestError> {
    let raw = record.get(idx).unwrap_or_default();
    raw.parse::<f64>().map_err(|_| IngestError::ParseField {
        field,
        value: raw.to_string(),
    })
}

fn json_i64(value: &Value, field: &'static str) -> Result<i64, IngestError> {
    if let Some(v) = value.as_i64() {
        return Ok(v);
    }
    let text = value.as_str().ok_or_else(|| IngestError::ParseField {
        field,
        value: value.to_string(),
    })?;
    text.parse::<i64>().map_err(|_| IngestError::ParseField {
        field,
        value: text.to_string(),
    })
}

fn json_f64(value: &Value, field: &'static str) -> Result<f64, IngestError> {
    if let Some(v) = value.as_f64() {
        return Ok(v);
    }
    let text = value.as_str().ok_or_else(|| IngestError::ParseField {
        field,
        value: value.to_string(),
    })?;
    text.parse::<f64>().map_err(|_| IngestError::ParseField {
        field,
        value: text.to_string(),
    })
}

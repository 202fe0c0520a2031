//! Raw row -> [`ColorRecord`].
//!
//! Sources disagree on header spelling and casing, so every header goes through
//! [`header_key`] before it is matched against the configured aliases. Required
//! fields that are missing or not coercible reject the row; optional fields
//! that are missing or malformed become `None`.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::config::{header_key, PulseConfig};
use crate::error::NormalizationError;
use crate::model::{Bias, ColorRecord, RawRow, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    MessageId,
    SecurityId,
    QuoteDate,
    Rank,
    Price,
    Ticker,
    AssetClass,
    Bid,
    Ask,
    Source,
    Bias,
}

impl Field {
    fn from_canonical(name: &str) -> Option<Self> {
        Some(match name {
            "messageId" => Self::MessageId,
            "securityId" => Self::SecurityId,
            "quoteDate" => Self::QuoteDate,
            "rank" => Self::Rank,
            "price" => Self::Price,
            "ticker" => Self::Ticker,
            "assetClass" => Self::AssetClass,
            "bid" => Self::Bid,
            "ask" => Self::Ask,
            "source" => Self::Source,
            "bias" => Self::Bias,
            _ => return None,
        })
    }
}

/// Per-batch outcome of normalization. Rows listed in `errors` were dropped.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeReport {
    pub input_rows: usize,
    pub accepted_rows: usize,
    pub errors: Vec<NormalizationError>,
}

impl NormalizeReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct Normalizer {
    lookup: HashMap<String, Field>,
    date_formats: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&PulseConfig::default())
    }
}

impl Normalizer {
    pub fn new(config: &PulseConfig) -> Self {
        let mut lookup = HashMap::new();
        for (canonical, names, _) in config.columns.fields() {
            if let Some(field) = Field::from_canonical(canonical) {
                // The canonical spelling itself is always accepted.
                lookup.insert(header_key(canonical), field);
                for name in names {
                    lookup.insert(header_key(name), field);
                }
            }
        }
        Self {
            lookup,
            date_formats: config.dates.formats.clone(),
        }
    }

    /// Normalize one row. `row` is the row's position in its batch and is only
    /// used for error reporting.
    pub fn normalize(&self, row: usize, raw: &RawRow) -> Result<ColorRecord, NormalizationError> {
        let mut cells: HashMap<Field, &Value> = HashMap::new();
        for (header, value) in raw {
            let Some(&field) = self.lookup.get(&header_key(header)) else {
                continue;
            };
            if is_blank(value) {
                continue;
            }
            cells.entry(field).or_insert(value);
        }

        let fail = |column: &str, reason: String| NormalizationError {
            row,
            column: column.to_string(),
            reason,
        };
        let required = |field: Field, column: &str| {
            cells
                .get(&field)
                .copied()
                .ok_or_else(|| fail(column, "missing required value".into()))
        };

        let message_id = coerce_i64(required(Field::MessageId, "messageId")?)
            .map_err(|reason| fail("messageId", reason))?;
        let security_id = coerce_text(required(Field::SecurityId, "securityId")?)
            .ok_or_else(|| fail("securityId", "expected a text identifier".into()))?;
        let quote_date = coerce_date(required(Field::QuoteDate, "quoteDate")?, &self.date_formats)
            .map_err(|reason| fail("quoteDate", reason))?;
        let rank = coerce_i64(required(Field::Rank, "rank")?)
            .and_then(|r| i32::try_from(r).map_err(|_| format!("rank {r} is out of range")))
            .map_err(|reason| fail("rank", reason))?;
        let price = coerce_decimal(required(Field::Price, "price")?)
            .map_err(|reason| fail("price", reason))?;

        let mut record = ColorRecord::new(message_id, security_id, quote_date, rank, price);
        record.ticker = cells.get(&Field::Ticker).and_then(|v| coerce_text(v));
        record.asset_class = cells.get(&Field::AssetClass).and_then(|v| coerce_text(v));
        record.bid = cells.get(&Field::Bid).and_then(|v| optional_decimal(v, row, "bid"));
        record.ask = cells.get(&Field::Ask).and_then(|v| optional_decimal(v, row, "ask"));
        record.source = cells
            .get(&Field::Source)
            .and_then(|v| coerce_text(v))
            .map(Source::from);
        record.bias = cells
            .get(&Field::Bias)
            .and_then(|v| coerce_text(v))
            .map(Bias::from);

        Ok(record)
    }

    /// Normalize a batch, collecting per-row errors instead of aborting.
    pub fn normalize_batch(&self, rows: &[RawRow]) -> (Vec<ColorRecord>, NormalizeReport) {
        let mut records = Vec::with_capacity(rows.len());
        let mut errors = Vec::new();

        for (idx, raw) in rows.iter().enumerate() {
            match self.normalize(idx, raw) {
                Ok(record) => records.push(record),
                Err(err) => {
                    log::warn!("dropping input {err}");
                    errors.push(err);
                }
            }
        }

        if !errors.is_empty() {
            log::info!(
                "normalized {} of {} rows ({} dropped)",
                records.len(),
                rows.len(),
                errors.len()
            );
        }

        let report = NormalizeReport {
            input_rows: rows.len(),
            accepted_rows: records.len(),
            errors,
        };
        (records, report)
    }
}

/// Normalize one row with the default column aliases and date formats.
pub fn normalize(raw: &RawRow) -> Result<ColorRecord, NormalizationError> {
    Normalizer::default().normalize(0, raw)
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    Decimal::from_str(&cleaned)
        .ok()
        .or_else(|| Decimal::from_scientific(&cleaned).ok())
}

fn coerce_decimal(value: &Value) -> Result<Decimal, String> {
    let parsed = match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s),
        _ => None,
    };
    parsed.ok_or_else(|| format!("expected a decimal, got {}", describe(value)))
}

fn optional_decimal(value: &Value, row: usize, column: &str) -> Option<Decimal> {
    match coerce_decimal(value) {
        Ok(d) => Some(d),
        Err(reason) => {
            log::debug!("row {row}: optional column '{column}' ignored: {reason}");
            None
        }
    }
}

fn coerce_i64(value: &Value) -> Result<i64, String> {
    if let Value::Number(n) = value {
        if let Some(i) = n.as_i64() {
            return Ok(i);
        }
    }
    let whole = match value {
        Value::Number(_) | Value::String(_) => coerce_decimal(value)
            .ok()
            .filter(|d| d.fract().is_zero())
            .and_then(|d| d.to_i64()),
        _ => None,
    };
    whole.ok_or_else(|| format!("expected an integer, got {}", describe(value)))
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_date(value: &Value, formats: &[String]) -> Result<NaiveDate, String> {
    match value {
        Value::String(s) => parse_quote_date(s.trim(), formats),
        // spreadsheets hand back compact dates like 20260111 as numbers
        Value::Number(n) => parse_quote_date(&n.to_string(), formats),
        other => Err(format!("expected a date string, got {}", describe(other))),
    }
}

/// Parse a quote date. Every configured format is tried; if two formats yield
/// different calendar dates the value is ambiguous and rejected. Timestamps
/// (RFC 3339 or `YYYY-MM-DD HH:MM:SS`) are truncated to their date.
pub fn parse_quote_date(text: &str, formats: &[String]) -> Result<NaiveDate, String> {
    let mut found: Option<NaiveDate> = None;
    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            match found {
                Some(prev) if prev != date => {
                    return Err(format!("ambiguous date '{text}' (could be {prev} or {date})"));
                }
                _ => found = Some(date),
            }
        }
    }
    if let Some(date) = found {
        return Ok(date);
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(ts.date());
        }
    }

    Err(format!("unparseable date '{text}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRow {
        match value {
            Value::Object(map) => map,
            _ => panic!("test rows must be objects"),
        }
    }

    #[test]
    fn source_headers_are_mapped() {
        let row = raw(json!({
            "MESSAGE_ID": 17679633591029712i64,
            "CUSIP": "97988RBL5",
            "TICKER": "WDMNT 2022-9A ER",
            "SECTOR": "MM-CLO",
            "DATE": "2026-01-11T00:00:00",
            "PX": 101.7,
            "BID": "101.700",
            "ASK": 102.575,
            "SOURCE": "SMBC",
            "BIAS": "BID",
            "RANK": 3
        }));
        let rec = normalize(&row).unwrap();
        assert_eq!(rec.message_id, 17679633591029712);
        assert_eq!(rec.security_id, "97988RBL5");
        assert_eq!(rec.asset_class.as_deref(), Some("MM-CLO"));
        assert_eq!(rec.quote_date, NaiveDate::from_ymd_opt(2026, 1, 11).unwrap());
        assert_eq!(rec.rank, 3);
        assert_eq!(rec.price, Decimal::from_str("101.7").unwrap());
        assert_eq!(rec.bid, Some(Decimal::from_str("101.700").unwrap()));
        assert_eq!(rec.ask, Some(Decimal::from_str("102.575").unwrap()));
        assert_eq!(rec.source, Some(Source::Other("SMBC".into())));
        assert_eq!(rec.bias, Some(Bias::Bid));
        assert!(!rec.is_parent);
    }

    #[test]
    fn camel_case_headers_are_mapped() {
        let row = raw(json!({
            "messageId": "42",
            "securityId": "ABC",
            "quoteDate": "2026-03-02",
            "rank": "1",
            "price": "99.5"
        }));
        let rec = normalize(&row).unwrap();
        assert_eq!(rec.message_id, 42);
        assert_eq!(rec.rank, 1);
        assert!(rec.ticker.is_none());
        assert!(rec.source.is_none());
    }

    #[test]
    fn missing_required_names_column() {
        let row = raw(json!({"messageId": 1, "securityId": "A", "quoteDate": "2026-01-01", "rank": 1}));
        let err = normalize(&row).unwrap_err();
        assert_eq!(err.column, "price");
        assert!(err.reason.contains("missing"));
    }

    #[test]
    fn blank_required_is_missing() {
        let row = raw(json!({"messageId": 1, "securityId": "  ", "quoteDate": "2026-01-01", "rank": 1, "price": 1}));
        let err = normalize(&row).unwrap_err();
        assert_eq!(err.column, "securityId");
    }

    #[test]
    fn non_integer_rank_rejected() {
        let row = raw(json!({"messageId": 1, "securityId": "A", "quoteDate": "2026-01-01", "rank": "1.5", "price": 1}));
        let err = normalize(&row).unwrap_err();
        assert_eq!(err.column, "rank");
        assert!(err.reason.contains("integer"));
    }

    #[test]
    fn whole_decimal_id_accepted() {
        let row = raw(json!({"messageId": "12.0", "securityId": "A", "quoteDate": "2026-01-01", "rank": 2, "price": "1,250.5"}));
        let rec = normalize(&row).unwrap();
        assert_eq!(rec.message_id, 12);
        assert_eq!(rec.price, Decimal::from_str("1250.5").unwrap());
    }

    #[test]
    fn malformed_optional_becomes_none() {
        let row = raw(json!({"messageId": 1, "securityId": "A", "quoteDate": "2026-01-01", "rank": 1, "price": 1, "bid": "n/a"}));
        let rec = normalize(&row).unwrap();
        assert!(rec.bid.is_none());
    }

    #[test]
    fn date_formats() {
        let formats = PulseConfig::default().dates.formats;
        let jan11 = NaiveDate::from_ymd_opt(2026, 1, 11).unwrap();
        assert_eq!(parse_quote_date("2026-01-11", &formats).unwrap(), jan11);
        assert_eq!(parse_quote_date("2026/01/11", &formats).unwrap(), jan11);
        assert_eq!(parse_quote_date("20260111", &formats).unwrap(), jan11);
        assert_eq!(parse_quote_date("01/11/2026", &formats).unwrap(), jan11);
        assert_eq!(parse_quote_date("11-Jan-2026", &formats).unwrap(), jan11);
        assert_eq!(parse_quote_date("2026-01-11T09:30:00Z", &formats).unwrap(), jan11);
        assert!(parse_quote_date("next tuesday", &formats).is_err());
    }

    #[test]
    fn numeric_compact_date_accepted() {
        let row = raw(json!({"messageId": 1, "securityId": "A", "quoteDate": 20260111, "rank": 1, "price": 100}));
        let rec = normalize(&row).unwrap();
        assert_eq!(rec.quote_date, NaiveDate::from_ymd_opt(2026, 1, 11).unwrap());

        let row = raw(json!({"messageId": 2, "securityId": "A", "quoteDate": 7, "rank": 1, "price": 100}));
        assert_eq!(normalize(&row).unwrap_err().column, "quoteDate");
    }

    #[test]
    fn ambiguous_date_rejected() {
        let formats = vec!["%m/%d/%Y".to_string(), "%d/%m/%Y".to_string()];
        let err = parse_quote_date("01/02/2026", &formats).unwrap_err();
        assert!(err.contains("ambiguous"));
        // Same date under both readings is not ambiguous.
        assert!(parse_quote_date("03/03/2026", &formats).is_ok());
    }

    #[test]
    fn batch_collects_errors_and_continues() {
        let rows = vec![
            raw(json!({"messageId": 1, "securityId": "A", "quoteDate": "2026-01-01", "rank": 1, "price": 100})),
            raw(json!({"messageId": "x", "securityId": "A", "quoteDate": "2026-01-01", "rank": 1, "price": 100})),
            raw(json!({"messageId": 3, "securityId": "B", "quoteDate": "bogus", "rank": 1, "price": 100})),
            raw(json!({"messageId": 4, "securityId": "B", "quoteDate": "2026-01-02", "rank": 2, "price": 98})),
        ];
        let (records, report) = Normalizer::default().normalize_batch(&rows);
        assert_eq!(records.len(), 2);
        assert_eq!(report.input_rows, 4);
        assert_eq!(report.accepted_rows, 2);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].row, 1);
        assert_eq!(report.errors[0].column, "messageId");
        assert_eq!(report.errors[1].row, 2);
        assert_eq!(report.errors[1].column, "quoteDate");
        assert!(!report.is_clean());
    }

    #[test]
    fn custom_aliases_from_config() {
        let config = PulseConfig::from_toml("[columns]\nsecurity_id = [\"SEC_CODE\"]\n").unwrap();
        let normalizer = Normalizer::new(&config);
        let row = raw(json!({"message_id": 1, "sec_code": "Z9", "date": "2026-01-01", "rank": 1, "px": 5}));
        let rec = normalizer.normalize(0, &row).unwrap();
        assert_eq!(rec.security_id, "Z9");
    }
}

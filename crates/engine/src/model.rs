use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One heterogeneous input row, keyed by whatever headers the source used.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Where a color came from. Unrecognized sources (dealer names, etc.) are
/// carried verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Source {
    Trace,
    Bloomberg,
    Manual,
    Other(String),
}

impl From<String> for Source {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "TRACE" => Self::Trace,
            "BLOOMBERG" | "BBG" => Self::Bloomberg,
            "MANUAL" => Self::Manual,
            _ => Self::Other(trimmed.to_string()),
        }
    }
}

impl From<Source> for String {
    fn from(source: Source) -> Self {
        source.to_string()
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "TRACE"),
            Self::Bloomberg => write!(f, "BLOOMBERG"),
            Self::Manual => write!(f, "MANUAL"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Direction of the quote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Bias {
    BuyBias,
    SellBias,
    Bid,
    Offer,
    BwicCover,
    Other(String),
}

impl From<String> for Bias {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        let key: String = trimmed
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_uppercase() })
            .collect();
        match key.as_str() {
            "BUY_BIAS" => Self::BuyBias,
            "SELL_BIAS" => Self::SellBias,
            "BID" => Self::Bid,
            "OFFER" => Self::Offer,
            "BWIC_COVER" => Self::BwicCover,
            _ => Self::Other(trimmed.to_string()),
        }
    }
}

impl From<Bias> for String {
    fn from(bias: Bias) -> Self {
        bias.to_string()
    }
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuyBias => write!(f, "BUY_BIAS"),
            Self::SellBias => write!(f, "SELL_BIAS"),
            Self::Bid => write!(f, "BID"),
            Self::Offer => write!(f, "OFFER"),
            Self::BwicCover => write!(f, "BWIC_COVER"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffStatus {
    Higher,
    Lower,
    Equal,
    #[default]
    NotApplicable,
}

impl std::fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Higher => write!(f, "HIGHER"),
            Self::Lower => write!(f, "LOWER"),
            Self::Equal => write!(f, "EQUAL"),
            Self::NotApplicable => write!(f, "NOT_APPLICABLE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingType {
    Automated,
    Manual,
}

impl std::fmt::Display for ProcessingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Automated => write!(f, "AUTOMATED"),
            Self::Manual => write!(f, "MANUAL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Color record
// ---------------------------------------------------------------------------

/// One price-color quotation, plus the fields the ranking pass derives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorRecord {
    pub message_id: i64,
    pub security_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_class: Option<String>,
    pub quote_date: NaiveDate,
    pub rank: i32,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<Bias>,

    // Derived by ranking; never taken from input.
    #[serde(default)]
    pub is_parent: bool,
    #[serde(default)]
    pub parent_message_id: Option<i64>,
    #[serde(default)]
    pub children_count: usize,
    #[serde(default)]
    pub coverage_price: Option<Decimal>,
    #[serde(default)]
    pub percent_diff: Option<Decimal>,
    #[serde(default)]
    pub price_diff: Option<Decimal>,
    #[serde(default)]
    pub diff_status: DiffStatus,
    #[serde(default)]
    pub processing_type: Option<ProcessingType>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl ColorRecord {
    /// Record with the required fields set and everything else empty.
    pub fn new(
        message_id: i64,
        security_id: impl Into<String>,
        quote_date: NaiveDate,
        rank: i32,
        price: Decimal,
    ) -> Self {
        Self {
            message_id,
            security_id: security_id.into(),
            ticker: None,
            asset_class: None,
            quote_date,
            rank,
            price,
            bid: None,
            ask: None,
            source: None,
            bias: None,
            is_parent: false,
            parent_message_id: None,
            children_count: 0,
            coverage_price: None,
            percent_diff: None,
            price_diff: None,
            diff_status: DiffStatus::NotApplicable,
            processing_type: None,
            processed_at: None,
        }
    }

    /// Reset every ranking-derived field so a record can be ranked afresh.
    pub fn clear_derived(&mut self) {
        self.is_parent = false;
        self.parent_message_id = None;
        self.children_count = 0;
        self.coverage_price = None;
        self.percent_diff = None;
        self.price_diff = None;
        self.diff_status = DiffStatus::NotApplicable;
    }

    /// Tag the record for a commit.
    pub fn stamp(&mut self, processing_type: ProcessingType, at: DateTime<Utc>) {
        self.processing_type = Some(processing_type);
        self.processed_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_parses_known_and_unknown() {
        assert_eq!(Source::from("trace".to_string()), Source::Trace);
        assert_eq!(Source::from(" Bloomberg ".to_string()), Source::Bloomberg);
        assert_eq!(Source::from("SMBC".to_string()), Source::Other("SMBC".into()));
        assert_eq!(Source::Other("SMBC".into()).to_string(), "SMBC");
    }

    #[test]
    fn bias_accepts_spaced_spelling() {
        assert_eq!(Bias::from("bwic cover".to_string()), Bias::BwicCover);
        assert_eq!(Bias::from("Sell-Bias".to_string()), Bias::SellBias);
        assert_eq!(Bias::from("BID".to_string()), Bias::Bid);
    }

    #[test]
    fn record_serializes_camel_case() {
        let rec = ColorRecord::new(
            7,
            "97988RBL5",
            NaiveDate::from_ymd_opt(2026, 1, 11).unwrap(),
            3,
            Decimal::new(101_700, 3),
        );
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["messageId"], 7);
        assert_eq!(json["securityId"], "97988RBL5");
        assert_eq!(json["quoteDate"], "2026-01-11");
        assert_eq!(json["price"], "101.700");
        assert_eq!(json["diffStatus"], "NOT_APPLICABLE");
        assert!(json.get("ticker").is_none());

        let back: ColorRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }
}

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::PulseError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub name: String,
    pub columns: ColumnAliases,
    pub dates: DateConfig,
    pub session: SessionConfig,
    pub output: OutputConfig,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            name: "market-pulse".into(),
            columns: ColumnAliases::default(),
            dates: DateConfig::default(),
            session: SessionConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Column aliases
// ---------------------------------------------------------------------------

/// Accepted source headers for each canonical field. Matching goes through
/// [`header_key`], so `MESSAGE_ID`, `messageId` and `message id` are the same.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColumnAliases {
    pub message_id: Vec<String>,
    pub security_id: Vec<String>,
    pub quote_date: Vec<String>,
    pub rank: Vec<String>,
    pub price: Vec<String>,
    pub ticker: Vec<String>,
    pub asset_class: Vec<String>,
    pub bid: Vec<String>,
    pub ask: Vec<String>,
    pub source: Vec<String>,
    pub bias: Vec<String>,
}

fn aliases(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            message_id: aliases(&["message_id", "msg_id"]),
            security_id: aliases(&["security_id", "cusip", "isin"]),
            quote_date: aliases(&["quote_date", "date", "trade_date"]),
            rank: aliases(&["rank"]),
            price: aliases(&["price", "px", "price_level"]),
            ticker: aliases(&["ticker"]),
            asset_class: aliases(&["asset_class", "sector"]),
            bid: aliases(&["bid"]),
            ask: aliases(&["ask", "offer"]),
            source: aliases(&["source"]),
            bias: aliases(&["bias"]),
        }
    }
}

impl ColumnAliases {
    /// (canonical name, aliases, required) for every field, in a fixed order.
    pub fn fields(&self) -> [(&'static str, &[String], bool); 11] {
        [
            ("messageId", self.message_id.as_slice(), true),
            ("securityId", self.security_id.as_slice(), true),
            ("quoteDate", self.quote_date.as_slice(), true),
            ("rank", self.rank.as_slice(), true),
            ("price", self.price.as_slice(), true),
            ("ticker", self.ticker.as_slice(), false),
            ("assetClass", self.asset_class.as_slice(), false),
            ("bid", self.bid.as_slice(), false),
            ("ask", self.ask.as_slice(), false),
            ("source", self.source.as_slice(), false),
            ("bias", self.bias.as_slice(), false),
        ]
    }
}

/// Canonical lookup key for a header: lowercase, separators dropped.
pub fn header_key(header: &str) -> String {
    header
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' ' | '.'))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

// ---------------------------------------------------------------------------
// Dates, session, output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DateConfig {
    /// `chrono` format strings, tried in order.
    pub formats: Vec<String>,
}

impl Default for DateConfig {
    fn default() -> Self {
        Self {
            formats: aliases(&["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%m/%d/%Y", "%d-%b-%Y"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_hours: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.ttl_hours))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "processed_colors.jsonl".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl PulseConfig {
    pub fn from_toml(input: &str) -> Result<Self, PulseError> {
        let config: PulseConfig =
            toml::from_str(input).map_err(|e| PulseError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PulseError> {
        let mut claimed: HashMap<String, &'static str> = HashMap::new();

        for (field, names, required) in self.columns.fields() {
            if required && names.is_empty() {
                return Err(PulseError::ConfigValidation(format!(
                    "required column '{field}' has no aliases"
                )));
            }
            for name in names {
                let key = header_key(name);
                if key.is_empty() {
                    return Err(PulseError::ConfigValidation(format!(
                        "column '{field}': empty alias"
                    )));
                }
                if let Some(other) = claimed.insert(key, field) {
                    if other != field {
                        return Err(PulseError::ConfigValidation(format!(
                            "alias '{name}' is claimed by both '{other}' and '{field}'"
                        )));
                    }
                }
            }
        }

        if self.dates.formats.is_empty() {
            return Err(PulseError::ConfigValidation(
                "at least one date format is required".into(),
            ));
        }

        if self.session.ttl_hours == 0 {
            return Err(PulseError::ConfigValidation(
                "session.ttl_hours must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

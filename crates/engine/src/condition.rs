//! Condition trees shared by exclusion rules and selection presets.
//!
//! JSON shape:
//!
//! ```json
//! {"type": "composite", "connector": "AND", "children": [
//!     {"type": "leaf", "column": "source", "operator": "equals", "value": "MANUAL"},
//!     {"type": "leaf", "column": "price", "operator": "between", "value": 90, "value2": 110}
//! ]}
//! ```

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::header_key;

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric => write!(f, "numeric"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// A record field a condition can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Column {
    MessageId,
    SecurityId,
    Ticker,
    AssetClass,
    QuoteDate,
    Rank,
    Price,
    Bid,
    Ask,
    Source,
    Bias,
    ChildrenCount,
    CoveragePrice,
    PriceDiff,
    PercentDiff,
    DiffStatus,
}

impl Column {
    pub fn kind(self) -> ColumnKind {
        match self {
            Self::MessageId
            | Self::Rank
            | Self::Price
            | Self::Bid
            | Self::Ask
            | Self::ChildrenCount
            | Self::CoveragePrice
            | Self::PriceDiff
            | Self::PercentDiff => ColumnKind::Numeric,
            Self::SecurityId
            | Self::Ticker
            | Self::AssetClass
            | Self::QuoteDate
            | Self::Source
            | Self::Bias
            | Self::DiffStatus => ColumnKind::Text,
        }
    }

    /// Set by ranking. Exclusion rules run before ranking, so only presets
    /// may test these.
    pub fn is_derived(self) -> bool {
        matches!(
            self,
            Self::ChildrenCount
                | Self::CoveragePrice
                | Self::PriceDiff
                | Self::PercentDiff
                | Self::DiffStatus
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MessageId => "messageId",
            Self::SecurityId => "securityId",
            Self::Ticker => "ticker",
            Self::AssetClass => "assetClass",
            Self::QuoteDate => "quoteDate",
            Self::Rank => "rank",
            Self::Price => "price",
            Self::Bid => "bid",
            Self::Ask => "ask",
            Self::Source => "source",
            Self::Bias => "bias",
            Self::ChildrenCount => "childrenCount",
            Self::CoveragePrice => "coveragePrice",
            Self::PriceDiff => "priceDiff",
            Self::PercentDiff => "percentDiff",
            Self::DiffStatus => "diffStatus",
        }
    }
}

impl FromStr for Column {
    type Err = String;

    /// Accepts the canonical names and the source system's header names,
    /// case-insensitively (`CUSIP`, `PX`, `SECTOR`, `DATE`, ...).
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Ok(match header_key(name).as_str() {
            "messageid" | "msgid" => Self::MessageId,
            "securityid" | "cusip" | "isin" => Self::SecurityId,
            "ticker" => Self::Ticker,
            "assetclass" | "sector" => Self::AssetClass,
            "quotedate" | "date" | "tradedate" => Self::QuoteDate,
            "rank" => Self::Rank,
            "price" | "px" | "pricelevel" => Self::Price,
            "bid" => Self::Bid,
            "ask" | "offer" => Self::Ask,
            "source" => Self::Source,
            "bias" => Self::Bias,
            "childrencount" => Self::ChildrenCount,
            "coverageprice" | "covprice" => Self::CoveragePrice,
            "pricediff" => Self::PriceDiff,
            "percentdiff" => Self::PercentDiff,
            "diffstatus" => Self::DiffStatus,
            _ => return Err(format!("unknown column '{name}'")),
        })
    }
}

impl TryFrom<String> for Column {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<Column> for String {
    fn from(column: Column) -> Self {
        column.as_str().to_string()
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    Between,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::LessThan => "less_than",
            Self::GreaterThan => "greater_than",
            Self::LessThanOrEqual => "less_than_or_equal",
            Self::GreaterThanOrEqual => "greater_than_or_equal",
            Self::Between => "between",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
        }
    }

    /// Whether this operator may be used on a column of `kind`.
    pub fn supports(self, kind: ColumnKind) -> bool {
        match self {
            Self::Equals | Self::NotEquals => true,
            Self::LessThan
            | Self::GreaterThan
            | Self::LessThanOrEqual
            | Self::GreaterThanOrEqual
            | Self::Between => kind == ColumnKind::Numeric,
            Self::Contains | Self::NotContains | Self::StartsWith | Self::EndsWith => {
                kind == ColumnKind::Text
            }
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    /// Accepts every spelling rule authors have used: `equal to`,
    /// `is equal to`, `equals`, `not_equals`, `greater_or_equal`, `>=`, ...
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let words: Vec<String> = raw
            .trim()
            .to_lowercase()
            .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        let key = words.join(" ");

        Ok(match key.as_str() {
            "equals" | "equal" | "equal to" | "is equal to" | "eq" | "=" | "==" => Self::Equals,
            "not equals" | "not equal" | "not equal to" | "is not equal to" | "ne" | "!=" => {
                Self::NotEquals
            }
            "less than" | "is less than" | "lt" | "<" => Self::LessThan,
            "greater than" | "is greater than" | "gt" | ">" => Self::GreaterThan,
            "less than equal to" | "less than or equal" | "less than or equal to"
            | "less or equal" | "lte" | "<=" => Self::LessThanOrEqual,
            "greater than equal to" | "greater than or equal" | "greater than or equal to"
            | "greater or equal" | "gte" | ">=" => Self::GreaterThanOrEqual,
            "between" => Self::Between,
            "contains" => Self::Contains,
            "not contains" | "does not contain" => Self::NotContains,
            "starts with" => Self::StartsWith,
            "ends with" => Self::EndsWith,
            _ => return Err(format!("unknown operator '{raw}'")),
        })
    }
}

impl TryFrom<String> for Operator {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connector {
    #[serde(rename = "AND", alias = "and", alias = "And")]
    And,
    #[serde(rename = "OR", alias = "or", alias = "Or")]
    Or,
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConditionTree {
    Leaf(Leaf),
    Composite(Composite),
}

/// A single comparison. `value2` is only read by `between`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaf {
    pub column: Column,
    pub operator: Operator,
    #[serde(deserialize_with = "de_operand")]
    pub value: String,
    #[serde(
        default,
        deserialize_with = "de_opt_operand",
        skip_serializing_if = "Option::is_none"
    )]
    pub value2: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composite {
    pub connector: Connector,
    #[serde(default)]
    pub children: Vec<ConditionTree>,
}

/// Operands arrive as JSON strings, numbers or booleans; they are kept as
/// text and coerced at evaluation time.
fn operand_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn de_operand<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    operand_text(Value::deserialize(de)?)
        .ok_or_else(|| serde::de::Error::custom("operand must be a string, number or boolean"))
}

fn de_opt_operand<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(de)?.and_then(operand_text))
}

impl ConditionTree {
    pub fn leaf(column: Column, operator: Operator, value: impl Into<String>) -> Self {
        Self::Leaf(Leaf {
            column,
            operator,
            value: value.into(),
            value2: None,
        })
    }

    pub fn between(column: Column, low: impl Into<String>, high: impl Into<String>) -> Self {
        Self::Leaf(Leaf {
            column,
            operator: Operator::Between,
            value: low.into(),
            value2: Some(high.into()),
        })
    }

    pub fn all(children: Vec<ConditionTree>) -> Self {
        Self::Composite(Composite {
            connector: Connector::And,
            children,
        })
    }

    pub fn any(children: Vec<ConditionTree>) -> Self {
        Self::Composite(Composite {
            connector: Connector::Or,
            children,
        })
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Composite(c) => c.children.iter().map(Self::leaf_count).sum(),
        }
    }

    /// Structural check run when a rule or preset is loaded: every operator
    /// must suit its column's type and `between` bounds must be ordered.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Leaf(leaf) => leaf.validate(),
            Self::Composite(c) => c.children.iter().try_for_each(Self::validate),
        }
    }

    /// First ranking-derived column the tree tests, if any.
    pub fn derived_column(&self) -> Option<Column> {
        match self {
            Self::Leaf(leaf) => Some(leaf.column).filter(|c| c.is_derived()),
            Self::Composite(c) => c.children.iter().find_map(Self::derived_column),
        }
    }
}

impl Leaf {
    fn validate(&self) -> Result<(), String> {
        let kind = self.column.kind();
        if !self.operator.supports(kind) {
            return Err(format!(
                "operator '{}' is not valid for {kind} column '{}'",
                self.operator, self.column
            ));
        }

        if self.operator == Operator::Between {
            match &self.value2 {
                None => log::warn!(
                    "'between' on '{}' has no upper bound and will never match",
                    self.column
                ),
                Some(high) => {
                    let low = Decimal::from_str(self.value.trim());
                    let high = Decimal::from_str(high.trim());
                    if let (Ok(low), Ok(high)) = (low, high) {
                        if low > high {
                            return Err(format!(
                                "'between' on '{}' has lower bound {low} above upper bound {high}",
                                self.column
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Legacy chained conditions
// ---------------------------------------------------------------------------

/// How a chained condition joins the running result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainLink {
    /// Starts a fresh chain, discarding what came before.
    #[default]
    Where,
    And,
    Or,
}

/// One entry of a flat `where` / `and` / `or` condition list.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainedCondition {
    #[serde(rename = "type", default)]
    pub link: ChainLink,
    #[serde(flatten)]
    pub leaf: Leaf,
}

impl ConditionTree {
    /// Fold a flat condition list left to right into a tree. An empty list
    /// becomes an empty OR, which never matches.
    pub fn from_chain(conditions: &[ChainedCondition]) -> Self {
        let mut acc: Option<ConditionTree> = None;
        for cond in conditions {
            let leaf = ConditionTree::Leaf(cond.leaf.clone());
            acc = Some(match (acc, cond.link) {
                (None, _) | (Some(_), ChainLink::Where) => leaf,
                (Some(prev), ChainLink::And) => ConditionTree::all(vec![prev, leaf]),
                (Some(prev), ChainLink::Or) => ConditionTree::any(vec![prev, leaf]),
            });
        }
        acc.unwrap_or_else(|| ConditionTree::any(Vec::new()))
    }
}

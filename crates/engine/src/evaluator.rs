use std::str::FromStr;

use rust_decimal::Decimal;

use crate::condition::{Column, ColumnKind, Composite, ConditionTree, Connector, Leaf, Operator};
use crate::model::ColorRecord;
use crate::rules::RuleSet;

/// Result of running a rule set over a batch.
#[derive(Debug, Clone, Default)]
pub struct RuleOutcome {
    pub kept: Vec<ColorRecord>,
    pub excluded_ids: Vec<i64>,
    pub excluded_count: usize,
    /// Number of active rules evaluated.
    pub rules_applied_count: usize,
}

/// Does `record` match `tree`?
///
/// Trees are expected to have passed [`ConditionTree::validate`]; a leaf whose
/// operator does not suit its column never matches.
pub fn evaluate(record: &ColorRecord, tree: &ConditionTree) -> bool {
    match tree {
        ConditionTree::Leaf(leaf) => evaluate_leaf(record, leaf),
        ConditionTree::Composite(Composite { connector, children }) => match connector {
            Connector::And => children.iter().all(|c| evaluate(record, c)),
            Connector::Or => children.iter().any(|c| evaluate(record, c)),
        },
    }
}

/// Drop every record matched by at least one active rule.
pub fn apply_rule_set(records: Vec<ColorRecord>, rules: &RuleSet) -> RuleOutcome {
    let active: Vec<_> = rules.active().collect();
    let mut outcome = RuleOutcome {
        kept: Vec::with_capacity(records.len()),
        rules_applied_count: active.len(),
        ..RuleOutcome::default()
    };

    for record in records {
        match active.iter().find(|rule| evaluate(&record, &rule.tree)) {
            Some(rule) => {
                log::trace!("rule '{}' excludes message {}", rule.name, record.message_id);
                outcome.excluded_ids.push(record.message_id);
            }
            None => outcome.kept.push(record),
        }
    }

    outcome.excluded_count = outcome.excluded_ids.len();
    log::debug!(
        "{} active rule(s) excluded {} of {} record(s)",
        outcome.rules_applied_count,
        outcome.excluded_count,
        outcome.excluded_count + outcome.kept.len()
    );
    outcome
}

/// Records matching `tree`, in input order. Used for presets.
pub fn select<'a>(records: &'a [ColorRecord], tree: &ConditionTree) -> Vec<&'a ColorRecord> {
    records.iter().filter(|r| evaluate(r, tree)).collect()
}

// ---------------------------------------------------------------------------
// Leaves
// ---------------------------------------------------------------------------

fn evaluate_leaf(record: &ColorRecord, leaf: &Leaf) -> bool {
    let kind = leaf.column.kind();
    if !leaf.operator.supports(kind) {
        log::warn!(
            "operator '{}' cannot be applied to {kind} column '{}'",
            leaf.operator,
            leaf.column
        );
        return false;
    }

    match kind {
        ColumnKind::Numeric => numeric_leaf(record, leaf),
        ColumnKind::Text => text_leaf(record, leaf),
    }
}

fn numeric_leaf(record: &ColorRecord, leaf: &Leaf) -> bool {
    // Anything that will not coerce fails closed.
    let (Some(lhs), Some(rhs)) = (numeric_field(record, leaf.column), parse_operand(&leaf.value))
    else {
        return false;
    };

    match leaf.operator {
        Operator::Equals => lhs == rhs,
        Operator::NotEquals => lhs != rhs,
        Operator::LessThan => lhs < rhs,
        Operator::GreaterThan => lhs > rhs,
        Operator::LessThanOrEqual => lhs <= rhs,
        Operator::GreaterThanOrEqual => lhs >= rhs,
        Operator::Between => match leaf.value2.as_deref().and_then(parse_operand) {
            Some(high) => rhs <= lhs && lhs <= high,
            None => false,
        },
        Operator::Contains | Operator::NotContains | Operator::StartsWith | Operator::EndsWith => {
            false
        }
    }
}

fn text_leaf(record: &ColorRecord, leaf: &Leaf) -> bool {
    // A missing text field compares as the empty string.
    let lhs = text_field(record, leaf.column)
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default();
    let rhs = leaf.value.trim().to_lowercase();

    match leaf.operator {
        Operator::Equals => lhs == rhs,
        Operator::NotEquals => lhs != rhs,
        Operator::Contains => lhs.contains(&rhs),
        Operator::NotContains => !lhs.contains(&rhs),
        Operator::StartsWith => lhs.starts_with(&rhs),
        Operator::EndsWith => lhs.ends_with(&rhs),
        Operator::LessThan
        | Operator::GreaterThan
        | Operator::LessThanOrEqual
        | Operator::GreaterThanOrEqual
        | Operator::Between => false,
    }
}

fn parse_operand(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

fn numeric_field(record: &ColorRecord, column: Column) -> Option<Decimal> {
    match column {
        Column::MessageId => Some(Decimal::from(record.message_id)),
        Column::Rank => Some(Decimal::from(record.rank)),
        Column::Price => Some(record.price),
        Column::Bid => record.bid,
        Column::Ask => record.ask,
        Column::ChildrenCount => Some(Decimal::from(record.children_count)),
        Column::CoveragePrice => record.coverage_price,
        Column::PriceDiff => record.price_diff,
        Column::PercentDiff => record.percent_diff,
        _ => None,
    }
}

fn text_field(record: &ColorRecord, column: Column) -> Option<String> {
    match column {
        Column::SecurityId => Some(record.security_id.clone()),
        Column::Ticker => record.ticker.clone(),
        Column::AssetClass => record.asset_class.clone(),
        Column::QuoteDate => Some(record.quote_date.format("%Y-%m-%d").to_string()),
        Column::Source => record.source.as_ref().map(ToString::to_string),
        Column::Bias => record.bias.as_ref().map(ToString::to_string),
        Column::DiffStatus => Some(record.diff_status.to_string()),
        _ => None,
    }
}

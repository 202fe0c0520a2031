use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::model::{ColorRecord, DiffStatus};

/// Group records by security, pick one parent per group, annotate children
/// with their delta to the parent, and emit groups in display order.
///
/// Output has the same length as the input. Any derived fields already on
/// the input are recomputed.
pub fn rank(records: Vec<ColorRecord>) -> Vec<ColorRecord> {
    let total = records.len();
    let mut groups: BTreeMap<String, Vec<ColorRecord>> = BTreeMap::new();

    for mut record in records {
        record.clear_derived();
        groups
            .entry(record.security_id.clone())
            .or_default()
            .push(record);
    }

    let mut ranked: Vec<Vec<ColorRecord>> = groups.into_values().map(rank_group).collect();
    ranked.sort_by(|a, b| match (a.first(), b.first()) {
        (Some(pa), Some(pb)) => group_order(pa, pb),
        _ => Ordering::Equal,
    });

    log::debug!("ranked {total} record(s) into {} group(s)", ranked.len());
    ranked.into_iter().flatten().collect()
}

/// Parent preference: lowest rank, highest price, earliest date, lowest id.
fn parent_order(a: &ColorRecord, b: &ColorRecord) -> Ordering {
    a.rank
        .cmp(&b.rank)
        .then_with(|| b.price.cmp(&a.price))
        .then_with(|| a.quote_date.cmp(&b.quote_date))
        .then_with(|| a.message_id.cmp(&b.message_id))
}

/// Groups by parent: newest date, best rank, highest price, then security.
fn group_order(a: &ColorRecord, b: &ColorRecord) -> Ordering {
    b.quote_date
        .cmp(&a.quote_date)
        .then_with(|| a.rank.cmp(&b.rank))
        .then_with(|| b.price.cmp(&a.price))
        .then_with(|| a.security_id.cmp(&b.security_id))
}

/// Parent first, then children by message id.
fn rank_group(mut group: Vec<ColorRecord>) -> Vec<ColorRecord> {
    let Some(parent_idx) = group
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| parent_order(a, b))
        .map(|(i, _)| i)
    else {
        return group;
    };

    let mut parent = group.remove(parent_idx);
    group.sort_by_key(|r| r.message_id);

    for child in &mut group {
        annotate_child(child, &parent);
    }

    parent.is_parent = true;
    parent.children_count = group.len();
    log::trace!(
        "security {}: parent {} with {} child(ren)",
        parent.security_id,
        parent.message_id,
        parent.children_count
    );

    let mut out = Vec::with_capacity(group.len() + 1);
    out.push(parent);
    out.append(&mut group);
    out
}

fn annotate_child(child: &mut ColorRecord, parent: &ColorRecord) {
    child.parent_message_id = Some(parent.message_id);
    child.coverage_price = Some(parent.price);

    if parent.price.is_zero() {
        return;
    }

    let Some(diff) = child.price.checked_sub(parent.price) else {
        return;
    };
    let Some(percent) = diff.checked_div(parent.price) else {
        return;
    };

    child.price_diff = Some(diff);
    child.percent_diff = Some(percent.normalize());
    child.diff_status = match diff.cmp(&rust_decimal::Decimal::ZERO) {
        Ordering::Greater => DiffStatus::Higher,
        Ordering::Less => DiffStatus::Lower,
        Ordering::Equal => DiffStatus::Equal,
    };
}

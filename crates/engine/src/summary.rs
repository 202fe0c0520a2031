use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::ColorRecord;

/// Headline counts over a ranked batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub total: usize,
    pub parents: usize,
    pub children: usize,
    pub unique_securities: usize,
}

pub fn compute_summary(records: &[ColorRecord]) -> RecordSummary {
    let parents = records.iter().filter(|r| r.is_parent).count();
    let securities: BTreeSet<&str> = records.iter().map(|r| r.security_id.as_str()).collect();

    RecordSummary {
        total: records.len(),
        parents,
        children: records.len() - parents,
        unique_securities: securities.len(),
    }
}

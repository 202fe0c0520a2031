//! Interactive review sessions: import once, prune by hand or by rule, then
//! commit to the output sink.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::condition::ConditionTree;
use crate::config::PulseConfig;
use crate::error::PulseError;
use crate::evaluator::{apply_rule_set, select};
use crate::model::{ColorRecord, ProcessingType, RawRow};
use crate::normalize::{NormalizeReport, Normalizer};
use crate::ranking::rank;
use crate::rules::RuleSet;
use crate::sink::{CommitReceipt, OutputSink};
use crate::summary::{compute_summary, RecordSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Open,
    Saved,
    Expired,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Saved => write!(f, "SAVED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A mutable working copy of one import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub source_filename: String,
    pub status: SessionStatus,
    pub records: Vec<ColorRecord>,
    pub deleted_count: usize,
    pub rules_applied_count: usize,
    /// Distinct ids of every active rule applied so far, ascending.
    pub applied_rule_ids: Vec<i64>,
    /// Message ids actually removed by `delete_rows`, in deletion order.
    pub deleted_ids: Vec<i64>,
    pub report: NormalizeReport,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn summary(&self) -> RecordSummary {
        compute_summary(&self.records)
    }

    fn ensure_open(&self) -> Result<(), PulseError> {
        match self.status {
            SessionStatus::Open => Ok(()),
            status => Err(PulseError::SessionClosed {
                session_id: self.session_id.clone(),
                status,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub requested: usize,
    pub removed: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesOutcome {
    pub excluded_count: usize,
    pub excluded_ids: Vec<i64>,
    pub rules_applied: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResult {
    pub session_id: String,
    pub receipt: CommitReceipt,
    pub summary: RecordSummary,
}

/// Lightweight listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub source_filename: String,
    pub status: SessionStatus,
    pub rows: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

type SessionHandle = Arc<Mutex<Session>>;

/// Owns every live session. Each session sits behind its own mutex, so
/// operations on different sessions never contend beyond the map lookup.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    normalizer: Normalizer,
    sink: Arc<dyn OutputSink>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self::with_config(sink, &PulseConfig::default())
    }

    pub fn with_config(sink: Arc<dyn OutputSink>, config: &PulseConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            normalizer: Normalizer::new(config),
            sink,
            ttl: config.session.ttl(),
        }
    }

    /// Normalize and rank `rows` into a new open session. Rows that fail
    /// normalization are reported on the session, not raised. Open sessions
    /// older than the configured TTL are expired first.
    pub fn create(&self, source_filename: &str, rows: &[RawRow]) -> Session {
        self.create_at(source_filename, rows, Utc::now())
    }

    pub fn create_at(&self, source_filename: &str, rows: &[RawRow], now: DateTime<Utc>) -> Session {
        let (records, report) = self.normalizer.normalize_batch(rows);
        let session = Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            source_filename: source_filename.to_string(),
            status: SessionStatus::Open,
            records: rank(records),
            deleted_count: 0,
            rules_applied_count: 0,
            applied_rule_ids: Vec::new(),
            deleted_ids: Vec::new(),
            report,
            created_at: now,
            updated_at: now,
        };

        log::info!(
            "session {} created from '{}': {} record(s), {} row error(s)",
            session.session_id,
            source_filename,
            session.records.len(),
            session.report.errors.len()
        );

        self.expire_at(now, self.ttl);
        self.sessions.write().insert(
            session.session_id.clone(),
            Arc::new(Mutex::new(session.clone())),
        );
        session
    }

    /// Snapshot of a session.
    pub fn get(&self, session_id: &str) -> Result<Session, PulseError> {
        Ok(self.handle(session_id)?.lock().clone())
    }

    /// Remove every record whose message id is in `message_ids`. Ranking is
    /// not re-run: remaining records keep the parent links they had.
    pub fn delete_rows(
        &self,
        session_id: &str,
        message_ids: &[i64],
    ) -> Result<DeleteOutcome, PulseError> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock();
        session.ensure_open()?;

        let wanted: HashSet<i64> = message_ids.iter().copied().collect();
        let before = session.records.len();
        let mut removed_ids = Vec::new();
        session.records.retain(|r| {
            let hit = wanted.contains(&r.message_id);
            if hit && !removed_ids.contains(&r.message_id) {
                removed_ids.push(r.message_id);
            }
            !hit
        });
        let removed = before - session.records.len();

        session.deleted_count += removed;
        session.deleted_ids.extend(removed_ids);
        session.updated_at = Utc::now();

        log::debug!("session {session_id}: deleted {removed} of {} requested id(s)", wanted.len());
        Ok(DeleteOutcome {
            requested: wanted.len(),
            removed,
            remaining: session.records.len(),
        })
    }

    /// Exclude every record matched by an active rule in `rules`. Cumulative
    /// with earlier deletions and rule passes.
    pub fn apply_rules(&self, session_id: &str, rules: &RuleSet) -> Result<RulesOutcome, PulseError> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock();
        session.ensure_open()?;

        let records = std::mem::take(&mut session.records);
        let outcome = apply_rule_set(records, rules);
        session.records = outcome.kept;
        session.rules_applied_count += outcome.rules_applied_count;
        session.applied_rule_ids.extend(rules.active().map(|r| r.id));
        session.applied_rule_ids.sort_unstable();
        session.applied_rule_ids.dedup();
        session.updated_at = Utc::now();

        log::debug!(
            "session {session_id}: {} rule(s) excluded {} record(s)",
            outcome.rules_applied_count,
            outcome.excluded_count
        );
        Ok(RulesOutcome {
            excluded_count: outcome.excluded_count,
            excluded_ids: outcome.excluded_ids,
            rules_applied: outcome.rules_applied_count,
            remaining: session.records.len(),
        })
    }

    /// Message ids of the session records matching `tree`, in session order.
    pub fn select(&self, session_id: &str, tree: &ConditionTree) -> Result<Vec<i64>, PulseError> {
        let handle = self.handle(session_id)?;
        let session = handle.lock();
        Ok(select(&session.records, tree)
            .into_iter()
            .map(|r| r.message_id)
            .collect())
    }

    /// Commit the remaining records as one `MANUAL` batch and close the
    /// session. A sink failure leaves the session open.
    pub fn save(&self, session_id: &str) -> Result<CommitResult, PulseError> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock();
        session.ensure_open()?;

        if session.records.is_empty() {
            return Err(PulseError::EmptyCommit(session_id.to_string()));
        }

        let receipt = self.sink.append(&session.records, ProcessingType::Manual)?;
        session.status = SessionStatus::Saved;
        session.updated_at = receipt.committed_at;

        log::info!(
            "session {session_id} saved: {} record(s) committed",
            receipt.records_written
        );
        Ok(CommitResult {
            session_id: session_id.to_string(),
            summary: session.summary(),
            receipt,
        })
    }

    /// Drop open sessions created more than `older_than` ago. Returns the
    /// expired ids.
    pub fn expire(&self, older_than: Duration) -> Vec<String> {
        self.expire_at(Utc::now(), older_than)
    }

    /// Expire with the configured session TTL.
    pub fn expire_stale(&self) -> Vec<String> {
        self.expire(self.ttl)
    }

    pub fn expire_at(&self, now: DateTime<Utc>, older_than: Duration) -> Vec<String> {
        let mut sessions = self.sessions.write();
        let mut expired = Vec::new();

        sessions.retain(|id, handle| {
            let mut session = handle.lock();
            if session.status == SessionStatus::Open && now - session.created_at > older_than {
                session.status = SessionStatus::Expired;
                session.updated_at = now;
                expired.push(id.clone());
                false
            } else {
                true
            }
        });

        if !expired.is_empty() {
            log::info!("expired {} stale session(s)", expired.len());
        }
        expired.sort();
        expired
    }

    /// Forget saved sessions. Returns how many were dropped.
    pub fn purge_saved(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, handle| handle.lock().status != SessionStatus::Saved);
        before - sessions.len()
    }

    /// Every known session, newest first.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .read()
            .values()
            .map(|handle| {
                let s = handle.lock();
                SessionInfo {
                    session_id: s.session_id.clone(),
                    source_filename: s.source_filename.clone(),
                    status: s.status,
                    rows: s.records.len(),
                    created_at: s.created_at,
                    updated_at: s.updated_at,
                }
            })
            .collect();
        infos.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        infos
    }

    fn handle(&self, session_id: &str) -> Result<SessionHandle, PulseError> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| PulseError::SessionNotFound(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Column, Operator};
    use crate::rules::Rule;
    use crate::sink::MemorySink;
    use serde_json::json;

    fn row(id: i64, sec: &str, rank: i64, price: f64, source: &str) -> RawRow {
        match json!({
            "MESSAGE_ID": id,
            "CUSIP": sec,
            "DATE": "2026-01-11",
            "RANK": rank,
            "PX": price,
            "SOURCE": source,
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn manager() -> (SessionManager, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (SessionManager::new(sink.clone()), sink)
    }

    #[test]
    fn create_ranks_and_reports() {
        let (mgr, _) = manager();
        let mut bad = row(3, "B", 1, 1.0, "TRACE");
        bad.remove("PX");
        let session = mgr.create("colors.csv", &[row(1, "A", 2, 100.0, "TRACE"), row(2, "A", 1, 99.0, "TRACE"), bad]);

        assert_eq!(session.status, SessionStatus::Open);
        assert_eq!(session.records.len(), 2);
        assert_eq!(session.records[0].message_id, 2);
        assert!(session.records[0].is_parent);
        assert_eq!(session.report.errors.len(), 1);
        assert_eq!(session.report.errors[0].column, "price");
        assert_eq!(session.deleted_count, 0);
        assert_eq!(session.rules_applied_count, 0);
        assert_eq!(mgr.get(&session.session_id).unwrap().records.len(), 2);
    }

    #[test]
    fn delete_rows_is_safe_to_repeat() {
        let (mgr, _) = manager();
        let rows: Vec<RawRow> = (1..=5).map(|i| row(i, "A", i, 100.0, "TRACE")).collect();
        let id = mgr.create("x.csv", &rows).session_id;

        let first = mgr.delete_rows(&id, &[1, 3, 99]).unwrap();
        assert_eq!(first, DeleteOutcome { requested: 3, removed: 2, remaining: 3 });
        let second = mgr.delete_rows(&id, &[1, 3, 99]).unwrap();
        assert_eq!(second.removed, 0);

        let session = mgr.get(&id).unwrap();
        assert_eq!(session.deleted_count, 2);
        assert_eq!(session.deleted_ids, vec![1, 3]);
        // no re-ranking: the surviving records still point at the deleted parent
        assert!(session.records.iter().all(|r| r.parent_message_id == Some(1)));
    }

    #[test]
    fn apply_rules_accumulates() {
        let (mgr, _) = manager();
        let rows = vec![
            row(1, "A", 1, 100.0, "MANUAL"),
            row(2, "B", 1, 100.0, "TRACE"),
            row(3, "C", 1, 100.0, "MANUAL"),
        ];
        let id = mgr.create("x.csv", &rows).session_id;
        let rules = RuleSet::new(vec![
            Rule::new(7, "manual", ConditionTree::leaf(Column::Source, Operator::Equals, "MANUAL")),
            Rule::new(8, "off", ConditionTree::all(Vec::new())).inactive(),
        ])
        .unwrap();

        let first = mgr.apply_rules(&id, &rules).unwrap();
        assert_eq!(first.excluded_count, 2);
        assert_eq!(first.rules_applied, 1);
        assert_eq!(first.remaining, 1);

        let second = mgr.apply_rules(&id, &rules).unwrap();
        assert_eq!(second.excluded_count, 0);

        let session = mgr.get(&id).unwrap();
        assert_eq!(session.rules_applied_count, 2);
        assert_eq!(session.applied_rule_ids, vec![7]);
    }

    #[test]
    fn select_returns_matching_ids() {
        let (mgr, _) = manager();
        let rows = vec![row(1, "A", 1, 100.0, "MANUAL"), row(2, "B", 1, 90.0, "TRACE")];
        let id = mgr.create("x.csv", &rows).session_id;
        let ids = mgr
            .select(&id, &ConditionTree::leaf(Column::Price, Operator::LessThan, "95"))
            .unwrap();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn save_commits_manual_and_closes() {
        let (mgr, sink) = manager();
        let id = mgr.create("x.csv", &[row(1, "A", 1, 100.0, "TRACE")]).session_id;

        let result = mgr.save(&id).unwrap();
        assert_eq!(result.receipt.records_written, 1);
        assert_eq!(result.summary.parents, 1);
        let stored = sink.read_all(None).unwrap();
        assert_eq!(stored[0].processing_type, Some(ProcessingType::Manual));

        assert_eq!(mgr.get(&id).unwrap().status, SessionStatus::Saved);
        assert!(matches!(
            mgr.delete_rows(&id, &[1]),
            Err(PulseError::SessionClosed { status: SessionStatus::Saved, .. })
        ));
        assert!(matches!(mgr.save(&id), Err(PulseError::SessionClosed { .. })));
    }

    #[test]
    fn save_empty_session_rejected() {
        let (mgr, sink) = manager();
        let id = mgr.create("x.csv", &[row(1, "A", 1, 100.0, "TRACE")]).session_id;
        mgr.delete_rows(&id, &[1]).unwrap();

        assert!(matches!(mgr.save(&id), Err(PulseError::EmptyCommit(_))));
        assert!(sink.is_empty());
        assert_eq!(mgr.get(&id).unwrap().status, SessionStatus::Open);
    }

    #[test]
    fn unknown_session() {
        let (mgr, _) = manager();
        assert!(matches!(mgr.get("nope"), Err(PulseError::SessionNotFound(_))));
        assert!(matches!(mgr.delete_rows("nope", &[1]), Err(PulseError::SessionNotFound(_))));
    }

    #[test]
    fn expire_drops_only_old_open_sessions() {
        let (mgr, _) = manager();
        // created first so the back-dated creates below do not sweep it
        let fresh = mgr.create("new.csv", &[row(1, "A", 1, 100.0, "TRACE")]).session_id;
        let t0 = Utc::now() - Duration::hours(48);
        let old_open = mgr.create_at("old.csv", &[row(1, "A", 1, 100.0, "TRACE")], t0).session_id;
        let old_saved = mgr.create_at("saved.csv", &[row(1, "A", 1, 100.0, "TRACE")], t0).session_id;
        mgr.save(&old_saved).unwrap();

        let expired = mgr.expire(Duration::hours(24));
        assert_eq!(expired, vec![old_open.clone()]);
        assert!(matches!(mgr.get(&old_open), Err(PulseError::SessionNotFound(_))));
        assert_eq!(mgr.get(&old_saved).unwrap().status, SessionStatus::Saved);
        assert_eq!(mgr.get(&fresh).unwrap().status, SessionStatus::Open);

        assert_eq!(mgr.purge_saved(), 1);
        assert!(mgr.get(&old_saved).is_err());
        assert_eq!(mgr.list_sessions().len(), 1);
    }

    fn manager_with_ttl(hours: u32) -> SessionManager {
        let mut config = PulseConfig::default();
        config.session.ttl_hours = hours;
        SessionManager::with_config(Arc::new(MemorySink::new()), &config)
    }

    #[test]
    fn expire_stale_uses_configured_ttl() {
        let created = Utc::now() - Duration::hours(25);

        let long = manager_with_ttl(48);
        let kept = long.create_at("a.csv", &[row(1, "A", 1, 100.0, "TRACE")], created).session_id;
        assert!(long.expire_stale().is_empty());
        assert_eq!(long.get(&kept).unwrap().status, SessionStatus::Open);

        let (default, _) = manager();
        let gone = default.create_at("a.csv", &[row(1, "A", 1, 100.0, "TRACE")], created).session_id;
        assert_eq!(default.expire_stale(), vec![gone.clone()]);
        assert!(matches!(default.get(&gone), Err(PulseError::SessionNotFound(_))));
    }

    #[test]
    fn create_sweeps_sessions_past_ttl() {
        let mgr = manager_with_ttl(12);
        let now = Utc::now();
        let stale = mgr.create_at("old.csv", &[], now - Duration::hours(13)).session_id;
        let recent = mgr.create_at("mid.csv", &[], now - Duration::hours(11)).session_id;

        let fresh = mgr.create("new.csv", &[row(1, "A", 1, 100.0, "TRACE")]).session_id;
        assert!(matches!(mgr.get(&stale), Err(PulseError::SessionNotFound(_))));
        assert_eq!(mgr.get(&recent).unwrap().status, SessionStatus::Open);
        assert_eq!(mgr.list_sessions().len(), 2);
        assert!(mgr.get(&fresh).is_ok());
    }

    #[test]
    fn list_sessions_newest_first() {
        let (mgr, _) = manager();
        let now = Utc::now();
        let a = mgr.create_at("a.csv", &[], now - Duration::minutes(5)).session_id;
        let b = mgr.create_at("b.csv", &[row(1, "A", 1, 1.0, "TRACE")], now).session_id;

        let infos = mgr.list_sessions();
        let ids: Vec<&str> = infos.iter().map(|i| i.session_id.as_str()).collect();
        assert_eq!(ids, vec![b.as_str(), a.as_str()]);
        assert_eq!(infos[0].rows, 1);
        assert_eq!(infos[1].source_filename, "a.csv");
    }
}

//! `pulse-engine`: ranking and rule engine for market price colors.
//!
//! Pure engine crate: receives raw rows, returns ranked records. Storage is
//! reached only through the [`OutputSink`] and [`RuleRepository`] traits.

pub mod condition;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod ranking;
pub mod rules;
pub mod session;
pub mod sink;
pub mod summary;

pub use condition::{Column, ConditionTree, Connector, Operator};
pub use config::PulseConfig;
pub use error::{NormalizationError, PulseError};
pub use evaluator::{apply_rule_set, evaluate, select, RuleOutcome};
pub use model::{Bias, ColorRecord, DiffStatus, ProcessingType, RawRow, Source};
pub use normalize::{normalize, NormalizeReport, Normalizer};
pub use pipeline::{run_batch, BatchReport};
pub use ranking::rank;
pub use rules::{Preset, Rule, RuleCatalog, RuleRepository, RuleSet};
pub use session::{
    CommitResult, DeleteOutcome, RulesOutcome, Session, SessionInfo, SessionManager,
    SessionStatus,
};
pub use sink::{CommitReceipt, MemorySink, OutputSink};
pub use summary::{compute_summary, RecordSummary};

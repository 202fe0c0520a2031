// File-backed collaborators for the pulse engine

pub mod csv;
pub mod error;
pub mod sink;
pub mod store;

pub use crate::csv::{parse_csv_rows, read_csv_rows};
pub use error::IoError;
pub use sink::JsonLinesSink;
pub use store::JsonRuleStore;

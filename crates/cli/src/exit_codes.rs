//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scheduled jobs rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                               |
//! |---------|-----------|-------------------------------------------|
//! | 0       | Universal | Success                                   |
//! | 1       | Universal | General error (unspecified)               |
//! | 2       | Universal | CLI usage error (bad args, bad config)    |
//! | 3-9     | input     | Reading and normalizing input rows        |
//! | 10-19   | rules     | Rule and preset documents                 |
//! | 20-29   | session   | Review session state                      |
//! | 30-39   | output    | Output sink                               |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `pulse_exit_code` or the relevant command

use pulse_engine::PulseError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable or invalid config.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Input (3-9)
// =============================================================================

/// Input file missing, unreadable or not valid CSV.
pub const EXIT_INPUT_READ: u8 = 3;

/// `--strict` run dropped at least one row during normalization.
pub const EXIT_ROWS_DROPPED: u8 = 4;

// =============================================================================
// Rules (10-19)
// =============================================================================

/// Rule or preset document failed to parse or validate.
pub const EXIT_RULES_INVALID: u8 = 10;

/// A requested rule or preset id is not in the document.
pub const EXIT_RULES_UNKNOWN_ID: u8 = 11;

// =============================================================================
// Session (20-29)
// =============================================================================

/// Session id unknown or expired.
pub const EXIT_SESSION_NOT_FOUND: u8 = 20;

/// Session already saved or expired.
pub const EXIT_SESSION_CLOSED: u8 = 21;

/// Save requested with nothing left in the session.
pub const EXIT_SESSION_EMPTY: u8 = 22;

// =============================================================================
// Output (30-39)
// =============================================================================

/// Output sink could not be written or read.
pub const EXIT_SINK: u8 = 30;

/// Exit code for an engine error.
pub fn pulse_exit_code(err: &PulseError) -> u8 {
    match err {
        PulseError::Normalization(_) => EXIT_INPUT_READ,
        PulseError::RuleEvaluation { .. } | PulseError::Repository(_) => EXIT_RULES_INVALID,
        PulseError::SessionNotFound(_) => EXIT_SESSION_NOT_FOUND,
        PulseError::SessionClosed { .. } => EXIT_SESSION_CLOSED,
        PulseError::EmptyCommit(_) => EXIT_SESSION_EMPTY,
        PulseError::ConfigParse(_) | PulseError::ConfigValidation(_) => EXIT_USAGE,
        PulseError::Sink(_) => EXIT_SINK,
    }
}

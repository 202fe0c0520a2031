//! `mpulse review`: one-shot manual review session.
//!
//! Imports the file into a session, applies the requested deletions in a
//! fixed order (explicit ids, then presets, then rules), and saves when
//! asked. The session never outlives the process.

use std::path::PathBuf;
use std::sync::Arc;

use pulse_engine::{
    CommitResult, DeleteOutcome, RuleRepository, RulesOutcome, Session, SessionManager,
};
use pulse_io::JsonLinesSink;
use serde::Serialize;

use crate::exit_codes::EXIT_RULES_UNKNOWN_ID;
use crate::util::{load_catalog, load_config, load_rows, output_path, print_json, source_name};
use crate::CliError;

pub struct ReviewArgs {
    pub input: PathBuf,
    pub delete: Vec<i64>,
    pub preset_delete: Option<PathBuf>,
    pub preset_ids: Vec<i64>,
    pub apply_rules: Option<PathBuf>,
    pub rule_ids: Vec<i64>,
    pub save: bool,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresetDeletion {
    preset_id: i64,
    preset_name: String,
    selected: usize,
    outcome: DeleteOutcome,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewReport {
    session: Session,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<DeleteOutcome>,
    presets: Vec<PresetDeletion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rules: Option<RulesOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit: Option<CommitResult>,
}

fn unknown_id(kind: &str, id: i64, path: &std::path::Path) -> CliError {
    CliError::new(
        EXIT_RULES_UNKNOWN_ID,
        format!("{kind} {id} not found in {}", path.display()),
    )
}

pub fn cmd_review(args: ReviewArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let rows = load_rows(&args.input)?;
    let sink = Arc::new(JsonLinesSink::new(output_path(args.output, &config)));
    let manager = SessionManager::with_config(sink.clone(), &config);

    let session = manager.create(&source_name(&args.input), &rows);
    let id = session.session_id.as_str();
    for err in &session.report.errors {
        eprintln!("  dropped {err}");
    }
    eprintln!(
        "session {id}: {} record(s) from {}",
        session.records.len(),
        session.source_filename
    );

    let deleted = if args.delete.is_empty() {
        None
    } else {
        let outcome = manager.delete_rows(id, &args.delete)?;
        if outcome.removed < outcome.requested {
            log::warn!(
                "{} of {} requested id(s) were not in the session",
                outcome.requested - outcome.removed,
                outcome.requested
            );
        }
        eprintln!("deleted {} record(s) by id", outcome.removed);
        Some(outcome)
    };

    let mut presets = Vec::new();
    if let Some(path) = &args.preset_delete {
        let catalog = load_catalog(path)?;
        for &preset_id in &args.preset_ids {
            let preset = catalog
                .find_preset(preset_id)?
                .ok_or_else(|| unknown_id("preset", preset_id, path))?;
            let selected = manager.select(id, &preset.tree)?;
            let outcome = manager.delete_rows(id, &selected)?;
            eprintln!("preset '{}' deleted {} record(s)", preset.name, outcome.removed);
            presets.push(PresetDeletion {
                preset_id,
                preset_name: preset.name,
                selected: selected.len(),
                outcome,
            });
        }
    }

    let rules = match &args.apply_rules {
        Some(path) => {
            let all = load_catalog(path)?.load_rules()?;
            let chosen = if args.rule_ids.is_empty() {
                all
            } else {
                for &rule_id in &args.rule_ids {
                    match all.get(rule_id) {
                        None => return Err(unknown_id("rule", rule_id, path)),
                        Some(rule) if !rule.is_active => {
                            log::warn!("rule {rule_id} ('{}') is inactive and will not run", rule.name)
                        }
                        Some(_) => {}
                    }
                }
                all.only(&args.rule_ids)
            };
            let outcome = manager.apply_rules(id, &chosen)?;
            eprintln!(
                "{} rule(s) excluded {} record(s)",
                outcome.rules_applied, outcome.excluded_count
            );
            Some(outcome)
        }
        None => None,
    };

    let commit = if args.save {
        let result = manager.save(id)?;
        eprintln!(
            "saved {} record(s) to {}",
            result.receipt.records_written,
            sink.path().display()
        );
        Some(result)
    } else {
        eprintln!("not saved (pass --save to commit)");
        None
    };

    let session = manager.get(id)?;
    if args.json {
        print_json(&ReviewReport {
            session,
            deleted,
            presets,
            rules,
            commit,
        })?;
    } else {
        let s = session.summary();
        eprintln!(
            "{} record(s) remain: {} parent(s), {} child(ren), status {}",
            s.total, s.parents, s.children, session.status
        );
    }
    Ok(())
}

//! `mpulse rules`: check rule documents without touching the output.

use std::path::PathBuf;

use clap::Subcommand;
use pulse_engine::{apply_rule_set, select, Normalizer, RuleRepository};
use serde::Serialize;

use crate::util::{load_catalog, load_config, load_rows, print_json};
use crate::CliError;

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Parse and validate every rule and preset in a document
    #[command(after_help = "\
Examples:
  mpulse rules validate rules.json
  mpulse rules validate rules.json --json")]
    Validate {
        /// Rule document (JSON)
        file: PathBuf,

        /// Print the validated document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Dry-run the rules against an input file and count matches
    #[command(after_help = "\
Examples:
  mpulse rules test rules.json colors.csv
  mpulse rules test rules.json colors.csv --config desk.toml --json")]
    Test {
        /// Rule document (JSON)
        file: PathBuf,

        /// Input CSV file
        input: PathBuf,

        /// TOML config file
        #[arg(long, short = 'c', env = "MPULSE_CONFIG")]
        config: Option<PathBuf>,

        /// Print per-rule results as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn cmd_rules(cmd: RulesCommands) -> Result<(), CliError> {
    match cmd {
        RulesCommands::Validate { file, json } => cmd_validate(file, json),
        RulesCommands::Test {
            file,
            input,
            config,
            json,
        } => cmd_test(file, input, config, json),
    }
}

fn cmd_validate(file: PathBuf, json: bool) -> Result<(), CliError> {
    let catalog = load_catalog(&file)?;
    let rules = catalog.load_rules()?;
    let presets = catalog.load_presets()?;

    if json {
        print_json(&catalog)?;
    }
    eprintln!(
        "{}: {} rule(s) ({} active), {} preset(s), all valid",
        file.display(),
        rules.len(),
        rules.active().count(),
        presets.len()
    );
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RuleMatch {
    id: i64,
    name: String,
    is_active: bool,
    matched: usize,
    matched_ids: Vec<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RulesTestReport {
    records: usize,
    dropped_rows: usize,
    rules: Vec<RuleMatch>,
    /// Records matched by at least one active rule.
    excluded_count: usize,
    remaining: usize,
}

fn cmd_test(
    file: PathBuf,
    input: PathBuf,
    config_path: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_deref())?;
    let rules = load_catalog(&file)?.load_rules()?;
    let rows = load_rows(&input)?;

    // same order as `run`: rules see normalized records before ranking
    let (records, norm) = Normalizer::new(&config).normalize_batch(&rows);

    let matches: Vec<RuleMatch> = rules
        .rules()
        .iter()
        .map(|rule| {
            let matched_ids: Vec<i64> = select(&records, &rule.tree)
                .into_iter()
                .map(|r| r.message_id)
                .collect();
            RuleMatch {
                id: rule.id,
                name: rule.name.clone(),
                is_active: rule.is_active,
                matched: matched_ids.len(),
                matched_ids,
            }
        })
        .collect();

    let total = records.len();
    let outcome = apply_rule_set(records, &rules);
    let report = RulesTestReport {
        records: total,
        dropped_rows: norm.errors.len(),
        rules: matches,
        excluded_count: outcome.excluded_count,
        remaining: outcome.kept.len(),
    };

    if json {
        print_json(&report)?;
    } else {
        for m in &report.rules {
            let state = if m.is_active { "" } else { " (inactive)" };
            println!("{:>4}  {:<32} {:>6} match(es){}", m.id, m.name, m.matched, state);
        }
    }
    eprintln!(
        "{} of {} record(s) would be excluded, {} remain",
        report.excluded_count, report.records, report.remaining
    );
    Ok(())
}

//! `mpulse run`, the scheduled path: normalize, exclude, rank, append.

use std::path::PathBuf;

use pulse_engine::{run_batch, BatchReport, Normalizer, RuleRepository};
use pulse_io::JsonLinesSink;

use crate::exit_codes::EXIT_ROWS_DROPPED;
use crate::util::{load_catalog, load_config, load_rows, output_path, print_json};
use crate::CliError;

pub fn cmd_run(
    input: PathBuf,
    rules_path: Option<PathBuf>,
    override_rules: bool,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
    json: bool,
    strict: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_deref())?;
    let rows = load_rows(&input)?;

    if strict {
        let (_, report) = Normalizer::new(&config).normalize_batch(&rows);
        if !report.is_clean() {
            for err in &report.errors {
                eprintln!("  {err}");
            }
            return Err(CliError::new(
                EXIT_ROWS_DROPPED,
                format!(
                    "{} of {} row(s) failed normalization; nothing committed",
                    report.errors.len(),
                    report.input_rows
                ),
            )
            .with_hint("drop --strict to commit the rows that did normalize"));
        }
    }

    let rules = match (rules_path, override_rules) {
        (Some(path), true) => {
            log::warn!("--override given; ignoring rules in {}", path.display());
            None
        }
        (Some(path), false) => Some(load_catalog(&path)?.load_rules()?),
        (None, _) => None,
    };

    let sink = JsonLinesSink::new(output_path(output, &config));
    let report = run_batch(&config, &rows, rules.as_ref(), &sink)?;

    if json {
        print_json(&report)?;
    }
    print_summary(&report, &sink);
    Ok(())
}

fn print_summary(report: &BatchReport, sink: &JsonLinesSink) {
    for err in &report.normalization_errors {
        eprintln!("  dropped {err}");
    }
    eprintln!(
        "{} row(s) read, {} normalized, {} excluded by {} rule(s)",
        report.input_rows, report.normalized_rows, report.excluded_count, report.rules_applied,
    );
    let s = &report.summary;
    match &report.receipt {
        Some(receipt) => eprintln!(
            "committed {} record(s) to {}: {} parent(s), {} child(ren), {} securit(ies)",
            receipt.records_written,
            sink.path().display(),
            s.parents,
            s.children,
            s.unique_securities,
        ),
        None => eprintln!("nothing left to commit"),
    }
}

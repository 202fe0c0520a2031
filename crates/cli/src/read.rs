//! `mpulse read`: dump committed records.

use std::path::PathBuf;

use pulse_engine::OutputSink;
use pulse_io::JsonLinesSink;

use crate::util::{load_config, output_path, print_json};
use crate::CliError;

pub fn cmd_read(
    output: Option<PathBuf>,
    limit: Option<usize>,
    config_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_deref())?;
    let sink = JsonLinesSink::new(output_path(output, &config));
    let records = sink
        .read_all(limit)
        .map_err(|e| CliError::sink(e.to_string()))?;
    log::info!("{} record(s) read from {}", records.len(), sink.path().display());
    print_json(&records)
}

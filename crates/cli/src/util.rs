use std::path::{Path, PathBuf};

use pulse_engine::{PulseConfig, RawRow, RuleCatalog};
use pulse_io::{read_csv_rows, IoError, JsonRuleStore};
use serde::Serialize;

use crate::CliError;

/// Config from `--config`, or defaults when none was given.
pub(crate) fn load_config(path: Option<&Path>) -> Result<PulseConfig, CliError> {
    let Some(path) = path else {
        return Ok(PulseConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::usage(format!("cannot read config {}: {e}", path.display())))?;
    let config = PulseConfig::from_toml(&text).map_err(CliError::engine)?;
    log::info!("config '{}' loaded from {}", config.name, path.display());
    Ok(config)
}

pub(crate) fn load_rows(path: &Path) -> Result<Vec<RawRow>, CliError> {
    read_csv_rows(path).map_err(|e| CliError::input(e.to_string()))
}

/// Rule document from a JSON file. Parse and validation failures are rules
/// errors; an unreadable file is an input error.
pub(crate) fn load_catalog(path: &Path) -> Result<RuleCatalog, CliError> {
    match JsonRuleStore::new(path).load() {
        Ok(catalog) => Ok(catalog),
        Err(err @ IoError::File { .. }) => Err(CliError::input(err.to_string())),
        Err(err) => Err(CliError::rules(err.to_string())),
    }
}

/// `--output` if given, else the config's output path.
pub(crate) fn output_path(flag: Option<PathBuf>, config: &PulseConfig) -> PathBuf {
    flag.unwrap_or_else(|| PathBuf::from(&config.output.path))
}

/// Name recorded on review sessions: the file name without its directory.
pub(crate) fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::internal(format!("JSON serialization error: {e}")))?;
    println!("{json}");
    Ok(())
}

// JSON rule/preset store

use std::path::{Path, PathBuf};

use pulse_engine::{Preset, PulseError, Rule, RuleCatalog, RuleRepository, RuleSet};
use serde::Deserialize;

use crate::error::IoError;

/// Accepted file layouts: the full catalog object, or a bare array of rules.
#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Catalog(RuleCatalog),
    Rules(Vec<Rule>),
}

/// Rules and presets kept in a JSON file, re-read on every load so edits
/// are picked up without a restart.
pub struct JsonRuleStore {
    path: PathBuf,
}

impl JsonRuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<RuleCatalog, IoError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| IoError::file(&self.path, e))?;
        let catalog = match serde_json::from_str(&text) {
            Ok(Document::Catalog(catalog)) => catalog,
            Ok(Document::Rules(rules)) => RuleCatalog {
                rules,
                presets: Vec::new(),
            },
            Err(_) => {
                // untagged errors say nothing useful; re-parse as a catalog for the message
                let message = serde_json::from_str::<RuleCatalog>(&text)
                    .err()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unrecognized rule document".into());
                return Err(IoError::Json {
                    path: self.path.clone(),
                    line: None,
                    message,
                });
            }
        };

        log::debug!(
            "{}: {} rule(s), {} preset(s)",
            self.path.display(),
            catalog.rules.len(),
            catalog.presets.len()
        );
        Ok(catalog)
    }
}

impl RuleRepository for JsonRuleStore {
    fn load_rules(&self) -> Result<RuleSet, PulseError> {
        self.load()
            .map_err(|e| PulseError::Repository(e.to_string()))?
            .load_rules()
    }

    fn load_presets(&self) -> Result<Vec<Preset>, PulseError> {
        self.load()
            .map_err(|e| PulseError::Repository(e.to_string()))?
            .load_presets()
    }
}

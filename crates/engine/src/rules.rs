//! Exclusion rules, selection presets and the repository they are loaded from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::{ChainedCondition, ConditionTree};
use crate::error::PulseError;

// ---------------------------------------------------------------------------
// Definitions as stored
// ---------------------------------------------------------------------------

/// Stored shape shared by rules and presets: either a `tree` or the older
/// flat `conditions` chain.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    id: i64,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_active", alias = "is_active")]
    is_active: bool,
    #[serde(default, alias = "updated_at")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    tree: Option<ConditionTree>,
    #[serde(default)]
    conditions: Option<Vec<ChainedCondition>>,
}

fn default_active() -> bool {
    true
}

impl Definition {
    fn into_tree(self) -> Result<(DefinitionHead, ConditionTree), String> {
        let head = DefinitionHead {
            id: self.id,
            name: self.name,
            description: self.description,
            is_active: self.is_active,
            updated_at: self.updated_at,
        };
        let tree = match (self.tree, self.conditions) {
            (Some(tree), None) => tree,
            (Some(tree), Some(_)) => {
                log::warn!("'{}' carries both 'tree' and 'conditions'; using 'tree'", head.name);
                tree
            }
            (None, Some(chain)) => ConditionTree::from_chain(&chain),
            (None, None) => {
                return Err(format!("'{}' has neither 'tree' nor 'conditions'", head.name))
            }
        };
        Ok((head, tree))
    }
}

struct DefinitionHead {
    id: i64,
    name: String,
    description: Option<String>,
    is_active: bool,
    updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// An always-on exclusion filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Definition")]
pub struct Rule {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub tree: ConditionTree,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<Definition> for Rule {
    type Error = String;

    fn try_from(def: Definition) -> Result<Self, Self::Error> {
        let (head, tree) = def.into_tree()?;
        Ok(Self {
            id: head.id,
            name: head.name,
            is_active: head.is_active,
            tree,
            updated_at: head.updated_at,
        })
    }
}

impl Rule {
    pub fn new(id: i64, name: impl Into<String>, tree: ConditionTree) -> Self {
        Self {
            id,
            name: name.into(),
            is_active: true,
            tree,
            updated_at: None,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn validate(&self) -> Result<(), PulseError> {
        let invalid = |message| PulseError::RuleEvaluation {
            rule: self.name.clone(),
            message,
        };
        self.tree.validate().map_err(invalid)?;
        match self.tree.derived_column() {
            Some(column) => Err(invalid(format!(
                "column '{column}' is only set by ranking and cannot be used in a rule"
            ))),
            None => Ok(()),
        }
    }
}

/// Validated, ordered collection of rules. Inactive rules are kept (and
/// validated) but never evaluated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Result<Self, PulseError> {
        for rule in &rules {
            rule.validate()?;
        }
        let set = Self { rules };
        log::debug!(
            "loaded {} rule(s), {} active",
            set.rules.len(),
            set.active().count()
        );
        Ok(set)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn active(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_active)
    }

    pub fn get(&self, id: i64) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// The rules whose ids are listed, in set order. Unknown ids are ignored.
    pub fn only(&self, ids: &[i64]) -> RuleSet {
        RuleSet {
            rules: self
                .rules
                .iter()
                .filter(|r| ids.contains(&r.id))
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Preset
// ---------------------------------------------------------------------------

/// An on-demand selection filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Definition")]
pub struct Preset {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tree: ConditionTree,
}

impl TryFrom<Definition> for Preset {
    type Error = String;

    fn try_from(def: Definition) -> Result<Self, Self::Error> {
        let (head, tree) = def.into_tree()?;
        Ok(Self {
            id: head.id,
            name: head.name,
            description: head.description,
            tree,
        })
    }
}

impl Preset {
    pub fn validate(&self) -> Result<(), PulseError> {
        self.tree.validate().map_err(|message| PulseError::RuleEvaluation {
            rule: format!("preset {}", self.name),
            message,
        })
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Where rules and presets come from. The engine never reads storage itself;
/// callers hand it whatever this returns.
pub trait RuleRepository {
    fn load_rules(&self) -> Result<RuleSet, PulseError>;

    fn load_presets(&self) -> Result<Vec<Preset>, PulseError>;

    fn find_preset(&self, id: i64) -> Result<Option<Preset>, PulseError> {
        Ok(self.load_presets()?.into_iter().find(|p| p.id == id))
    }
}

/// `{ "rules": [...], "presets": [...] }` document, held in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleCatalog {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub presets: Vec<Preset>,
}

impl RuleCatalog {
    pub fn from_json(input: &str) -> Result<Self, PulseError> {
        let catalog: RuleCatalog =
            serde_json::from_str(input).map_err(|e| PulseError::RuleEvaluation {
                rule: "<document>".into(),
                message: e.to_string(),
            })?;
        for preset in &catalog.presets {
            preset.validate()?;
        }
        Ok(catalog)
    }
}

impl RuleRepository for RuleCatalog {
    fn load_rules(&self) -> Result<RuleSet, PulseError> {
        RuleSet::new(self.rules.clone())
    }

    fn load_presets(&self) -> Result<Vec<Preset>, PulseError> {
        for preset in &self.presets {
            preset.validate()?;
        }
        Ok(self.presets.clone())
    }
}

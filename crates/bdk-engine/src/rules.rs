//! Rule evaluation: exclusion verdicts and asset-directory overrides.
//!
//! Rules are evaluated in declared order and muted rules are skipped. For
//! each package the last matching include/exclude rule decides exclusion,
//! and the last matching set-asset-directory rule decides the override.
//! A package no rule matches is included.

use std::collections::BTreeMap;

use bdk_config::{Package, Rule, RuleKind};
use glob::{MatchOptions, Pattern};

use crate::error::EngineError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// The outcome of rule evaluation for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleVerdict {
    pub excluded: bool,
    pub asset_directory: Option<String>,
}

struct CompiledRule<'a> {
    rule: &'a Rule,
    pattern: Pattern,
}

impl CompiledRule<'_> {
    fn matches(&self, package: &Package) -> bool {
        self.pattern.matches_with(&package.filename, MATCH_OPTIONS)
            || self.pattern.matches_with(&package.path, MATCH_OPTIONS)
    }
}

fn compile(rules: &[Rule]) -> Result<Vec<CompiledRule<'_>>, EngineError> {
    rules
        .iter()
        .filter(|r| !r.mute)
        .map(|rule| {
            let pattern = Pattern::new(&rule.pattern).map_err(|e| EngineError::RulePattern {
                pattern: rule.pattern.clone(),
                message: e.to_string(),
            })?;
            Ok(CompiledRule { rule, pattern })
        })
        .collect()
}

/// Evaluate `rules` against every package, keyed by package path.
///
/// # Errors
/// Returns an error if a non-muted rule has a malformed glob.
pub fn evaluate(
    packages: &[Package],
    rules: &[Rule],
) -> Result<BTreeMap<String, RuleVerdict>, EngineError> {
    let compiled = compile(rules)?;
    let mut verdicts = BTreeMap::new();
    for package in packages {
        let mut verdict = RuleVerdict::default();
        for rule in compiled.iter().filter(|r| r.matches(package)) {
            match rule.rule.kind {
                RuleKind::Include => verdict.excluded = false,
                RuleKind::Exclude => verdict.excluded = true,
                RuleKind::SetAssetDirectory => {
                    verdict.asset_directory.clone_from(&rule.rule.asset_directory);
                }
            }
        }
        verdicts.insert(package.path.clone(), verdict);
    }
    Ok(verdicts)
}

/// Recompute `is_excluded_by_rule` and `asset_directory` on every package.
///
/// Previous values are discarded, never merged.
///
/// # Errors
/// Returns an error if a non-muted rule has a malformed glob.
pub fn apply_rules(packages: &mut [Package], rules: &[Rule]) -> Result<(), EngineError> {
    let verdicts = evaluate(packages, rules)?;
    for package in packages.iter_mut() {
        let verdict = verdicts.get(&package.path).cloned().unwrap_or_default();
        if verdict.excluded {
            tracing::debug!(package = %package.path, "excluded by rule");
        }
        package.is_excluded_by_rule = verdict.excluded;
        package.asset_directory = verdict.asset_directory;
    }
    Ok(())
}

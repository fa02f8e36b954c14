//! Branch-to-command routing

use regex::Regex;

use crate::config::Settings;
use crate::error::{DeployError, Result};

pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// How a rule decides whether it applies to a branch.
#[derive(Debug, Clone)]
pub enum BranchMatcher {
    ExactName(String),
    /// Anchored at the start of the branch name, not at its end.
    Pattern(Regex),
}

impl BranchMatcher {
    /// Compiles `pattern` on its own; anchoring is applied when matching.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(BranchMatcher::Pattern)
            .map_err(|source| DeployError::InvalidRule {
                rule: pattern.to_string(),
                source,
            })
    }

    pub fn matches(&self, branch: &str) -> bool {
        match self {
            BranchMatcher::ExactName(name) => name == branch,
            // leftmost-first search finds a match at 0 whenever one exists
            BranchMatcher::Pattern(re) => re.find(branch).is_some_and(|m| m.start() == 0),
        }
    }
}

impl std::fmt::Display for BranchMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BranchMatcher::ExactName(name) => write!(f, "name '{}'", name),
            BranchMatcher::Pattern(re) => write!(f, "regexp '{}'", re.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BranchRule {
    pub matcher: BranchMatcher,
    pub deploy_command: String,
}

/// Strips the `refs/heads/` prefix; a ref without it yields an empty branch name.
pub fn branch_name_from_ref(reference: &str) -> &str {
    reference.strip_prefix(BRANCH_REF_PREFIX).unwrap_or("")
}

/// Returns the command to deploy `branch` with, if any.
///
/// The legacy single-branch rule wins outright when it names this branch; otherwise the
/// first rule in configured order that matches is used.
pub fn resolve<'a>(branch: &str, settings: &'a Settings) -> Option<&'a str> {
    if let Some(legacy) = &settings.legacy_rule {
        if branch_name_from_ref(&legacy.branch_ref) == branch {
            return Some(legacy.deploy_command.as_str());
        }
    }

    settings
        .rules
        .iter()
        .find(|rule| rule.matcher.matches(branch))
        .map(|rule| rule.deploy_command.as_str())
}

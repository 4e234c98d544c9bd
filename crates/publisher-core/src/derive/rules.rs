// crates/publisher-core/src/derive/rules.rs
// ============================================================================
// Module: Delivery Rules
// Description: Static routing table fanning one artifact out to many mirrors.
// Purpose: Derive per-destination publish instructions from repository and tag.
// Dependencies: regex, serde
// ============================================================================

//! ## Overview
//! A [`DeliveryRule`] matches when its repository pattern matches the artifact
//! repository and any of its tag patterns matches the tag. Each matching rule
//! produces one [`DeliveryInstruction`] per destination mirror.
//! Invariants:
//! - Evaluation is pure: only repository and tag strings are inspected.
//! - Duplicate instructions are removed, first occurrence wins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use super::DeriveError;
use super::patterns::compile;
use super::reference::split_repo_and_tag;

// ============================================================================
// SECTION: Rule Types
// ============================================================================

/// Routing rule as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRule {
    /// Repository pattern.
    pub repo: String,
    /// Tag patterns; any match selects the rule.
    pub tags: Vec<String>,
    /// Destination mirror names.
    pub dest_mirrors: Vec<String>,
    /// Optional replacement template applied to the tag to form a version override.
    #[serde(default)]
    pub tag_regex_replace: Option<String>,
}

/// Concrete instruction to publish one artifact to one mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryInstruction {
    /// Destination mirror name.
    pub mirror: String,
    /// Artifact reference (`repo:tag`).
    pub artifact_url: String,
    /// Explicit version override taking precedence over the derived version.
    pub version: Option<String>,
}

/// Rule with compiled patterns.
#[derive(Debug, Clone)]
struct CompiledRule {
    /// Repository pattern.
    repo: Regex,
    /// Tag patterns in declaration order.
    tags: Vec<Regex>,
    /// Destination mirror names.
    dest_mirrors: Vec<String>,
    /// Optional version replacement template.
    tag_regex_replace: Option<String>,
}

/// Compiled delivery rule table.
#[derive(Debug, Clone, Default)]
pub struct DeliveryRules {
    /// Rules in declaration order.
    rules: Vec<CompiledRule>,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

impl DeliveryRules {
    /// Compiles a rule table.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::Pattern`] when any pattern is invalid.
    pub fn compile(rules: &[DeliveryRule]) -> Result<Self, DeriveError> {
        let rules = rules
            .iter()
            .map(|rule| {
                Ok(CompiledRule {
                    repo: compile(&rule.repo)?,
                    tags: rule.tags.iter().map(|tag| compile(tag)).collect::<Result<_, _>>()?,
                    dest_mirrors: rule.dest_mirrors.clone(),
                    tag_regex_replace: rule.tag_regex_replace.clone(),
                })
            })
            .collect::<Result<Vec<_>, DeriveError>>()?;
        Ok(Self {
            rules,
        })
    }

    /// Returns true when the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Derives delivery instructions for an artifact reference.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::InvalidReference`] when the reference cannot be split.
    pub fn instructions(&self, artifact_url: &str) -> Result<Vec<DeliveryInstruction>, DeriveError> {
        let (repo, tag) = split_repo_and_tag(artifact_url)?;
        let mut instructions: Vec<DeliveryInstruction> = Vec::new();
        for rule in self.rules.iter().filter(|rule| rule.repo.is_match(&repo)) {
            let Some(matched) = rule.tags.iter().find(|pattern| pattern.is_match(&tag)) else {
                continue;
            };
            let version = rule
                .tag_regex_replace
                .as_deref()
                .map(|template| matched.replace_all(&tag, template).into_owned())
                .filter(|version| !version.is_empty());
            for mirror in &rule.dest_mirrors {
                let instruction = DeliveryInstruction {
                    mirror: mirror.clone(),
                    artifact_url: format!("{repo}:{tag}"),
                    version: version.clone(),
                };
                if !instructions.contains(&instruction) {
                    instructions.push(instruction);
                }
            }
        }
        Ok(instructions)
    }
}

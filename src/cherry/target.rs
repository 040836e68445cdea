//! Label to target-branch resolution and label rewriting

use crate::config::RepoConfig;
use crate::error::{Error, Result};
use regex::Regex;

/// Placeholder substituted in branch and label templates
const VERSION_PLACEHOLDER: &str = "[version]";

/// A maintenance branch to cherry pick onto
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Branch name (`release-4.0`, `master`)
    pub branch: String,
    /// Version token captured from the label (`4.0`, `master`)
    pub version: String,
}

/// Resolves cherry-pick labels and rewrites labels for a repository
#[derive(Debug, Clone)]
pub struct Resolver {
    rule: Regex,
    release: String,
    type_label: String,
    replace_label: String,
    ignore: Option<Regex>,
}

fn fill(template: &str, version: &str) -> String {
    template.replacen(VERSION_PLACEHOLDER, version, 1)
}

impl Resolver {
    /// Build a resolver from a label pattern and templates
    ///
    /// An empty `ignore_label` ignores nothing.
    pub fn new(
        rule: &str,
        release: &str,
        type_label: &str,
        replace_label: &str,
        ignore_label: &str,
    ) -> Result<Self> {
        let ignore = if ignore_label.is_empty() {
            None
        } else {
            Some(Regex::new(ignore_label)?)
        };
        Ok(Self {
            rule: Regex::new(rule)?,
            release: release.to_string(),
            type_label: type_label.to_string(),
            replace_label: replace_label.to_string(),
            ignore,
        })
    }

    /// Build a resolver from repository settings
    pub fn from_config(config: &RepoConfig) -> Result<Self> {
        Self::new(
            &config.rule,
            &config.release,
            &config.type_label,
            &config.replace_label,
            &config.ignore_label,
        )
    }

    /// Version token of a cherry-pick label, if it is one
    pub fn version_of<'a>(&self, label: &'a str) -> Option<&'a str> {
        self.rule
            .captures(label)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Resolve a label to its target branch
    ///
    /// `master` maps to itself; any other version fills the release template.
    pub fn resolve(&self, label: &str) -> Result<Target> {
        let version = self
            .version_of(label)
            .ok_or_else(|| Error::PatternMismatch(label.to_string()))?;

        let branch = if version == "master" {
            version.to_string()
        } else {
            fill(&self.release, version)
        };
        Ok(Target {
            branch,
            version: version.to_string(),
        })
    }

    /// Labels for the cherry-pick PR, derived from the source PR's labels
    ///
    /// Ignored labels are dropped; the cherry-pick label for `version`
    /// becomes the type label and cherry-pick labels for other versions are
    /// dropped. Everything else is copied as-is.
    pub fn labels_to_copy(&self, source_labels: &[String], version: &str) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for label in source_labels {
            if self.ignore.as_ref().is_some_and(|re| re.is_match(label)) {
                continue;
            }
            let copied = match self.version_of(label) {
                None => label.clone(),
                Some(v) if v == version && !self.type_label.is_empty() => {
                    fill(&self.type_label, v)
                }
                Some(_) => continue,
            };
            if !labels.contains(&copied) {
                labels.push(copied);
            }
        }
        labels
    }

    /// Label added to the source PR once the pick for `version` exists
    pub fn replace_label_for(&self, version: &str) -> Option<String> {
        (!self.replace_label.is_empty()).then(|| fill(&self.replace_label, version))
    }

    /// Cherry-pick labels on the source PR that target `version`
    pub fn labels_for_version<'a>(&self, labels: &'a [String], version: &str) -> Vec<&'a str> {
        labels
            .iter()
            .filter(|l| self.version_of(l) == Some(version))
            .map(String::as_str)
            .collect()
    }
}

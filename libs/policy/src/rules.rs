//! Creation restriction rules.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{EnforcementContext, Pattern, PolicyError};

/// One grant or revoke rule.
///
/// Each axis left empty matches every input.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreationRestriction {
    #[serde(default)]
    pub resource_types: BTreeSet<String>,

    #[serde(default)]
    pub auth_subjects: Vec<Pattern>,

    #[serde(default)]
    pub namespaces: Vec<Pattern>,
}

impl CreationRestriction {
    /// A rule that matches every context.
    pub fn wildcard() -> Self {
        Self::default()
    }

    /// Returns true if every axis of this rule matches the context.
    pub fn matches(&self, context: &EnforcementContext) -> bool {
        self.matches_resource_type(context)
            && self.matches_auth_subject(context)
            && self.matches_namespace(context)
    }

    fn matches_resource_type(&self, context: &EnforcementContext) -> bool {
        if self.resource_types.is_empty() {
            return true;
        }
        let matched = self.resource_types.contains(&context.resource_type);
        if !matched {
            debug!(
                correlation_id = %context.headers.correlation_id,
                resource_type = %context.resource_type,
                "no resource type match"
            );
        }
        matched
    }

    fn matches_auth_subject(&self, context: &EnforcementContext) -> bool {
        if self.auth_subjects.is_empty() {
            return true;
        }
        let matched = context.headers.auth_subjects.iter().find(|subject| {
            self.auth_subjects
                .iter()
                .any(|pattern| pattern.is_match(subject))
        });
        match matched {
            Some(subject) => {
                debug!(
                    correlation_id = %context.headers.correlation_id,
                    subject = %subject,
                    "matched auth subject"
                );
                true
            }
            None => {
                debug!(
                    correlation_id = %context.headers.correlation_id,
                    "no auth subject match"
                );
                false
            }
        }
    }

    fn matches_namespace(&self, context: &EnforcementContext) -> bool {
        if self.namespaces.is_empty() {
            return true;
        }
        let matched = self
            .namespaces
            .iter()
            .any(|pattern| pattern.is_match(&context.namespace));
        if !matched {
            debug!(
                correlation_id = %context.headers.correlation_id,
                namespace = %context.namespace,
                "no namespace match"
            );
        }
        matched
    }
}

/// The grant and revoke lists. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationRestrictionConfig {
    #[serde(default)]
    pub grant: Vec<CreationRestriction>,

    #[serde(default)]
    pub revoke: Vec<CreationRestriction>,
}

impl Default for CreationRestrictionConfig {
    /// Everyone may create everything.
    fn default() -> Self {
        Self {
            grant: vec![CreationRestriction::wildcard()],
            revoke: Vec::new(),
        }
    }
}

impl CreationRestrictionConfig {
    pub fn new(grant: Vec<CreationRestriction>, revoke: Vec<CreationRestriction>) -> Self {
        Self { grant, revoke }
    }

    /// Parses `[[grant]]` and `[[revoke]]` tables from a TOML document.
    ///
    /// ```toml
    /// [[grant]]
    /// resource_types = ["thing"]
    /// auth_subjects = [".*:alice"]
    ///
    /// [[revoke]]
    /// namespaces = ["restricted\\..*"]
    /// ```
    pub fn from_toml_str(document: &str) -> Result<Self, PolicyError> {
        Ok(toml::from_str(document)?)
    }

    /// Returns true if the context matches some grant rule and no revoke rule.
    pub fn can_create(&self, context: &EnforcementContext) -> bool {
        self.grant.iter().any(|rule| rule.matches(context))
            && !self.revoke.iter().any(|rule| rule.matches(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use twin_signals::Headers;

    fn context(resource_type: &str, namespace: &str, subjects: &[&str]) -> EnforcementContext {
        let headers = subjects
            .iter()
            .fold(Headers::with_correlation_id("c"), |h, s| h.auth_subject(*s));
        EnforcementContext::new(resource_type, namespace, headers)
    }

    fn rule(types: &[&str], subjects: &[&str], namespaces: &[&str]) -> CreationRestriction {
        CreationRestriction {
            resource_types: types.iter().map(|t| t.to_string()).collect(),
            auth_subjects: subjects.iter().map(|p| Pattern::new(p).unwrap()).collect(),
            namespaces: namespaces.iter().map(|p| Pattern::new(p).unwrap()).collect(),
        }
    }

    #[test]
    fn test_default_allows_everything() {
        let config = CreationRestrictionConfig::default();
        assert!(config.can_create(&context("thing", "any", &[])));
        assert!(config.can_create(&context("policy", "", &["x:y"])));
    }

    #[test]
    fn test_no_grant_denies() {
        let config = CreationRestrictionConfig::new(vec![], vec![]);
        assert!(!config.can_create(&context("thing", "ns", &["nginx:alice"])));
    }

    #[rstest]
    #[case::alice_allowed("thing", "ns", &["nginx:alice"], true)]
    #[case::any_of_subjects("thing", "ns", &["nginx:bob", "nginx:alice"], true)]
    #[case::bob_denied("thing", "ns", &["nginx:bob"], false)]
    #[case::no_subjects("thing", "ns", &[], false)]
    #[case::other_type("policy", "ns", &["nginx:alice"], false)]
    #[case::partial_match_is_not_a_match("thing", "ns", &["nginx:alice2"], false)]
    fn test_grant_by_subject(
        #[case] resource_type: &str,
        #[case] namespace: &str,
        #[case] subjects: &[&str],
        #[case] expected: bool,
    ) {
        let config = CreationRestrictionConfig::new(vec![rule(&["thing"], &[".*:alice"], &[])], vec![]);
        assert_eq!(
            config.can_create(&context(resource_type, namespace, subjects)),
            expected
        );
    }

    #[rstest]
    #[case::granted_namespace("org.example", true)]
    #[case::revoked_namespace("org.example.restricted", false)]
    #[case::outside_grant("com.other", false)]
    fn test_revoke_overrides_grant(#[case] namespace: &str, #[case] expected: bool) {
        let config = CreationRestrictionConfig::new(
            vec![rule(&[], &[], &["org\\.example.*"])],
            vec![rule(&[], &[], &[".*\\.restricted"])],
        );
        assert_eq!(
            config.can_create(&context("thing", namespace, &["nginx:alice"])),
            expected
        );
    }

    #[test]
    fn test_from_toml() {
        let config = CreationRestrictionConfig::from_toml_str(
            r#"
            [[grant]]
            resource_types = ["thing"]
            auth_subjects = [".*:alice"]

            [[revoke]]
            namespaces = ["restricted"]
            "#,
        )
        .unwrap();
        assert_eq!(config.grant.len(), 1);
        assert_eq!(config.grant[0].auth_subjects[0].as_str(), ".*:alice");
        assert_eq!(config.revoke.len(), 1);
        assert!(config.revoke[0].resource_types.is_empty());
        assert!(config.can_create(&context("thing", "open", &["x:alice"])));
        assert!(!config.can_create(&context("thing", "restricted", &["x:alice"])));
    }

    #[test]
    fn test_from_toml_rejects_bad_pattern() {
        let err = CreationRestrictionConfig::from_toml_str("[[grant]]\nnamespaces = [\"(\"]\n")
            .unwrap_err();
        assert!(matches!(err, PolicyError::Parse(_)));
    }

    #[test]
    fn test_empty_document_has_no_rules() {
        let config = CreationRestrictionConfig::from_toml_str("").unwrap();
        assert!(config.grant.is_empty());
        assert!(config.revoke.is_empty());
    }
}

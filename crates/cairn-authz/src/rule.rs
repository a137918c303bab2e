//! Rule-based authorization.
//!
//! A rule is a `(trust_domain_pattern, api_method_pattern)` pair; `"*"` is
//! a wildcard on either side. The default policy grants every method to the
//! server's own trust domain and the read-only set to anyone.

use crate::{Authorizer, PolicyInput, READ_ONLY_METHODS};

/// One allow rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Trust domain pattern; `"*"` matches any domain.
    pub trust_domain: String,
    /// API method pattern; `"*"` matches any method.
    pub api_method: String,
}

impl Rule {
    /// Creates a rule from a pattern pair.
    #[must_use]
    pub fn new(trust_domain: impl Into<String>, api_method: impl Into<String>) -> Self {
        Self {
            trust_domain: trust_domain.into(),
            api_method: api_method.into(),
        }
    }

    fn matches(&self, input: &PolicyInput<'_>) -> bool {
        pattern_matches(&self.trust_domain, input.trust_domain)
            && pattern_matches(&self.api_method, input.api_method)
    }
}

fn pattern_matches(pattern: &str, value: &str) -> bool {
    pattern == "*" || pattern == value
}

/// Rule-based policy evaluator.
#[derive(Debug, Clone)]
pub struct RuleAuthorizer {
    rules: Vec<Rule>,
}

impl RuleAuthorizer {
    /// Creates an evaluator from an explicit rule set.
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The default policy: everything for the server's own trust domain,
    /// read-only methods for everyone else.
    #[must_use]
    pub fn default_policy(own_trust_domain: &str) -> Self {
        let mut rules = vec![Rule::new(own_trust_domain, "*")];
        for method in READ_ONLY_METHODS {
            rules.push(Rule::new("*", method));
        }
        Self::new(rules)
    }
}

impl Authorizer for RuleAuthorizer {
    fn authorize(&self, input: &PolicyInput<'_>) -> bool {
        self.rules.iter().any(|rule| rule.matches(input))
    }
}

use crate::error::{Result, SweepError};
use regex::Regex;
use std::collections::HashSet;

/// Namespaces that are never in scope, whatever the allow-list or patterns say
pub const DEFAULT_EXCLUDED_NAMESPACES: [&str; 5] = [
    "kube-system",
    "kube-public",
    "kube-node-lease",
    "ingress-nginx",
    "argocd",
];

/// Decides whether a namespace is in scope for the cleanup policies
///
/// Precedence: exclusion set, then exact allow-list, then prefix-anchored
/// patterns. Anything else is out of scope.
#[derive(Debug, Clone)]
pub struct NamespaceMatcher {
    excluded: HashSet<String>,
    allowed: HashSet<String>,
    patterns: Vec<Regex>,
}

impl NamespaceMatcher {
    /// Build a matcher, compiling every pattern up front.
    ///
    /// Each pattern is anchored at the start of the name but not at the end,
    /// so `std-.*` matches `std-prod-extra` and not `prestd-prod`.
    pub fn new<E, A, P>(excluded: E, allowed: A, patterns: P) -> Result<Self>
    where
        E: IntoIterator,
        E::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| compile_prefix_anchored(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            excluded: excluded.into_iter().map(Into::into).collect(),
            allowed: allowed.into_iter().map(Into::into).collect(),
            patterns,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        if self.excluded.contains(name) {
            return false;
        }
        if self.allowed.contains(name) {
            return true;
        }
        self.patterns.iter().any(|re| re.is_match(name))
    }

}

/// The raw pattern must compile on its own before it is wrapped, otherwise a
/// stray `)` could close the anchoring group and leave an unanchored branch.
fn compile_prefix_anchored(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| SweepError::invalid_pattern(pattern, e.to_string()))?;
    Regex::new(&format!("^(?:{})", pattern))
        .map_err(|e| SweepError::invalid_pattern(pattern, e.to_string()))
}

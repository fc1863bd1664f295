//! Placeholder expansion against an explicit environment mapping.
//!
//! Branch and repository names may contain `${NAME}` or `$NAME` tokens.
//! Expansion is a pure function of the template and the mapping handed to
//! it; nothing here reads the process environment except
//! [`Environment::from_process`], which callers use once to take a snapshot.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// An ordered key/value snapshot used for placeholder expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        std::env::vars().collect()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Expand `template` against this environment.
    pub fn expand(&self, template: &str) -> String {
        expand(template, self)
    }
}

impl FromIterator<(String, String)> for Environment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("placeholder pattern is a valid regex")
    })
}

/// Replace `${NAME}` and `$NAME` tokens with values from `env`.
///
/// Unknown names are left verbatim so a misconfigured placeholder shows up
/// in the resulting name instead of silently collapsing to an empty string.
pub fn expand(template: &str, env: &Environment) -> String {
    if !template.contains('$') {
        return template.to_string();
    }
    placeholder_pattern()
        .replace_all(template, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match env.get(name) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::new()
            .with("BRANCH", "develop")
            .with("REPO", "upstream")
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(expand("master", &env()), "master");
    }

    #[test]
    fn braced_and_bare_tokens_expand() {
        assert_eq!(expand("${BRANCH}", &env()), "develop");
        assert_eq!(expand("$REPO/${BRANCH}", &env()), "upstream/develop");
        assert_eq!(expand("release-${BRANCH}-x", &env()), "release-develop-x");
    }

    #[test]
    fn unknown_tokens_are_left_verbatim() {
        assert_eq!(expand("${MISSING}", &env()), "${MISSING}");
        assert_eq!(expand("$MISSING/a", &env()), "$MISSING/a");
    }

    #[test]
    fn lone_dollar_is_kept() {
        assert_eq!(expand("price$", &env()), "price$");
        assert_eq!(expand("$1abc", &env()), "$1abc");
    }

    #[test]
    fn collected_from_pairs() {
        let e: Environment = vec![("A".to_string(), "1".to_string())]
            .into_iter()
            .collect();
        assert_eq!(e.get("A"), Some("1"));
        assert_eq!(e.len(), 1);
    }
}

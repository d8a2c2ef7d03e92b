//! Environment snapshots.
//!
//! Color detection only ever looks at an [`Environment`] captured once, never at
//! the live process environment, so a session sees consistent answers and tests
//! can describe a terminal without touching global state.

use std::collections::HashMap;

/// An immutable snapshot of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Snapshot the environment of the current process.
    ///
    /// Variables whose name or value is not valid unicode are skipped.
    #[must_use]
    pub fn capture() -> Self {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }

    /// The value of `key`, or an empty string when it is not set.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.vars.get(key).map_or("", String::as_str)
    }

    /// Whether `key` is set to a non-empty value.
    #[must_use]
    pub fn is_set(&self, key: &str) -> bool {
        !self.get(key).is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

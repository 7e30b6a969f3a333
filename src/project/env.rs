//! Environment merging.
//!
//! Entries use the engine's `KEY=value` form. A bare `KEY` is a key-only
//! entry: the engine passes the variable through from its own environment
//! rather than setting it to an empty string, so the two are kept distinct.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// One environment entry, with or without a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvEntry {
    /// Variable name.
    pub key: String,
    /// Value, or `None` for a key-only entry.
    pub value: Option<String>,
}

impl EnvEntry {
    /// Parse `KEY=value` or `KEY`. Returns `None` for an empty key.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (key, value) = match raw.split_once('=') {
            Some((key, value)) => (key, Some(String::from(value))),
            None => (raw, None),
        };
        if key.is_empty() {
            return None;
        }
        Some(Self {
            key: String::from(key),
            value,
        })
    }
}

impl fmt::Display for EnvEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={value}", self.key),
            None => f.write_str(&self.key),
        }
    }
}

/// Ordered service environment.
///
/// Accepts either the list form (`["A=1", "B"]`) or the mapping form
/// (`{ A = "1" }`, with `null` meaning key-only) when deserialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "EnvironmentInput")]
pub struct Environment {
    entries: Vec<EnvEntry>,
}

impl Environment {
    /// Build an environment from `KEY=value` / `KEY` strings.
    #[must_use]
    pub fn from_list<S: AsRef<str>>(raw: &[S]) -> Self {
        Self {
            entries: merge_entries(raw.iter().filter_map(|item| EnvEntry::parse(item.as_ref()))),
        }
    }

    /// Return the entries in order.
    #[must_use]
    pub fn entries(&self) -> &[EnvEntry] {
        &self.entries
    }

    /// Render the entries in engine form.
    #[must_use]
    pub fn to_list(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }

    /// Return whether no variables are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnvironmentInput {
    List(Vec<String>),
    Map(BTreeMap<String, Option<String>>),
}

impl From<EnvironmentInput> for Environment {
    fn from(input: EnvironmentInput) -> Self {
        match input {
            EnvironmentInput::List(list) => Self::from_list(&list),
            EnvironmentInput::Map(map) => Self {
                entries: map
                    .into_iter()
                    .filter(|(key, _)| !key.is_empty())
                    .map(|(key, value)| EnvEntry { key, value })
                    .collect(),
            },
        }
    }
}

/// Merge `overrides` over `base`.
///
/// Output order is first-seen across both lists. An override entry replaces
/// the base entry for the same key entirely, so a key-only override turns a
/// valued base entry back into a key-only one.
///
/// ```
/// use compose_exec::project::merge_env;
///
/// let merged = merge_env(&["A", "B=2"], &["A=1", "C"]);
/// assert_eq!(merged, ["A=1", "B=2", "C"]);
/// ```
#[must_use]
pub fn merge_env<B: AsRef<str>, O: AsRef<str>>(base: &[B], overrides: &[O]) -> Vec<String> {
    let parsed = base
        .iter()
        .map(AsRef::as_ref)
        .chain(overrides.iter().map(AsRef::as_ref))
        .filter_map(EnvEntry::parse);
    merge_entries(parsed)
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn merge_entries(entries: impl Iterator<Item = EnvEntry>) -> Vec<EnvEntry> {
    let mut merged: Vec<EnvEntry> = Vec::new();
    for entry in entries {
        match merged.iter_mut().find(|existing| existing.key == entry.key) {
            Some(existing) => existing.value = entry.value,
            None => merged.push(entry),
        }
    }
    merged
}

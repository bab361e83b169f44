//! Profiling label sets.
//!
//! Labels are kept in key order so every walk over a set, and every query
//! string built from it, comes out the same way.

use crate::error::{ProfilingError, Result};
use crate::ids::ProfileId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Label carrying the owning span's id.
pub const PROFILE_ID_LABEL: &str = "profile_id";
/// Label carrying the owning span's name.
pub const SPAN_NAME_LABEL: &str = "span_name";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Labels for a span's profiling scope: the profile id, plus the span
    /// name when one is given.
    pub fn for_profile(profile_id: &ProfileId, span_name: Option<&str>) -> Self {
        let mut labels = Self::new();
        labels.insert(PROFILE_ID_LABEL, profile_id.as_str());
        if let Some(name) = span_name {
            labels.insert(SPAN_NAME_LABEL, name);
        }
        labels
    }

    /// Parse `k=v,k2=v2`. Blank entries are ignored, whitespace around keys
    /// and values is trimmed.
    pub fn parse_pairs(raw: &str) -> Result<Self> {
        let mut labels = Self::new();
        for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                ProfilingError::Configuration(format!("label '{}' is not key=value", entry))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ProfilingError::Configuration(format!(
                    "label '{}' has an empty key",
                    entry
                )));
            }
            labels.insert(key, value.trim());
        }
        Ok(labels)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn profile_id(&self) -> Option<&str> {
        self.get(PROFILE_ID_LABEL)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Comma-joined `key="value"` terms in key order.
    ///
    /// Values are embedded as-is: a value containing `"` yields a broken
    /// query.
    pub fn to_query_terms(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

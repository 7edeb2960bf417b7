//! Typed variable attributes.
//!
//! A handful of keys are understood by the pipeline (units, plotting range,
//! chemical specie); everything else rides along untouched in an escape-hatch
//! bag so downstream code can still round-trip it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Well-known attribute keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrKey {
    Units,
    Low,
    High,
    Specie,
}

impl AttrKey {
    pub const ALL: [AttrKey; 4] = [AttrKey::Units, AttrKey::Low, AttrKey::High, AttrKey::Specie];

    pub fn as_str(self) -> &'static str {
        match self {
            AttrKey::Units => "units",
            AttrKey::Low => "low",
            AttrKey::High => "high",
            AttrKey::Specie => "specie",
        }
    }

    /// Parse a raw attribute name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a well-known attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(v) => Some(*v),
            AttrValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Number(_) => None,
        }
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Number(v)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

/// Attribute map: typed well-known keys plus an opaque bag for the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    known: BTreeMap<AttrKey, AttrValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extra: BTreeMap<String, serde_json::Value>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for a well-known key.
    pub fn with(mut self, key: AttrKey, value: impl Into<AttrValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: AttrKey, value: impl Into<AttrValue>) {
        self.known.insert(key, value.into());
    }

    pub fn get(&self, key: AttrKey) -> Option<&AttrValue> {
        self.known.get(&key)
    }

    pub fn remove(&mut self, key: AttrKey) -> Option<AttrValue> {
        self.known.remove(&key)
    }

    pub fn units(&self) -> Option<&str> {
        self.get(AttrKey::Units).and_then(AttrValue::as_text)
    }

    /// Plotting range stored under `low` / `high`.
    pub fn range(&self) -> Option<(f64, f64)> {
        let low = self.get(AttrKey::Low)?.as_number()?;
        let high = self.get(AttrKey::High)?.as_number()?;
        Some((low, high))
    }

    /// Insert an attribute by raw name, routing well-known names into
    /// their typed slot and everything else into the extra bag.
    pub fn insert_raw(&mut self, name: &str, value: serde_json::Value) {
        if let Some(key) = AttrKey::parse(name) {
            let typed = match &value {
                serde_json::Value::Number(n) => n.as_f64().map(AttrValue::Number),
                serde_json::Value::String(s) => Some(AttrValue::Text(s.clone())),
                _ => None,
            };
            if let Some(typed) = typed {
                self.known.insert(key, typed);
                return;
            }
        }
        self.extra.insert(name.to_string(), value);
    }

    pub fn extra(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }

    pub fn extras(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.extra.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.extra.is_empty()
    }

    /// Deterministic serialization, used for fingerprints.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

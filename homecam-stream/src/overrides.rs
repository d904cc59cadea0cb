//! User overrides for transcoder arguments.
//!
//! Overrides come in two shapes in user configuration:
//!
//! ```json
//! { "videoOptions": { "-vcodec": "copy", "-tune": false, "-g": 30 } }
//! { "videoOptions": "-vcodec copy -g 30" }
//! ```
//!
//! Both are normalized into an [`OverrideMap`] when the configuration is
//! deserialized. A value of `false` removes the flag from its argument group.

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;

/// Replacement value or removal marker for one flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideValue {
    /// Replace (or add) the flag with this value; empty for value-less flags
    Set(String),
    /// Remove every occurrence of the flag
    Remove,
}

impl OverrideValue {
    fn from_json(value: serde_json::Value) -> Result<Self, String> {
        match value {
            serde_json::Value::Bool(false) => Ok(Self::Remove),
            serde_json::Value::Bool(true) | serde_json::Value::Null => Ok(Self::Set(String::new())),
            serde_json::Value::String(s) => Ok(Self::Set(s)),
            serde_json::Value::Number(n) => Ok(Self::Set(n.to_string())),
            other => Err(format!("unsupported override value: {other}")),
        }
    }
}

/// Ordered mapping from flag name to override.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideMap {
    entries: Vec<(String, OverrideValue)>,
}

impl OverrideMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an override; a repeated flag keeps its first position and takes
    /// the latest value.
    pub fn insert(&mut self, flag: impl Into<String>, value: OverrideValue) {
        let flag = flag.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == flag) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((flag, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert) with a replacement value
    pub fn set(mut self, flag: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(flag, OverrideValue::Set(value.into()));
        self
    }

    /// Builder-style [`insert`](Self::insert) with the removal marker
    pub fn remove(mut self, flag: impl Into<String>) -> Self {
        self.insert(flag, OverrideValue::Remove);
        self
    }

    pub fn get(&self, flag: &str) -> Option<&OverrideValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == flag)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OverrideValue)> {
        self.entries.iter().map(|(flag, value)| (flag.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse the legacy single-string form, e.g. `"-vcodec copy -g 30"`.
    ///
    /// Every token starting with `-` opens a new flag, unless it parses as a
    /// number (so `-itsoffset -0.5` keeps its negative value). Remaining
    /// tokens up to the next flag form the value, joined by single spaces.
    /// Tokens before the first flag are ignored.
    pub fn parse_legacy(input: &str) -> Self {
        let mut map = Self::new();
        let mut current: Option<(String, Vec<&str>)> = None;

        for token in input.split_whitespace() {
            let is_flag = token.len() > 1 && token.starts_with('-') && token.parse::<f64>().is_err();
            if is_flag {
                if let Some((flag, words)) = current.take() {
                    map.insert(flag, OverrideValue::Set(words.join(" ")));
                }
                current = Some((token.to_string(), Vec::new()));
            } else if let Some((_, words)) = current.as_mut() {
                words.push(token);
            } else {
                tracing::warn!("Ignoring override token '{}' without a preceding flag", token);
            }
        }

        if let Some((flag, words)) = current {
            map.insert(flag, OverrideValue::Set(words.join(" ")));
        }

        map
    }
}

impl FromIterator<(String, OverrideValue)> for OverrideMap {
    fn from_iter<I: IntoIterator<Item = (String, OverrideValue)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (flag, value) in iter {
            map.insert(flag, value);
        }
        map
    }
}

struct OverrideMapVisitor;

impl<'de> Visitor<'de> for OverrideMapVisitor {
    type Value = OverrideMap;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of flag overrides or a legacy argument string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(OverrideMap::parse_legacy(value))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(OverrideMap::new())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(OverrideMap::new())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OverrideMap::new();
        while let Some((flag, value)) = access.next_entry::<String, serde_json::Value>()? {
            let value = OverrideValue::from_json(value).map_err(de::Error::custom)?;
            map.insert(flag, value);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for OverrideMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OverrideMapVisitor)
    }
}

/// Overrides for the three transcoder argument groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentOverrides {
    #[serde(default, rename = "sourceOptions")]
    pub source: OverrideMap,
    #[serde(default, rename = "videoOptions")]
    pub video: OverrideMap,
    #[serde(default, rename = "audioOptions")]
    pub audio: OverrideMap,
}

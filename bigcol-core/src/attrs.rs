//! Column attributes.
//!
//! Every column may carry a small ordered map of named values stored as
//! `attrs.json` next to its header. The map is loaded on first access and only
//! written back when it changed.

use std::{fs, io::ErrorKind, path::Path};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    codec::write_json_atomic,
    error::{BigColError, BigColResult},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttrValue {
    Int(Vec<i64>),
    UInt(Vec<u64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
    Text(String),
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(vec![value])
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(value: Vec<i64>) -> Self {
        AttrValue::Int(value)
    }
}

impl From<u64> for AttrValue {
    fn from(value: u64) -> Self {
        AttrValue::UInt(vec![value])
    }
}

impl From<Vec<u64>> for AttrValue {
    fn from(value: Vec<u64>) -> Self {
        AttrValue::UInt(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(vec![value])
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(value: Vec<f64>) -> Self {
        AttrValue::Float(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(vec![value])
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrSet {
    entries: IndexMap<String, AttrValue>,
    dirty: bool,
}

impl AttrSet {
    /// Loads `path`, treating a missing file as an empty set.
    pub fn load(path: &Path) -> BigColResult<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(BigColError::io(path, err)),
        };
        let entries = serde_json::from_slice(&bytes)
            .map_err(|e| BigColError::format(path, format!("unreadable attributes: {e}")))?;
        Ok(Self {
            entries,
            dirty: false,
        })
    }

    /// Writes the set to `path` if it changed since it was loaded.
    pub fn persist(&mut self, path: &Path) -> BigColResult<()> {
        if !self.dirty {
            return Ok(());
        }
        write_json_atomic(path, &self.entries, true)?.map_err(|e| BigColError::io(path, e))?;
        self.dirty = false;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.entries.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.entries.insert(name.into(), value.into());
        self.dirty = true;
    }

    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        let removed = self.entries.shift_remove(name);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Forgets pending changes without reverting them in memory.
    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

//! Filter engine
//!
//! Evaluates operator constraints against event records. A constraint binds
//! a dotted field path to a free-text pattern; an event passes when the
//! value at every constrained path contains its pattern, ignoring case.

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::models::Event;
use crate::schema::PATH_SEPARATOR;

/// Outcome of resolving a field path against an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    /// A key along the path is absent, or an intermediate value is not an object
    Missing,
    /// The path exists; the value may still be null
    Found(&'a Value),
}

impl<'a> Lookup<'a> {
    /// The located value, treating a found null as absent
    pub fn non_null(self) -> Option<&'a Value> {
        match self {
            Lookup::Found(Value::Null) | Lookup::Missing => None,
            Lookup::Found(value) => Some(value),
        }
    }
}

/// Resolve `path` by sequential key lookup from the event root.
pub fn resolve_path<'a>(event: &'a Event, path: &str) -> Lookup<'a> {
    let mut current = event.as_value();
    for key in path.split(PATH_SEPARATOR) {
        match current {
            Value::Object(map) => match map.get(key) {
                Some(next) => current = next,
                None => return Lookup::Missing,
            },
            _ => return Lookup::Missing,
        }
    }
    Lookup::Found(current)
}

/// Textual form of a value used for matching.
///
/// Strings are taken verbatim; arrays and objects render as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// A single compiled constraint (pattern already lower-cased)
#[derive(Debug, Clone)]
struct Criterion<'c> {
    field: &'c str,
    needle: String,
}

impl Criterion<'_> {
    fn matches(&self, event: &Event) -> bool {
        match resolve_path(event, self.field).non_null() {
            Some(value) => stringify(value).to_lowercase().contains(&self.needle),
            None => false,
        }
    }
}

/// Check one constraint against one event.
pub fn matches_constraint(event: &Event, field: &str, pattern: &str) -> bool {
    Criterion {
        field,
        needle: pattern.to_lowercase(),
    }
    .matches(event)
}

/// Active field -> pattern constraints
///
/// Blank patterns are never stored: setting one removes the field's entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    entries: BTreeMap<String, String>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the constraint for `field`.
    pub fn set(&mut self, field: impl Into<String>, pattern: impl Into<String>) {
        let field = field.into();
        let pattern = pattern.into();
        if pattern.trim().is_empty() {
            self.entries.remove(&field);
        } else {
            self.entries.insert(field, pattern);
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.entries.remove(field)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn compile(&self) -> Vec<Criterion<'_>> {
        self.entries
            .iter()
            .map(|(field, pattern)| Criterion {
                field,
                needle: pattern.to_lowercase(),
            })
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Constraints
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut constraints = Constraints::new();
        for (field, pattern) in iter {
            constraints.set(field, pattern);
        }
        constraints
    }
}

/// A `path=pattern` constraint as given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintArg {
    pub field: String,
    pub pattern: String,
}

impl FromStr for ConstraintArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (field, pattern) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected PATH=PATTERN, got {:?}", s))?;
        let field = field.trim();
        if field.is_empty() {
            return Err(anyhow!("empty field path in {:?}", s));
        }
        Ok(Self {
            field: field.to_string(),
            pattern: pattern.to_string(),
        })
    }
}

impl FromIterator<ConstraintArg> for Constraints {
    fn from_iter<I: IntoIterator<Item = ConstraintArg>>(iter: I) -> Self {
        iter.into_iter().map(|arg| (arg.field, arg.pattern)).collect()
    }
}

/// Select the events passing every active constraint, preserving order.
pub fn apply_filters<'a>(events: &'a [Event], constraints: &Constraints) -> Vec<&'a Event> {
    if constraints.is_empty() {
        return events.iter().collect();
    }
    let criteria = constraints.compile();
    events
        .iter()
        .filter(|event| criteria.iter().all(|c| c.matches(event)))
        .collect()
}

/// Indices of the events passing every active constraint.
pub fn filter_indices(events: &[Event], constraints: &Constraints) -> Vec<usize> {
    if constraints.is_empty() {
        return (0..events.len()).collect();
    }
    let criteria = constraints.compile();
    events
        .iter()
        .enumerate()
        .filter(|(_, event)| criteria.iter().all(|c| c.matches(event)))
        .map(|(idx, _)| idx)
        .collect()
}

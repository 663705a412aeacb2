//! Schema discovery over heterogeneous event records
//!
//! Walks every event, records each reachable leaf as a dotted field path and
//! remembers which protocol categories produced a value there. The result is
//! recomputed from scratch for every event collection; nothing is carried
//! over between scans.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::Event;

/// Separator between keys of a field path
pub const PATH_SEPARATOR: char = '.';

/// Discovered field paths and their provenance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    /// Distinct field paths, lexicographically sorted
    pub fields: Vec<String>,
    /// Field path -> uppercased categories that emitted a non-null value there
    pub provenance: BTreeMap<String, BTreeSet<String>>,
}

impl Schema {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.provenance.contains_key(field)
    }

    pub fn categories(&self, field: &str) -> Option<&BTreeSet<String>> {
        self.provenance.get(field)
    }

    /// Comma-joined categories for a field, as shown next to the filter input
    pub fn provenance_label(&self, field: &str) -> String {
        self.provenance
            .get(field)
            .map(|set| set.iter().map(String::as_str).collect::<Vec<_>>().join(", "))
            .unwrap_or_default()
    }
}

/// Derive the schema of a full event collection.
pub fn discover_schema(events: &[Event]) -> Schema {
    let mut provenance: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for event in events {
        let Some(root) = event.fields() else {
            continue;
        };
        let category = event.category();
        let mut path = String::new();
        visit_object(root, &mut path, &category, &mut provenance);
    }

    Schema {
        fields: provenance.keys().cloned().collect(),
        provenance,
    }
}

fn visit_object(
    object: &Map<String, Value>,
    path: &mut String,
    category: &str,
    provenance: &mut BTreeMap<String, BTreeSet<String>>,
) {
    for (key, value) in object {
        let prefix_len = path.len();
        if !path.is_empty() {
            path.push(PATH_SEPARATOR);
        }
        path.push_str(key);

        match value {
            Value::Null => {}
            Value::Object(child) => visit_object(child, path, category, provenance),
            // Arrays are leaves, never descended into.
            Value::Array(_) | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                match provenance.get_mut(path.as_str()) {
                    Some(set) => {
                        if !set.contains(category) {
                            set.insert(category.to_string());
                        }
                    }
                    None => {
                        provenance.insert(path.clone(), BTreeSet::from([category.to_string()]));
                    }
                }
            }
        }

        path.truncate(prefix_len);
    }
}

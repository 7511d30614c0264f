//! Patch merging for the configuration document.

use serde_json::{Map, Value};

/// A configuration update: a partial document
#[derive(Debug, Clone)]
pub enum Patch {
    Document(Map<String, Value>),
}

impl Patch {
    /// Patch touching a single top-level key
    #[cfg(test)]
    pub fn entry(key: impl Into<String>, value: Value) -> Self {
        let mut map = Map::new();
        map.insert(key.into(), value);
        Patch::Document(map)
    }

    fn into_entries(self) -> Map<String, Value> {
        match self {
            Patch::Document(map) => map,
        }
    }
}

impl From<Map<String, Value>> for Patch {
    fn from(map: Map<String, Value>) -> Self {
        Patch::Document(map)
    }
}

/// Apply a patch to the document in place.
///
/// Object values landing on an existing object are merged one level deep,
/// patch winning per inner key. Everything else replaces the old value.
/// Keys are never removed. Returns the top-level keys whose value changed.
pub fn merge_patch(document: &mut Map<String, Value>, patch: Patch) -> Vec<String> {
    let mut mutated = Vec::new();

    for (key, value) in patch.into_entries() {
        let changed = match document.get_mut(&key) {
            Some(existing) => merge_value(existing, value),
            None => {
                document.insert(key.clone(), value);
                true
            }
        };

        if changed && !mutated.contains(&key) {
            mutated.push(key);
        }
    }

    mutated
}

fn merge_value(existing: &mut Value, value: Value) -> bool {
    match (existing, value) {
        (Value::Object(existing), Value::Object(inner)) => {
            let mut changed = false;
            for (inner_key, inner_value) in inner {
                if existing.get(&inner_key) != Some(&inner_value) {
                    existing.insert(inner_key, inner_value);
                    changed = true;
                }
            }
            changed
        }
        (existing, value) => {
            if *existing == value {
                return false;
            }
            *existing = value;
            true
        }
    }
}

/// Insert defaults for missing top-level keys. Inner keys are only filled in
/// for the named `sections`; other objects are left exactly as found.
/// Returns true if anything was added.
pub fn fill_missing(
    document: &mut Map<String, Value>,
    defaults: &Map<String, Value>,
    sections: &[&str],
) -> bool {
    let mut added = false;
    for (key, default) in defaults {
        match document.get_mut(key) {
            None => {
                document.insert(key.clone(), default.clone());
                added = true;
            }
            Some(Value::Object(existing)) if sections.contains(&key.as_str()) => {
                if let Value::Object(inner_defaults) = default {
                    for (inner_key, inner_default) in inner_defaults {
                        if !existing.contains_key(inner_key) {
                            existing.insert(inner_key.clone(), inner_default.clone());
                            added = true;
                        }
                    }
                }
            }
            Some(_) => {}
        }
    }
    added
}

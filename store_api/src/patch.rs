use serde_json::{Map, Value};

use crate::Fields;

/// Value written for one field of a [`Patch`].
#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    Set(Value),
    /// Resolved by the store to its own clock (milliseconds since epoch).
    ServerTimestamp,
}

/// Ordered set of field writes. Paths may be dotted to address nested
/// objects; intermediate objects are created as needed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    entries: Vec<(String, PatchValue)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((path.into(), PatchValue::Set(value.into())));
        self
    }

    pub fn server_timestamp(mut self, path: impl Into<String>) -> Self {
        self.entries.push((path.into(), PatchValue::ServerTimestamp));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, PatchValue)] {
        &self.entries
    }

    /// Merge the patch into `fields`, stamping server timestamps with `now_ms`.
    pub fn apply(&self, fields: &mut Fields, now_ms: i64) {
        for (path, value) in &self.entries {
            let value = match value {
                PatchValue::Set(v) => v.clone(),
                PatchValue::ServerTimestamp => Value::from(now_ms),
            };
            set_path(fields, path, value);
        }
    }
}

/// Read a value by dotted path.
pub fn get_path<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Write a value by dotted path, replacing non-object intermediates.
pub fn set_path(fields: &mut Fields, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            fields.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = fields
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                set_path(inner, rest, value);
            }
        }
    }
}

/// Add `delta` to the integer at `path`. Returns `false` when the current
/// value exists but is not an integer, leaving `fields` untouched.
pub fn apply_increment(fields: &mut Fields, path: &str, delta: i64) -> bool {
    let current = match get_path(fields, path) {
        None | Some(Value::Null) => 0,
        Some(v) => match v.as_i64() {
            Some(n) => n,
            None => return false,
        },
    };
    set_path(fields, path, Value::from(current.saturating_add(delta)));
    true
}

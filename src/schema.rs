//! Keyed-array schema registry: a small in-memory map from an array's path
//! to the field that identifies its elements, consulted by the facade while
//! indexing a patch.

use std::collections::HashMap;

use crate::path::KPath;

/// Maps an array's kinded path to the field name that keys its elements.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    keyed_arrays: HashMap<KPath, String>,
}

impl Schema {
    pub fn new() -> Schema {
        Schema { keyed_arrays: HashMap::new() }
    }

    /// Register `path` (the array's own kpath, not its parent) as keyed by
    /// `key_field`. Returns `&mut Self` for builder-style chaining.
    pub fn register_keyed_array(&mut self, path: KPath, key_field: impl Into<String>) -> &mut Self {
        self.keyed_arrays.insert(path, key_field.into());
        self
    }

    pub fn key_field_for(&self, array_path: &KPath) -> Option<&str> {
        self.keyed_arrays.get(array_path).map(|s| s.as_str())
    }
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod schema_test;

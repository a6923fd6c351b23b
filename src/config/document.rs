use crate::error::{ConfigError, PersistenceError};
use crate::models::FieldPath;
use serde_yaml_ng::{Mapping, Value};

/// The whole configuration as an untyped tree.
///
/// Sections are mappings and leaves are strings. Models bind typed trees to
/// sections of the document (see [`Model`](crate::models::Model)); everything
/// they do not own is carried through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    root: Value,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self {
            root: Value::Mapping(Mapping::new()),
        }
    }

    /// # Errors
    /// Returns [`PersistenceError::Malformed`] unless the root is a mapping; an
    /// empty (null) document is accepted as an empty mapping.
    pub fn from_value(root: Value) -> Result<Self, PersistenceError> {
        match root {
            Value::Mapping(_) => Ok(Self { root }),
            Value::Null => Ok(Self::new()),
            _ => Err(PersistenceError::Malformed {
                path: String::new(),
                reason: "document root must be a mapping".to_string(),
            }),
        }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, PersistenceError> {
        let root: Value = serde_yaml_ng::from_str(contents).map_err(|source| PersistenceError::Parse {
            path: Default::default(),
            source,
        })?;
        Self::from_value(root)
    }

    pub fn to_yaml_string(&self) -> Result<String, PersistenceError> {
        serde_yaml_ng::to_string(&self.root).map_err(PersistenceError::Serialize)
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.segments() {
            current = current.as_mapping()?.get(segment.as_str())?;
        }
        Some(current)
    }

    /// Scalar at `path` in its string form.
    pub fn get_str(&self, path: &FieldPath) -> Option<String> {
        self.get(path).and_then(scalar_to_string)
    }

    /// Replace the value at `path`, creating intermediate sections as needed.
    ///
    /// # Errors
    /// Returns [`PersistenceError::Malformed`] if an intermediate node exists but
    /// is not a section, or if the root would be replaced by anything but a
    /// mapping.
    pub fn set(&mut self, path: &FieldPath, value: Value) -> Result<(), ConfigError> {
        if path.is_root() && !value.is_mapping() {
            return Err(PersistenceError::Malformed {
                path: path.to_string(),
                reason: "document root must be a mapping".to_string(),
            }
            .into());
        }

        let mut current = &mut self.root;
        for segment in path.segments() {
            let map = ensure_mapping(current).ok_or_else(|| PersistenceError::Malformed {
                path: path.to_string(),
                reason: format!("'{}' is not nested under a section", segment),
            })?;
            if !map.contains_key(segment.as_str()) {
                map.insert(Value::String(segment.clone()), Value::Null);
            }
            current = map
                .get_mut(segment.as_str())
                .ok_or_else(|| ConfigError::PathNotFound(path.to_string()))?;
        }
        *current = value;
        Ok(())
    }

    pub fn remove(&mut self, path: &FieldPath) -> Option<Value> {
        let parent = path.parent()?;
        let name = path.name()?;
        let mut current = &mut self.root;
        for segment in parent.segments() {
            current = current.as_mapping_mut()?.get_mut(segment.as_str())?;
        }
        current.as_mapping_mut()?.remove(name)
    }

    /// Top-level section names, in document order.
    pub fn section_names(&self) -> Vec<String> {
        self.root
            .as_mapping()
            .map(|m| m.keys().filter_map(scalar_to_string).collect())
            .unwrap_or_default()
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.root.as_mapping()?.get(name)
    }
}

fn ensure_mapping(value: &mut Value) -> Option<&mut Mapping> {
    if value.is_null() {
        *value = Value::Mapping(Mapping::new());
    }
    value.as_mapping_mut()
}

/// String form of a scalar leaf: booleans become `"0"`/`"1"`, null is empty.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

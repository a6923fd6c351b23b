use super::field::{ArrayField, ContainerField, FieldNode, ScalarField};
use super::path::FieldPath;
use crate::config::document::{ConfigDocument, scalar_to_string};
use crate::error::{PersistenceError, Result};
use crate::validation::{ValidationMessages, ValidationRunner};
use serde_yaml_ng::{Mapping, Value};

/// A typed tree bound to one section of the configuration document.
///
/// The lifecycle is: [`load`](Self::load) from the document, mutate the tree,
/// [`perform_validation`](Self::perform_validation), and only when that returns
/// no messages, [`serialize_to_config`](Self::serialize_to_config), save the
/// store and [`commit`](Self::commit). None of the model methods saves on the
/// caller's behalf.
pub trait Model {
    /// Dotted location of the model's section, e.g. `OPNsense.unboundplus`.
    fn mount(&self) -> &str;

    fn root(&self) -> &ContainerField;

    fn root_mut(&mut self) -> &mut ContainerField;

    /// Field-level pass over the model tree. Not meant to be overridden;
    /// overrides of [`perform_validation`](Self::perform_validation) call it
    /// first.
    fn base_validation(&self, full_model: bool) -> Result<ValidationMessages> {
        ValidationRunner::new(self.root()).validate(full_model)
    }

    /// Validate the model. Models with cross-model rules override this, run
    /// [`base_validation`](Self::base_validation) and append their own messages.
    ///
    /// # Errors
    /// Only for misconfigured validators; failed checks are returned as messages.
    fn perform_validation(&self, _config: &ConfigDocument, full_model: bool) -> Result<ValidationMessages> {
        self.base_validation(full_model)
    }

    /// Bind the mounted section into the tree. Loaded values become the
    /// baseline for change tracking.
    ///
    /// # Errors
    /// Returns [`PersistenceError::Malformed`] when the section's shape does not
    /// fit the model.
    fn load(&mut self, config: &ConfigDocument) -> Result<()> {
        let mount = FieldPath::parse(self.mount());
        let section = config.get(&mount);
        bind_container(self.root_mut(), section, &mount)?;
        tracing::debug!("Loaded model {}", mount);
        Ok(())
    }

    /// Write the tree into the mounted section, replacing what was there.
    fn serialize_to_config(&self, config: &mut ConfigDocument) -> Result<()> {
        let mount = FieldPath::parse(self.mount());
        config.set(&mount, container_to_value(self.root()))?;
        tracing::debug!("Serialized model {} into configuration", mount);
        Ok(())
    }

    /// Adopt the current values as the new baseline, after a successful save.
    fn commit(&mut self) {
        self.root_mut().commit_baseline();
    }

    fn is_changed(&self) -> bool {
        self.root().is_field_changed()
    }
}

fn malformed(path: &FieldPath, reason: &str) -> PersistenceError {
    PersistenceError::Malformed {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

fn bind_container(container: &mut ContainerField, value: Option<&Value>, path: &FieldPath) -> Result<()> {
    let mapping = match value {
        None | Some(Value::Null) => None,
        Some(Value::Mapping(mapping)) => Some(mapping),
        Some(_) => return Err(malformed(path, "expected a section").into()),
    };

    for (name, child) in container.children_mut() {
        let child_value = mapping.and_then(|m| m.get(name));
        bind_node(child, child_value, &path.child(name))?;
    }

    if let Some(mapping) = mapping {
        for key in mapping.keys().filter_map(scalar_to_string) {
            if container.child(&key).is_none() {
                tracing::debug!("Ignoring unknown key {}", path.child(&key));
            }
        }
    }
    Ok(())
}

fn bind_node(node: &mut FieldNode, value: Option<&Value>, path: &FieldPath) -> Result<()> {
    match node {
        FieldNode::Scalar(scalar) => bind_scalar(scalar, value, path),
        FieldNode::Container(container) => bind_container(container, value, path),
        FieldNode::Array(array) => bind_array(array, value, path),
    }
}

fn bind_scalar(scalar: &mut ScalarField, value: Option<&Value>, path: &FieldPath) -> Result<()> {
    match value {
        None => scalar.load_value(None),
        Some(value) => {
            let text = scalar_to_string(value).ok_or_else(|| malformed(path, "expected a scalar value"))?;
            scalar.load_value(Some(text));
        }
    }
    Ok(())
}

fn bind_array(array: &mut ArrayField, value: Option<&Value>, path: &FieldPath) -> Result<()> {
    array.clear();
    match value {
        None | Some(Value::Null) => {}
        Some(Value::Mapping(rows)) => {
            for (id, row_value) in rows {
                let id = scalar_to_string(id)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| malformed(path, "row ids must be non-empty scalars"))?;
                let row_path = path.child(&id);
                let row = array.add_row_with_id(id)?;
                bind_container(row, Some(row_value), &row_path)?;
            }
        }
        Some(_) => return Err(malformed(path, "expected a mapping of rows").into()),
    }
    array.mark_loaded();
    Ok(())
}

fn container_to_value(container: &ContainerField) -> Value {
    let mut mapping = Mapping::new();
    for (name, child) in container.children() {
        mapping.insert(Value::String(name.to_string()), node_to_value(child));
    }
    Value::Mapping(mapping)
}

fn node_to_value(node: &FieldNode) -> Value {
    match node {
        FieldNode::Scalar(scalar) => Value::String(scalar.get_value().to_string()),
        FieldNode::Container(container) => container_to_value(container),
        FieldNode::Array(array) => {
            let mut rows = Mapping::new();
            for (id, row) in array.rows() {
                rows.insert(Value::String(id.to_string()), container_to_value(row));
            }
            Value::Mapping(rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    struct TestModel {
        root: ContainerField,
    }

    impl TestModel {
        fn new() -> Self {
            let host = ContainerField::new()
                .with_child("name", ScalarField::text())
                .unwrap()
                .with_child("enabled", ScalarField::boolean().with_default("1"))
                .unwrap();
            let root = ContainerField::new()
                .with_child(
                    "general",
                    ContainerField::new()
                        .with_child("port", ScalarField::port().with_default("53"))
                        .unwrap(),
                )
                .unwrap()
                .with_child("hosts", ArrayField::new(host))
                .unwrap();
            Self { root }
        }
    }

    impl Model for TestModel {
        fn mount(&self) -> &str {
            "test.model"
        }

        fn root(&self) -> &ContainerField {
            &self.root
        }

        fn root_mut(&mut self) -> &mut ContainerField {
            &mut self.root
        }
    }

    const DOC: &str = r#"
test:
  model:
    general:
      port: 5353
      stale: value
    hosts:
      b2d6:
        name: alpha
        enabled: false
      07aa:
        name: beta
other:
  keep: me
"#;

    #[test]
    fn test_load_binds_values_and_baseline() {
        let doc = ConfigDocument::from_yaml_str(DOC).unwrap();
        let mut model = TestModel::new();
        model.load(&doc).unwrap();

        let root = model.root();
        assert_eq!(root.get_value(&"general.port".into()), Some("5353"));
        assert_eq!(root.get_value(&"hosts.b2d6.enabled".into()), Some("0"));
        assert_eq!(root.get_value(&"hosts.07aa.enabled".into()), Some("1"));
        assert!(!model.is_changed());

        let ids: Vec<_> = root
            .array(&"hosts".into())
            .unwrap()
            .row_ids()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["b2d6", "07aa"]);
    }

    #[test]
    fn test_missing_section_loads_defaults() {
        let mut model = TestModel::new();
        model.load(&ConfigDocument::new()).unwrap();
        assert_eq!(model.root().get_value(&"general.port".into()), Some("53"));
        assert!(!model.is_changed());
    }

    #[test]
    fn test_serialize_round_trips_and_keeps_other_sections() {
        let mut doc = ConfigDocument::from_yaml_str(DOC).unwrap();
        let mut model = TestModel::new();
        model.load(&doc).unwrap();
        model.root_mut().set_value(&"general.port".into(), "853").unwrap();
        model.serialize_to_config(&mut doc).unwrap();

        assert_eq!(doc.get_str(&"test.model.general.port".into()).as_deref(), Some("853"));
        assert!(doc.get(&"test.model.general.stale".into()).is_none());
        assert_eq!(doc.get_str(&"other.keep".into()).as_deref(), Some("me"));

        let mut reloaded = TestModel::new();
        reloaded.load(&doc).unwrap();
        assert_eq!(reloaded.root().flatten(), model.root().flatten());
    }

    #[test]
    fn test_commit_resets_change_tracking() {
        let mut model = TestModel::new();
        model.load(&ConfigDocument::new()).unwrap();
        model.root_mut().set_value(&"general.port".into(), "853").unwrap();
        assert!(model.is_changed());
        model.commit();
        assert!(!model.is_changed());
    }

    #[test]
    fn test_malformed_section() {
        let doc = ConfigDocument::from_yaml_str("test:\n  model:\n    general: flat\n").unwrap();
        let mut model = TestModel::new();
        let result = model.load(&doc);
        assert!(matches!(
            result,
            Err(ConfigError::Persistence(PersistenceError::Malformed { .. }))
        ));
    }
}

use super::{SharedValidator, Validation, ValidationMessages};
use crate::error::{ConfigError, Result};
use crate::models::{ContainerField, FieldPath, NodeRef};

/// Runs the validators of a model tree.
///
/// In a full pass every validator on every node is evaluated. In a partial pass
/// only nodes whose value differs from the loaded baseline are checked, which is
/// what an API form submission wants: report problems with what the user just
/// edited, not with untouched settings.
///
/// The runner never mutates the tree and never persists anything.
#[derive(Debug)]
pub struct ValidationRunner<'a> {
    root: &'a ContainerField,
    extra: Vec<(FieldPath, SharedValidator)>,
}

impl<'a> ValidationRunner<'a> {
    pub fn new(root: &'a ContainerField) -> Self {
        Self {
            root,
            extra: Vec::new(),
        }
    }

    /// Register an additional validator for `path`, subject to the same
    /// changed-only rule as validators attached to the node itself.
    pub fn add(&mut self, path: impl Into<FieldPath>, validator: SharedValidator) -> &mut Self {
        self.extra.push((path.into(), validator));
        self
    }

    /// # Errors
    /// Returns [`ConfigError::Configuration`] if a validator is misconfigured or
    /// an extra validator was registered for a path that does not exist.
    pub fn validate(&self, full_model: bool) -> Result<ValidationMessages> {
        let mut jobs: Vec<(FieldPath, SharedValidator)> = Vec::new();
        collect(NodeRef::Container(self.root), FieldPath::root(), full_model, &mut jobs);

        for (path, validator) in &self.extra {
            let node = self.root.node(path).ok_or_else(|| {
                ConfigError::Configuration(format!("validator registered for unknown field '{}'", path))
            })?;
            if full_model || node.is_field_changed() {
                jobs.push((path.clone(), validator.clone()));
            }
        }

        tracing::debug!(
            "Running {} validation pass with {} check(s)",
            if full_model { "full" } else { "partial" },
            jobs.len()
        );

        let mut validation = Validation::new(self.root);
        for (path, validator) in &jobs {
            validator.validate(&mut validation, path)?;
        }

        let messages = validation.into_messages();
        if !messages.is_empty() {
            tracing::info!("Validation produced {} message(s)", messages.len());
        }
        Ok(messages)
    }
}

/// Depth-first, declaration order. Unchanged subtrees are skipped in a partial
/// pass since a container only counts as changed through its children.
fn collect(node: NodeRef<'_>, path: FieldPath, full_model: bool, jobs: &mut Vec<(FieldPath, SharedValidator)>) {
    if !full_model && !node.is_field_changed() {
        return;
    }

    jobs.extend(node.validators().into_iter().map(|v| (path.clone(), v)));

    match node {
        NodeRef::Scalar(_) => {}
        NodeRef::Container(container) => {
            for (name, child) in container.children() {
                collect(child.as_node_ref(), path.child(name), full_model, jobs);
            }
        }
        NodeRef::Array(array) => {
            for (id, row) in array.rows() {
                collect(NodeRef::Container(row), path.child(id.as_str()), full_model, jobs);
            }
        }
    }
}

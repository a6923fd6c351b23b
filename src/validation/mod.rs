//! Field validation for model trees.
//!
//! - [`Validator`]: a rule attached to a node, invoked once per validation pass
//! - [`Validation`]: the context handed to validators; read access to the tree plus
//!   the message sink
//! - [`ValidationMessage`] / [`ValidationMessages`]: `{field, message}` pairs in
//!   discovery order
//! - [`ValidationRunner`]: full and changed-fields-only passes
//! - [`UniqueConstraint`]: composite-key uniqueness across array rows
//!
//! A failed check is never an error. Validators only return `Err` when they are
//! misconfigured, e.g. pointing at a field that does not exist.

pub mod runner;
pub mod unique;
pub mod validators;

use crate::error::Result;
use crate::models::{ArrayField, ContainerField, FieldPath, NodeRef};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub use runner::ValidationRunner;
pub use unique::UniqueConstraint;
pub use validators::{
    ChoiceValidator, DependsOnValidator, IntegerRangeValidator, NetworkValidator,
    RegexValidator, RequiredValidator,
};

/// A validation rule bound to one node of a model tree.
///
/// Implementations must not keep state between invocations.
pub trait Validator: fmt::Debug + Send + Sync {
    /// Inspect the node at `field` and append a message for every failure.
    ///
    /// # Errors
    /// Returns [`ConfigError::Configuration`](crate::error::ConfigError::Configuration)
    /// when the validator cannot be applied to the tree it was given.
    fn validate(&self, validation: &mut Validation<'_>, field: &FieldPath) -> Result<()>;
}

/// Validators are shared between a row template and every row cloned from it.
pub type SharedValidator = Arc<dyn Validator>;

/// One failed check, as surfaced to the API layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationMessage {
    pub field: String,
    pub message: String,
}

impl ValidationMessage {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Ordered collection of messages produced by one validation pass.
///
/// An empty collection means the data may be persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationMessages(Vec<ValidationMessage>);

impl ValidationMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_message(&mut self, message: ValidationMessage) {
        self.0.push(message);
    }

    pub fn extend(&mut self, other: ValidationMessages) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationMessage> {
        self.0.iter()
    }

    /// Messages attributed to a single field path.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationMessage> {
        self.0.iter().filter(move |m| m.field == field)
    }

    pub fn into_vec(self) -> Vec<ValidationMessage> {
        self.0
    }
}

impl IntoIterator for ValidationMessages {
    type Item = ValidationMessage;
    type IntoIter = std::vec::IntoIter<ValidationMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationMessages {
    type Item = &'a ValidationMessage;
    type IntoIter = std::slice::Iter<'a, ValidationMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<ValidationMessage> for ValidationMessages {
    fn from_iter<T: IntoIterator<Item = ValidationMessage>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Context of a single validation pass.
///
/// Gives validators read-only access to the tree being validated and collects
/// the messages they append. The tree is never mutated during a pass.
#[derive(Debug)]
pub struct Validation<'a> {
    root: &'a ContainerField,
    messages: ValidationMessages,
}

impl<'a> Validation<'a> {
    pub fn new(root: &'a ContainerField) -> Self {
        Self {
            root,
            messages: ValidationMessages::new(),
        }
    }

    pub fn root(&self) -> &'a ContainerField {
        self.root
    }

    pub fn node(&self, path: &FieldPath) -> Option<NodeRef<'a>> {
        self.root.node(path)
    }

    /// Current value of the scalar at `path`, `None` when the path does not
    /// resolve to a scalar.
    pub fn get_value(&self, path: &FieldPath) -> Option<&'a str> {
        match self.root.node(path)? {
            NodeRef::Scalar(scalar) => Some(scalar.get_value()),
            _ => None,
        }
    }

    pub fn array(&self, path: &FieldPath) -> Option<&'a ArrayField> {
        match self.root.node(path)? {
            NodeRef::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn append_message(&mut self, message: ValidationMessage) {
        tracing::trace!("Validation failed for {}: {}", message.field, message.message);
        self.messages.append_message(message);
    }

    pub fn messages(&self) -> &ValidationMessages {
        &self.messages
    }

    pub fn into_messages(self) -> ValidationMessages {
        self.messages
    }
}

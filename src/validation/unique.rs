use super::{Validation, ValidationMessage, Validator};
use crate::error::{ConfigError, Result};
use crate::models::{ArrayField, FieldPath, NodeRef};
use std::collections::HashSet;

/// Placeholder in the message template replaced by the duplicated value.
pub const VALUE_PLACEHOLDER: &str = "{value}";

/// Rejects array rows sharing the same composite key.
///
/// The key of a row is its primary field value followed by every `add_fields`
/// value in declaration order. Rows are scanned in stored order: the first
/// occurrence of a key wins and every later occurrence gets one message on its
/// primary field.
///
/// With `values_required` off, a row whose primary value is empty never takes
/// part in the comparison. Empty additional fields are ordinary key components,
/// so `(x, "")` still collides with `(x, "")`.
#[derive(Debug, Clone)]
pub struct UniqueConstraint {
    field: String,
    add_fields: Vec<String>,
    values_required: bool,
    message: String,
}

impl UniqueConstraint {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            add_fields: Vec::new(),
            values_required: false,
            message: "This value must be unique.".to_string(),
        }
    }

    pub fn with_add_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn values_required(mut self, required: bool) -> Self {
        self.values_required = required;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn add_fields(&self) -> &[String] {
        &self.add_fields
    }

    /// Key fields without repeats, primary first.
    fn key_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.field.as_str()];
        for field in &self.add_fields {
            if !fields.contains(&field.as_str()) {
                fields.push(field);
            }
        }
        fields
    }

    /// Run the check against `array` located at `array_path`.
    ///
    /// # Errors
    /// Returns [`ConfigError::Configuration`] when a key field is not a scalar
    /// of the row template.
    pub fn check(&self, array: &ArrayField, array_path: &FieldPath) -> Result<Vec<ValidationMessage>> {
        let key_fields = self.key_fields();
        for name in &key_fields {
            if !matches!(array.template().node(&FieldPath::parse(name)), Some(NodeRef::Scalar(_))) {
                return Err(ConfigError::Configuration(format!(
                    "unique constraint on '{}' references unknown field '{}'",
                    array_path, name
                )));
            }
        }

        let mut seen: HashSet<Vec<&str>> = HashSet::new();
        let mut messages = Vec::new();

        for (id, row) in array.rows() {
            let key: Vec<&str> = key_fields
                .iter()
                .map(|name| row.get_value(&FieldPath::parse(name)).unwrap_or_default())
                .collect();

            let primary = key[0];
            if primary.is_empty() && !self.values_required {
                continue;
            }

            if !seen.insert(key) {
                let field = array_path.child(id.as_str()).child(&self.field);
                messages.push(ValidationMessage::new(
                    field.to_string(),
                    self.message.replace(VALUE_PLACEHOLDER, primary),
                ));
            }
        }

        if !messages.is_empty() {
            tracing::debug!(
                "Unique constraint on {}.{} found {} duplicate row(s)",
                array_path,
                self.field,
                messages.len()
            );
        }
        Ok(messages)
    }
}

impl Validator for UniqueConstraint {
    fn validate(&self, validation: &mut Validation<'_>, field: &FieldPath) -> Result<()> {
        let array = validation.array(field).ok_or_else(|| {
            ConfigError::Configuration(format!(
                "unique constraint must be attached to an array field, got '{}'",
                field
            ))
        })?;
        for message in self.check(array, field)? {
            validation.append_message(message);
        }
        Ok(())
    }
}

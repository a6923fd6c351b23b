use super::{Validation, ValidationMessage, Validator};
use crate::error::{ConfigError, Result};
use crate::models::FieldPath;
use regex::Regex;
use std::net::IpAddr;

/// Resolve the value a scalar validator is bound to.
fn bound_value<'a>(
    validation: &Validation<'a>,
    field: &FieldPath,
    validator: &str,
) -> Result<&'a str> {
    validation.get_value(field).ok_or_else(|| {
        ConfigError::Configuration(format!("{} bound to non-scalar field '{}'", validator, field))
    })
}

/// Fails when the field is empty.
#[derive(Debug, Clone)]
pub struct RequiredValidator {
    message: String,
}

impl RequiredValidator {
    pub fn new() -> Self {
        Self {
            message: "A value is required.".to_string(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Default for RequiredValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for RequiredValidator {
    fn validate(&self, validation: &mut Validation<'_>, field: &FieldPath) -> Result<()> {
        let value = bound_value(validation, field, "required validator")?;
        if value.is_empty() {
            validation.append_message(ValidationMessage::new(field.to_string(), &self.message));
        }
        Ok(())
    }
}

/// Fails when a non-empty value does not match the pattern.
#[derive(Debug, Clone)]
pub struct RegexValidator {
    pattern: Regex,
    message: String,
}

impl RegexValidator {
    /// # Errors
    /// Returns [`ConfigError::Configuration`] when `pattern` does not compile.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            ConfigError::Configuration(format!("invalid mask '{}': {}", pattern, e))
        })?;
        Ok(Self {
            pattern,
            message: "Value does not match the required format.".to_string(),
        })
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Validator for RegexValidator {
    fn validate(&self, validation: &mut Validation<'_>, field: &FieldPath) -> Result<()> {
        let value = bound_value(validation, field, "mask validator")?;
        if !value.is_empty() && !self.pattern.is_match(value) {
            validation.append_message(ValidationMessage::new(field.to_string(), &self.message));
        }
        Ok(())
    }
}

/// Fails when a non-empty value is not an integer within `min..=max`.
#[derive(Debug, Clone)]
pub struct IntegerRangeValidator {
    min: i64,
    max: i64,
    message: String,
}

impl IntegerRangeValidator {
    pub fn new(min: i64, max: i64) -> Self {
        Self {
            min,
            max,
            message: format!("Value must be an integer between {} and {}.", min, max),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Validator for IntegerRangeValidator {
    fn validate(&self, validation: &mut Validation<'_>, field: &FieldPath) -> Result<()> {
        let value = bound_value(validation, field, "integer validator")?;
        if value.is_empty() {
            return Ok(());
        }
        let in_range = value
            .trim()
            .parse::<i64>()
            .is_ok_and(|n| (self.min..=self.max).contains(&n));
        if !in_range {
            validation.append_message(ValidationMessage::new(field.to_string(), &self.message));
        }
        Ok(())
    }
}

/// Fails when a non-empty value is not one of the configured choices.
#[derive(Debug, Clone)]
pub struct ChoiceValidator {
    choices: Vec<String>,
    message: String,
}

impl ChoiceValidator {
    pub fn new<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            choices: choices.into_iter().map(Into::into).collect(),
            message: "Option not in list.".to_string(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Validator for ChoiceValidator {
    fn validate(&self, validation: &mut Validation<'_>, field: &FieldPath) -> Result<()> {
        let value = bound_value(validation, field, "option validator")?;
        if !value.is_empty() && !self.choices.iter().any(|c| c == value) {
            validation.append_message(ValidationMessage::new(field.to_string(), &self.message));
        }
        Ok(())
    }
}

/// Fails when a non-empty value is neither an IP address nor, if allowed, a
/// CIDR network.
#[derive(Debug, Clone)]
pub struct NetworkValidator {
    allow_cidr: bool,
    message: String,
}

impl NetworkValidator {
    pub fn new() -> Self {
        Self {
            allow_cidr: true,
            message: "Please specify a valid network address or segment.".to_string(),
        }
    }

    pub fn hosts_only(mut self) -> Self {
        self.allow_cidr = false;
        self.message = "Please specify a valid IP address.".to_string();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Default for NetworkValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn is_valid_network(value: &str, allow_cidr: bool) -> bool {
    match value.split_once('/') {
        None => value.parse::<IpAddr>().is_ok(),
        Some((address, prefix)) if allow_cidr => {
            let Ok(address) = address.parse::<IpAddr>() else {
                return false;
            };
            let Ok(prefix) = prefix.parse::<u8>() else {
                return false;
            };
            match address {
                IpAddr::V4(_) => prefix <= 32,
                IpAddr::V6(_) => prefix <= 128,
            }
        }
        Some(_) => false,
    }
}

impl Validator for NetworkValidator {
    fn validate(&self, validation: &mut Validation<'_>, field: &FieldPath) -> Result<()> {
        let value = bound_value(validation, field, "network validator")?;
        if !value.is_empty() && !is_valid_network(value, self.allow_cidr) {
            validation.append_message(ValidationMessage::new(field.to_string(), &self.message));
        }
        Ok(())
    }
}

/// Cross-field rule: when the bound field has a value, the named sibling must
/// have one as well.
#[derive(Debug, Clone)]
pub struct DependsOnValidator {
    sibling: String,
    message: String,
}

impl DependsOnValidator {
    pub fn new(sibling: impl Into<String>) -> Self {
        let sibling = sibling.into();
        Self {
            message: format!("This field requires '{}' to be set.", sibling),
            sibling,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Validator for DependsOnValidator {
    fn validate(&self, validation: &mut Validation<'_>, field: &FieldPath) -> Result<()> {
        let value = bound_value(validation, field, "dependency validator")?;
        let sibling_path = field.parent().unwrap_or_default().child(&self.sibling);
        let sibling = validation.get_value(&sibling_path).ok_or_else(|| {
            ConfigError::Configuration(format!(
                "dependency of '{}' references unknown field '{}'",
                field, sibling_path
            ))
        })?;

        if !value.is_empty() && sibling.is_empty() {
            validation.append_message(ValidationMessage::new(field.to_string(), &self.message));
        }
        Ok(())
    }
}

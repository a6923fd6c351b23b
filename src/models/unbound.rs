//! Unbound DNS resolver settings.
//!
//! Besides the field-level rules, the model refuses to enable Unbound on the
//! port Dnsmasq is already listening on, which is a rule spanning two
//! independently configured services.

use super::field::{ArrayField, ContainerField, RowId, ScalarField};
use super::model::Model;
use super::path::FieldPath;
use crate::config::document::ConfigDocument;
use crate::error::{ConfigError, Result};
use crate::validation::{UniqueConstraint, ValidationMessage, ValidationMessages};
use std::sync::Arc;

pub const UNBOUND_MOUNT: &str = "OPNsense.unboundplus";

/// Port Dnsmasq listens on when its section does not say otherwise.
pub const DNSMASQ_DEFAULT_PORT: &str = "53";

pub const PORT_CONFLICT_MESSAGE: &str =
    "Dnsmasq is still active on the same port. Disable it before enabling Unbound.";

const HOSTNAME_MASK: &str = r"^(\*|[a-zA-Z0-9_-]+)?$";

/// A host override as submitted by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOverride {
    pub hostname: String,
    pub domain: String,
    pub server: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct Unbound {
    root: ContainerField,
}

impl Unbound {
    /// Build the schema with defaults. Call [`Model::load`] to bind the
    /// current configuration.
    pub fn new() -> Result<Self> {
        let general = ContainerField::new()
            .with_child("enabled", ScalarField::boolean().with_default("0"))?
            .with_child("port", ScalarField::port().with_default("53").required(true))?
            .with_child("dnssec", ScalarField::boolean().with_default("0"))?
            .with_child("cache_size", ScalarField::integer(0, 1_048_576).with_default("0"))?;

        let host = ContainerField::new()
            .with_child("enabled", ScalarField::boolean().with_default("1"))?
            .with_child(
                "hostname",
                ScalarField::text().with_mask(HOSTNAME_MASK)?,
            )?
            .with_child("domain", ScalarField::text().required(true))?
            .with_child("server", ScalarField::network().required(true))?
            .with_child("description", ScalarField::text())?;

        let hosts = ArrayField::new(host).with_validator(Arc::new(
            UniqueConstraint::new("hostname")
                .with_add_fields(["domain"])
                .with_message("A host override for this hostname and domain already exists."),
        ));

        let root = ContainerField::new()
            .with_child("general", general)?
            .with_child("hosts", hosts)?;

        Ok(Self { root })
    }

    pub fn hosts(&self) -> Option<&ArrayField> {
        self.root.array(&FieldPath::parse("hosts"))
    }

    /// Append a host override row. The row is not validated here.
    pub fn add_host(&mut self, host: &HostOverride) -> Result<RowId> {
        let hosts = self
            .root
            .array_mut(&FieldPath::parse("hosts"))
            .ok_or_else(|| ConfigError::PathNotFound("hosts".to_string()))?;
        let id = hosts.add_row();
        if let Some(row) = hosts.row_mut(id.as_str()) {
            row.set_values([
                ("hostname", host.hostname.as_str()),
                ("domain", host.domain.as_str()),
                ("server", host.server.as_str()),
                ("description", host.description.as_str()),
            ])?;
        }
        Ok(id)
    }

    pub fn remove_host(&mut self, id: &str) -> bool {
        self.root
            .array_mut(&FieldPath::parse("hosts"))
            .and_then(|hosts| hosts.remove_row(id))
            .is_some()
    }

    fn is_enabled_in(value: Option<String>) -> bool {
        value.is_some_and(|v| !v.is_empty() && v != "0")
    }
}

impl Model for Unbound {
    fn mount(&self) -> &str {
        UNBOUND_MOUNT
    }

    fn root(&self) -> &ContainerField {
        &self.root
    }

    fn root_mut(&mut self) -> &mut ContainerField {
        &mut self.root
    }

    fn perform_validation(&self, config: &ConfigDocument, full_model: bool) -> Result<ValidationMessages> {
        let mut messages = self.base_validation(full_model)?;

        let enabled_path = FieldPath::parse("general.enabled");
        let port_path = FieldPath::parse("general.port");
        let enabled = self.root.scalar(&enabled_path);
        let port = self.root.scalar(&port_path);
        let (Some(enabled), Some(port)) = (enabled, port) else {
            return Ok(messages);
        };

        let dnsmasq_enabled = Self::is_enabled_in(config.get_str(&FieldPath::parse("dnsmasq.enable")));
        let dnsmasq_port = config
            .get_str(&FieldPath::parse("dnsmasq.port"))
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DNSMASQ_DEFAULT_PORT.to_string());

        for (path, node) in [(&enabled_path, enabled), (&port_path, port)] {
            if !(full_model || node.is_field_changed()) {
                continue;
            }
            if enabled.get_value() == "1" && dnsmasq_enabled && port.get_value() == dnsmasq_port {
                messages.append_message(ValidationMessage::new(path.to_string(), PORT_CONFLICT_MESSAGE));
            }
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(doc: &str) -> (Unbound, ConfigDocument) {
        let doc = ConfigDocument::from_yaml_str(doc).unwrap();
        let mut model = Unbound::new().unwrap();
        model.load(&doc).unwrap();
        (model, doc)
    }

    fn host(hostname: &str, domain: &str) -> HostOverride {
        HostOverride {
            hostname: hostname.to_string(),
            domain: domain.to_string(),
            server: "10.0.0.1".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let (model, doc) = loaded("{}");
        assert!(model.perform_validation(&doc, true).unwrap().is_empty());
    }

    #[test]
    fn test_port_conflict_when_enabling() {
        let (mut model, doc) = loaded("dnsmasq:\n  enable: '1'\n");
        model.root_mut().set_value(&"general.enabled".into(), "1").unwrap();

        let messages = model.perform_validation(&doc, false).unwrap();
        let fields: Vec<_> = messages.iter().map(|m| m.field.as_str()).collect();
        assert_eq!(fields, vec!["general.enabled"]);
        assert_eq!(messages.iter().next().unwrap().message, PORT_CONFLICT_MESSAGE);
    }

    #[test]
    fn test_full_pass_reports_both_fields() {
        let (mut model, doc) = loaded("dnsmasq:\n  enable: '1'\n  port: '5353'\n");
        model.root_mut().set_value(&"general.enabled".into(), "1").unwrap();
        model.root_mut().set_value(&"general.port".into(), "5353").unwrap();

        assert_eq!(model.perform_validation(&doc, true).unwrap().len(), 2);
    }

    #[test]
    fn test_no_conflict_on_other_port_or_disabled_dnsmasq() {
        let (mut model, doc) = loaded("dnsmasq:\n  enable: '1'\n  port: '5353'\n");
        model.root_mut().set_value(&"general.enabled".into(), "1").unwrap();
        assert!(model.perform_validation(&doc, true).unwrap().is_empty());

        let (mut model, doc) = loaded("dnsmasq:\n  enable: '0'\n");
        model.root_mut().set_value(&"general.enabled".into(), "1").unwrap();
        assert!(model.perform_validation(&doc, true).unwrap().is_empty());
    }

    #[test]
    fn test_unchanged_conflict_ignored_in_partial_pass() {
        let doc = "dnsmasq:\n  enable: '1'\nOPNsense:\n  unboundplus:\n    general:\n      enabled: '1'\n";
        let (model, doc) = loaded(doc);
        assert!(model.perform_validation(&doc, false).unwrap().is_empty());
        assert_eq!(model.perform_validation(&doc, true).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_host_override() {
        let (mut model, doc) = loaded("{}");
        model.add_host(&host("www", "example.com")).unwrap();
        let second = model.add_host(&host("www", "example.com")).unwrap();

        let messages = model.perform_validation(&doc, false).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages.iter().next().unwrap().field,
            format!("hosts.{}.hostname", second)
        );
    }

    #[test]
    fn test_wildcard_hosts_on_different_domains() {
        let (mut model, doc) = loaded("{}");
        model.add_host(&host("*", "a.example")).unwrap();
        model.add_host(&host("*", "b.example")).unwrap();
        model.add_host(&host("", "c.example")).unwrap();
        model.add_host(&host("", "c.example")).unwrap();
        assert!(model.perform_validation(&doc, false).unwrap().is_empty());
    }

    #[test]
    fn test_host_field_rules() {
        let (mut model, doc) = loaded("{}");
        let id = model
            .add_host(&HostOverride {
                hostname: "bad host".to_string(),
                domain: String::new(),
                server: "not-an-ip".to_string(),
                description: String::new(),
            })
            .unwrap();

        let messages = model.perform_validation(&doc, false).unwrap();
        let fields: Vec<_> = messages.iter().map(|m| m.field.clone()).collect();
        assert_eq!(
            fields,
            vec![
                format!("hosts.{}.hostname", id),
                format!("hosts.{}.domain", id),
                format!("hosts.{}.server", id),
            ]
        );
    }

    #[test]
    fn test_remove_host() {
        let (mut model, _doc) = loaded("{}");
        let id = model.add_host(&host("www", "example.com")).unwrap();
        assert!(model.remove_host(id.as_str()));
        assert!(!model.remove_host(id.as_str()));
        assert!(model.hosts().unwrap().is_empty());
    }
}

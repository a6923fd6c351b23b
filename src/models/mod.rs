//! Typed configuration models.
//!
//! - [`FieldNode`]: one node of a model tree, either a [`ScalarField`], a
//!   [`ContainerField`] of named children or an [`ArrayField`] of uniform rows
//! - [`FieldPath`]: dotted addresses such as `general.port` or
//!   `hosts.<row id>.hostname`
//! - [`Model`]: binds a tree to one section of the
//!   [`ConfigDocument`](crate::config::ConfigDocument) and hosts the
//!   `perform_validation` hook
//! - [`Unbound`]: the DNS resolver model
//!
//! # Change tracking
//!
//! Each scalar keeps the value it was loaded with. "Changed" is a plain
//! comparison against that baseline, so setting a value back to what was loaded
//! is not a change. Containers and arrays derive their state from their children.

pub mod field;
pub mod model;
pub mod path;
pub mod unbound;

pub use field::{
    ArrayField, ContainerField, FieldKind, FieldNode, NodeMut, NodeRef, RowId, ScalarField,
};
pub use model::Model;
pub use path::FieldPath;
pub use unbound::{HostOverride, Unbound};

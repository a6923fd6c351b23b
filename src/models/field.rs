use super::path::FieldPath;
use crate::error::{ConfigError, Result};
use crate::validation::{
    ChoiceValidator, IntegerRangeValidator, NetworkValidator, RegexValidator, RequiredValidator,
    SharedValidator,
};
use indexmap::IndexMap;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Value type of a scalar field.
///
/// Each kind contributes a built-in validator that only checks non-empty values;
/// emptiness is the concern of the required flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Stored as `"0"` / `"1"`.
    Boolean,
    Integer { min: i64, max: i64 },
    Port,
    Option { choices: Vec<String> },
    /// IP address or CIDR network.
    Network,
}

impl FieldKind {
    fn builtin_validator(&self) -> Option<SharedValidator> {
        match self {
            FieldKind::Text => None,
            FieldKind::Boolean => Some(Arc::new(
                ChoiceValidator::new(["0", "1"])
                    .with_message("Value should be a boolean (0 or 1)."),
            )),
            FieldKind::Integer { min, max } => Some(Arc::new(IntegerRangeValidator::new(*min, *max))),
            FieldKind::Port => Some(Arc::new(
                IntegerRangeValidator::new(1, 65535)
                    .with_message("Please specify a valid port number (1-65535)."),
            )),
            FieldKind::Option { choices } => {
                Some(Arc::new(ChoiceValidator::new(choices.iter().cloned())))
            }
            FieldKind::Network => Some(Arc::new(NetworkValidator::new())),
        }
    }

    fn coerce(&self, value: String) -> String {
        match self {
            FieldKind::Boolean => match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => "1".to_string(),
                "0" | "false" | "no" | "off" => "0".to_string(),
                _ => value,
            },
            FieldKind::Integer { .. } | FieldKind::Port => value.trim().to_string(),
            _ => value,
        }
    }
}

/// A leaf holding one text value.
///
/// Dirty tracking is a snapshot diff: the value loaded from the document is kept
/// as `baseline` and [`is_field_changed`](Self::is_field_changed) compares against
/// it. A field that was never loaded (e.g. part of a freshly added row) has no
/// baseline and always counts as changed.
#[derive(Debug, Clone)]
pub struct ScalarField {
    kind: FieldKind,
    value: String,
    baseline: Option<String>,
    default: String,
    required: bool,
    validators: Vec<SharedValidator>,
}

impl ScalarField {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            value: String::new(),
            baseline: None,
            default: String::new(),
            required: false,
            validators: Vec::new(),
        }
    }

    pub fn text() -> Self {
        Self::new(FieldKind::Text)
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    pub fn integer(min: i64, max: i64) -> Self {
        Self::new(FieldKind::Integer { min, max })
    }

    pub fn port() -> Self {
        Self::new(FieldKind::Port)
    }

    pub fn option<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(FieldKind::Option {
            choices: choices.into_iter().map(Into::into).collect(),
        })
    }

    pub fn network() -> Self {
        Self::new(FieldKind::Network)
    }

    /// Set the default, which is also the initial value.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = self.kind.coerce(default.into());
        self.value = self.default.clone();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_validator(mut self, validator: SharedValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Attach a regex mask, e.g. `^[a-z0-9-]+$`.
    ///
    /// # Errors
    /// Returns [`ConfigError::Configuration`] when the pattern does not compile.
    pub fn with_mask(self, pattern: &str) -> Result<Self> {
        let validator = RegexValidator::new(pattern)?;
        Ok(self.with_validator(Arc::new(validator)))
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn get_value(&self) -> &str {
        &self.value
    }

    /// Replace the value, applying the kind's coercion rules.
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = self.kind.coerce(value.into());
    }

    pub fn default_value(&self) -> &str {
        &self.default
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn set_required(&mut self, required: bool) {
        self.required = required;
    }

    pub fn is_field_changed(&self) -> bool {
        self.baseline.as_deref() != Some(self.value.as_str())
    }

    /// Value as it was when the document was loaded.
    pub fn baseline(&self) -> Option<&str> {
        self.baseline.as_deref()
    }

    /// Bind a value read from the document; a missing value falls back to the
    /// default. Either way the result becomes the baseline.
    pub fn load_value(&mut self, value: Option<String>) {
        self.value = match value {
            Some(value) => self.kind.coerce(value),
            None => self.default.clone(),
        };
        self.baseline = Some(self.value.clone());
    }

    pub fn commit_baseline(&mut self) {
        self.baseline = Some(self.value.clone());
    }

    /// Required check first, then the kind check, then attached validators.
    pub fn validators(&self) -> Vec<SharedValidator> {
        let mut validators: Vec<SharedValidator> = Vec::with_capacity(self.validators.len() + 2);
        if self.required {
            validators.push(Arc::new(RequiredValidator::new()));
        }
        validators.extend(self.kind.builtin_validator());
        validators.extend(self.validators.iter().cloned());
        validators
    }
}

/// Named, ordered children.
#[derive(Debug, Clone, Default)]
pub struct ContainerField {
    children: IndexMap<String, FieldNode>,
    validators: Vec<SharedValidator>,
}

impl ContainerField {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add_child_node`](Self::add_child_node).
    ///
    /// # Errors
    /// Returns [`ConfigError::DuplicatePath`] if `name` is already taken.
    pub fn with_child(mut self, name: &str, node: impl Into<FieldNode>) -> Result<Self> {
        self.add_child_node(name, node)?;
        Ok(self)
    }

    pub fn with_validator(mut self, validator: SharedValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// # Errors
    /// Returns [`ConfigError::DuplicatePath`] if `name` is already taken, or
    /// [`ConfigError::Configuration`] if it is not a valid path segment.
    pub fn add_child_node(&mut self, name: &str, node: impl Into<FieldNode>) -> Result<()> {
        if name.is_empty() || name.contains(super::path::PATH_SEPARATOR) {
            return Err(ConfigError::Configuration(format!(
                "invalid field name '{}'",
                name
            )));
        }
        if self.children.contains_key(name) {
            return Err(ConfigError::DuplicatePath(name.to_string()));
        }
        self.children.insert(name.to_string(), node.into());
        Ok(())
    }

    pub fn child(&self, name: &str) -> Option<&FieldNode> {
        self.children.get(name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut FieldNode> {
        self.children.get_mut(name)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &FieldNode)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub(crate) fn children_mut(&mut self) -> impl Iterator<Item = (&str, &mut FieldNode)> {
        self.children
            .iter_mut()
            .map(|(name, node)| (name.as_str(), node))
    }

    /// Resolve a path relative to this container. The root path resolves to
    /// the container itself.
    pub fn node(&self, path: &FieldPath) -> Option<NodeRef<'_>> {
        let mut current = NodeRef::Container(self);
        for segment in path.segments() {
            current = match current {
                NodeRef::Container(container) => container.children.get(segment.as_str())?.as_node_ref(),
                NodeRef::Array(array) => NodeRef::Container(array.row(segment)?),
                NodeRef::Scalar(_) => return None,
            };
        }
        Some(current)
    }

    pub fn node_mut(&mut self, path: &FieldPath) -> Option<NodeMut<'_>> {
        let mut current = NodeMut::Container(self);
        for segment in path.segments() {
            current = match current {
                NodeMut::Container(container) => {
                    container.children.get_mut(segment.as_str())?.as_node_mut()
                }
                NodeMut::Array(array) => NodeMut::Container(array.row_mut(segment)?),
                NodeMut::Scalar(_) => return None,
            };
        }
        Some(current)
    }

    pub fn scalar(&self, path: &FieldPath) -> Option<&ScalarField> {
        match self.node(path)? {
            NodeRef::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn scalar_mut(&mut self, path: &FieldPath) -> Option<&mut ScalarField> {
        match self.node_mut(path)? {
            NodeMut::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn array(&self, path: &FieldPath) -> Option<&ArrayField> {
        match self.node(path)? {
            NodeRef::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn array_mut(&mut self, path: &FieldPath) -> Option<&mut ArrayField> {
        match self.node_mut(path)? {
            NodeMut::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn get_value(&self, path: &FieldPath) -> Option<&str> {
        self.scalar(path).map(ScalarField::get_value)
    }

    /// # Errors
    /// Returns [`ConfigError::PathNotFound`] unless `path` resolves to a scalar.
    pub fn set_value(&mut self, path: &FieldPath, value: impl Into<String>) -> Result<()> {
        let scalar = self
            .scalar_mut(path)
            .ok_or_else(|| ConfigError::PathNotFound(path.to_string()))?;
        scalar.set_value(value);
        Ok(())
    }

    /// Apply a flat `path -> value` submission, e.g. from an API form post.
    ///
    /// Paths are checked up front so an unknown path leaves the tree untouched.
    ///
    /// # Errors
    /// Returns [`ConfigError::PathNotFound`] for the first path that does not
    /// resolve to a scalar.
    pub fn set_values<'v, I>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'v str, &'v str)>,
    {
        let values: Vec<(FieldPath, &str)> = values
            .into_iter()
            .map(|(path, value)| (FieldPath::parse(path), value))
            .collect();

        if let Some((missing, _)) = values.iter().find(|(path, _)| self.scalar(path).is_none()) {
            return Err(ConfigError::PathNotFound(missing.to_string()));
        }
        for (path, value) in values {
            self.set_value(&path, value)?;
        }
        Ok(())
    }

    /// Every scalar as `path -> value`, in tree order.
    pub fn flatten(&self) -> IndexMap<String, String> {
        let mut out = IndexMap::new();
        flatten_into(NodeRef::Container(self), &FieldPath::root(), &mut out);
        out
    }

    pub fn is_field_changed(&self) -> bool {
        self.children.values().any(FieldNode::is_field_changed)
    }

    pub fn commit_baseline(&mut self) {
        for child in self.children.values_mut() {
            child.commit_baseline();
        }
    }

    pub fn validators(&self) -> Vec<SharedValidator> {
        self.validators.clone()
    }
}

fn flatten_into(node: NodeRef<'_>, path: &FieldPath, out: &mut IndexMap<String, String>) {
    match node {
        NodeRef::Scalar(scalar) => {
            out.insert(path.to_string(), scalar.get_value().to_string());
        }
        NodeRef::Container(container) => {
            for (name, child) in container.children() {
                flatten_into(child.as_node_ref(), &path.child(name), out);
            }
        }
        NodeRef::Array(array) => {
            for (id, row) in array.rows() {
                flatten_into(NodeRef::Container(row), &path.child(id.as_str()), out);
            }
        }
    }
}

/// Identifier of one array row, unique within its array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(String);

impl RowId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RowId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RowId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Ordered collection of uniform rows, each built from the row template.
///
/// Row order is insertion order and is kept through load, iteration and
/// serialization.
#[derive(Debug, Clone)]
pub struct ArrayField {
    template: ContainerField,
    rows: IndexMap<RowId, ContainerField>,
    baseline: Vec<RowId>,
    validators: Vec<SharedValidator>,
}

impl ArrayField {
    pub fn new(template: ContainerField) -> Self {
        Self {
            template,
            rows: IndexMap::new(),
            baseline: Vec::new(),
            validators: Vec::new(),
        }
    }

    pub fn with_validator(mut self, validator: SharedValidator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn template(&self) -> &ContainerField {
        &self.template
    }

    /// Append a row populated with the template defaults.
    pub fn add_row(&mut self) -> RowId {
        let mut id = RowId::generate();
        while self.rows.contains_key(&id) {
            id = RowId::generate();
        }
        self.rows.insert(id.clone(), self.template.clone());
        id
    }

    /// Append a row under a caller-chosen id (used when loading a document).
    ///
    /// # Errors
    /// Returns [`ConfigError::DuplicatePath`] if the id is taken, or
    /// [`ConfigError::Configuration`] if it is not a valid path segment.
    pub fn add_row_with_id(&mut self, id: impl Into<RowId>) -> Result<&mut ContainerField> {
        let id = id.into();
        if id.0.is_empty() || id.0.contains(super::path::PATH_SEPARATOR) {
            return Err(ConfigError::Configuration(format!("invalid row id '{}'", id)));
        }
        if self.rows.contains_key(&id) {
            return Err(ConfigError::DuplicatePath(id.0));
        }
        let row = self.template.clone();
        Ok(self.rows.entry(id).or_insert(row))
    }

    /// Remove a row, keeping the order of the remaining ones.
    pub fn remove_row(&mut self, id: &str) -> Option<ContainerField> {
        self.rows.shift_remove(id)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&RowId, &ContainerField)> {
        self.rows.iter()
    }

    pub fn row(&self, id: &str) -> Option<&ContainerField> {
        self.rows.get(id)
    }

    pub fn row_mut(&mut self, id: &str) -> Option<&mut ContainerField> {
        self.rows.get_mut(id)
    }

    pub fn row_ids(&self) -> impl Iterator<Item = &RowId> {
        self.rows.keys()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
    }

    /// Changed when rows were added, removed or reordered, or any row changed.
    pub fn is_field_changed(&self) -> bool {
        !self.rows.keys().eq(self.baseline.iter())
            || self.rows.values().any(ContainerField::is_field_changed)
    }

    /// Record the current row set as loaded, without touching row contents.
    pub(crate) fn mark_loaded(&mut self) {
        self.baseline = self.rows.keys().cloned().collect();
    }

    pub fn commit_baseline(&mut self) {
        for row in self.rows.values_mut() {
            row.commit_baseline();
        }
        self.mark_loaded();
    }

    pub fn validators(&self) -> Vec<SharedValidator> {
        self.validators.clone()
    }
}

/// One node of a model tree. The variant set is closed; all access goes
/// through exhaustive matches.
#[derive(Debug, Clone)]
pub enum FieldNode {
    Scalar(ScalarField),
    Container(ContainerField),
    Array(ArrayField),
}

impl FieldNode {
    pub fn as_node_ref(&self) -> NodeRef<'_> {
        match self {
            FieldNode::Scalar(scalar) => NodeRef::Scalar(scalar),
            FieldNode::Container(container) => NodeRef::Container(container),
            FieldNode::Array(array) => NodeRef::Array(array),
        }
    }

    pub fn as_node_mut(&mut self) -> NodeMut<'_> {
        match self {
            FieldNode::Scalar(scalar) => NodeMut::Scalar(scalar),
            FieldNode::Container(container) => NodeMut::Container(container),
            FieldNode::Array(array) => NodeMut::Array(array),
        }
    }

    pub fn is_field_changed(&self) -> bool {
        self.as_node_ref().is_field_changed()
    }

    pub fn commit_baseline(&mut self) {
        match self {
            FieldNode::Scalar(scalar) => scalar.commit_baseline(),
            FieldNode::Container(container) => container.commit_baseline(),
            FieldNode::Array(array) => array.commit_baseline(),
        }
    }
}

impl From<ScalarField> for FieldNode {
    fn from(field: ScalarField) -> Self {
        FieldNode::Scalar(field)
    }
}

impl From<ContainerField> for FieldNode {
    fn from(field: ContainerField) -> Self {
        FieldNode::Container(field)
    }
}

impl From<ArrayField> for FieldNode {
    fn from(field: ArrayField) -> Self {
        FieldNode::Array(field)
    }
}

/// Borrowed view of a resolved node. Array rows resolve to `Container`.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Scalar(&'a ScalarField),
    Container(&'a ContainerField),
    Array(&'a ArrayField),
}

impl<'a> NodeRef<'a> {
    pub fn is_field_changed(&self) -> bool {
        match self {
            NodeRef::Scalar(scalar) => scalar.is_field_changed(),
            NodeRef::Container(container) => container.is_field_changed(),
            NodeRef::Array(array) => array.is_field_changed(),
        }
    }

    pub fn validators(&self) -> Vec<SharedValidator> {
        match self {
            NodeRef::Scalar(scalar) => scalar.validators(),
            NodeRef::Container(container) => container.validators(),
            NodeRef::Array(array) => array.validators(),
        }
    }
}

/// Mutable view of a resolved node.
#[derive(Debug)]
pub enum NodeMut<'a> {
    Scalar(&'a mut ScalarField),
    Container(&'a mut ContainerField),
    Array(&'a mut ArrayField),
}

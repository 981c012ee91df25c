// Declarative form shapes and the field tree built from them
//
// A shape maps keys to specs. Each spec says explicitly what to build:
// a field from a bare value, a field from a value plus options, an
// existing field adopted as is, or a nested group.

use crate::error::FormError;
use crate::field::{Field, FieldOptions, FieldRef};
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Options of a field built by a form from a JSON value
pub type FormFieldOptions = FieldOptions<Value>;

/// Staged write produced while validating an `init` payload
pub(crate) type StagedInit = Box<dyn FnOnce() + Send>;

/// What to build for one key of a [`FormShape`].
pub enum FieldSpec {
    /// Field with default options starting at this value
    Value(Value),
    /// Field starting at the value, configured by the options
    Options(Value, FormFieldOptions),
    /// Existing field, adopted without re-wrapping (may be shared)
    Field(FieldRef),
    /// Nested group
    Shape(FormShape),
}

impl From<Value> for FieldSpec {
    fn from(value: Value) -> Self {
        FieldSpec::Value(value)
    }
}

impl From<(Value, FormFieldOptions)> for FieldSpec {
    fn from((value, options): (Value, FormFieldOptions)) -> Self {
        FieldSpec::Options(value, options)
    }
}

impl From<FieldRef> for FieldSpec {
    fn from(field: FieldRef) -> Self {
        FieldSpec::Field(field)
    }
}

impl<S, V> From<Field<S, V>> for FieldSpec
where
    S: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn from(field: Field<S, V>) -> Self {
        FieldSpec::Field(field.to_ref())
    }
}

impl From<FormShape> for FieldSpec {
    fn from(shape: FormShape) -> Self {
        FieldSpec::Shape(shape)
    }
}

impl std::fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldSpec::Value(value) => f.debug_tuple("Value").field(value).finish(),
            FieldSpec::Options(value, options) => f
                .debug_tuple("Options")
                .field(value)
                .field(options)
                .finish(),
            FieldSpec::Field(field) => f.debug_tuple("Field").field(&field.name()).finish(),
            FieldSpec::Shape(shape) => f.debug_tuple("Shape").field(shape).finish(),
        }
    }
}

/// Ordered description of a form's fields.
///
/// ```ignore
/// let shape = FormShape::new()
///     .field("email", json!(""))
///     .field("age", (json!(0), FormFieldOptions::default().validate_on_blur(true)))
///     .field("address", FormShape::new().field("city", json!("")));
/// ```
#[derive(Debug, Default)]
pub struct FormShape {
    entries: IndexMap<String, FieldSpec>,
}

impl FormShape {
    /// Empty shape
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the spec for `key`
    pub fn field(mut self, key: impl Into<String>, spec: impl Into<FieldSpec>) -> Self {
        self.entries.insert(key.into(), spec.into());
        self
    }

    /// Shape mirroring a JSON object: nested objects become groups,
    /// everything else becomes a field with default options.
    pub fn from_json(value: Value) -> Result<Self, FormError> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            _ => Err(FormError::NotAnObject {
                path: String::new(),
            }),
        }
    }

    fn from_map(map: Map<String, Value>) -> Self {
        let entries = map
            .into_iter()
            .map(|(key, value)| {
                let spec = match value {
                    Value::Object(nested) => FieldSpec::Shape(Self::from_map(nested)),
                    other => FieldSpec::Value(other),
                };
                (key, spec)
            })
            .collect();
        Self { entries }
    }

    /// Number of top-level keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the shape has no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the field tree; fields are named `{prefix}.{key}`
    pub(crate) fn build(self, prefix: &str) -> FormFields {
        let entries = self
            .entries
            .into_iter()
            .map(|(key, spec)| {
                let path = format!("{prefix}.{key}");
                let node = match spec {
                    FieldSpec::Value(init) => FormNode::Field(
                        Field::new(init, FieldOptions::default().name(path)).to_ref(),
                    ),
                    FieldSpec::Options(init, options) => {
                        let options = match options.name {
                            Some(_) => options,
                            None => options.name(path),
                        };
                        FormNode::Field(Field::new(init, options).to_ref())
                    }
                    FieldSpec::Field(field) => FormNode::Field(field),
                    FieldSpec::Shape(shape) => FormNode::Group(shape.build(&path)),
                };
                (key, node)
            })
            .collect();
        FormFields { entries }
    }
}

/// One entry of the field tree.
#[derive(Clone)]
pub enum FormNode {
    /// A leaf field
    Field(FieldRef),
    /// A nested group of entries
    Group(FormFields),
}

impl FormNode {
    /// The field, if this is a leaf
    pub fn as_field(&self) -> Option<&FieldRef> {
        match self {
            FormNode::Field(field) => Some(field),
            FormNode::Group(_) => None,
        }
    }

    /// The group, if this is not a leaf
    pub fn as_group(&self) -> Option<&FormFields> {
        match self {
            FormNode::Field(_) => None,
            FormNode::Group(group) => Some(group),
        }
    }
}

impl std::fmt::Debug for FormNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormNode::Field(field) => f.debug_tuple("Field").field(&field.name()).finish(),
            FormNode::Group(group) => f.debug_tuple("Group").field(group).finish(),
        }
    }
}

/// Field tree of a form, in shape order.
#[derive(Clone, Debug, Default)]
pub struct FormFields {
    entries: IndexMap<String, FormNode>,
}

impl FormFields {
    /// Direct child at `key`
    pub fn get(&self, key: &str) -> Option<&FormNode> {
        self.entries.get(key)
    }

    /// Field at a dotted path such as `address.city`
    ///
    /// Every `.` separates two keys, so keys that contain a dot are only
    /// reachable through [`field_at`](Self::field_at).
    pub fn field(&self, path: &str) -> Option<FieldRef> {
        let segments: Vec<&str> = path.split('.').collect();
        self.field_at(&segments)
    }

    /// Field at a path given as separate keys
    pub fn field_at(&self, segments: &[&str]) -> Option<FieldRef> {
        let (head, rest) = segments.split_first()?;
        match (self.entries.get(*head)?, rest.is_empty()) {
            (FormNode::Field(field), true) => Some(field.clone()),
            (FormNode::Group(group), false) => group.field_at(rest),
            _ => None,
        }
    }

    /// Typed handle of the field at `path`
    ///
    /// Returns None if there is no field there or it has other types.
    /// Fields built from JSON are `Field<serde_json::Value>`.
    pub fn field_as<S, V>(&self, path: &str) -> Option<Field<S, V>>
    where
        S: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
        V: Clone + PartialEq + Send + Sync + 'static,
    {
        let field = self.field(path)?;
        field.as_any().downcast_ref::<Field<S, V>>().cloned()
    }

    /// Nested group at a dotted path
    pub fn group(&self, path: &str) -> Option<&FormFields> {
        path.split('.')
            .try_fold(self, |group, key| group.entries.get(key)?.as_group())
    }

    /// Direct children in shape order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormNode)> {
        self.entries.iter().map(|(key, node)| (key.as_str(), node))
    }

    /// Number of direct children
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the group has no children
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Depth-first list of all fields
    pub fn leaves(&self) -> Vec<FieldRef> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<FieldRef>) {
        for node in self.entries.values() {
            match node {
                FormNode::Field(field) => out.push(field.clone()),
                FormNode::Group(group) => group.collect_leaves(out),
            }
        }
    }

    /// JSON object of every field's raw state (tracked)
    pub(crate) fn snapshot(&self) -> Value {
        let map = self
            .entries
            .iter()
            .map(|(key, node)| {
                let value = match node {
                    FormNode::Field(field) => field.state_json().unwrap_or_else(|err| {
                        tracing::warn!(%err, "field state left out of form snapshot");
                        Value::Null
                    }),
                    FormNode::Group(group) => group.snapshot(),
                };
                (key.clone(), value)
            })
            .collect();
        Value::Object(map)
    }

    /// Validate an `init` payload and collect the writes it implies
    ///
    /// Keys without a counterpart in the tree are ignored.
    pub(crate) fn stage_init(
        &self,
        partial: &Map<String, Value>,
        prefix: &str,
        staged: &mut Vec<StagedInit>,
    ) -> Result<(), FormError> {
        for (key, value) in partial {
            let Some(node) = self.entries.get(key) else {
                continue;
            };
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            match (node, value) {
                (FormNode::Group(group), Value::Object(nested)) => {
                    group.stage_init(nested, &path, staged)?;
                }
                (FormNode::Group(_), _) => return Err(FormError::NotAnObject { path }),
                (FormNode::Field(field), value) => {
                    staged.push(field.prepare_init(value.clone())?);
                }
            }
        }
        Ok(())
    }
}

//! Schema nodes describing the attribute tree of a resource.
//!
//! A schema is runtime data: one engine walks any number of schemas. The
//! node kinds form a closed enum, so every traversal is an exhaustive match
//! and an "unrecognised kind" cannot exist at runtime.
//!
//! Schemas can be declared in code with the builder helpers or loaded from
//! JSON:
//!
//! ```json
//! {
//!   "kind": "object",
//!   "attributes": {
//!     "displayName": { "schema": { "kind": "primitive", "primitive": "string" }, "required": true },
//!     "runAsAccount": {
//!       "schema": { "kind": "primitive", "primitive": "string" },
//!       "optional": true,
//!       "computed": true,
//!       "default": "system"
//!     }
//!   }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default wire field carrying a union's type tag.
pub const ODATA_TYPE: &str = "@odata.type";

// ============================================================================
// Paths
// ============================================================================

/// One step of an [`AttrPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A named attribute of an object.
    Attribute(String),
    /// A concrete element of a collection value.
    Index(usize),
    /// The element shape of a collection schema (no concrete index).
    Element,
    /// A variant key of a union.
    Variant(String),
}

impl PathSegment {
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute(name.into())
    }

    pub fn variant(name: impl Into<String>) -> Self {
        Self::Variant(name.into())
    }
}

/// Position inside a schema or a state value, from the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AttrPath(Vec<PathSegment>);

impl AttrPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns a new path extended by `segment`.
    #[must_use]
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Attribute(name) | PathSegment::Variant(name) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{name}")?;
                }
                PathSegment::Index(index) => write!(f, "[{index}]")?,
                PathSegment::Element => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// Scalar types a primitive node can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    String,
    Int64,
    Float64,
    Bool,
    /// Any JSON value, passed through untouched.
    Dynamic,
}

impl PrimitiveType {
    /// Returns `true` if `value` has this primitive's JSON shape.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int64 => value.is_i64() || value.is_u64(),
            Self::Float64 => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Dynamic => true,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::Dynamic => "dynamic",
        };
        f.write_str(name)
    }
}

/// A typed node in the attribute tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaNode {
    Primitive { primitive: PrimitiveType },
    Object(ObjectNode),
    Collection(CollectionNode),
    Union(UnionNode),
}

impl SchemaNode {
    pub fn string() -> Self {
        Self::Primitive {
            primitive: PrimitiveType::String,
        }
    }

    pub fn int64() -> Self {
        Self::Primitive {
            primitive: PrimitiveType::Int64,
        }
    }

    pub fn float64() -> Self {
        Self::Primitive {
            primitive: PrimitiveType::Float64,
        }
    }

    pub fn bool() -> Self {
        Self::Primitive {
            primitive: PrimitiveType::Bool,
        }
    }

    pub fn dynamic() -> Self {
        Self::Primitive {
            primitive: PrimitiveType::Dynamic,
        }
    }

    pub fn object(node: ObjectNode) -> Self {
        Self::Object(node)
    }

    /// An ordered collection (list).
    pub fn list(element: SchemaNode) -> Self {
        Self::Collection(CollectionNode {
            element: Box::new(element),
            ordered: true,
        })
    }

    /// An unordered collection (set).
    pub fn set(element: SchemaNode) -> Self {
        Self::Collection(CollectionNode {
            element: Box::new(element),
            ordered: false,
        })
    }

    pub fn union(node: UnionNode) -> Self {
        Self::Union(node)
    }

    /// Short name of the node kind, used in messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Primitive { .. } => "primitive",
            Self::Object(_) => "object",
            Self::Collection(_) => "collection",
            Self::Union(_) => "union",
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }

    /// Looks up an attribute that lands at the top level of the encoded
    /// wire object.
    ///
    /// For a union this covers the base attributes and the attributes of
    /// every variant, since variant bodies are flattened on the wire.
    pub fn top_level_attribute(&self, name: &str) -> Option<&Attribute> {
        match self {
            Self::Object(object) => object.get(name),
            Self::Union(union) => union.base.get(name).or_else(|| {
                union
                    .variants
                    .values()
                    .find_map(|variant| variant.body.get(name))
            }),
            Self::Primitive { .. } | Self::Collection(_) => None,
        }
    }
}

/// An attribute: a node plus how configuration may use it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub schema: SchemaNode,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Attribute {
    fn new(schema: SchemaNode, required: bool, optional: bool, computed: bool) -> Self {
        Self {
            schema,
            required,
            optional,
            computed,
            default: None,
            description: None,
        }
    }

    pub fn required(schema: SchemaNode) -> Self {
        Self::new(schema, true, false, false)
    }

    pub fn optional(schema: SchemaNode) -> Self {
        Self::new(schema, false, true, false)
    }

    /// Read-only attribute set by the remote.
    pub fn computed(schema: SchemaNode) -> Self {
        Self::new(schema, false, false, true)
    }

    /// Optional attribute whose value the provider fills in when unset.
    pub fn optional_computed(schema: SchemaNode) -> Self {
        Self::new(schema, false, true, true)
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Static(value));
        self
    }

    #[must_use]
    pub fn with_dynamic_default<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Dynamic(DynamicDefault(Arc::new(f))));
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Read-only attributes are never encoded into a write body.
    pub fn is_read_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// Object node: an ordered set of named attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectNode {
    #[serde(default)]
    pub attributes: IndexMap<String, Attribute>,
}

impl ObjectNode {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Attribute)> {
        self.attributes.iter()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionNode {
    pub element: Box<SchemaNode>,
    #[serde(default = "default_ordered")]
    pub ordered: bool,
}

fn default_ordered() -> bool {
    true
}

/// A polymorphic object whose concrete shape is named by a wire tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionNode {
    /// Wire field holding the tag.
    #[serde(default = "default_discriminator")]
    pub discriminator: String,
    /// Attributes common to every variant.
    #[serde(default)]
    pub base: ObjectNode,
    /// Tag sent when no variant is set and the remote accepts the base type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_tag: Option<String>,
    /// Variants keyed by their state key.
    #[serde(default)]
    pub variants: IndexMap<String, UnionVariant>,
    /// When set, encoding with no variant populated is an error.
    #[serde(default)]
    pub require_variant: bool,
}

fn default_discriminator() -> String {
    ODATA_TYPE.to_string()
}

impl Default for UnionNode {
    fn default() -> Self {
        Self {
            discriminator: default_discriminator(),
            base: ObjectNode::default(),
            base_tag: None,
            variants: IndexMap::new(),
            require_variant: false,
        }
    }
}

impl UnionNode {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn discriminator(mut self, field: impl Into<String>) -> Self {
        self.discriminator = field.into();
        self
    }

    #[must_use]
    pub fn base_attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.base.attributes.insert(name.into(), attribute);
        self
    }

    #[must_use]
    pub fn base_tag(mut self, tag: impl Into<String>) -> Self {
        self.base_tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn variant(mut self, key: impl Into<String>, tag: impl Into<String>, body: ObjectNode) -> Self {
        self.variants.insert(
            key.into(),
            UnionVariant {
                tag: tag.into(),
                body,
            },
        );
        self
    }

    #[must_use]
    pub fn require_variant(mut self) -> Self {
        self.require_variant = true;
        self
    }

    /// Finds the variant carrying `tag`.
    pub fn variant_by_tag(&self, tag: &str) -> Option<(&str, &UnionVariant)> {
        self.variants
            .iter()
            .find(|(_, variant)| variant.tag == tag)
            .map(|(key, variant)| (key.as_str(), variant))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionVariant {
    pub tag: String,
    #[serde(default)]
    pub body: ObjectNode,
}

// ============================================================================
// Defaults
// ============================================================================

/// Provider-side default for an attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// A constant JSON value.
    Static(Value),
    /// A value computed when defaults are applied. Code-only.
    #[serde(skip)]
    Dynamic(DynamicDefault),
}

impl DefaultValue {
    pub fn resolve(&self) -> Value {
        match self {
            Self::Static(value) => value.clone(),
            Self::Dynamic(dynamic) => (dynamic.0)(),
        }
    }
}

#[derive(Clone)]
pub struct DynamicDefault(Arc<dyn Fn() -> Value + Send + Sync>);

impl fmt::Debug for DynamicDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DynamicDefault(..)")
    }
}

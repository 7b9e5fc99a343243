//! Resource descriptors.
//!
//! A descriptor is built once when a resource type is registered and is
//! read-only afterwards. It is shared (behind an `Arc`) by every operation
//! on that resource type, so no operation ever mutates it.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::middleware::{ReadEnrichment, WriteMiddleware};
use crate::schema::{AttrPath, DefaultValue, PathSegment, SchemaNode, UnionNode};
use crate::transport::HttpMethod;
use crate::walker::{self, WalkControl};
use crate::write::WriteOperation;

/// Everything the engine needs to manage one resource type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Human-readable type name, used in logs and errors.
    pub type_name: String,
    /// Collection URI for top-level resources, or the parent collection URI
    /// for child resources. For singletons this is the object's own URI.
    pub base_uri: String,
    #[serde(default)]
    pub is_singleton: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentItem>,
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,
    pub schema: SchemaNode,
    #[serde(default)]
    pub read: ReadOptions,
    #[serde(default)]
    pub write: WriteOptions,
    /// Pre-write hooks, run in order after defaulting and encoding.
    #[serde(skip)]
    pub write_middleware: Vec<Arc<dyn WriteMiddleware>>,
    /// Post-read hooks, run in order after all GETs and before decoding.
    #[serde(skip)]
    pub read_enrichments: Vec<Arc<dyn ReadEnrichment>>,
}

fn default_id_attribute() -> String {
    "id".to_string()
}

/// Addressing of a resource that lives under a parent object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentItem {
    /// State field holding the parent id. It is never sent on the wire.
    pub parent_id_field: String,
    /// Path below the parent object, e.g. `assignments`.
    pub uri_suffix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    pub odata_expand: Option<String>,
    pub odata_filter: Option<String>,
    pub odata_select: Vec<String>,
    pub extra_requests: Vec<ExtraRequest>,
    /// Read a single child item through `$filter=id eq '..'` on the
    /// collection, for collections without single-item GET.
    pub single_item_use_odata_filter: bool,
    pub data_source: DataSourceOptions,
}

/// A nested collection fetched by a secondary GET and spliced into the
/// primary payload under `parent_attribute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraRequest {
    pub parent_attribute: String,
    pub uri_suffix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceOptions {
    /// The data source reads one object rather than a collection.
    pub singular: bool,
    /// The remote collection accepts a caller-supplied `$filter`.
    pub filterable: bool,
}

impl Default for DataSourceOptions {
    fn default() -> Self {
        Self {
            singular: false,
            filterable: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Executed strictly in this order after the primary request.
    pub sub_actions: Vec<WriteSubAction>,
}

/// A secondary write bound to a subset of attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSubAction {
    /// Attributes sent under their own name.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Attributes renamed for the wire: state name to wire name.
    #[serde(default)]
    pub attributes_map: IndexMap<String, String>,
    /// Appended to the resource's own URI.
    pub uri_suffix: String,
    #[serde(default)]
    pub gate: SubActionGate,
    #[serde(default = "default_sub_action_method")]
    pub method: HttpMethod,
}

fn default_sub_action_method() -> HttpMethod {
    HttpMethod::Post
}

impl WriteSubAction {
    pub fn new(uri_suffix: impl Into<String>) -> Self {
        Self {
            attributes: Vec::new(),
            attributes_map: IndexMap::new(),
            uri_suffix: uri_suffix.into(),
            gate: SubActionGate::Always,
            method: HttpMethod::Post,
        }
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    #[must_use]
    pub fn mapped_attribute(mut self, state: impl Into<String>, wire: impl Into<String>) -> Self {
        self.attributes_map.insert(state.into(), wire.into());
        self
    }

    #[must_use]
    pub fn gate(mut self, gate: SubActionGate) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// `(state name, wire name)` for every claimed attribute.
    pub fn fields(&self) -> Vec<(&str, &str)> {
        self.attributes
            .iter()
            .map(|name| (name.as_str(), name.as_str()))
            .chain(
                self.attributes_map
                    .iter()
                    .map(|(state, wire)| (state.as_str(), wire.as_str())),
            )
            .collect()
    }
}

/// Which operations a sub-action runs for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubActionGate {
    #[default]
    Always,
    CreateOnly,
    UpdateOnly,
}

impl SubActionGate {
    pub fn runs_for(&self, operation: WriteOperation) -> bool {
        match self {
            Self::Always => true,
            Self::CreateOnly => operation == WriteOperation::Create,
            Self::UpdateOnly => operation == WriteOperation::Update,
        }
    }
}

impl ResourceDescriptor {
    pub fn new(type_name: impl Into<String>, base_uri: impl Into<String>, schema: SchemaNode) -> Self {
        Self {
            type_name: type_name.into(),
            base_uri: base_uri.into(),
            is_singleton: false,
            parent: None,
            id_attribute: default_id_attribute(),
            schema,
            read: ReadOptions::default(),
            write: WriteOptions::default(),
            write_middleware: Vec::new(),
            read_enrichments: Vec::new(),
        }
    }

    #[must_use]
    pub fn singleton(mut self) -> Self {
        self.is_singleton = true;
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id_field: impl Into<String>, uri_suffix: impl Into<String>) -> Self {
        self.parent = Some(ParentItem {
            parent_id_field: parent_id_field.into(),
            uri_suffix: uri_suffix.into(),
        });
        self
    }

    #[must_use]
    pub fn with_read_options(mut self, read: ReadOptions) -> Self {
        self.read = read;
        self
    }

    #[must_use]
    pub fn with_sub_action(mut self, sub_action: WriteSubAction) -> Self {
        self.write.sub_actions.push(sub_action);
        self
    }

    #[must_use]
    pub fn with_write_middleware(mut self, middleware: Arc<dyn WriteMiddleware>) -> Self {
        self.write_middleware.push(middleware);
        self
    }

    #[must_use]
    pub fn with_read_enrichment(mut self, enrichment: Arc<dyn ReadEnrichment>) -> Self {
        self.read_enrichments.push(enrichment);
        self
    }

    // ==================== URIs ====================

    /// URI of the collection the resource lives in.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` when a child resource has no parent id.
    pub fn collection_uri(&self, parent_id: Option<&str>) -> EngineResult<String> {
        match &self.parent {
            None => Ok(self.base_uri.trim_end_matches('/').to_string()),
            Some(parent) => {
                let parent_id = parent_id.filter(|id| !id.is_empty()).ok_or_else(|| {
                    EngineError::validation(
                        &AttrPath::root().child(PathSegment::attribute(&parent.parent_id_field)),
                        "parent id is required",
                    )
                })?;
                Ok(join_uri(&join_uri(&self.base_uri, parent_id), &parent.uri_suffix))
            }
        }
    }

    /// URI of one resource. Singletons have no id segment.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` when a non-singleton has no id, or a
    /// child resource has no parent id.
    pub fn item_uri(&self, id: Option<&str>, parent_id: Option<&str>) -> EngineResult<String> {
        let collection = self.collection_uri(parent_id)?;
        if self.is_singleton {
            return Ok(collection);
        }
        let id = id.filter(|id| !id.is_empty()).ok_or_else(|| {
            EngineError::validation(
                &AttrPath::root().child(PathSegment::attribute(&self.id_attribute)),
                "resource id is required",
            )
        })?;
        Ok(join_uri(&collection, id))
    }

    // ==================== Validation ====================

    /// Checks the descriptor for inconsistencies that would otherwise only
    /// show up as confusing runtime failures.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidDescriptor` describing the first problem.
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |message: String| EngineError::invalid_descriptor(&self.type_name, message);

        if self.base_uri.trim().is_empty() {
            return Err(invalid("base_uri is empty".into()));
        }
        if !matches!(self.schema, SchemaNode::Object(_) | SchemaNode::Union(_)) {
            return Err(invalid(format!(
                "root schema must be an object or a union, got {}",
                self.schema.kind_name()
            )));
        }
        if let Some(parent) = &self.parent
            && parent.parent_id_field.trim().is_empty()
        {
            return Err(invalid("parent_id_field is empty".into()));
        }

        let mut problem: Option<String> = None;
        walker::walk(&self.schema, &mut |visit| {
            if problem.is_some() {
                return WalkControl::SkipChildren;
            }
            if let SchemaNode::Union(union) = visit.node {
                problem = check_union(union).map(|p| format!("{}: {p}", visit.path));
            }
            if let (Some(attribute), SchemaNode::Primitive { primitive }) = (visit.attribute, visit.node)
                && let Some(DefaultValue::Static(value)) = &attribute.default
                && !value.is_null()
                && !primitive.accepts(value)
            {
                problem = Some(format!(
                    "{}: default {value} is not a valid {primitive}",
                    visit.path
                ));
            }
            WalkControl::Continue
        });
        if let Some(problem) = problem {
            return Err(invalid(problem));
        }

        for (index, sub_action) in self.write.sub_actions.iter().enumerate() {
            if sub_action.uri_suffix.trim().is_empty() {
                return Err(invalid(format!("sub-action #{index} has an empty uri_suffix")));
            }
            for (state, _) in sub_action.fields() {
                if self.schema.top_level_attribute(state).is_none() {
                    return Err(invalid(format!(
                        "sub-action #{index} claims unknown attribute '{state}'"
                    )));
                }
            }
        }

        for extra in &self.read.extra_requests {
            if self.schema.top_level_attribute(&extra.parent_attribute).is_none() {
                return Err(invalid(format!(
                    "extra request targets unknown attribute '{}'",
                    extra.parent_attribute
                )));
            }
            if extra.uri_suffix.trim().is_empty() {
                return Err(invalid(format!(
                    "extra request for '{}' has an empty uri_suffix",
                    extra.parent_attribute
                )));
            }
        }

        Ok(())
    }
}

fn check_union(union: &UnionNode) -> Option<String> {
    if union.discriminator.is_empty() {
        return Some("discriminator field is empty".into());
    }
    if union.base.get(&union.discriminator).is_some() {
        return Some(format!(
            "discriminator '{}' collides with a base attribute",
            union.discriminator
        ));
    }

    let mut tags = HashSet::new();
    if let Some(base_tag) = &union.base_tag {
        tags.insert(base_tag.as_str());
    }
    for (key, variant) in &union.variants {
        if variant.tag.is_empty() {
            return Some(format!("variant '{key}' has an empty tag"));
        }
        if !tags.insert(variant.tag.as_str()) {
            return Some(format!("tag '{}' is declared twice", variant.tag));
        }
        if union.base.get(key).is_some() {
            return Some(format!("variant key '{key}' collides with a base attribute"));
        }
        if let Some((name, _)) = variant
            .body
            .iter()
            .find(|(name, _)| union.base.get(name.as_str()).is_some())
        {
            return Some(format!(
                "variant '{key}' redeclares base attribute '{name}'"
            ));
        }
    }
    None
}

/// Joins two URI parts with exactly one slash.
pub fn join_uri(base: &str, segment: &str) -> String {
    let base = base.trim_end_matches('/');
    let segment = segment.trim_start_matches('/');
    if segment.is_empty() {
        return base.to_string();
    }
    format!("{base}/{segment}")
}

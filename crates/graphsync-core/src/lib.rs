//! # graphsync-core
//!
//! Generic reconciliation engine for OData-flavored object-management APIs.
//!
//! A resource type is described once, as data: a [`SchemaNode`] tree of
//! attributes plus a [`ResourceDescriptor`] holding its URIs, read options,
//! ordered write sub-actions and hooks. The [`ResourceEngine`] then performs
//! read, list, create, update and delete for any such description without
//! per-resource code.
//!
//! ## Overview
//!
//! - [`walker`] traverses schema trees.
//! - [`defaults`] injects declared defaults into unset attributes.
//! - [`codec`] translates between state and wire payloads, including
//!   `@odata.type` tagged unions.
//! - [`read`] and [`write`] are the two pipelines.
//! - [`middleware`] holds the hook traits and the bundled hooks.
//! - [`transport`] is the seam to the HTTP client.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use graphsync_core::prelude::*;
//!
//! let schema = SchemaNode::object(
//!     ObjectNode::new()
//!         .attribute("id", Attribute::computed(SchemaNode::string()))
//!         .attribute("displayName", Attribute::required(SchemaNode::string())),
//! );
//! let descriptor = ResourceDescriptor::new("role_scope_tag", "/deviceManagement/roleScopeTags", schema);
//! let engine = ResourceEngine::new(Arc::new(descriptor), transport)?;
//!
//! let created = engine
//!     .create(&json!({ "displayName": "Tag" }), &OperationContext::new())
//!     .await?;
//! ```

pub mod codec;
pub mod defaults;
pub mod descriptor;
pub mod diagnostics;
mod engine;
mod error;
pub mod middleware;
pub mod query;
pub mod read;
pub mod request;
pub mod schema;
pub mod transport;
pub mod walker;
pub mod write;

pub use descriptor::{
    DataSourceOptions, ExtraRequest, ParentItem, ReadOptions, ResourceDescriptor, SubActionGate,
    WriteOptions, WriteSubAction,
};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use engine::{ResourceEngine, ResourceTarget};
pub use error::{EngineError, EngineResult, ErrorCategory};
pub use middleware::{
    Base64Fields, EnrichmentContext, HookError, ImmutableFields, ReadEnrichment,
    SecretReferenceResolver, WriteMiddleware,
};
pub use read::{ListOutcome, ListQuery, ReadOutcome};
pub use request::OperationContext;
pub use schema::{
    AttrPath, Attribute, CollectionNode, DefaultValue, ObjectNode, PathSegment, PrimitiveType,
    SchemaNode, UnionNode, UnionVariant,
};
pub use transport::{HttpMethod, RemoteRequest, RemoteResponse, Transport, TransportError};
pub use write::{
    PlannedRequest, PlannedSubAction, UpdateOptions, WriteOperation, WriteOutcome, WritePlan,
    WriteProgress, WriteStep,
};

/// Type alias for a shared transport.
pub type DynTransport = std::sync::Arc<dyn Transport>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use graphsync_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Attribute, Diagnostics, EngineError, EngineResult, ListQuery, ObjectNode, OperationContext,
        ReadOutcome, ResourceDescriptor, ResourceEngine, ResourceTarget, SchemaNode, Transport,
        UnionNode, UpdateOptions, WriteOperation, WriteOutcome, WriteSubAction,
    };
}

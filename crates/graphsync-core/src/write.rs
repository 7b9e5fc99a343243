//! Write pipeline.
//!
//! A write runs in two phases. Planning is pure:
//!
//! ```text
//! defaults -> encode -> null-clearing -> middleware -> split(primary, sub-actions)
//! ```
//!
//! and yields a [`WritePlan`] that can be shown to an operator before
//! anything is sent. Execution then issues the primary request followed by
//! every planned sub-action, strictly in declared order. The first failure
//! aborts the sequence. Committed steps are never rolled back; the error
//! carries a [`WriteProgress`] describing exactly what was committed.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::codec;
use crate::defaults::apply_defaults;
use crate::descriptor::{ResourceDescriptor, join_uri};
use crate::diagnostics::Diagnostics;
use crate::engine::ResourceTarget;
use crate::error::{EngineError, EngineResult};
use crate::request::RequestExecutor;
use crate::schema::AttrPath;
use crate::transport::{HttpMethod, RemoteRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOperation {
    Create,
    Update,
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// One network step of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStep {
    Primary,
    /// Index into the descriptor's declared sub-actions.
    SubAction(usize),
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary request"),
            Self::SubAction(index) => write!(f, "sub-action #{index}"),
        }
    }
}

/// How far a write sequence progressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteProgress {
    pub operation: WriteOperation,
    /// Known once the primary request committed (or up front for updates).
    pub resource_id: Option<String>,
    pub primary_committed: bool,
    /// Committed sub-actions, in execution order.
    pub committed: Vec<usize>,
    /// Sub-actions skipped by their gate.
    pub skipped: Vec<usize>,
}

impl WriteProgress {
    pub fn new(operation: WriteOperation) -> Self {
        Self {
            operation,
            resource_id: None,
            primary_committed: false,
            committed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// The last committed step, if any.
    pub fn cursor(&self) -> Option<WriteStep> {
        match self.committed.last() {
            Some(index) => Some(WriteStep::SubAction(*index)),
            None if self.primary_committed => Some(WriteStep::Primary),
            None => None,
        }
    }

    /// Human-readable summary of the committed steps.
    pub fn describe(&self) -> String {
        if !self.primary_committed {
            return "no steps".to_string();
        }
        if self.committed.is_empty() {
            return "the primary request".to_string();
        }
        let indices: Vec<String> = self.committed.iter().map(|i| format!("#{i}")).collect();
        format!("the primary request and sub-actions {}", indices.join(", "))
    }
}

/// Caller-supplied inputs that only apply to updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    /// Last observed remote state. Writable attributes set there but unset in
    /// the desired state are sent as `null`.
    pub prior: Option<Value>,
    /// Sent as `If-Match` on the primary PATCH.
    pub if_match: Option<String>,
}

impl UpdateOptions {
    #[must_use]
    pub fn with_prior(mut self, prior: Value) -> Self {
        self.prior = Some(prior);
        self
    }

    #[must_use]
    pub fn with_if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedRequest {
    pub method: HttpMethod,
    pub uri: String,
    pub body: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub if_match: Option<String>,
}

impl PlannedRequest {
    fn to_request(&self) -> RemoteRequest {
        RemoteRequest::new(self.method, &self.uri)
            .with_body(Value::Object(self.body.clone()))
            .with_if_match(self.if_match.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedSubAction {
    /// Position in the descriptor's declared sub-actions.
    pub index: usize,
    pub method: HttpMethod,
    /// Appended to the item URI, which for creates is only known after the
    /// primary request.
    pub uri_suffix: String,
    pub body: Map<String, Value>,
}

/// Every request a write will issue, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WritePlan {
    pub operation: WriteOperation,
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub primary: PlannedRequest,
    pub sub_actions: Vec<PlannedSubAction>,
    pub skipped_sub_actions: Vec<usize>,
}

/// Result of a successful write.
#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    pub id: Option<String>,
    pub progress: WriteProgress,
    /// Body returned by the primary request.
    pub response: Value,
    pub diagnostics: Diagnostics,
}

// ============================================================================
// Planning
// ============================================================================

/// Builds the request sequence for a write without touching the network.
///
/// # Errors
///
/// Returns `Validation`, `MultipleVariantsSet` or `NoVariantSet` for desired
/// states the schema rejects, and `Middleware` when a pre-write hook refuses
/// the body.
pub fn plan_write(
    descriptor: &ResourceDescriptor,
    operation: WriteOperation,
    target: &ResourceTarget,
    desired: &Value,
    options: &UpdateOptions,
) -> EngineResult<WritePlan> {
    let resolved = apply_defaults(&descriptor.schema, desired);
    let mut body = match codec::encode(&descriptor.schema, &resolved)? {
        Some(Value::Object(map)) => map,
        None => Map::new(),
        Some(other) => {
            return Err(EngineError::validation(
                &AttrPath::root(),
                format!("resource state must encode to an object, got {other}"),
            ));
        }
    };

    let parent_field = descriptor.parent.as_ref().map(|p| p.parent_id_field.as_str());
    let parent_id = match parent_field {
        Some(field) => {
            body.shift_remove(field);
            target.parent_id.clone().or_else(|| {
                resolved
                    .get(field)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
        }
        None => None,
    };

    if operation == WriteOperation::Update
        && let Some(prior) = &options.prior
    {
        for field in codec::writable_fields(&descriptor.schema, prior) {
            if Some(field.as_str()) != parent_field {
                body.entry(field).or_insert(Value::Null);
            }
        }
    }

    for middleware in &descriptor.write_middleware {
        middleware
            .before_write(&mut body, operation)
            .map_err(|e| EngineError::Middleware {
                hook: middleware.name().to_string(),
                message: e.to_string(),
            })?;
    }

    let full = body.clone();
    let mut sub_actions = Vec::new();
    let mut skipped_sub_actions = Vec::new();
    for (index, sub_action) in descriptor.write.sub_actions.iter().enumerate() {
        if !sub_action.gate.runs_for(operation) {
            skipped_sub_actions.push(index);
            continue;
        }
        let mut sub_body = Map::new();
        for (state, wire) in sub_action.fields() {
            body.shift_remove(state);
            match full.get(state) {
                Some(value) if !value.is_null() => {
                    sub_body.insert(wire.to_string(), value.clone());
                }
                _ if is_collection_attribute(descriptor, state) => {
                    sub_body.insert(wire.to_string(), Value::Array(Vec::new()));
                }
                _ => {}
            }
        }
        sub_actions.push(PlannedSubAction {
            index,
            method: sub_action.method,
            uri_suffix: sub_action.uri_suffix.clone(),
            body: sub_body,
        });
    }

    let (primary, resource_id) = match operation {
        WriteOperation::Create if !descriptor.is_singleton => (
            PlannedRequest {
                method: HttpMethod::Post,
                uri: descriptor.collection_uri(parent_id.as_deref())?,
                body,
                if_match: None,
            },
            None,
        ),
        WriteOperation::Create => (
            PlannedRequest {
                method: HttpMethod::Patch,
                uri: descriptor.item_uri(None, parent_id.as_deref())?,
                body,
                if_match: None,
            },
            None,
        ),
        WriteOperation::Update => (
            PlannedRequest {
                method: HttpMethod::Patch,
                uri: descriptor.item_uri(target.id.as_deref(), parent_id.as_deref())?,
                body,
                if_match: options.if_match.clone(),
            },
            target.id.clone().filter(|_| !descriptor.is_singleton),
        ),
    };

    Ok(WritePlan {
        operation,
        type_name: descriptor.type_name.clone(),
        resource_id,
        parent_id,
        primary,
        sub_actions,
        skipped_sub_actions,
    })
}

fn is_collection_attribute(descriptor: &ResourceDescriptor, name: &str) -> bool {
    descriptor
        .schema
        .top_level_attribute(name)
        .is_some_and(|attribute| attribute.schema.is_collection())
}

// ============================================================================
// Execution
// ============================================================================

/// Issues a planned write.
///
/// A failing primary request is returned as is, since nothing was committed.
/// A failing sub-action is wrapped in `EngineError::PartialWrite`.
pub(crate) async fn execute_plan(
    executor: &RequestExecutor<'_>,
    descriptor: &ResourceDescriptor,
    plan: &WritePlan,
) -> EngineResult<WriteOutcome> {
    let mut progress = WriteProgress::new(plan.operation);
    progress.skipped = plan.skipped_sub_actions.clone();
    progress.resource_id = plan.resource_id.clone();

    let response = executor.execute(plan.primary.to_request()).await?;
    progress.primary_committed = true;

    if plan.operation == WriteOperation::Create && !descriptor.is_singleton {
        progress.resource_id = response
            .get(&descriptor.id_attribute)
            .and_then(Value::as_str)
            .map(str::to_string);
    }
    debug!(
        method = %plan.primary.method,
        uri = %plan.primary.uri,
        id = ?progress.resource_id,
        "Primary request committed"
    );

    if let Some(first) = plan.sub_actions.first() {
        let item_uri = match descriptor.item_uri(progress.resource_id.as_deref(), plan.parent_id.as_deref()) {
            Ok(uri) => uri,
            Err(_) => {
                let source = EngineError::unexpected_response(
                    &plan.primary.uri,
                    format!("response carries no '{}'", descriptor.id_attribute),
                );
                return Err(partial_write(progress, WriteStep::SubAction(first.index), source));
            }
        };

        for sub_action in &plan.sub_actions {
            let request = RemoteRequest::new(sub_action.method, join_uri(&item_uri, &sub_action.uri_suffix))
                .with_body(Value::Object(sub_action.body.clone()));
            match executor.execute(request).await {
                Ok(_) => progress.committed.push(sub_action.index),
                Err(source) => {
                    warn!(
                        resource = %descriptor.type_name,
                        sub_action = sub_action.index,
                        category = %source.category(),
                        error = %source,
                        "Sub-action failed; committed steps are kept"
                    );
                    return Err(partial_write(progress, WriteStep::SubAction(sub_action.index), source));
                }
            }
        }
    }

    info!(
        operation = %plan.operation,
        resource = %descriptor.type_name,
        id = ?progress.resource_id,
        sub_actions = progress.committed.len(),
        "Write completed"
    );

    Ok(WriteOutcome {
        id: progress.resource_id.clone(),
        progress,
        response,
        diagnostics: Diagnostics::new(),
    })
}

fn partial_write(progress: WriteProgress, failed_step: WriteStep, source: EngineError) -> EngineError {
    EngineError::PartialWrite {
        progress: Box::new(progress),
        failed_step,
        source: Box::new(source),
    }
}

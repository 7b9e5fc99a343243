//! The reconciliation engine for one resource type.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::descriptor::ResourceDescriptor;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::error::{EngineError, EngineResult};
use crate::read::{self, ListOutcome, ListQuery, ReadOutcome};
use crate::request::{OperationContext, RequestExecutor};
use crate::transport::{RemoteRequest, Transport};
use crate::write::{self, UpdateOptions, WriteOperation, WriteOutcome, WritePlan};

/// Addresses one remote object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceTarget {
    /// Object id. Unused for singletons.
    pub id: Option<String>,
    /// Id of the owning object, for child resources.
    pub parent_id: Option<String>,
}

impl ResourceTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            parent_id: None,
        }
    }

    /// Target for a singleton, which has no id.
    pub fn singleton() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Runs CRUD operations for one resource type.
///
/// The engine is cheap to clone and safe to share: the descriptor is
/// immutable and every operation owns its own request executor.
#[derive(Clone)]
pub struct ResourceEngine {
    descriptor: Arc<ResourceDescriptor>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for ResourceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceEngine")
            .field("type_name", &self.descriptor.type_name)
            .finish_non_exhaustive()
    }
}

impl ResourceEngine {
    /// Creates an engine after validating the descriptor.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidDescriptor` if the descriptor is
    /// inconsistent.
    pub fn new(descriptor: Arc<ResourceDescriptor>, transport: Arc<dyn Transport>) -> EngineResult<Self> {
        descriptor.validate()?;
        Ok(Self {
            descriptor,
            transport,
        })
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Reads one object.
    ///
    /// Returns `Ok(None)` when the object no longer exists remotely, so the
    /// caller can drop its local state.
    ///
    /// # Errors
    ///
    /// Returns any request failure other than 404. Enrichment failures are
    /// reported as warnings in the outcome instead.
    #[instrument(skip_all, fields(resource = %self.descriptor.type_name, id = ?target.id))]
    pub async fn read(&self, target: &ResourceTarget, context: &OperationContext) -> EngineResult<Option<ReadOutcome>> {
        let executor = RequestExecutor::new(self.transport.as_ref(), context);
        match read::read_one(&executor, &self.descriptor, target).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(EngineError::NotFound { uri }) => {
                info!(uri = %uri, "Resource removed externally");
                Ok(None)
            }
            Err(e) => Err(log_failure("read", e)),
        }
    }

    /// Lists the collection the resource type lives in.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a filter on a non-filterable data source.
    #[instrument(skip_all, fields(resource = %self.descriptor.type_name))]
    pub async fn list(
        &self,
        parent_id: Option<&str>,
        query: &ListQuery,
        context: &OperationContext,
    ) -> EngineResult<ListOutcome> {
        let executor = RequestExecutor::new(self.transport.as_ref(), context);
        read::list(&executor, &self.descriptor, parent_id, query)
            .await
            .map_err(|e| log_failure("list", e))
    }

    /// Plans a create without sending anything.
    ///
    /// The parent id of a child resource is taken from the desired state.
    pub fn plan_create(&self, desired: &Value) -> EngineResult<WritePlan> {
        write::plan_write(
            &self.descriptor,
            WriteOperation::Create,
            &ResourceTarget::default(),
            desired,
            &UpdateOptions::default(),
        )
    }

    /// Plans an update without sending anything.
    pub fn plan_update(
        &self,
        target: &ResourceTarget,
        desired: &Value,
        options: &UpdateOptions,
    ) -> EngineResult<WritePlan> {
        write::plan_write(&self.descriptor, WriteOperation::Update, target, desired, options)
    }

    /// Creates the object. For singletons this is a PATCH.
    ///
    /// # Errors
    ///
    /// Local validation errors are returned before any request. A failing
    /// sub-action yields `EngineError::PartialWrite`.
    #[instrument(skip_all, fields(resource = %self.descriptor.type_name))]
    pub async fn create(&self, desired: &Value, context: &OperationContext) -> EngineResult<WriteOutcome> {
        let plan = self.plan_create(desired)?;
        self.apply(&plan, context).await
    }

    /// Updates the object.
    ///
    /// # Errors
    ///
    /// As for [`create`](Self::create); a stale `If-Match` yields
    /// `ConcurrencyConflict`.
    #[instrument(skip_all, fields(resource = %self.descriptor.type_name, id = ?target.id))]
    pub async fn update(
        &self,
        target: &ResourceTarget,
        desired: &Value,
        options: &UpdateOptions,
        context: &OperationContext,
    ) -> EngineResult<WriteOutcome> {
        let plan = self.plan_update(target, desired, options)?;
        self.apply(&plan, context).await
    }

    /// Executes a plan produced by this engine.
    pub async fn apply(&self, plan: &WritePlan, context: &OperationContext) -> EngineResult<WriteOutcome> {
        let executor = RequestExecutor::new(self.transport.as_ref(), context);
        write::execute_plan(&executor, &self.descriptor, plan)
            .await
            .map_err(|e| log_failure("write", e))
    }

    /// Deletes the object. A 404 counts as already deleted.
    ///
    /// Singletons cannot be deleted: nothing is sent and a warning is
    /// returned.
    #[instrument(skip_all, fields(resource = %self.descriptor.type_name, id = ?target.id))]
    pub async fn delete(&self, target: &ResourceTarget, context: &OperationContext) -> EngineResult<Diagnostics> {
        let mut diagnostics = Diagnostics::new();
        if self.descriptor.is_singleton {
            diagnostics.warn(Diagnostic::warning(
                DiagnosticKind::SingletonDelete,
                format!(
                    "{} is a singleton and cannot be deleted; it was left unchanged",
                    self.descriptor.type_name
                ),
            ));
            return Ok(diagnostics);
        }

        let uri = self
            .descriptor
            .item_uri(target.id.as_deref(), target.parent_id.as_deref())?;
        let executor = RequestExecutor::new(self.transport.as_ref(), context);
        match executor.execute(RemoteRequest::delete(&uri)).await {
            Ok(_) => info!(uri = %uri, "Resource deleted"),
            Err(EngineError::NotFound { .. }) => info!(uri = %uri, "Resource already deleted"),
            Err(e) => return Err(log_failure("delete", e)),
        }
        Ok(diagnostics)
    }
}

fn log_failure(operation: &str, err: EngineError) -> EngineError {
    warn!(
        operation,
        category = %err.category(),
        retryable = err.is_retryable(),
        error = %err,
        "Operation failed"
    );
    err
}

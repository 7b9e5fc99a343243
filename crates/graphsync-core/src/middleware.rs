//! Per-resource extension points.
//!
//! Two hook points exist, both attached to the [`ResourceDescriptor`]:
//!
//! - [`WriteMiddleware`] runs once per write, after defaulting and encoding
//!   and before any network call. It may rewrite the outgoing body or reject
//!   the write.
//! - [`ReadEnrichment`] runs once per read, after the primary and extra GETs
//!   and before decoding. It may issue side-channel requests to augment the
//!   raw payload. A failing enrichment never fails the read: the engine
//!   restores the payload and records a warning.
//!
//! Hooks only touch the payload and the diagnostics sink. They cannot change
//! which sub-actions run or alter the descriptor.
//!
//! [`ResourceDescriptor`]: crate::descriptor::ResourceDescriptor

use std::fmt;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};

use crate::descriptor::join_uri;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::error::{EngineError, EngineResult};
use crate::request::RequestExecutor;
use crate::transport::RemoteRequest;
use crate::write::WriteOperation;

/// Error type for hook execution.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The hook could not process the payload.
    #[error("Hook execution failed: {0}")]
    Execution(String),

    /// A side-channel request failed.
    #[error("Request failed: {0}")]
    Request(#[from] EngineError),
}

impl HookError {
    pub fn execution(msg: impl Into<String>) -> Self {
        HookError::Execution(msg.into())
    }

    /// Returns `true` if the hook stopped because the operation was aborted.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            HookError::Request(EngineError::Cancelled | EngineError::Timeout)
        )
    }
}

// ============================================================================
// Hook Traits
// ============================================================================

/// Pre-write transform of the outgoing body.
///
/// Any `Fn(&mut Map<String, Value>, WriteOperation) -> Result<(), HookError>`
/// closure is a middleware.
pub trait WriteMiddleware: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Mutates the encoded body in place. Returning an error aborts the
    /// write before any request is sent.
    fn before_write(
        &self,
        body: &mut Map<String, Value>,
        operation: WriteOperation,
    ) -> Result<(), HookError>;
}

impl<F> WriteMiddleware for F
where
    F: Fn(&mut Map<String, Value>, WriteOperation) -> Result<(), HookError> + Send + Sync,
{
    fn name(&self) -> &str {
        std::any::type_name::<F>()
    }

    fn before_write(
        &self,
        body: &mut Map<String, Value>,
        operation: WriteOperation,
    ) -> Result<(), HookError> {
        self(body, operation)
    }
}

impl fmt::Debug for dyn WriteMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WriteMiddleware({})", self.name())
    }
}

/// Post-read augmentation of the raw payload.
#[async_trait]
pub trait ReadEnrichment: Send + Sync {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Augments `payload`. Partial failures should be recorded in
    /// `diagnostics` as warnings; a returned error is downgraded to a
    /// warning by the engine and the payload is restored.
    async fn enrich(
        &self,
        context: &EnrichmentContext<'_>,
        payload: &mut Value,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), HookError>;
}

impl fmt::Debug for dyn ReadEnrichment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReadEnrichment({})", self.name())
    }
}

/// What an enrichment hook may use to reach the remote API.
pub struct EnrichmentContext<'a> {
    executor: &'a RequestExecutor<'a>,
    resource_uri: &'a str,
}

impl<'a> EnrichmentContext<'a> {
    pub fn new(executor: &'a RequestExecutor<'a>, resource_uri: &'a str) -> Self {
        Self {
            executor,
            resource_uri,
        }
    }

    /// URI of the resource being read.
    pub fn resource_uri(&self) -> &str {
        self.resource_uri
    }

    /// GETs `uri` under the operation's cancellation and deadline.
    pub async fn get(&self, uri: &str) -> EngineResult<Value> {
        self.executor.execute(RemoteRequest::get(uri)).await
    }
}

// ============================================================================
// Bundled hooks
// ============================================================================

/// Base64-encodes top-level string fields on write and decodes them on read.
///
/// Used for script payloads whose wire form is base64 while configuration
/// holds plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Fields {
    fields: Vec<String>,
}

impl Base64Fields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl WriteMiddleware for Base64Fields {
    fn name(&self) -> &str {
        "base64_fields"
    }

    fn before_write(
        &self,
        body: &mut Map<String, Value>,
        _operation: WriteOperation,
    ) -> Result<(), HookError> {
        for field in &self.fields {
            if let Some(Value::String(plain)) = body.get_mut(field) {
                *plain = STANDARD.encode(plain.as_bytes());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ReadEnrichment for Base64Fields {
    fn name(&self) -> &str {
        "base64_fields"
    }

    async fn enrich(
        &self,
        _context: &EnrichmentContext<'_>,
        payload: &mut Value,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), HookError> {
        let Some(map) = payload.as_object_mut() else {
            return Ok(());
        };
        for field in &self.fields {
            let Some(Value::String(encoded)) = map.get_mut(field) else {
                continue;
            };
            let decoded = STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| e.to_string())
                .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()));
            match decoded {
                Ok(plain) => *encoded = plain,
                Err(reason) => diagnostics.warn(
                    Diagnostic::warning(
                        DiagnosticKind::Enrichment,
                        format!("Field '{field}' is not valid base64 text; left as received"),
                    )
                    .with_detail(reason)
                    .at_pointer(format!("/{field}")),
                ),
            }
        }
        Ok(())
    }
}

/// Drops write-once fields from update bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImmutableFields {
    fields: Vec<String>,
}

impl ImmutableFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl WriteMiddleware for ImmutableFields {
    fn name(&self) -> &str {
        "immutable_fields"
    }

    fn before_write(
        &self,
        body: &mut Map<String, Value>,
        operation: WriteOperation,
    ) -> Result<(), HookError> {
        if operation == WriteOperation::Update {
            for field in &self.fields {
                body.shift_remove(field);
            }
        }
        Ok(())
    }
}

pub const SECRET_ID_PLACEHOLDER: &str = "{secret_reference_id}";
const ENCRYPTED_STATE: &str = "encryptedValueToken";
const PLAINTEXT_STATE: &str = "notEncrypted";

/// Replaces encrypted secret setting values with their plaintext.
///
/// Every object in the payload tagged with `value_type` whose `valueState`
/// is `encryptedValueToken` is resolved by a GET to `uri_template` (relative
/// to the resource URI, with `{secret_reference_id}` replaced by the
/// object's `secretReferenceValueId`). The plaintext endpoint answers
/// `{ "value": "..." }`. A value that cannot be resolved keeps its encrypted
/// form and produces one warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReferenceResolver {
    value_type: String,
    uri_template: String,
}

impl SecretReferenceResolver {
    pub fn new(value_type: impl Into<String>, uri_template: impl Into<String>) -> Self {
        Self {
            value_type: value_type.into(),
            uri_template: uri_template.into(),
        }
    }
}

#[async_trait]
impl ReadEnrichment for SecretReferenceResolver {
    fn name(&self) -> &str {
        "secret_reference_resolver"
    }

    async fn enrich(
        &self,
        context: &EnrichmentContext<'_>,
        payload: &mut Value,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), HookError> {
        let mut secrets = Vec::new();
        collect_secrets(payload, String::new(), &self.value_type, &mut secrets);

        for (pointer, secret_id) in secrets {
            let uri = join_uri(
                context.resource_uri(),
                &self.uri_template.replace(SECRET_ID_PLACEHOLDER, &secret_id),
            );
            let plaintext = match context.get(&uri).await {
                Ok(body) => body.get("value").and_then(Value::as_str).map(str::to_string),
                Err(e @ (EngineError::Cancelled | EngineError::Timeout)) => return Err(e.into()),
                Err(e) => {
                    diagnostics.warn(
                        Diagnostic::warning(
                            DiagnosticKind::Enrichment,
                            "Could not resolve secret value; keeping encrypted value",
                        )
                        .with_detail(e.to_string())
                        .at_pointer(&pointer),
                    );
                    continue;
                }
            };

            match (plaintext, payload.pointer_mut(&pointer)) {
                (Some(plaintext), Some(Value::Object(setting))) => {
                    setting.insert("value".into(), Value::String(plaintext));
                    setting.insert("valueState".into(), Value::String(PLAINTEXT_STATE.into()));
                }
                _ => diagnostics.warn(
                    Diagnostic::warning(
                        DiagnosticKind::Enrichment,
                        "Secret endpoint returned no plaintext value; keeping encrypted value",
                    )
                    .at_pointer(&pointer),
                ),
            }
        }
        Ok(())
    }
}

/// Collects `(json pointer, secret reference id)` of encrypted values.
fn collect_secrets(value: &Value, pointer: String, value_type: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            let tagged = map.get("@odata.type").and_then(Value::as_str) == Some(value_type);
            let encrypted = map.get("valueState").and_then(Value::as_str) == Some(ENCRYPTED_STATE);
            if tagged
                && encrypted
                && let Some(secret_id) = map.get("secretReferenceValueId").and_then(Value::as_str)
            {
                out.push((pointer.clone(), secret_id.to_string()));
            }
            for (key, child) in map {
                let escaped = key.replace('~', "~0").replace('/', "~1");
                collect_secrets(child, format!("{pointer}/{escaped}"), value_type, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                collect_secrets(child, format!("{pointer}/{index}"), value_type, out);
            }
        }
        _ => {}
    }
}

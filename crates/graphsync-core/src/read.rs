//! Read pipeline.
//!
//! ```text
//! build query -> primary fetch -> extra requests -> enrichments -> decode
//! ```
//!
//! Requests are issued one after another. A failing extra request fails the
//! read. A failing enrichment does not: its changes are rolled back and a
//! warning is recorded.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::codec;
use crate::descriptor::{ResourceDescriptor, join_uri};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::engine::ResourceTarget;
use crate::error::{EngineError, EngineResult};
use crate::middleware::{EnrichmentContext, HookError};
use crate::query::{ODataQuery, id_filter};
use crate::request::RequestExecutor;
use crate::schema::AttrPath;
use crate::transport::{HttpMethod, RemoteRequest};

const ODATA_ETAG: &str = "@odata.etag";

/// Result of reading one resource.
#[derive(Debug, Clone, Serialize)]
pub struct ReadOutcome {
    pub id: Option<String>,
    /// Decoded remote state.
    pub state: Value,
    /// `@odata.etag` of the payload, for `If-Match` on a later update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub diagnostics: Diagnostics,
}

/// Caller-supplied options for listing a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub top: Option<u32>,
    pub order_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListOutcome {
    pub items: Vec<Value>,
    pub diagnostics: Diagnostics,
}

pub(crate) async fn read_one(
    executor: &RequestExecutor<'_>,
    descriptor: &ResourceDescriptor,
    target: &ResourceTarget,
) -> EngineResult<ReadOutcome> {
    let parent_id = target.parent_id.as_deref();
    let item_uri = descriptor.item_uri(target.id.as_deref(), parent_id)?;
    let query = ODataQuery::from_read_options(&descriptor.read);

    let mut raw = match target.id.as_deref() {
        Some(id) if descriptor.read.single_item_use_odata_filter && !descriptor.is_singleton => {
            let collection = descriptor.collection_uri(parent_id)?;
            let query = query.and_filter(id_filter(id));
            executor
                .fetch_collection(&collection, query.to_pairs(), Some(1))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| EngineError::not_found(&item_uri))?
        }
        _ => {
            executor
                .execute(RemoteRequest::get(&item_uri).with_query(query.to_pairs()))
                .await?
        }
    };

    let Some(payload) = raw.as_object_mut() else {
        return Err(EngineError::unexpected_response(&item_uri, "expected a JSON object"));
    };

    for extra in &descriptor.read.extra_requests {
        let uri = join_uri(&item_uri, &extra.uri_suffix);
        let items = executor
            .fetch_collection(&uri, Vec::new(), None)
            .await
            .map_err(|e| surface_not_found(e, &uri))?;
        debug!(uri = %uri, attribute = %extra.parent_attribute, count = items.len(), "Spliced extra request");
        payload.insert(extra.parent_attribute.clone(), Value::Array(items));
    }

    let mut diagnostics = Diagnostics::new();
    run_enrichments(executor, descriptor, &item_uri, &mut raw, &mut diagnostics).await?;

    let etag = raw.get(ODATA_ETAG).and_then(Value::as_str).map(str::to_string);
    let id = raw
        .get(&descriptor.id_attribute)
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| target.id.clone());
    let state = decode_item(descriptor, &raw, parent_id, &mut diagnostics);

    Ok(ReadOutcome {
        id,
        state,
        etag,
        diagnostics,
    })
}

/// A 404 below an object that exists is a failed read, not a removed
/// resource, so it must not reach the caller as `NotFound`.
fn surface_not_found(err: EngineError, uri: &str) -> EngineError {
    match err {
        EngineError::NotFound { uri: missing } => EngineError::RemoteRequest {
            method: HttpMethod::Get,
            uri: uri.to_string(),
            status: 404,
            message: format!("extra request target {missing} does not exist"),
            body: Value::Null,
        },
        other => other,
    }
}

/// Runs every enrichment hook in order against the raw payload.
///
/// Cancellation and deadline expiry inside a hook abort the read.
async fn run_enrichments(
    executor: &RequestExecutor<'_>,
    descriptor: &ResourceDescriptor,
    item_uri: &str,
    raw: &mut Value,
    diagnostics: &mut Diagnostics,
) -> EngineResult<()> {
    let context = EnrichmentContext::new(executor, item_uri);
    for hook in &descriptor.read_enrichments {
        let snapshot = raw.clone();
        let mut hook_diagnostics = Diagnostics::new();
        let result = hook.enrich(&context, raw, &mut hook_diagnostics).await;
        diagnostics.extend(hook_diagnostics);
        match result {
            Ok(()) => {}
            Err(HookError::Request(err @ (EngineError::Cancelled | EngineError::Timeout))) => {
                return Err(err);
            }
            Err(err) => {
                *raw = snapshot;
                diagnostics.warn(
                    Diagnostic::warning(
                        DiagnosticKind::Enrichment,
                        format!("Read enrichment '{}' failed; payload left as fetched", hook.name()),
                    )
                    .with_detail(err.to_string()),
                );
            }
        }
    }
    Ok(())
}

pub(crate) async fn list(
    executor: &RequestExecutor<'_>,
    descriptor: &ResourceDescriptor,
    parent_id: Option<&str>,
    list_query: &ListQuery,
) -> EngineResult<ListOutcome> {
    if list_query.filter.is_some() && !descriptor.read.data_source.filterable {
        return Err(EngineError::validation(
            &AttrPath::root(),
            format!("{} does not support filtering", descriptor.type_name),
        ));
    }

    let collection = descriptor.collection_uri(parent_id)?;
    let mut query = ODataQuery::from_read_options(&descriptor.read);
    if let Some(filter) = &list_query.filter {
        query = query.and_filter(filter.clone());
    }

    let raws = if descriptor.is_singleton || descriptor.read.data_source.singular {
        vec![
            executor
                .execute(RemoteRequest::get(&collection).with_query(query.to_pairs()))
                .await?,
        ]
    } else {
        let query = query
            .with_order_by(list_query.order_by.clone())
            .with_top(list_query.top);
        let limit = list_query.top.map(|top| top as usize);
        executor
            .fetch_collection(&collection, query.to_pairs(), limit)
            .await?
    };

    let mut diagnostics = Diagnostics::new();
    let items = raws
        .iter()
        .map(|raw| decode_item(descriptor, raw, parent_id, &mut diagnostics))
        .collect();
    Ok(ListOutcome { items, diagnostics })
}

/// Decodes a payload and restores the parent id field, which never travels
/// on the wire.
fn decode_item(
    descriptor: &ResourceDescriptor,
    raw: &Value,
    parent_id: Option<&str>,
    diagnostics: &mut Diagnostics,
) -> Value {
    let mut state = codec::decode(&descriptor.schema, raw, diagnostics).unwrap_or_else(|| Value::Object(Map::new()));
    if let (Some(parent), Some(parent_id), Value::Object(map)) = (&descriptor.parent, parent_id, &mut state) {
        map.insert(parent.parent_id_field.clone(), Value::String(parent_id.to_string()));
    }
    state
}

//! Translation between state values and wire payloads.
//!
//! State and wire objects share field names. They differ only around
//! unions: in state a union is an object holding its base attributes plus
//! one key per variant, at most one of which is populated. On the wire the
//! populated variant's attributes are flattened beside the base attributes
//! and the variant is named by a tag field (`@odata.type` by default).
//!
//! ```text
//! state: { "displayName": "x", "windowsWebApp": { "appUrl": "https://..." } }
//! wire:  { "@odata.type": "#microsoft.graph.windowsWebApp", "displayName": "x", "appUrl": "https://..." }
//! ```
//!
//! Encoding fails fast on schema violations. Decoding never fails: a tag that
//! matches no variant decodes as "no variant set" and records a warning,
//! because the remote API grows new variants faster than schemas do.

use serde_json::{Map, Value};

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::error::{EngineError, EngineResult};
use crate::schema::{AttrPath, ObjectNode, PathSegment, SchemaNode, UnionNode};

// ============================================================================
// Encode
// ============================================================================

/// Encodes a state value into its wire payload.
///
/// Returns `Ok(None)` when the value encodes to "absent" (a `null` value, or
/// an optional union with no variant set).
pub fn encode(node: &SchemaNode, state: &Value) -> EngineResult<Option<Value>> {
    encode_at(node, state, &AttrPath::root())
}

/// Encodes `state` located at `path`; `path` only feeds error messages.
pub fn encode_at(node: &SchemaNode, state: &Value, path: &AttrPath) -> EngineResult<Option<Value>> {
    if state.is_null() {
        return Ok(None);
    }

    match node {
        SchemaNode::Primitive { primitive } => {
            if primitive.accepts(state) {
                Ok(Some(state.clone()))
            } else {
                Err(EngineError::validation(
                    path,
                    format!("expected {primitive}, got {}", json_kind(state)),
                ))
            }
        }
        SchemaNode::Object(object) => {
            let map = expect_object(state, path)?;
            let mut out = Map::new();
            encode_object(object, map, path, &mut out)?;
            Ok(Some(Value::Object(out)))
        }
        SchemaNode::Collection(collection) => {
            let Value::Array(items) = state else {
                return Err(EngineError::validation(
                    path,
                    format!("expected collection, got {}", json_kind(state)),
                ));
            };
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let item_path = path.child(PathSegment::Index(index));
                out.push(encode_at(&collection.element, item, &item_path)?.unwrap_or(Value::Null));
            }
            Ok(Some(Value::Array(out)))
        }
        SchemaNode::Union(union) => {
            let map = expect_object(state, path)?;
            encode_union(union, map, path)
        }
    }
}

fn encode_object(
    object: &ObjectNode,
    state: &Map<String, Value>,
    path: &AttrPath,
    out: &mut Map<String, Value>,
) -> EngineResult<()> {
    for (name, attribute) in object.iter() {
        if attribute.is_read_only() {
            continue;
        }
        let attribute_path = path.child(PathSegment::attribute(name));
        match state.get(name).filter(|v| !v.is_null()) {
            Some(value) => {
                if let Some(encoded) = encode_at(&attribute.schema, value, &attribute_path)? {
                    out.insert(name.clone(), encoded);
                }
            }
            None if attribute.required => {
                return Err(EngineError::validation(
                    &attribute_path,
                    "required attribute is missing",
                ));
            }
            None => {}
        }
    }
    Ok(())
}

fn encode_union(
    union: &UnionNode,
    state: &Map<String, Value>,
    path: &AttrPath,
) -> EngineResult<Option<Value>> {
    let populated: Vec<&String> = union
        .variants
        .keys()
        .filter(|key| state.get(key.as_str()).is_some_and(|v| !v.is_null()))
        .collect();

    if populated.len() > 1 {
        return Err(EngineError::MultipleVariantsSet {
            path: path.clone(),
            variants: populated.into_iter().cloned().collect(),
        });
    }

    let mut out = Map::new();
    match populated.first() {
        Some(key) => {
            let variant = &union.variants[key.as_str()];
            let variant_path = path.child(PathSegment::variant(key.as_str()));
            let body = expect_object(&state[key.as_str()], &variant_path)?;
            out.insert(union.discriminator.clone(), Value::String(variant.tag.clone()));
            encode_object(&union.base, state, path, &mut out)?;
            encode_object(&variant.body, body, &variant_path, &mut out)?;
        }
        None => match &union.base_tag {
            Some(tag) => {
                out.insert(union.discriminator.clone(), Value::String(tag.clone()));
                encode_object(&union.base, state, path, &mut out)?;
            }
            None if union.require_variant => {
                return Err(EngineError::NoVariantSet { path: path.clone() });
            }
            None => return Ok(None),
        },
    }
    Ok(Some(Value::Object(out)))
}

/// Names of the clearable top-level wire fields `state` would encode.
///
/// Used to find attributes that were set before and are unset now. A
/// computed attribute without a default is left to the remote when unset,
/// so it is never reported.
pub fn writable_fields(node: &SchemaNode, state: &Value) -> Vec<String> {
    let Some(map) = state.as_object() else {
        return Vec::new();
    };
    let present = |object: &ObjectNode, map: &Map<String, Value>, out: &mut Vec<String>| {
        for (name, attribute) in object.iter() {
            let remote_owned = attribute.computed && attribute.default.is_none();
            if !remote_owned && map.get(name).is_some_and(|v| !v.is_null()) {
                out.push(name.clone());
            }
        }
    };

    let mut fields = Vec::new();
    match node {
        SchemaNode::Object(object) => present(object, map, &mut fields),
        SchemaNode::Union(union) => {
            present(&union.base, map, &mut fields);
            for (key, variant) in &union.variants {
                if let Some(Value::Object(body)) = map.get(key) {
                    present(&variant.body, body, &mut fields);
                }
            }
        }
        SchemaNode::Primitive { .. } | SchemaNode::Collection(_) => {}
    }
    fields
}

fn expect_object<'a>(value: &'a Value, path: &AttrPath) -> EngineResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        EngineError::validation(path, format!("expected object, got {}", json_kind(value)))
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Decode
// ============================================================================

/// Decodes a wire payload into a state value shaped by `node`.
///
/// Wire fields the schema does not declare are dropped. Returns `None` for
/// values that decode to "absent".
pub fn decode(node: &SchemaNode, wire: &Value, diagnostics: &mut Diagnostics) -> Option<Value> {
    decode_at(node, wire, &AttrPath::root(), diagnostics)
}

fn decode_at(
    node: &SchemaNode,
    wire: &Value,
    path: &AttrPath,
    diagnostics: &mut Diagnostics,
) -> Option<Value> {
    if wire.is_null() {
        return None;
    }

    match node {
        SchemaNode::Primitive { primitive } => {
            if !primitive.accepts(wire) {
                tracing::debug!(path = %path, expected = %primitive, "Passing through mismatched primitive");
            }
            Some(wire.clone())
        }
        SchemaNode::Object(object) => {
            let map = decodable_object(wire, path, diagnostics)?;
            let mut out = Map::new();
            decode_object(object, map, path, diagnostics, &mut out);
            Some(Value::Object(out))
        }
        SchemaNode::Collection(collection) => {
            let Value::Array(items) = wire else {
                diagnostics.warn(
                    Diagnostic::warning(DiagnosticKind::UndecodableValue, "Expected a collection")
                        .with_detail(format!("got {}", json_kind(wire)))
                        .at(path),
                );
                return None;
            };
            let out = items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    let item_path = path.child(PathSegment::Index(index));
                    decode_at(&collection.element, item, &item_path, diagnostics).unwrap_or(Value::Null)
                })
                .collect();
            Some(Value::Array(out))
        }
        SchemaNode::Union(union) => {
            let map = decodable_object(wire, path, diagnostics)?;
            Some(decode_union(union, map, path, diagnostics))
        }
    }
}

fn decode_object(
    object: &ObjectNode,
    wire: &Map<String, Value>,
    path: &AttrPath,
    diagnostics: &mut Diagnostics,
    out: &mut Map<String, Value>,
) {
    for (name, attribute) in object.iter() {
        let Some(value) = wire.get(name) else {
            continue;
        };
        let attribute_path = path.child(PathSegment::attribute(name));
        if let Some(decoded) = decode_at(&attribute.schema, value, &attribute_path, diagnostics) {
            out.insert(name.clone(), decoded);
        }
    }
}

fn decode_union(
    union: &UnionNode,
    wire: &Map<String, Value>,
    path: &AttrPath,
    diagnostics: &mut Diagnostics,
) -> Value {
    let mut out = Map::new();
    decode_object(&union.base, wire, path, diagnostics, &mut out);

    let Some(tag) = wire.get(&union.discriminator).and_then(Value::as_str) else {
        tracing::debug!(path = %path, "Union payload carries no type tag");
        return Value::Object(out);
    };
    if union.base_tag.as_deref() == Some(tag) {
        return Value::Object(out);
    }

    match union.variant_by_tag(tag) {
        Some((key, variant)) => {
            let variant_path = path.child(PathSegment::variant(key));
            let mut body = Map::new();
            decode_object(&variant.body, wire, &variant_path, diagnostics, &mut body);
            out.insert(key.to_string(), Value::Object(body));
        }
        None => {
            let known: Vec<&str> = union.variants.values().map(|v| v.tag.as_str()).collect();
            diagnostics.warn(
                Diagnostic::warning(
                    DiagnosticKind::UnknownDiscriminator,
                    format!("Unknown type tag '{tag}'; no variant decoded"),
                )
                .with_detail(format!("known tags: {}", known.join(", ")))
                .at(path),
            );
        }
    }
    Value::Object(out)
}

fn decodable_object<'a>(
    wire: &'a Value,
    path: &AttrPath,
    diagnostics: &mut Diagnostics,
) -> Option<&'a Map<String, Value>> {
    match wire {
        Value::Object(map) => Some(map),
        other => {
            diagnostics.warn(
                Diagnostic::warning(DiagnosticKind::UndecodableValue, "Expected an object")
                    .with_detail(format!("got {}", json_kind(other)))
                    .at(path),
            );
            None
        }
    }
}

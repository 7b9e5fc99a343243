//! Provider-side default values.
//!
//! Defaults fill only holes: an attribute whose desired value is absent or
//! `null` (Terraform's "unset" and "unknown" both arrive as `null`). A present
//! value, including `false`, `0`, `""` and `[]`, is never replaced, which also
//! makes applying defaults idempotent.
//!
//! Defaults on nested attributes only apply inside an object that exists.
//! When a parent object is absent and carries its own default, the parent
//! default is injected first and its children's defaults then fill the holes
//! left inside it.

use serde_json::{Map, Value};

use crate::schema::{Attribute, ObjectNode, SchemaNode};

/// Returns `desired` with every declared default applied.
pub fn apply_defaults(node: &SchemaNode, desired: &Value) -> Value {
    let mut resolved = desired.clone();
    apply_defaults_in_place(node, &mut resolved);
    resolved
}

/// In-place variant of [`apply_defaults`].
pub fn apply_defaults_in_place(node: &SchemaNode, value: &mut Value) {
    match node {
        SchemaNode::Primitive { .. } => {}
        SchemaNode::Object(object) => {
            if let Value::Object(map) = value {
                apply_object(object, map);
            }
        }
        SchemaNode::Collection(collection) => {
            if let Value::Array(items) = value {
                for item in items {
                    apply_defaults_in_place(&collection.element, item);
                }
            }
        }
        SchemaNode::Union(union) => {
            if let Value::Object(map) = value {
                apply_object(&union.base, map);
                for (key, variant) in &union.variants {
                    if let Some(Value::Object(body)) = map.get_mut(key) {
                        apply_object(&variant.body, body);
                    }
                }
            }
        }
    }
}

fn apply_object(object: &ObjectNode, map: &mut Map<String, Value>) {
    for (name, attribute) in object.iter() {
        let missing = map.get(name).is_none_or(Value::is_null);
        if missing {
            if let Some(default) = injected_default(attribute) {
                map.insert(name.clone(), default);
            } else {
                continue;
            }
        }
        if let Some(child) = map.get_mut(name) {
            apply_defaults_in_place(&attribute.schema, child);
        }
    }
}

fn injected_default(attribute: &Attribute) -> Option<Value> {
    let default = attribute.default.as_ref()?;
    let value = default.resolve();
    tracing::trace!(value = %value, "Injecting default");
    Some(value)
}

//! Depth-first traversal of a schema tree.
//!
//! The walker only sees the schema: a collection's element shape is visited
//! once under a [`PathSegment::Element`] step. Concrete elements are handled
//! per value by the codec and the default resolver.

use crate::schema::{AttrPath, Attribute, ObjectNode, PathSegment, SchemaNode};

/// Returned by a visitor to steer the traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    /// Do not descend into the current node's children.
    SkipChildren,
}

/// What the visitor is handed for every node.
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    pub path: &'a AttrPath,
    pub node: &'a SchemaNode,
    /// The attribute declaring this node, when the node is an attribute's
    /// schema (not for the root or collection elements).
    pub attribute: Option<&'a Attribute>,
}

/// Visits `node` and every descendant, parents before children.
pub fn walk<'a, F>(node: &'a SchemaNode, visit: &mut F)
where
    F: FnMut(Visit<'_>) -> WalkControl,
{
    walk_node(node, None, &AttrPath::root(), visit);
}

fn walk_node<'a, F>(
    node: &'a SchemaNode,
    attribute: Option<&'a Attribute>,
    path: &AttrPath,
    visit: &mut F,
) where
    F: FnMut(Visit<'_>) -> WalkControl,
{
    let control = visit(Visit {
        path,
        node,
        attribute,
    });
    if control == WalkControl::SkipChildren {
        return;
    }

    match node {
        SchemaNode::Primitive { .. } => {}
        SchemaNode::Object(object) => walk_object(object, path, visit),
        SchemaNode::Collection(collection) => {
            let element_path = path.child(PathSegment::Element);
            walk_node(&collection.element, None, &element_path, visit);
        }
        SchemaNode::Union(union) => {
            walk_object(&union.base, path, visit);
            for (key, variant) in &union.variants {
                walk_object(&variant.body, &path.child(PathSegment::variant(key)), visit);
            }
        }
    }
}

fn walk_object<'a, F>(object: &'a ObjectNode, path: &AttrPath, visit: &mut F)
where
    F: FnMut(Visit<'_>) -> WalkControl,
{
    for (name, attribute) in object.iter() {
        let attribute_path = path.child(PathSegment::attribute(name));
        walk_node(&attribute.schema, Some(attribute), &attribute_path, visit);
    }
}

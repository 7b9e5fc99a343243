//! Resource files: a descriptor plus declarative hook specs.
//!
//! ```json
//! {
//!   "descriptor": { "type_name": "...", "base_uri": "...", "schema": { ... } },
//!   "hooks": [{ "kind": "base64_fields", "fields": ["scriptContent"] }]
//! }
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use graphsync_core::{
    Base64Fields, ImmutableFields, ResourceDescriptor, SecretReferenceResolver,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ResourceFile {
    pub descriptor: ResourceDescriptor,
    #[serde(default)]
    pub hooks: Vec<HookSpec>,
}

/// Bundled hooks that can be attached from a resource file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookSpec {
    /// Base64 on write, decoded on read.
    Base64Fields { fields: Vec<String> },
    /// Dropped from update bodies.
    ImmutableFields { fields: Vec<String> },
    SecretReferenceResolver {
        value_type: String,
        uri_template: String,
    },
}

impl ResourceFile {
    /// Attaches the hooks to the descriptor.
    pub fn into_descriptor(self) -> ResourceDescriptor {
        let mut descriptor = self.descriptor;
        for hook in self.hooks {
            descriptor = match hook {
                HookSpec::Base64Fields { fields } => {
                    let hook = Arc::new(Base64Fields::new(fields));
                    descriptor
                        .with_write_middleware(hook.clone())
                        .with_read_enrichment(hook)
                }
                HookSpec::ImmutableFields { fields } => {
                    descriptor.with_write_middleware(Arc::new(ImmutableFields::new(fields)))
                }
                HookSpec::SecretReferenceResolver {
                    value_type,
                    uri_template,
                } => descriptor.with_read_enrichment(Arc::new(SecretReferenceResolver::new(
                    value_type,
                    uri_template,
                ))),
            };
        }
        descriptor
    }
}

pub fn load_resource(path: &Path) -> Result<ResourceDescriptor> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read resource file: {}", path.display()))?;
    let file: ResourceFile = serde_json::from_str(&content)
        .with_context(|| format!("Invalid resource file: {}", path.display()))?;
    Ok(file.into_descriptor())
}

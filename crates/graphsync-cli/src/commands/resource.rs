use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use graphsync_core::{
    ListQuery, OperationContext, ResourceDescriptor, ResourceEngine, ResourceTarget, UpdateOptions,
};
use serde_json::Value;

use crate::cli::{ListArgs, OutputFormat, PlanArgs, TargetArgs, UpdateArgs, WriteArgs};
use crate::output::{print_json, print_success, print_value, print_warnings};

fn read_body(file: &Option<PathBuf>) -> Result<Value> {
    let content = match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            buf
        }
    };
    serde_json::from_str(&content).context("Invalid JSON")
}

fn target(args: &TargetArgs) -> ResourceTarget {
    ResourceTarget {
        id: args.id.clone(),
        parent_id: args.parent.clone(),
    }
}

fn label(engine: &ResourceEngine, id: Option<&str>) -> String {
    let type_name = &engine.descriptor().type_name;
    match id {
        Some(id) => format!("{}/{}", type_name.cyan(), id.cyan()),
        None => type_name.cyan().to_string(),
    }
}

pub fn validate(descriptor: &ResourceDescriptor) -> Result<()> {
    descriptor.validate()?;
    print_success(&format!(
        "{} is valid ({} sub-actions, {} extra requests)",
        descriptor.type_name.cyan(),
        descriptor.write.sub_actions.len(),
        descriptor.read.extra_requests.len()
    ));
    Ok(())
}

pub async fn read(
    engine: &ResourceEngine,
    args: &TargetArgs,
    context: &OperationContext,
    format: OutputFormat,
) -> Result<()> {
    let target = target(args);
    let outcome = engine
        .read(&target, context)
        .await?
        .with_context(|| format!("{} not found", label(engine, target.id.as_deref())))?;
    print_warnings(&outcome.diagnostics);
    print_value(&outcome.state, format);
    Ok(())
}

pub async fn list(
    engine: &ResourceEngine,
    args: &ListArgs,
    context: &OperationContext,
    format: OutputFormat,
) -> Result<()> {
    let query = ListQuery {
        filter: args.filter.clone(),
        top: args.top,
        order_by: args.order_by.clone(),
    };
    let outcome = engine.list(args.parent.as_deref(), &query, context).await?;
    print_warnings(&outcome.diagnostics);
    print_value(&Value::Array(outcome.items), format);
    Ok(())
}

pub fn plan(engine: &ResourceEngine, args: &PlanArgs) -> Result<()> {
    let desired = read_body(&args.file)?;
    let plan = if args.update {
        engine.plan_update(&target(&args.target), &desired, &UpdateOptions::default())?
    } else {
        let mut desired = desired;
        inject_parent(engine, &mut desired, args.target.parent.as_deref());
        engine.plan_create(&desired)?
    };
    print_json(&serde_json::to_value(&plan)?);
    Ok(())
}

pub async fn create(
    engine: &ResourceEngine,
    args: &WriteArgs,
    context: &OperationContext,
    format: OutputFormat,
) -> Result<()> {
    let mut desired = read_body(&args.file)?;
    inject_parent(engine, &mut desired, args.parent.as_deref());
    let outcome = engine.create(&desired, context).await?;
    print_warnings(&outcome.diagnostics);
    print_success(&format!("Created {}", label(engine, outcome.id.as_deref())));
    print_value(&outcome.response, format);
    Ok(())
}

/// Reads the current object first so removed attributes are cleared and
/// the write is guarded by its etag.
pub async fn update(
    engine: &ResourceEngine,
    args: &UpdateArgs,
    context: &OperationContext,
    format: OutputFormat,
) -> Result<()> {
    let target = target(&args.target);
    let desired = read_body(&args.file)?;
    let current = engine
        .read(&target, context)
        .await?
        .with_context(|| format!("{} not found", label(engine, target.id.as_deref())))?;
    print_warnings(&current.diagnostics);

    let options = UpdateOptions {
        prior: Some(current.state),
        if_match: current.etag,
    };
    let outcome = engine.update(&target, &desired, &options, context).await?;
    print_warnings(&outcome.diagnostics);
    print_success(&format!("Updated {}", label(engine, target.id.as_deref())));
    print_value(&outcome.response, format);
    Ok(())
}

pub async fn delete(engine: &ResourceEngine, args: &TargetArgs, context: &OperationContext) -> Result<()> {
    let target = target(args);
    let diagnostics = engine.delete(&target, context).await?;
    print_warnings(&diagnostics);
    if diagnostics.is_empty() {
        print_success(&format!("Deleted {}", label(engine, target.id.as_deref())));
    }
    Ok(())
}

/// Sets the parent id field from `--parent` unless the file already has it.
fn inject_parent(engine: &ResourceEngine, desired: &mut Value, parent: Option<&str>) {
    if let (Some(item), Some(parent), Value::Object(map)) = (&engine.descriptor().parent, parent, desired)
    {
        map.entry(item.parent_id_field.clone())
            .or_insert_with(|| Value::String(parent.to_string()));
    }
}

use crate::cli::OutputFormat;
use colored::Colorize;
use graphsync_core::Diagnostics;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Table => print_as_table(value),
    }
}

pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => print_error(&format!("Failed to render JSON: {e}")),
    }
}

pub fn print_success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Warnings go to stderr so stdout stays machine-readable.
pub fn print_warnings(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        eprintln!("{} {}", "!".yellow(), diagnostic);
    }
}

fn print_as_table(value: &Value) {
    let Some(items) = value.as_array() else {
        let id = value.get("id").and_then(|v| v.as_str()).unwrap_or("-");
        println!("{} {}", "Resource:".cyan(), id.cyan());
        print_json(value);
        return;
    };
    if items.is_empty() {
        println!("No resources found.");
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(["ID", "Name", "Type"]);
    for item in items {
        let id = item.get("id").and_then(|v| v.as_str()).unwrap_or("-");
        let name = item
            .get("displayName")
            .or_else(|| item.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        let kind = variant_key(item).unwrap_or("-");
        builder.push_record([id, name, kind]);
    }
    let table = builder.build().with(Style::rounded()).to_string();
    println!("{table}");
    println!("Total: {}", items.len());
}

/// Name of the populated union variant, if the item has one.
fn variant_key(item: &Value) -> Option<&str> {
    item.as_object()?
        .iter()
        .find(|(_, v)| v.is_object())
        .map(|(k, _)| k.as_str())
}

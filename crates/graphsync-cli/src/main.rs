mod catalog;
mod cli;
mod commands;
mod logging;
mod output;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Parser;
use graphsync_core::{OperationContext, ResourceEngine};
use graphsync_http::HttpTransport;
use graphsync_http::config::{ClientConfig, loader::load_config};
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();

    let config = resolve_config(&cli)?;
    logging::init_tracing_with_level(&config.logging.level);

    let resource_path = match &cli.command {
        Commands::Validate(args) => &args.resource,
        Commands::Read(args) | Commands::Delete(args) => &args.resource.resource,
        Commands::List(args) => &args.resource.resource,
        Commands::Plan(args) => &args.target.resource.resource,
        Commands::Create(args) => &args.resource.resource,
        Commands::Update(args) => &args.target.resource.resource,
    };
    let descriptor = catalog::load_resource(resource_path)?;

    if let Commands::Validate(_) = &cli.command {
        return commands::resource::validate(&descriptor);
    }

    let transport = HttpTransport::new(&config.client)?;
    let engine = ResourceEngine::new(Arc::new(descriptor), Arc::new(transport))?;
    let context = OperationContext::new().with_cancellation(cancel_on_ctrl_c());

    match &cli.command {
        Commands::Validate(_) => {}
        Commands::Read(args) => commands::resource::read(&engine, args, &context, format).await?,
        Commands::List(args) => commands::resource::list(&engine, args, &context, format).await?,
        Commands::Plan(args) => commands::resource::plan(&engine, args)?,
        Commands::Create(args) => commands::resource::create(&engine, args, &context, format).await?,
        Commands::Update(args) => commands::resource::update(&engine, args, &context, format).await?,
        Commands::Delete(args) => commands::resource::delete(&engine, args, &context).await?,
    }

    Ok(())
}

/// Config file and environment, then command-line overrides.
fn resolve_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = load_config(cli.config.as_deref()).map_err(|e| anyhow!(e))?;
    if let Some(base_url) = &cli.base_url {
        config.client.base_url = base_url.clone();
    }
    if let Some(token) = &cli.token {
        config.client.bearer_token = Some(token.clone());
    }
    if let Some(timeout) = cli.timeout {
        config.client.timeout_ms = timeout;
    }
    config.validate().map_err(|e| anyhow!(e))?;
    Ok(config)
}

/// Cancels in-flight requests on Ctrl-C so no further steps are issued.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; cancelling the current operation");
            child.cancel();
        }
    });
    token
}

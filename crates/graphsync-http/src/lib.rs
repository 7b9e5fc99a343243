//! # graphsync-http
//!
//! HTTP transport and client configuration for the graphsync engine.
//!
//! [`HttpTransport`] implements [`graphsync_core::Transport`] with `reqwest`.
//! [`config::loader::load_config`] reads a [`ClientConfig`] from TOML and
//! `GRAPHSYNC__*` environment variables.

mod client;
pub mod config;

pub use client::HttpTransport;
pub use config::{ClientConfig, ClientSettings, LoggingConfig};

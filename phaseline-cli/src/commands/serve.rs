//! Serve command - run the HTTP transport adapter

use std::sync::Arc;

use anyhow::Result;
use phaseline_core::adapters::http;
use phaseline_core::{EntryPoint, LoggingService};

use super::{block_on, get_config, get_phaseline_dir};
use crate::output;

pub fn run(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = get_config()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let journal = get_phaseline_dir()
        .ok()
        .filter(|dir| std::fs::create_dir_all(dir).is_ok())
        .and_then(|dir| {
            LoggingService::new(&dir, EntryPoint::Server, env!("CARGO_PKG_VERSION")).ok()
        })
        .map(Arc::new);
    if journal.is_none() {
        output::warning("Run journal unavailable, continuing without it");
    }

    output::info(&format!(
        "Serving POST /migrate on http://{}:{}",
        config.server.host, config.server.port
    ));
    block_on(http::serve(&config, journal))??;
    Ok(())
}

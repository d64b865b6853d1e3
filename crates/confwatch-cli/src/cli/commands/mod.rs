use super::args::*;

pub mod keys;
pub mod watch;

use std::time::Duration;

use anyhow::Context;
use confwatch::{ConfResult, EtcdConfig, EtcdSettings};
use tracing::debug;

use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let settings = resolve_settings(&cli)?;
    debug!(endpoint = %settings.endpoint, timeout_ms = settings.timeout_ms, "resolved settings");

    let result = match EtcdConfig::new(settings) {
        Ok(client) => run(&client, cli.cmd).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Ok(SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code())
        }
    }
}

async fn run(client: &EtcdConfig, cmd: Command) -> ConfResult<()> {
    match cmd {
        Command::Get(args) => keys::get(client, args).await,
        Command::Set(args) => keys::set(client, args).await,
        Command::Cas(args) => keys::cas(client, args).await,
        Command::Mkdir(args) => keys::mkdir(client, args).await,
        Command::Add(args) => keys::add(client, args).await,
        Command::Rm(args) => keys::rm(client, args).await,
        Command::Watch(args) => watch::run(client, args).await,
    }
}

/// Settings file (or environment) first, then command-line overrides.
fn resolve_settings(cli: &Cli) -> anyhow::Result<EtcdSettings> {
    let mut settings = match &cli.config {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            EtcdSettings::from_yaml_str(&yaml)?
        }
        None => EtcdSettings::from_env(),
    };

    if let Some(endpoint) = &cli.endpoint {
        settings = settings.with_endpoint(endpoint.clone());
    }
    if let Some(ms) = cli.timeout_ms {
        settings = settings.with_timeout(Duration::from_millis(ms));
    }
    Ok(settings)
}

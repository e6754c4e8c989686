// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `relay` — entry point for the sandboxed script-execution broker.
//!
//! A single foreground command that starts the broker, plus two read-only
//! utility modes (`--namespaces`, `--types`) that spin the registry up
//! just long enough to print a catalog and exit, without binding a port.

mod exit_error;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use exit_error::ExitError;
use relay_daemon::{ctrl_c_shutdown, registry::Registry, supervisor::Supervisor, types_gen, worker_transport::WorkerTransport, App, CliOverrides, Settings};

/// Sandboxed script-execution broker.
#[derive(Parser, Debug)]
#[command(name = "relay", version, about)]
struct Cli {
    /// Client-facing WebSocket/HTTP port (env: RELAY_PORT, default 8787)
    #[arg(long)]
    port: Option<u16>,

    /// Worker-facing WebSocket port (env: RELAY_WORKER_PORT, default port+1)
    #[arg(long)]
    worker_port: Option<u16>,

    /// Directory scanned for namespace source files (env: RELAY_TOOLS_DIR)
    #[arg(long)]
    tools_dir: Option<PathBuf>,

    /// Executable used to run a namespace's worker (env: RELAY_WORKER_RUNNER, default node)
    #[arg(long)]
    worker_runner: Option<String>,

    /// Print the current namespace catalog and exit, without serving
    #[arg(long)]
    namespaces: bool,

    /// Print generated type definitions for one namespace and exit
    #[arg(long, value_name = "NAMESPACE")]
    types: Option<String>,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            port: self.port,
            worker_port: self.worker_port,
            tools_dir: self.tools_dir.clone(),
            worker_runner: self.worker_runner.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(err.code);
    }
}

async fn run() -> Result<(), ExitError> {
    let _guard = logging::init();
    let cli = Cli::parse();

    if cli.namespaces || cli.types.is_some() {
        return utility_mode(cli).await;
    }

    let settings = Settings::load(cli.overrides()).map_err(|err| ExitError::new(2, err.to_string()))?;

    let app = App::bootstrap(settings).await.map_err(|err| ExitError::new(3, err.to_string()))?;
    app.run(ctrl_c_shutdown()).await.map_err(|err| ExitError::new(1, err.to_string()))?;
    Ok(())
}

/// `--namespaces` / `--types`: bring the registry up against the
/// configured tools directory, print a catalog, tear back down. No socket
/// is bound in this mode.
async fn utility_mode(cli: Cli) -> Result<(), ExitError> {
    let settings = Settings::load(cli.overrides()).map_err(|err| ExitError::new(2, err.to_string()))?;
    let settings = Arc::new(settings);

    let transport = WorkerTransport::new();
    let supervisor = Supervisor::new(Arc::clone(&transport), Arc::clone(&settings));
    let registry = Registry::new(settings.tools_dir.clone(), supervisor, transport, Arc::clone(&settings));
    registry.start().await.map_err(|err| ExitError::new(3, err.to_string()))?;

    if cli.namespaces {
        let mut names = registry.namespace_names();
        names.sort();
        for name in names {
            println!("{name}");
        }
    }

    if let Some(namespace) = cli.types {
        match registry.functions_for(&namespace) {
            Some(functions) => println!("{}", types_gen::render_namespace(&namespace, &functions)),
            None => return Err(ExitError::new(4, format!("namespace {namespace} not found"))),
        }
    }

    Ok(())
}

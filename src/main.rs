//! setupforge - Main entry point
//!
//! Binary glue around the deployment engine: resolves the setup
//! configuration, builds the engine, and streams its events to stdout as
//! JSON lines for whatever shell is watching (the engine itself never
//! cares who consumes them).

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

use setupforge::cli::{Cli, Commands};
use setupforge::engine::{Engine, Event, EventSink};
use setupforge::host::system::SystemHost;
use setupforge::resolver::{self, HttpFetcher, Provenance};
use setupforge::{bundle, catalog, logging, DirBundle};

/// Emits every engine event to stdout as one JSON line.
struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&self, event: Event) {
        if let Ok(line) = serde_json::to_string(&event) {
            println!("{}", line);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Some(Commands::Eula) => {
            logging::init_console(cli.dev);
            let bundle = DirBundle::open(&cli.bundle)?;
            println!("{}", bundle::eula_text(&bundle));
            Ok(())
        }
        Some(Commands::Validate) => {
            logging::init_console(cli.dev);
            match validate(&cli) {
                Ok(active) => {
                    println!("✓ Setup configuration is valid: {} active modules", active.len());
                    for name in active {
                        println!("  - {}", name);
                    }
                    Ok(())
                }
                Err(e) => {
                    eprintln!("✗ Validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Run { offline }) => run(&cli, offline),
        None => run(&cli, false),
    }
}

/// Resolve and validate without installing anything.
fn validate(cli: &Cli) -> Result<Vec<String>> {
    let bundle = DirBundle::open(&cli.bundle)?;
    let root = resolver::prepare_root()?;
    let fetcher = HttpFetcher::new()?;
    let provenance = resolver::resolve(&bundle, &fetcher, &root)?;
    let active = catalog::resolve_active_modules(&bundle, &root, provenance)?;
    Ok(active)
}

/// Full install sequence: resolve, validate, build the engine, run.
fn run(cli: &Cli, offline: bool) -> Result<()> {
    let root = resolver::prepare_root().context("cannot create working root")?;
    let _log_guard = logging::init(&root, cli.dev)?;
    info!("working root: {}", root.display());
    if cli.dev {
        println!("working root: {}", root.display());
    }

    let bundle = Arc::new(DirBundle::open(&cli.bundle)?);
    let sink = Arc::new(StdoutSink);

    let provenance = if offline {
        info!("offline mode, using embedded setup configuration");
        resolver::restore_embedded(bundle.as_ref(), &root)?;
        Provenance::Embedded
    } else {
        let fetcher = HttpFetcher::new()?;
        resolver::resolve(bundle.as_ref(), &fetcher, &root)?
    };
    info!("setup configuration resolved (provenance: {:?})", provenance);

    let active = match catalog::resolve_active_modules(bundle.as_ref(), &root, provenance) {
        Ok(active) => active,
        Err(e) => {
            error!("setup configuration validation failed: {}", e);
            sink.emit(Event::Fatal(e.to_string()));
            std::process::exit(1);
        }
    };

    let engine = match Engine::new(bundle, Arc::new(SystemHost::new()), sink.clone(), &active) {
        Ok(engine) => engine,
        Err(e) => {
            error!("cannot load module manifests: {}", e);
            sink.emit(Event::Fatal(e.to_string()));
            std::process::exit(1);
        }
    };

    let outcome = engine.run();

    // Final per-module report, whatever the outcome.
    for status in engine.module_statuses() {
        match &status.error {
            Some(message) => info!("{}: {} ({})", status.name, status.status, message),
            None => info!("{}: {}", status.name, status.status),
        }
    }

    if let Err(e) = outcome {
        error!("installation failed: {}", e);
        sink.emit(Event::Fatal(e.to_string()));
        std::process::exit(1);
    }

    info!("installation completed");
    Ok(())
}

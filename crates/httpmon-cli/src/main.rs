mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use httpmon_core::{
    build_client, definition_channel, parse_duration, parse_manifests, parse_set_var, watch,
    Controller, ControllerConfig, CycleReport, DirectorySource, Engine, MonitorDefinition, Phase,
    ResponseCounters, RunnerRegistry,
};

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        VERSION
    } else {
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, String> {
    match parse_duration(raw) {
        Ok(d) if !d.is_zero() => Ok(d),
        Ok(_) => Err("timeout must be greater than zero".into()),
        Err(e) => Err(e.to_string()),
    }
}

/// Periodic chained HTTP monitors driven by HttpMonitor manifests.
#[derive(Parser)]
#[command(name = "httpmon", version = version_string(), about)]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a manifest directory, run every monitor and serve the HTTP API.
    Serve {
        /// Listen address (e.g. 0.0.0.0:8080). Overrides config file.
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory of HttpMonitor manifests. Overrides config file.
        #[arg(short, long)]
        manifests: Option<PathBuf>,

        /// Timeout for any single HTTP exchange (e.g. 29s). Overrides config file.
        #[arg(long, value_parser = parse_timeout)]
        http_client_timeout: Option<Duration>,

        /// Global variable available to every monitor, as key=value. Repeatable.
        #[arg(long = "set-var", value_parser = parse_set_var)]
        set_vars: Vec<(String, String)>,
    },
    /// Run one cycle of each monitor in the given manifests and report.
    Check {
        /// Manifest files (YAML or JSON).
        #[arg(required = true)]
        manifests: Vec<PathBuf>,

        /// Global variable available to every monitor, as key=value. Repeatable.
        #[arg(long = "set-var", value_parser = parse_set_var)]
        set_vars: Vec<(String, String)>,

        /// Print cycle reports as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            listen,
            config,
            manifests,
            http_client_timeout,
            set_vars,
        } => {
            run_serve(
                cli.verbose,
                listen,
                config,
                manifests,
                http_client_timeout,
                set_vars,
            )
            .await;
        }
        Commands::Check {
            manifests,
            set_vars,
            json,
        } => {
            init_tracing("pretty", if cli.verbose { "debug" } else { "warn" });
            let ok = run_check(&manifests, set_vars, json).await;
            if !ok {
                std::process::exit(1);
            }
        }
    }
}

async fn run_serve(
    verbose: bool,
    listen_override: Option<SocketAddr>,
    config_path: Option<PathBuf>,
    manifests_override: Option<PathBuf>,
    timeout_override: Option<Duration>,
    set_vars: Vec<(String, String)>,
) {
    let level = if verbose { "debug" } else { "info" };
    let app_config = if let Some(ref path) = config_path {
        match config::AppConfig::load(path) {
            Ok(c) => {
                init_tracing(&c.server.log_format, level);
                tracing::info!(path = %path.display(), "Loaded config file");
                c
            }
            Err(e) => {
                init_tracing("pretty", level);
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        }
    } else {
        init_tracing("pretty", level);
        config::AppConfig::default()
    };

    let listen = listen_override.unwrap_or(app_config.server.listen);
    let manifests_dir = manifests_override.unwrap_or_else(|| app_config.controller.manifests_dir.clone());

    let mut controller_config = app_config.to_controller_config().with_globals(set_vars);
    if let Some(timeout) = timeout_override {
        controller_config = controller_config.with_http_client_timeout(timeout);
    }

    let client = match build_client(controller_config.http_client_timeout) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            std::process::exit(1);
        }
    };

    let counters = Arc::new(ResponseCounters::new());
    let engine = Arc::new(Engine::new(client, counters.clone(), &controller_config));
    let registry = Arc::new(RunnerRegistry::new(engine));

    let (definition_tx, definition_rx) = definition_channel();
    let controller_handle = tokio::spawn(Controller::new(Arc::clone(&registry)).run(definition_rx));

    let watch_shutdown = CancellationToken::new();
    tracing::info!(dir = %manifests_dir.display(), "Loading monitor definitions");
    let watch_handle = tokio::spawn(watch(
        DirectorySource::new(manifests_dir),
        controller_config.rescan_interval,
        definition_tx,
        watch_shutdown.clone(),
    ));

    let state = httpmon_api::state::AppState::new(Arc::clone(&registry), counters);

    tracing::info!(%listen, "Starting httpmon API server");
    if let Err(e) = httpmon_api::serve_with_state(listen, state, httpmon_api::shutdown_signal()).await {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }

    tracing::info!("Shutdown signal received, stopping runners...");

    watch_shutdown.cancel();
    if let Err(e) = watch_handle.await {
        tracing::warn!(error = %e, "Definition watch ended abnormally");
    }
    // The watch owned the only sender, so the controller drains and exits.
    if let Err(e) = controller_handle.await {
        tracing::warn!(error = %e, "Controller ended abnormally");
    }

    let stopped = registry.stop_all().await;
    tracing::info!(count = stopped, "All runners stopped");
    tracing::info!("Shutdown complete");
}

fn load_definitions(paths: &[PathBuf]) -> Result<Vec<MonitorDefinition>, String> {
    let mut definitions = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let parsed = parse_manifests(&content)
            .map_err(|e| format!("Invalid manifest {}: {}", path.display(), e))?;
        definitions.extend(parsed);
    }
    Ok(definitions)
}

async fn run_check(paths: &[PathBuf], set_vars: Vec<(String, String)>, json: bool) -> bool {
    let definitions = match load_definitions(paths) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            return false;
        }
    };

    let controller_config = ControllerConfig::default().with_globals(set_vars);
    let client = match build_client(controller_config.http_client_timeout) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            return false;
        }
    };
    let engine = Engine::new(
        client,
        Arc::new(ResponseCounters::new()),
        &controller_config,
    );

    let mut reports = Vec::with_capacity(definitions.len());
    for definition in &definitions {
        reports.push(engine.execute_cycle(definition).await);
    }
    let ok = reports.iter().all(CycleReport::succeeded);

    if json {
        match serde_json::to_string_pretty(&reports) {
            Ok(out) => println!("{out}"),
            Err(e) => {
                eprintln!("{} {}", style("error:").red().bold(), e);
                return false;
            }
        }
        return ok;
    }

    println!(
        "{} {}",
        style("httpmon check").bold(),
        style(version_string()).dim()
    );
    for path in paths {
        println!("  {} {}", style("manifest:").dim(), path.display());
    }
    println!();

    for report in &reports {
        print_report(report);
    }

    let failed = reports.iter().filter(|r| !r.succeeded()).count();
    let summary = format!("{} monitors, {} failed", reports.len(), failed);
    if failed == 0 {
        println!("{}", style(summary).green().bold());
    } else {
        println!("{}", style(summary).red().bold());
    }
    ok
}

fn print_report(report: &CycleReport) {
    let badge = if report.succeeded() {
        style("PASS").green().bold()
    } else {
        style("FAIL").red().bold()
    };
    println!("{} {}", badge, style(&report.monitor).bold());

    for r in &report.requests {
        let phase = match r.phase {
            Phase::Primary => style("request"),
            Phase::Cleanup => style("cleanup").dim(),
        };
        let status = match r.status {
            Some(s) if r.is_ok() => style(s.to_string()).green(),
            Some(s) => style(s.to_string()).red(),
            None => style("---".to_string()).red(),
        };
        let line = format!(
            "  {:<7} {:<24} {:>3} {}",
            phase,
            r.name,
            status,
            style(format!("{}ms", r.elapsed_ms)).dim()
        );
        match &r.error {
            Some(e) => println!("{}  {}", line, style(e).red()),
            None => println!("{}", line),
        }
    }

    if report.primary_failed() {
        let ran = report.phase(Phase::Primary).count();
        println!(
            "  {}",
            style(format!("primary sequence stopped after {} request(s)", ran)).yellow()
        );
    }
    println!();
}

fn init_tracing(log_format: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_format {
        "json" => {
            fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .init();
        }
    }
}

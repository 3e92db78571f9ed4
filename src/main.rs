//! herakles-jvmtop - version 0.1.0
//!
//! Top-like console monitor for managed runtime instances.
//! This is the main entry point that resolves configuration, picks a view
//! and drives the poll loop until the iteration limit, the view or a signal
//! ends it.

mod cli;
mod commands;
mod config;
mod system;
mod views;

use chrono::Local;
use clap::Parser;
use herakles_jvmtop::{DetailMonitor, InstanceId, Monitor, MonitorOptions, ScenarioBackend};
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, error, info};
#[cfg(not(unix))]
use tracing::warn;
use tracing_subscriber::filter::LevelFilter;

use cli::{Args, Commands, LogLevel};
use commands::{command_generate_scenario, command_sysinfo};
use config::{resolve_config, show_config, validate_effective_config, Config};
use views::{ConsoleView, DetailView, OverviewView, StatView};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

fn level_from_str(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "off" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "info" => LevelFilter::INFO,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::WARN,
    }
}

/// Initializes tracing on stderr so log lines stay out of the console frames.
fn setup_logging(config: &Config, args: &Args) {
    let log_level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        match args.log_level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            // CLI default, the config file may still raise or lower it
            LogLevel::Warn => config
                .log_level
                .as_deref()
                .map(level_from_str)
                .unwrap_or(LevelFilter::WARN),
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    info!("Logging initialized with level: {}", log_level);
}

/// Registers the SIGINT (Ctrl+C) and SIGTERM handlers right away and
/// returns a future that resolves once either arrives.
#[cfg(unix)]
fn shutdown_listener() -> std::io::Result<impl Future<Output = ()>> {
    use signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    })
}

#[cfg(not(unix))]
fn shutdown_listener() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    })
}

/// Opens the management backend. Only scenario replay is available.
fn open_backend(config: &Config) -> anyhow::Result<ScenarioBackend> {
    let path = config.scenario_file.as_deref().ok_or_else(|| {
        anyhow::anyhow!("No management transport available, pass --scenario <FILE>")
    })?;
    let backend = ScenarioBackend::from_file(path)?;
    info!(
        "Replaying {} instances from {}",
        backend.scenario().instances.len(),
        path.display()
    );
    Ok(backend)
}

/// Picks the view: detail or stat for a single pid, the overview otherwise.
fn build_view(config: &Config, backend: &ScenarioBackend) -> anyhow::Result<Box<dyn ConsoleView>> {
    match config.pid {
        Some(pid) => {
            let stat = config.stat_view.unwrap_or(false);
            let mut discovery = backend.clone();
            let monitor = DetailMonitor::open(
                InstanceId(pid),
                &mut discovery,
                backend,
                config.effective_thread_limit(),
                !stat,
            )?;
            if stat {
                debug!("Starting stat view for pid {}", pid);
                Ok(Box::new(StatView::new(monitor)))
            } else {
                debug!("Starting detail view for pid {}", pid);
                Ok(Box::new(DetailView::new(
                    monitor,
                    config.thread_name_width(),
                    config.effective_thread_limit(),
                )))
            }
        }
        None => {
            let options = MonitorOptions {
                sort_order: config.sort_order(),
                scan_interval: config.scan_interval(),
            };
            debug!("Starting overview sorted by {}", options.sort_order);
            Ok(Box::new(OverviewView::new(Monitor::new(
                Box::new(backend.clone()),
                Box::new(backend.clone()),
                options,
            ))))
        }
    }
}

/// Runs exactly once after the loop: last reading, then release sessions.
fn finalize(view: &mut dyn ConsoleView) {
    print!("Finish execution ... ");
    print!("{}", views::final_reading(&view.published()));
    view.shutdown();
    println!("done!");
    let _ = std::io::stdout().flush();
}

/// Drives the view until the iteration limit, its exit flag or a signal.
async fn run(
    view: &mut dyn ConsoleView,
    backend: &ScenarioBackend,
    config: &Config,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let iterations = config.iterations();
    let delay = Duration::try_from_secs_f64(config.delay_secs())
        .map_err(|e| anyhow::anyhow!("Invalid delay {}: {}", config.delay_secs(), e))?;
    let clear = view.wants_clearing() && iterations != 1;

    tokio::pin!(shutdown);

    let mut stdout = std::io::stdout();
    let mut completed: i64 = 0;

    loop {
        let frame = view.render()?;

        let mut out = String::new();
        if clear {
            out.push_str(CLEAR_SCREEN);
        }
        if view.wants_top_bar() {
            out.push_str(&views::top_bar(Local::now()));
        }
        out.push_str(&frame);
        stdout.write_all(out.as_bytes())?;
        stdout.flush()?;

        backend.tick();
        completed += 1;

        if view.should_exit() || (iterations > 0 && completed >= iterations) {
            debug!("Leaving poll loop after {} iterations", completed);
            return Ok(());
        }

        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Main application entry point.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        return match command {
            Commands::GenerateScenario {
                output,
                instances,
                samples,
                threads,
            } => command_generate_scenario(output.clone(), *instances, *samples, *threads),
            Commands::Sysinfo => command_sysinfo(),
        };
    }

    let config = resolve_config(&args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&config, &args);
    info!("Starting herakles-jvmtop");

    // Handlers go in before the first frame so an early signal still finalizes
    let shutdown = shutdown_listener()?;

    let backend = open_backend(&config)?;
    let mut view = build_view(&config, &backend)?;

    let result = run(view.as_mut(), &backend, &config, shutdown).await;
    finalize(view.as_mut());

    if let Err(e) = result {
        error!("Monitoring stopped: {:#}", e);
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

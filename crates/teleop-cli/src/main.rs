//! `teleop-cli` – console teleoperation client.
//!
//! 1. Loads `~/.teleop/config.toml` (defaults when absent) and `TELEOP_*`
//!    overrides.
//! 2. Spawns a rosbridge session driver on a Tokio runtime.
//! 3. Drops the operator into a REPL that drives the robot and shows
//!    telemetry.
//! 4. Intercepts **Ctrl-C** to send an emergency stop before exiting.

mod config;
mod repl;
mod telemetry;

use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use teleop_bridge::spawn_ws_session;

/// Time allowed for the final stop frame to leave the socket on Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() {
    let _tracer = telemetry::init_tracing("teleop");

    print_banner();

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    println!("  Endpoint: {}", cfg.endpoint.bold());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start Tokio runtime");
            std::process::exit(1);
        }
    };

    let (handle, driver) = spawn_ws_session(cfg.bridge.clone(), cfg.endpoint.clone(), runtime.handle());
    runtime.spawn(repl::print_notices(handle.clone()));

    // The driver task is awaited by whichever of Ctrl-C or /quit gets there first.
    let driver = Arc::new(Mutex::new(Some(driver)));
    let shutdown = Arc::new(AtomicBool::new(false));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    {
        let handle = handle.clone();
        let driver = Arc::clone(&driver);
        let shutdown = Arc::clone(&shutdown);
        let rt = runtime.handle().clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "⚠  Ctrl-C received – sending emergency stop …".yellow().bold());
            shutdown.store(true, Ordering::SeqCst);
            handle.emergency_stop();
            handle.shutdown();
            if !join_driver(&rt, &driver) {
                std::thread::sleep(SHUTDOWN_GRACE);
            }
            println!("{}", "  ✓ Exiting teleop.".green());
            std::process::exit(130);
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; emergency stop on Ctrl-C will not be available");
        }
    }

    println!();
    println!(
        "  Type {} to connect, {} for a list of commands.\n",
        "/connect".bold().cyan(),
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(handle.clone(), shutdown);

    handle.shutdown();
    join_driver(runtime.handle(), &driver);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
}

/// Wait up to [`SHUTDOWN_GRACE`] for the driver task. `true` if it finished;
/// `false` on timeout or when another thread already took the task.
fn join_driver(rt: &Handle, driver: &Mutex<Option<JoinHandle<()>>>) -> bool {
    let Some(task) = driver.lock().ok().and_then(|mut d| d.take()) else {
        return false;
    };
    rt.block_on(async { tokio::time::timeout(SHUTDOWN_GRACE, task).await })
        .is_ok()
}

fn print_banner() {
    println!();
    println!("{}", r#"  _       _                  "#.bold().cyan());
    println!("{}", r#" | |_ ___| |___ ___ ___      "#.bold().cyan());
    println!("{}", r#" |  _| -_| | -_| . | . |     "#.bold().cyan());
    println!("{}", r#" |_| |___|_|___|___|  _|     "#.bold().cyan());
    println!("{}", r#"                   |_|       "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "teleop".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  rosbridge teleoperation console");
    println!();
}

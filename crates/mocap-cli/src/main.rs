//! `mocap` – headless motion-capture ingestion
//!
//! Runs one capture session against a simulated host scene:
//!
//! 1. Loads `~/.mocap/config.toml` (or the path given as the first
//!    argument), writing a default config on first run.
//! 2. Builds a simulated rig from the config's `[rig]` tables.
//! 3. Starts capture, listens for telemetry datagrams and pumps the sample
//!    tick until **Ctrl-C**.
//! 4. Stops capture and prints a keyframe summary.

mod config;
mod rig;

use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use mocap_host::sim::SimTimerHost;
use mocap_host::{JointContainer, PositionTarget, SceneGraph};
use mocap_runtime::{SessionController, init_tracing};
use mocap_types::CommandStatus;
use tracing::warn;

/// Longest the host loop sleeps between checks of the shutdown flag.
const HOST_POLL: Duration = Duration::from_millis(100);

fn main() -> ExitCode {
    let _telemetry = init_tracing("mocap");

    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping capture …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop the process to end capture");
    }

    let cfg = load_config();
    let session_config = match cfg.to_session_config() {
        Ok(c) => c,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    if cfg.rig.is_empty() {
        println!("  {}", "Rig is empty; samples will be received but not applied.".yellow());
    }

    let (mut scene, rig) = rig::build_scene(&cfg.rig, 0);
    let mut timers = SimTimerHost::new();
    let mut controller = match SessionController::new(session_config) {
        Ok(c) => c,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = controller.start(&scene, &mut timers) {
        println!("{}: {}", "Capture failed to start".red(), e);
        return ExitCode::FAILURE;
    }
    if let Some(session) = controller.session() {
        println!(
            "  {} on {}  (session {})",
            "Capturing".green().bold(),
            session.local_addr.to_string().bold(),
            session.id.to_string().dimmed()
        );
        println!("  Press {} to stop.\n", "Ctrl-C".bold().cyan());
    }

    while !shutdown.load(Ordering::SeqCst) {
        let now = Instant::now();
        timers.run_due(now, &mut scene);
        if !controller.listener_healthy() {
            break;
        }
        let wait = timers
            .next_due()
            .map_or(HOST_POLL, |due| due.saturating_duration_since(now).min(HOST_POLL));
        thread::sleep(wait);
    }

    let stopped = controller.stop(&mut timers);
    print_summary(&controller, &rig, scene.current_frame());
    match stopped {
        Ok(status) => {
            print_stop_status(status);
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "Capture ended with an error".red(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

fn load_config() -> config::Config {
    let explicit = std::env::args().nth(1).map(PathBuf::from);
    let path = explicit.clone().unwrap_or_else(config::config_path);

    match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) if explicit.is_some() => {
            println!("{}: {} not found", "Config error".red(), path.display());
            println!("  Using default configuration.");
            default_with_env()
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save_to(&cfg, &path) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            default_with_env()
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            default_with_env()
        }
    }
}

fn default_with_env() -> config::Config {
    let mut cfg = config::Config::default();
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_summary(controller: &SessionController, rig: &rig::SimRig, frame: i64) {
    println!();
    println!("{}", "  Capture summary".bold());
    if let Some(stats) = controller.last_listener_stats() {
        println!(
            "    datagrams: {}  samples: {}  dropped: {}",
            stats.datagrams, stats.samples, stats.decode_errors
        );
    }
    println!("    last frame: {}", frame);
    for armature in &rig.armatures {
        println!(
            "    {} {}: {} rotation keyframes",
            "armature".dimmed(),
            armature.id().bold(),
            armature.keyframes().len()
        );
    }
    for object in &rig.objects {
        println!(
            "    {} {}: {} position keyframes",
            "object".dimmed(),
            object.id().bold(),
            object.keyframes().len()
        );
    }
    println!("    total keyframes: {}", rig.keyframe_count());
    println!();
}

fn print_stop_status(status: CommandStatus) {
    if status.changed_state() {
        println!("  {} Capture stopped", "✓".green().bold());
    } else {
        println!("  {}", "Capture was not running.".yellow());
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   __  ___                      "#.bold().cyan());
    println!("{}", r#"  /  |/  /__  _______ ____      "#.bold().cyan());
    println!("{}", r#" / /|_/ / _ \/ __/ _ `/ _ \     "#.bold().cyan());
    println!("{}", r#"/_/  /_/\___/\__/\_,_/ .__/     "#.bold().cyan());
    println!("{}", r#"                    /_/         "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "mocap".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Sensor telemetry to keyframed animation");
    println!();
}

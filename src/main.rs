//! # brewpi entry point
//!
//! Runs the temperature-control engine against the simulated kettle with a terminal
//! front end.
//!
//! ## Usage
//! `brewpi [config.toml] [--relay]`: without a path every engine default applies and no
//! controller can start until gains are configured (see `config/simulated_kettle.toml`).
//! `--relay` drives the heater on/off instead of with a continuous duty.
//!
//! ## Front end
//! - Menu on stdin: setpoint, controller selection, start/stop of both tasks, manual pump
//!   switch, status.
//! - Live chart: `<export dir>/live/window.svg`, redrawn on every acquisition tick.
//! - On exit: both tasks stop, then `session_history.csv` and `session_summary.csv` are
//!   written to the export directory.

use std::{
    env,
    io::{Write, stdin, stdout},
    path::Path,
    process::ExitCode,
    sync::Arc,
};

use log::{error, info};

use brewpi::{
    control::{
        actuator::{Actuator, ActuatorCommand, RelayActuator},
        controller::ControllerKind,
    },
    runtime::lifecycle::{LifecycleManager, TaskKind},
    simulation::{
        dashboard::Dashboard,
        kettle::{KettleParams, SimulatedKettle},
    },
    utils::{
        config::EngineConfig,
        error::Result,
        export::{SessionSummary, export_history, export_summary},
    },
};

/// Controller output (percent) at or above which the relay closes.
const RELAY_THRESHOLD: f64 = 50.0;

fn main() -> ExitCode {
    env_logger::init();
    info!("=== BREWPI START ===");

    match run() {
        Ok(()) => {
            info!("=== BREWPI FINISHED ===");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("brewpi: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let relay = args.iter().any(|a| a == "--relay");
    let config = match args.iter().find(|a| !a.starts_with("--")) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            EngineConfig::load(Path::new(path))?
        }
        None => {
            info!("No configuration file given, using defaults");
            EngineConfig::default()
        }
    };

    let kettle = Arc::new(SimulatedKettle::new(KettleParams::default()));
    let export_dir = Path::new(&config.export.directory).to_path_buf();
    let actuator: Arc<dyn Actuator> = if relay {
        // On/off heater, like a single GPIO pin driving a solid-state relay.
        Arc::new(RelayActuator::new(kettle.clone(), RELAY_THRESHOLD))
    } else {
        kettle.clone()
    };
    let engine = LifecycleManager::new(config, kettle, actuator)?;

    let dashboard = Dashboard::new(&export_dir.join("live"), engine.config().engine.horizon_secs)?;
    println!("Live chart: {}", dashboard.target().display());
    let _render = dashboard.spawn(engine.window_updates())?;

    loop {
        match prompt_menu(&engine).as_str() {
            "1" => {
                if let Some(value) = prompt("New setpoint (°C): ").and_then(|s| s.parse::<f64>().ok()) {
                    report(engine.set_setpoint(value));
                } else {
                    println!("Not a number.");
                }
            }
            "2" => {
                let names: Vec<&str> = ControllerKind::ALL.iter().map(|k| k.name()).collect();
                let answer = prompt(&format!("Controller [{}]: ", names.join("/"))).unwrap_or_default();
                match answer.parse::<ControllerKind>() {
                    Ok(kind) => engine.select_controller(kind),
                    Err(e) => println!("{e}"),
                }
            }
            "3" => report(engine.start(TaskKind::Acquisition)),
            "4" => engine.stop(TaskKind::Acquisition),
            "5" => report(engine.start(TaskKind::Control)),
            "6" => {
                if confirm("Really stop control? [y/N]: ") {
                    engine.stop(TaskKind::Control);
                } else {
                    println!("Control keeps running.");
                }
            }
            "7" => report(engine.apply_manual(ActuatorCommand::Switch(true))),
            "8" => report(engine.apply_manual(ActuatorCommand::Switch(false))),
            "9" => print_status(&engine),
            "0" | "q" => break,
            "" => {}
            other => println!("Unrecognized option '{}', please try again.", other),
        }
    }

    engine.shutdown();

    let samples = engine.history();
    let acquisition = engine.health(TaskKind::Acquisition);
    let control = engine.health(TaskKind::Control);
    let controller = engine.selected_controller();
    export_history(&export_dir, &samples)?;
    export_summary(
        &export_dir,
        &SessionSummary {
            samples: &samples,
            capacity: engine.buffer().occupancy().1,
            controller: controller.name(),
            acquisition: &acquisition,
            control: &control,
        },
    )?;
    println!("Session exported to {}", export_dir.display());
    Ok(())
}

fn prompt_menu(engine: &LifecycleManager) -> String {
    println!("\n┌─────────────────────────────────────────────┐");
    println!(
        "│ setpoint {:>6.2} °C   controller {:<4}         │",
        engine.setpoint(),
        engine.selected_controller().name()
    );
    println!(
        "│ acquisition {:<14} control {:<13}│",
        format!("{:?}", engine.state(TaskKind::Acquisition)),
        format!("{:?}", engine.state(TaskKind::Control))
    );
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) Set setpoint      2) Select controller  │");
    println!("│  3) Start acquisition 4) Stop acquisition   │");
    println!("│  5) Start control     6) Stop control       │");
    println!("│  7) Pump on           8) Pump off           │");
    println!("│  9) Status            0) Exit               │");
    println!("└─────────────────────────────────────────────┘");
    prompt("Select: ").unwrap_or_else(|| "0".into())
}

/// Reads one trimmed line; `None` on end of input.
fn prompt(text: &str) -> Option<String> {
    print!("{text}");
    let _ = stdout().flush();
    let mut input = String::new();
    match stdin().read_line(&mut input) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(input.trim().to_string()),
    }
}

fn confirm(text: &str) -> bool {
    matches!(prompt(text).as_deref(), Some("y" | "Y" | "yes"))
}

fn report(result: Result<()>) {
    if let Err(e) = result {
        println!("{e}");
    }
}

fn print_status(engine: &LifecycleManager) {
    let (len, capacity) = engine.buffer().occupancy();
    println!("samples {len} / capacity {capacity}");
    if let Some((setpoint, measurement)) = engine.window().latest() {
        println!("latest: {measurement:.2} °C (target {setpoint:.2} °C)");
    }
    for kind in [TaskKind::Acquisition, TaskKind::Control] {
        let h = engine.health(kind);
        println!(
            "{kind}: {:?} ticks={} sensor_fail={} actuator_fail={} timeouts={} overruns={} skipped={} dropped={} idle={}{}",
            engine.state(kind),
            h.ticks,
            h.sensor_failures,
            h.actuator_failures,
            h.io_timeouts,
            h.overruns,
            h.skipped_ticks,
            h.dropped_updates,
            h.idle_ticks,
            if h.faulted { " FAULTED" } else { "" }
        );
        if let Some(last) = &h.last_error {
            println!("  last error: {last}");
        }
        if let Some(command) = h.last_command {
            println!("  last command: {command:.2}");
        }
    }
}

//! evt-rsp CLI: list EVT response boxes, check session files, run trials with LED feedback
//! and keyboard fallback, and write outcomes as JSON lines.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use evt_response::backends::hid::{HidBackend, SETTLE_LIST, SETTLE_PREPARE};
use evt_response::backends::keyboard::TerminalKeyboard;
use evt_response::config::DEFAULT_GROUP;
use evt_response::device::LED_COUNT;
use evt_response::{
    ActiveDevice, DeviceSelector, EvtError, LedTrigger, ResponseLogger, Rgb, Session,
    SessionConfig,
};

/// Response-box trials for EVT devices.
#[derive(Parser)]
#[command(name = "evt-rsp", version, about)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List selectable devices.
    List {
        /// Product group to scan for.
        #[arg(long, default_value = DEFAULT_GROUP)]
        group: String,
    },

    /// Validate a session file without touching hardware.
    Check {
        /// Session file (TOML).
        config: PathBuf,
    },

    /// Run every trial in a session file.
    Run {
        /// Session file (TOML).
        config: PathBuf,

        /// Append outcomes to this file as JSON lines.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Set the four button LEDs of a device.
    Leds {
        /// Device slot (from `evt-rsp list`).
        slot: usize,

        /// Up to four colors, `#RRGGBB`; missing LEDs are switched off.
        colors: Vec<String>,

        #[arg(long, default_value = DEFAULT_GROUP)]
        group: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::List { group } => list(&group),
        Commands::Check { config } => check(&config),
        Commands::Run { config, output } => run(&config, output),
        Commands::Leds {
            slot,
            colors,
            group,
        } => leds(slot, &colors, &group),
    }
}

fn session(group: &str, settle: std::time::Duration) -> Session {
    Session::new(
        Box::new(HidBackend::new(settle)),
        Box::new(TerminalKeyboard::new()),
    )
    .with_group(group)
}

fn load(path: &Path) -> Result<SessionConfig> {
    SessionConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn list(group: &str) -> Result<()> {
    let mut session = session(group, SETTLE_LIST);
    for choice in session.device_choices() {
        println!("{choice}");
    }
    Ok(())
}

fn check(path: &Path) -> Result<()> {
    let config = load(path)?;
    for (i, trial) in config.trials.iter().enumerate() {
        let plan = trial
            .prepare()
            .with_context(|| format!("trial {} ({})", i + 1, trial.item))?;
        println!(
            "{}: {} mask=0b{:08b} correct={} timeout={} feedback={}",
            i + 1,
            plan.item,
            plan.allowed.mask(),
            plan.correct_button,
            plan.timeout,
            if plan.feedback.is_some() { "yes" } else { "no" },
        );
    }
    println!("{} trial(s) OK", config.trials.len());
    Ok(())
}

fn run(path: &Path, output: Option<PathBuf>) -> Result<()> {
    let mut config = load(path)?;

    // Configuration errors stop the run before the first trial.
    for (i, trial) in config.trials.iter().enumerate() {
        trial
            .prepare()
            .with_context(|| format!("trial {} ({})", i + 1, trial.item))?;
    }

    let mut session = session(&config.group, SETTLE_PREPARE);

    let uses_device = config
        .trials
        .iter()
        .any(|t| matches!(t.device.parse::<DeviceSelector>(), Ok(s) if !s.is_keyboard()));
    if uses_device {
        let choices = session.device_choices();
        for trial in &mut config.trials {
            if let Ok(selector) = trial.device.parse::<DeviceSelector>() {
                trial.device = selector.reconcile(&choices).to_string();
            }
        }
    }

    let mut out = match output {
        Some(p) => Some(BufWriter::new(
            File::options()
                .create(true)
                .append(true)
                .open(&p)
                .with_context(|| format!("opening {}", p.display()))?,
        )),
        None => None,
    };

    let mut logger = ResponseLogger::new();
    for trial in &config.trials {
        let prepared = session.prepare(trial)?;
        let outcome = match session.run_and_record(&prepared, &mut logger) {
            Ok(outcome) => outcome,
            Err(e @ EvtError::MultipleButtonsPressed { .. }) => {
                warn!(item = %trial.item, error = %e, "Trial discarded");
                continue;
            }
            Err(e) => {
                error!(item = %trial.item, error = %e, "Trial failed");
                return Err(e.into());
            }
        };
        if let Some(w) = out.as_mut() {
            serde_json::to_writer(&mut *w, &outcome)?;
            w.write_all(b"\n")?;
        }
    }

    if let Some(mut w) = out {
        w.flush()?;
    }
    info!("Recorded {} response(s)", logger.recorded());
    session.close();
    Ok(())
}

fn leds(slot: usize, colors: &[String], group: &str) -> Result<()> {
    if colors.len() > LED_COUNT {
        bail!("at most {LED_COUNT} colors");
    }
    let colors = colors
        .iter()
        .map(|c| c.parse::<Rgb>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut session = session(group, SETTLE_PREPARE);
    let selector: DeviceSelector = format!("{slot}:").parse()?;
    if session.resolve(&selector) == ActiveDevice::Keyboard {
        bail!("no EVT device in slot {slot}");
    }

    let registry = session.registry_mut();
    let device = registry.select(slot)?;
    for led in 1..=LED_COUNT as u8 {
        let color = colors.get(led as usize - 1).copied().unwrap_or(Rgb::BLACK);
        device.set_led(led, color, LedTrigger::Immediate)?;
    }
    println!("{}: LEDs set", device.name());
    Ok(())
}

//! GroveIO - GrovePi monitor daemon
//!
//! Opens the board, connects the input devices listed in the configuration
//! and logs their value changes until interrupted.

use grove_io::GroveBus;
use grove_io::config::AppConfig;
use grove_io::error::{Error, Result};
use grove_io::transport::{MockTransport, Transport};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

struct Args {
    config_path: String,
    mock: bool,
}

/// Parse command line arguments.
///
/// Supports:
/// - `grove-io <path>` (positional)
/// - `grove-io --config <path>` / `-c <path>`
/// - `--mock` to run against an in-memory board
///
/// Defaults to `/etc/grove-io.toml` if not specified.
fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();
    let mock = args.iter().any(|a| a == "--mock");

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Args {
                config_path: args[i + 1].clone(),
                mock,
            };
        }
    }

    let positional = args.iter().skip(1).find(|a| !a.starts_with('-')).cloned();
    Args {
        config_path: positional.unwrap_or_else(|| "/etc/grove-io.toml".to_string()),
        mock,
    }
}

fn load_config(path: &str) -> Result<AppConfig> {
    if Path::new(path).exists() {
        AppConfig::from_file(path)
    } else {
        eprintln!("Config {} not found, using defaults", path);
        Ok(AppConfig::default())
    }
}

fn open_transport(config: &AppConfig, mock: bool) -> Result<Box<dyn Transport>> {
    if mock {
        return Ok(Box::new(MockTransport::new()));
    }
    #[cfg(feature = "hardware")]
    {
        let transport =
            grove_io::transport::I2cTransport::open(config.bus.bus_number, config.bus.retry_policy())?;
        Ok(Box::new(transport))
    }
    #[cfg(not(feature = "hardware"))]
    {
        let _ = config;
        Err(Error::Config(
            "built without the hardware feature, run with --mock".to_string(),
        ))
    }
}

fn main() -> Result<()> {
    let args = parse_args();
    let config = load_config(&args.config_path)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("GroveIO v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", args.config_path);

    let transport = open_transport(&config, args.mock)?;
    let bus = GroveBus::with_transport(transport, &config.bus)?;

    match bus.firmware_version() {
        Ok(version) => log::info!("Firmware version {}", version),
        Err(e) => log::warn!("Could not read firmware version: {}", e),
    }

    let mut watches = Vec::new();
    for port in &config.ports {
        match port.device.watch(&bus, port.label, port.sample_interval()) {
            Ok(watch) => watches.push(watch),
            Err(e) => log::error!("Failed to connect {:?} on {}: {}", port.device, port.label, e),
        }
    }
    log::info!("Watching {} ports", watches.len());

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    log::info!("Shutting down...");
    drop(watches);
    bus.close()?;
    log::info!("GroveIO stopped");
    Ok(())
}

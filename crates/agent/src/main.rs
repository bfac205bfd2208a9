//! `thermwatch-agent` -- amplifier overheat monitor.
//!
//! Polls each configured device for its temperature over a serial line,
//! tracks consecutive over-limit readings per device and runs the
//! emergency power-off command once an overheat has persisted for the
//! configured number of cycles.
//!
//! # Environment variables
//!
//! | Variable                | Required | Default                 | Description                               |
//! |-------------------------|----------|-------------------------|-------------------------------------------|
//! | `THERMWATCH_CONFIG`     | no       | `/etc/thermwatch.json`  | JSON config file; missing means defaults  |
//! | `THERMWATCH_TEST_MODE`  | no       | --                      | `1`/`true`: echo the power-off command    |
//! | `THERMWATCH_LOG_FORMAT` | no       | `text`                  | `json` for JSON log lines                 |
//! | `RUST_LOG`              | no       | `thermwatch_agent=info,thermwatch_core=info` | tracing filter       |

use std::path::PathBuf;

use thermwatch_agent::monitor::Monitor;
use thermwatch_agent::shutdown::PowerOffCommand;
use thermwatch_agent::signal::cancel_on_signal;
use thermwatch_agent::transport::SerialTransport;
use thermwatch_core::MonitorConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_PATH: &str = "/etc/thermwatch.json";

const DEFAULT_LOG_FILTER: &str = "thermwatch_agent=info,thermwatch_core=info";

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true"))
        .unwrap_or(false)
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    let json = std::env::var("THERMWATCH_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config_path = std::env::var("THERMWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = match MonitorConfig::load(&config_path) {
        Ok(Some(config)) => {
            tracing::info!(path = %config_path.display(), "Loaded configuration");
            config
        }
        Ok(None) => {
            tracing::info!(path = %config_path.display(), "No config file, using defaults");
            MonitorConfig::default()
        }
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let test_mode = env_flag("THERMWATCH_TEST_MODE");
    let config = if test_mode {
        tracing::warn!("Test mode: the power-off command will only be echoed");
        config.into_test_mode()
    } else {
        config
    };

    let action = PowerOffCommand::from_config(&config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid power-off command");
        std::process::exit(1);
    });
    let transport = SerialTransport::new(config.device_dir.clone(), config.serial.clone());

    let mut monitor = Monitor::new(&config, transport, action);
    if let Err(e) = monitor.verify_devices() {
        tracing::error!(error = %e, "Device check failed");
        std::process::exit(1);
    }

    tracing::info!(
        devices = ?config.devices,
        results_file = ?config.results_file,
        test_mode,
        "Starting thermwatch-agent",
    );

    let cancel = CancellationToken::new();
    let signal_handle = cancel_on_signal(cancel.clone());

    monitor.run(&cancel).await;

    signal_handle.abort();
    tracing::info!("thermwatch-agent stopped");
}

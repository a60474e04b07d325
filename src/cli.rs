use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use clap::{Parser, Subcommand};
use log::{info, warn};

use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::btle::BtleHost;
use crate::device::codec::{encode_display, timeout_from_duration};
use crate::device::dispatch::SensorObserver;
use crate::device::session::DeviceSession;
use crate::device::types::{ButtonAction, FlyDirection, SwipeDirection};
use crate::error::{AppRunError, SessionError};

#[derive(Debug, Parser)]
#[command(version, about = "Talks to a Nuimo over Bluetooth LE")]
pub struct Args {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Advertised device name to look for
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// Hardware address to look for; takes precedence over the name
    #[arg(long, global = true)]
    pub address: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log every input event until Ctrl-C is pressed
    Monitor,
    /// Show a pattern on the LED matrix
    Display {
        /// 81 symbols, row by row; ' ' and '0' are off. Line breaks are ignored.
        pattern: String,
        #[arg(long)]
        brightness: Option<u8>,
        /// How long to show the pattern, in seconds
        #[arg(long)]
        timeout: Option<f32>,
    },
    /// Write the effective settings to the config file
    SaveConfig,
}

/// Logs events and keeps track of the absolute rotation.
#[derive(Default)]
struct LoggingObserver {
    angle: i64,
}

impl SensorObserver for LoggingObserver {
    fn on_battery(&mut self, level: u8) {
        info!("Battery: {}%", level);
    }

    fn on_button(&mut self, action: ButtonAction) {
        info!("Button state: {:?}", action);
    }

    fn on_rotation(&mut self, delta_steps: i16) {
        self.angle += i64::from(delta_steps);
        info!("Angle: {}", self.angle);
    }

    fn on_swipe(&mut self, direction: SwipeDirection) {
        info!("Swipe {:?}", direction);
    }

    fn on_fly(&mut self, direction: FlyDirection, distance: u8) {
        match direction {
            // means close/far
            FlyDirection::UpDown => info!("Hover distance: {}", distance),
            _ => info!("Fly {:?}", direction),
        }
    }
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(name) = &args.name {
        config.device.name = Some(name.clone());
    }
    if let Some(address) = &args.address {
        config.device.address = Some(address.clone());
    }
}

async fn open_session(config: &Config) -> Result<DeviceSession<BtleHost>, SessionError> {
    let host = BtleHost::with_scan_duration(Duration::from_millis(config.scan_duration_ms)).await?;
    let session = DeviceSession::new(Arc::new(host), config.identity());

    session.connect().await?;
    if let Some(peripheral) = session.bound_peripheral() {
        info!(
            "Name: {} Id: {} Battery: {}%",
            peripheral.name.as_deref().unwrap_or("NONE"),
            peripheral.address,
            session.battery_level(),
        );
    }

    Ok(session)
}

async fn close_session(session: &DeviceSession<BtleHost>) {
    let report = session.cleanup().await;
    if !report.is_clean() {
        warn!("{} channel(s) could not be cleaned up", report.failures.len());
    }
}

async fn monitor(config: &Config) -> Result<(), AppRunError> {
    let session = open_session(config).await?;
    session.set_observer(LoggingObserver::default());

    info!("Monitoring, press Ctrl-C to stop");
    let result = tokio::signal::ctrl_c().await;

    close_session(&session).await;
    result?;
    Ok(())
}

async fn display(config: &Config, pattern: &str, brightness: Option<u8>, timeout: Option<f32>) -> Result<(), AppRunError> {
    let pattern: String = pattern.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    let brightness = brightness.unwrap_or(config.display.brightness);
    let timeout = match timeout {
        Some(seconds) => timeout_from_duration(Duration::from_secs_f32(seconds.max(0.0).min(25.5))),
        None => config.display.timeout,
    };

    // fail before scanning when the pattern is unusable
    let frame = encode_display(&pattern, brightness, timeout)?;

    let session = open_session(config).await?;
    let result = session.write_display(&frame).await;
    close_session(&session).await;

    result?;
    Ok(())
}

pub async fn run_cli(args: Args) -> Result<(), AppRunError> {
    let config_io = match &args.config {
        Some(path) => ConfigIO::from_path(path),
        None => ConfigIO::new()?,
    };
    let mut config = config_io.read_or_default().await?;
    apply_overrides(&mut config, &args);

    match &args.command {
        Command::Monitor => monitor(&config).await,
        Command::Display { pattern, brightness, timeout } => display(&config, pattern, *brightness, *timeout).await,
        Command::SaveConfig => {
            config_io.save(&config).await?;
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let args = Args::parse_from(["nuimo-controller", "--address", "D3:B4:8A:8B:91:AC", "monitor"]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.identity().address(), Some("d3b48a8b91ac"));
        assert_eq!(config.device.name, Some("Nuimo".to_string()));
    }

    #[test]
    fn test_display_args() {
        let args = Args::parse_from(["nuimo-controller", "display", "--brightness", "50", "--timeout", "1.5", "*"]);

        match args.command {
            Command::Display { pattern, brightness, timeout } => {
                assert_eq!(pattern, "*");
                assert_eq!(brightness, Some(50));
                assert_eq!(timeout, Some(1.5));
            },
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_display_rejects_short_pattern_before_scanning() {
        let result = display(&Config::default(), "* *", None, None).await;
        assert!(matches!(result, Err(AppRunError::Pattern { .. })));
    }
}

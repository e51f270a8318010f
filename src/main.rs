/*
 *  main.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  SSD1306 status display for the SIP sprinkler controller
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use log::{error, info, warn};
use env_logger::Env;
use clap::Parser;
use tokio::sync::mpsc;

use tokio::signal::unix::{signal, SignalKind}; // Import specific Unix signals

use sip_oled::config::{self, Cli, SettingsStore};
use sip_oled::display::{Geometry, Scheduler, SchedulerConfig, SchedulerHandle, Ssd1306};
use sip_oled::events;
use sip_oled::status::{FileStatusSource, HostStatus, StaticStatus, StatusSource};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
/// Once a signal is caught, it logs the event and returns, allowing for
/// graceful shutdown.
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

/// Stdin lines, read on a detached thread
fn stdin_lines() -> mpsc::UnboundedReceiver<io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Read host notifications, one per line, until the host asks for a
/// restart. A closed stdin leaves the display running.
async fn host_events(handle: SchedulerHandle, store: SettingsStore) {
    let mut lines = stdin_lines();
    while let Some(line) = lines.recv().await {
        match line {
            Ok(line) => match events::parse_line(&line) {
                Ok(Some(event)) => {
                    if !events::dispatch(&handle, Some(&store), event) {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Ignoring malformed event {:?}: {}", line, e),
            },
            Err(e) => {
                error!("Reading host input failed: {}", e);
                break;
            }
        }
    }
    info!("Host input closed, display keeps running");
    std::future::pending::<()>().await
}

#[tokio::main] // Requires the `tokio` runtime with `macros` and `rt-multi-thread` features
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize the logger with the appropriate level based on debug flag
    env_logger::Builder::from_env(Env::default().default_filter_or(if cli.debug {"debug"}else{"info"}))
        .format_timestamp_secs()
        .init();

    info!("{} - sprinkler status at a glance", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let (store, settings) = config::load(&cli)?;
    info!("Settings from {}: idle_timeout={}s address={:02x}",
        store.path().display(), settings.idle_timeout, settings.i2c_hw_address);

    let geometry = Geometry::new(cli.width, cli.height)?;
    let display = Arc::new(Ssd1306::open(&cli.i2c_bus, settings.i2c_hw_address, geometry)?);
    if !display.initialize() {
        warn!("Display did not acknowledge initialisation on {}, will keep trying", cli.i2c_bus);
    }

    let source: Arc<dyn StatusSource> = match &cli.status_file {
        Some(path) => {
            info!("Reading host status from {}", path.display());
            Arc::new(FileStatusSource::new(path))
        }
        None => Arc::new(StaticStatus::live(HostStatus::default())),
    };

    let scheduler_config = SchedulerConfig {
        tick: Duration::from_millis(cli.tick_ms),
        startup_delay: Duration::from_millis(cli.startup_delay_ms),
    };
    let scheduler = Scheduler::new(display, source, settings, scheduler_config).spawn()?;
    let handle = scheduler.handle();

    tokio::select! {
        // Handle Unix signals for graceful shutdown
        res = signal_handler() => {
            if let Err(e) = res {
                error!("Signal handling failed: {}", e);
            }
        }
        _ = host_events(handle.clone(), store) => {}
    }

    handle.shutdown();
    if tokio::task::spawn_blocking(move || scheduler.join()).await?.is_err() {
        error!("Display scheduler panicked");
    }
    info!("Goodbye");
    Ok(())
}

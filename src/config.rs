use serde::{Deserialize, Serialize, Serializer};
use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

use crate::deutils::{deserialize_hex_u8, deserialize_numeric_u64, parse_hex_u8};
use crate::display::drivers::ssd1306::DEFAULT_HW_ADDRESS;

/// Error type for settings loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

fn default_hw_address() -> u8 { DEFAULT_HW_ADDRESS }

fn serialize_hex_u8<S: Serializer>(value: &u8, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:02x}", value))
}

/// Persisted display settings.
///
/// On disk: `{"idle_timeout": 30, "i2c_hw_address": "78"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds without a content change before the panel is switched off, 0 never
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_numeric_u64")]
    pub idle_timeout: u64,

    /// 8-bit write address, the wire address is half of it
    #[serde(default = "default_hw_address")]
    #[serde(deserialize_with = "deserialize_hex_u8", serialize_with = "serialize_hex_u8")]
    pub i2c_hw_address: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            idle_timeout: 0,
            i2c_hw_address: DEFAULT_HW_ADDRESS,
        }
    }
}

impl Settings {
    /// Apply the keys present in `map`, leaving the rest alone.
    ///
    /// Returns whether the bus address changed. Nothing is applied if any
    /// present key is malformed.
    pub fn merge_from_map(&mut self, map: &Map<String, Value>) -> Result<bool, ConfigError> {
        let mut next = *self;
        if let Some(v) = map.get("idle_timeout") {
            next.idle_timeout = deserialize_numeric_u64(v.clone())?;
        }
        if let Some(v) = map.get("i2c_hw_address") {
            next.i2c_hw_address = deserialize_hex_u8(v.clone())?;
        }
        validate(&next)?;

        let address_changed = next.i2c_hw_address != self.i2c_hw_address;
        *self = next;
        Ok(address_changed)
    }

    /// 7-bit address used on the wire
    pub fn wire_address(&self) -> u8 {
        self.i2c_hw_address >> 1
    }
}

/// Put any invariants here (ranges, etc.)
fn validate(settings: &Settings) -> Result<(), ConfigError> {
    let wire = settings.wire_address();
    if !(0x03..=0x77).contains(&wire) {
        return Err(ConfigError::Validation(format!(
            "i2c_hw_address {:02x} is outside the 7-bit bus range", settings.i2c_hw_address
        )));
    }
    Ok(())
}

/// Settings file location plus load/save.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// Explicit path, else the first existing well-known file, else the
    /// project local default (which may not exist yet).
    pub fn locate(explicit: Option<&Path>) -> Self {
        match explicit {
            Some(p) => Self::new(p),
            None => Self::new(find_settings_file().unwrap_or_else(|| PathBuf::from(LOCAL_SETTINGS))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_load(&self) -> Result<Settings, ConfigError> {
        let s = fs::read_to_string(&self.path)?;
        let settings: Settings = serde_json::from_str(&s)?;
        validate(&settings)?;
        Ok(settings)
    }

    /// Best effort: any failure yields the defaults.
    pub fn load(&self) -> Settings {
        if !self.path.exists() {
            info!("No settings at {}, using defaults", self.path.display());
            return Settings::default();
        }
        match self.try_load() {
            Ok(settings) => {
                debug!("Loaded settings from {}: {:?}", self.path.display(), settings);
                settings
            }
            Err(e) => {
                warn!("Ignoring settings in {}: {}", self.path.display(), e);
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string(settings)?)?;
        info!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

const LOCAL_SETTINGS: &str = "data/ssd1306.json";

/// Try common locations in order (first hit wins).
fn find_settings_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/sip-oled/ssd1306.json
    if let Some(home) = home_dir() {
        let p = home.join(".config/sip-oled/ssd1306.json");
        if p.exists() { return Some(p) }
    }
    // alongside the host's data directory
    let p = PathBuf::from(LOCAL_SETTINGS);
    if p.exists() { return Some(p) }
    None
}

fn parse_address_arg(s: &str) -> Result<u8, String> {
    parse_hex_u8(s).ok_or_else(|| format!("not a hex byte: {s}"))
}

/// Command line. Settings overrides are Options so they layer over the file.
#[derive(Debug, Parser, Clone)]
#[command(name = "sip-oled", about = "SSD1306 status display for SIP", version)]
pub struct Cli {
    /// Path to a JSON settings file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub settings: Option<PathBuf>,
    #[arg(long, default_value = "/dev/i2c-1", value_hint = ValueHint::FilePath)]
    pub i2c_bus: String,
    #[arg(long, default_value_t = 128)]
    pub width: u32,
    #[arg(long, default_value_t = 64)]
    pub height: u32,
    /// JSON host status snapshot, re-read every tick
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub status_file: Option<PathBuf>,
    #[arg(long, default_value_t = 1000)]
    pub tick_ms: u64,
    #[arg(long, default_value_t = 5000)]
    pub startup_delay_ms: u64,
    #[arg(short = 'v', long, action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long)]
    pub idle_timeout: Option<u64>,
    /// 8-bit hex write address, e.g. 78
    #[arg(long, value_parser = parse_address_arg)]
    pub i2c_hw_address: Option<u8>,
    /// write the effective settings back to the settings file
    #[arg(long, action = ArgAction::SetTrue)]
    pub save_settings: bool,
}

fn apply_cli_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(t) = cli.idle_timeout    { settings.idle_timeout = t; }
    if let Some(a) = cli.i2c_hw_address  { settings.i2c_hw_address = a; }
}

/// Public entry point: locate and read settings, layer the CLI on top,
/// validate, optionally persist.
pub fn load(cli: &Cli) -> Result<(SettingsStore, Settings), ConfigError> {
    let store = SettingsStore::locate(cli.settings.as_deref());
    let mut settings = store.load();

    apply_cli_overrides(&mut settings, cli);
    validate(&settings)?;

    if cli.width == 0 || cli.height == 0 {
        return Err(ConfigError::Validation("display width/height must be > 0".into()));
    }
    if cli.tick_ms == 0 {
        return Err(ConfigError::Validation("tick must be > 0 ms".into()));
    }

    if cli.save_settings {
        store.save(&settings)?;
    }
    Ok((store, settings))
}

/*
 *  status.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  Host status snapshot and the sources that provide it
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

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{Local, NaiveDateTime, Timelike};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::deutils::{
    default_true, default_water_level, deserialize_bool_from_anything, deserialize_numeric_i64,
    deserialize_numeric_u32,
};

/// What the controller is currently running
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProgramState {
    #[default]
    Idle,
    RunOnce,
    Manual,
    Program(String),
}

impl ProgramState {
    /// Text shown for this state
    pub fn label(&self) -> String {
        match self {
            ProgramState::Idle => "Idle".to_string(),
            ProgramState::RunOnce => "Run-once".to_string(),
            ProgramState::Manual => "Manual Mode".to_string(),
            ProgramState::Program(id) => id.clone(),
        }
    }
}

impl From<String> for ProgramState {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" | "idle" | "none" | "null" => ProgramState::Idle,
            "run-once" | "runonce" | "98" => ProgramState::RunOnce,
            "manual" | "99" => ProgramState::Manual,
            _ => ProgramState::Program(s.trim().to_string()),
        }
    }
}

impl From<ProgramState> for String {
    fn from(p: ProgramState) -> Self {
        match p {
            ProgramState::Idle => "idle".to_string(),
            ProgramState::RunOnce => "run-once".to_string(),
            ProgramState::Manual => "manual".to_string(),
            ProgramState::Program(id) => id,
        }
    }
}

/// One station's run state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationStatus {
    /// Program that scheduled this station, 0 when none
    #[serde(default)]
    #[serde(deserialize_with="deserialize_numeric_u32")]
    pub program: u32,

    /// Seconds left in the current run, <= 0 for open ended
    #[serde(default)]
    #[serde(deserialize_with="deserialize_numeric_i64")]
    pub remaining: i64,

    /// Valve currently energised
    #[serde(default)]
    #[serde(deserialize_with="deserialize_bool_from_anything")]
    pub active: bool,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Read-only view of the host controller, taken once per tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStatus {
    #[serde(default)]
    pub program: ProgramState,

    #[serde(default)]
    pub stations: Vec<StationStatus>,

    /// 1-based index of the master valve, never listed as running
    #[serde(default)]
    pub master_station: Option<usize>,

    #[serde(default="default_true")]
    #[serde(deserialize_with="deserialize_bool_from_anything")]
    pub enabled: bool,

    #[serde(default)]
    #[serde(deserialize_with="deserialize_bool_from_anything")]
    pub manual_mode: bool,

    #[serde(default)]
    #[serde(deserialize_with="deserialize_bool_from_anything")]
    pub rain_delay: bool,

    /// Rain delay end, seconds since the epoch on the host's local clock
    #[serde(default)]
    #[serde(deserialize_with="deserialize_numeric_i64")]
    pub rain_delay_end: i64,

    /// Percent
    #[serde(default="default_water_level")]
    #[serde(deserialize_with="deserialize_numeric_u32")]
    pub water_level: u32,

    #[serde(default="local_now")]
    pub now: NaiveDateTime,

    #[serde(default)]
    #[serde(deserialize_with="deserialize_bool_from_anything")]
    pub time_24h: bool,
}

impl Default for HostStatus {
    fn default() -> Self {
        Self {
            program: ProgramState::Idle,
            stations: Vec::new(),
            master_station: None,
            enabled: true,
            manual_mode: false,
            rain_delay: false,
            rain_delay_end: 0,
            water_level: 100,
            now: local_now(),
            time_24h: false,
        }
    }
}

impl HostStatus {
    /// Clock as "H:MM" (24 hour) or "H:MM AM"
    pub fn clock_string(&self) -> String {
        let minute = self.now.minute();
        if self.time_24h {
            return format!("{}:{:02}", self.now.hour(), minute);
        }
        let (is_pm, hour) = self.now.hour12();
        format!("{}:{:02} {}", hour, minute, if is_pm { "PM" } else { "AM" })
    }

    /// Whole hours of rain delay left, truncated
    pub fn rain_delay_hours(&self) -> i64 {
        (self.rain_delay_end - self.now.and_utc().timestamp()) / 3600
    }

    /// Any station has a program assigned
    pub fn program_running(&self) -> bool {
        self.stations.iter().any(|s| s.program != 0)
    }

    /// 1-based numbers of running stations other than the master, and the
    /// longest remaining time among them
    pub fn active_stations(&self) -> (Vec<usize>, i64) {
        let mut numbers = Vec::new();
        let mut longest = 0;
        for (i, station) in self.stations.iter().enumerate() {
            let number = i + 1;
            if station.active && Some(number) != self.master_station {
                numbers.push(number);
                longest = longest.max(station.remaining);
            }
        }
        (numbers, longest)
    }
}

/// Where the scheduler gets host state from
pub trait StatusSource: Send + Sync {
    fn snapshot(&self) -> HostStatus;
}

/// Status held in memory and updated by whoever owns it
#[derive(Debug, Default)]
pub struct StaticStatus {
    status: Mutex<HostStatus>,
    live_clock: bool,
}

impl StaticStatus {
    /// Fixed snapshot, clock included
    pub fn new(status: HostStatus) -> Self {
        Self {
            status: Mutex::new(status),
            live_clock: false,
        }
    }

    /// Snapshot whose clock follows local time
    pub fn live(status: HostStatus) -> Self {
        Self {
            status: Mutex::new(status),
            live_clock: true,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HostStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, status: HostStatus) {
        *self.lock() = status;
    }

    pub fn update<F: FnOnce(&mut HostStatus)>(&self, f: F) {
        f(&mut self.lock());
    }
}

impl StatusSource for StaticStatus {
    fn snapshot(&self) -> HostStatus {
        let mut status = self.lock().clone();
        if self.live_clock {
            status.now = local_now();
        }
        status
    }
}

/// Re-reads a JSON snapshot written by the host on every call
///
/// A missing or half-written file keeps the last good snapshot.
#[derive(Debug)]
pub struct FileStatusSource {
    path: PathBuf,
    last: Mutex<HostStatus>,
    failing: Mutex<bool>,
}

impl FileStatusSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            last: Mutex::new(HostStatus::default()),
            failing: Mutex::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<HostStatus, String> {
        let text = fs::read_to_string(&self.path).map_err(|e| e.to_string())?;
        serde_json::from_str(&text).map_err(|e| e.to_string())
    }
}

impl StatusSource for FileStatusSource {
    fn snapshot(&self) -> HostStatus {
        let mut failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match self.read() {
            Ok(status) => {
                if *failing {
                    debug!("Status file {} readable again", self.path.display());
                    *failing = false;
                }
                *last = status;
            }
            Err(e) => {
                if !*failing {
                    warn!("Cannot read status file {}: {}", self.path.display(), e);
                    *failing = true;
                }
            }
        }
        last.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_program_state_round_trip_names() {
        assert_eq!(ProgramState::from("idle".to_string()), ProgramState::Idle);
        assert_eq!(ProgramState::from("Run-once".to_string()), ProgramState::RunOnce);
        assert_eq!(ProgramState::from("manual".to_string()), ProgramState::Manual);
        assert_eq!(ProgramState::from("3".to_string()), ProgramState::Program("3".to_string()));
        assert_eq!(String::from(ProgramState::RunOnce), "run-once");
    }

    #[test]
    fn test_labels() {
        assert_eq!(ProgramState::Idle.label(), "Idle");
        assert_eq!(ProgramState::RunOnce.label(), "Run-once");
        assert_eq!(ProgramState::Manual.label(), "Manual Mode");
        assert_eq!(ProgramState::Program("Lawn".to_string()).label(), "Lawn");
    }

    #[test]
    fn test_clock_string() {
        let mut status = HostStatus { now: at(0, 5), ..Default::default() };
        assert_eq!(status.clock_string(), "12:05 AM");
        status.now = at(12, 30);
        assert_eq!(status.clock_string(), "12:30 PM");
        status.now = at(17, 9);
        assert_eq!(status.clock_string(), "5:09 PM");
        status.time_24h = true;
        assert_eq!(status.clock_string(), "17:09");
        status.now = at(0, 0);
        assert_eq!(status.clock_string(), "0:00");
    }

    #[test]
    fn test_rain_delay_hours_truncate() {
        let now = at(8, 0);
        let base = now.and_utc().timestamp();
        let mut status = HostStatus { now, rain_delay: true, ..Default::default() };

        status.rain_delay_end = base + 1800;
        assert_eq!(status.rain_delay_hours(), 0);
        status.rain_delay_end = base + 3600 + 1799;
        assert_eq!(status.rain_delay_hours(), 1);
        status.rain_delay_end = base + 5 * 3600 + 3599;
        assert_eq!(status.rain_delay_hours(), 5);
    }

    #[test]
    fn test_active_stations_skip_master() {
        let status = HostStatus {
            master_station: Some(1),
            stations: vec![
                StationStatus { program: 1, remaining: 900, active: true },
                StationStatus { program: 1, remaining: 300, active: true },
                StationStatus { program: 0, remaining: 0, active: false },
                StationStatus { program: 1, remaining: 420, active: true },
            ],
            ..Default::default()
        };
        assert_eq!(status.active_stations(), (vec![2, 4], 420));
        assert!(status.program_running());
    }

    #[test]
    fn test_deserialize_minimal_snapshot() {
        let status: HostStatus = serde_json::from_str(
            r#"{"program":"run-once","stations":[{"program":98,"remaining":"65","active":1}],
                "now":"2024-06-01T10:15:00","enabled":"yes"}"#,
        )
        .unwrap();
        assert_eq!(status.program, ProgramState::RunOnce);
        assert_eq!(status.stations[0].remaining, 65);
        assert!(status.stations[0].active);
        assert!(status.enabled);
        assert_eq!(status.water_level, 100);
        assert_eq!(status.now, at(10, 15));
    }

    #[test]
    fn test_static_status_update() {
        let source = StaticStatus::new(HostStatus { now: at(9, 0), ..Default::default() });
        source.update(|s| s.enabled = false);
        let snap = source.snapshot();
        assert!(!snap.enabled);
        assert_eq!(snap.now, at(9, 0));
    }

    #[test]
    fn test_file_source_keeps_last_good() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"program":"manual","now":"2024-06-01T07:00:00"}}"#).unwrap();
        file.flush().unwrap();

        let source = FileStatusSource::new(file.path());
        assert_eq!(source.snapshot().program, ProgramState::Manual);

        fs::write(file.path(), "{ not json").unwrap();
        let snap = source.snapshot();
        assert_eq!(snap.program, ProgramState::Manual);
        assert_eq!(snap.now, at(7, 0));
    }
}

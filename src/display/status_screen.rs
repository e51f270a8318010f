/*
 *  display/status_screen.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  Status page rendering with change suppression
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

use crate::deutils::seconds_to_hms;
use crate::display::layout::Justification::{self, Center, Left};
use crate::display::traits::DisplayDriver;
use crate::status::{HostStatus, ProgramState};

/// One `write_line` call: text, row-band, scale, justification
type Line<'a> = (&'a str, usize, usize, Justification);

/// What the scheduler should do after a status pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOutcome {
    /// Content changed or something is running: keep the panel awake
    pub wake: bool,
    /// An idle page is showing, so the idle timeout applies
    pub idle_screen: bool,
}

/// Renders the host status, touching the bus only when the main content
/// (`last_write`) or the readout line (`last_sub_val`) changes.
#[derive(Debug, Default)]
pub struct StatusScreen {
    last_write: String,
    last_sub_val: String,
}

fn paint<D: DisplayDriver + ?Sized>(display: &D, lines: &[Line<'_>]) {
    for &(text, row, scale, justification) in lines {
        display.write_line(text, row, scale, justification);
    }
}

fn rain_delay_text(hours: i64) -> String {
    match hours {
        h if h < 1 => "<1 hr".to_string(),
        1 => "1 hr".to_string(),
        h => format!("{} hrs", h),
    }
}

impl StatusScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget what is on the panel so the next pass repaints everything
    pub fn reset(&mut self) {
        self.last_write.clear();
        self.last_sub_val.clear();
    }

    pub fn last_write(&self) -> &str {
        &self.last_write
    }

    pub fn last_sub_val(&self) -> &str {
        &self.last_sub_val
    }

    /// Paint `lines` if `key` differs from the cached page. Returns whether
    /// anything was written.
    fn page<D: DisplayDriver + ?Sized>(&mut self, display: &D, key: &str, lines: &[Line<'_>]) -> bool {
        if self.last_write == key {
            return false;
        }
        paint(display, lines);
        self.last_write = key.to_string();
        true
    }

    /// Bottom readout line at row-band 6, 2x
    fn readout<D: DisplayDriver + ?Sized>(&mut self, display: &D, key: &str, text: &str) {
        if self.last_sub_val != key {
            display.write_line(text, 6, 2, Center);
            self.last_sub_val = key.to_string();
        }
    }

    pub fn render<D: DisplayDriver + ?Sized>(&mut self, display: &D, status: &HostStatus) -> RenderOutcome {
        let mut outcome = RenderOutcome::default();
        let mut idle = status.program == ProgramState::Idle;

        if !idle {
            outcome.wake = true;
            let (stations, longest) = status.active_stations();

            if !stations.is_empty() {
                let list = stations.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(" ");
                if self.last_write != list {
                    display.write_block(&list, 0, 1, 5, Center);
                    display.write_line(" ", 5, 1, Center);
                    self.last_write = list;
                    self.last_sub_val.clear();
                }
                let remaining = if status.program == ProgramState::Manual && longest <= 0 {
                    "ON".to_string()
                } else {
                    seconds_to_hms(longest)
                };
                self.readout(display, &remaining, &remaining);
            } else if status.program_running() {
                match &status.program {
                    ProgramState::RunOnce => {
                        self.page(display, "RunningRun-onceProgram", &[
                            ("Running", 0, 2, Center),
                            ("", 2, 1, Left),
                            ("Run-once", 3, 2, Center),
                            ("", 5, 1, Left),
                            ("Program", 6, 2, Center),
                        ]);
                    }
                    ProgramState::Manual => {
                        self.page(display, "ManualMode", &[
                            ("", 0, 1, Left),
                            ("Manual", 1, 2, Center),
                            ("", 3, 1, Left),
                            ("Mode", 4, 2, Center),
                            ("", 6, 2, Left),
                        ]);
                    }
                    program => {
                        let id = program.label();
                        self.page(display, &format!("RunningProgram{}", id), &[
                            ("Running", 0, 2, Center),
                            ("", 2, 1, Left),
                            ("Program", 3, 2, Center),
                            ("", 5, 1, Left),
                            (id.as_str(), 6, 2, Center),
                        ]);
                    }
                }
            } else {
                // flagged as running but nothing is
                idle = true;
            }
        }

        if idle {
            outcome.idle_screen = true;
            outcome.wake |= self.render_idle(display, status);
        }
        outcome
    }

    /// Idle pages in priority order. Returns whether the main page changed.
    fn render_idle<D: DisplayDriver + ?Sized>(&mut self, display: &D, status: &HostStatus) -> bool {
        if !status.enabled {
            return self.page(display, "OFF", &[("OFF", 0, 3, Center), ("", 3, 5, Left)]);
        }

        if status.manual_mode {
            return self.page(display, "IdleManualMode", &[
                ("Idle", 0, 3, Center),
                ("", 3, 1, Left),
                ("Manual", 4, 2, Center),
                ("Mode", 6, 2, Center),
            ]);
        }

        if status.rain_delay {
            let changed = self.page(display, "RainDelay", &[
                ("Rain", 0, 2, Center),
                ("", 2, 1, Left),
                ("Delay", 3, 2, Center),
                ("", 5, 1, Left),
            ]);
            if changed {
                self.last_sub_val.clear();
            }
            let hours = status.rain_delay_hours();
            self.readout(display, &hours.to_string(), &rain_delay_text(hours));
            return changed;
        }

        let changed = if status.water_level < 100 {
            let level = status.water_level.to_string();
            let percent = format!("{}%", level);
            self.page(display, &format!("IdleWaterLevel{}", level), &[
                ("Idle", 0, 3, Center),
                (percent.as_str(), 3, 2, Center),
                ("", 5, 1, Left),
            ])
        } else {
            self.page(display, "Idle", &[("Idle", 0, 3, Center), ("", 3, 3, Left)])
        };
        if changed {
            self.last_sub_val.clear();
        }
        let clock = status.clock_string();
        self.readout(display, &clock, &clock);
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::window::Geometry;
    use crate::status::StationStatus;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// Records write calls instead of touching a bus
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    impl DisplayDriver for Recorder {
        fn geometry(&self) -> Geometry { Geometry::new(128, 64).unwrap() }
        fn initialize(&self) -> bool { true }
        fn clear(&self) -> bool { true }
        fn set_power(&self, _on: bool) -> bool { true }
        fn is_powered(&self) -> bool { true }
        fn disable(&self) {}
        fn set_address(&self, _hw_address: u8) {}
        fn write_line(&self, text: &str, row: usize, scale: usize, j: Justification) -> usize {
            self.calls.lock().unwrap().push(format!("line {:?} {} {} {}", text, row, scale, j));
            1
        }
        fn write_block(&self, text: &str, row: usize, min: usize, max: usize, j: Justification) -> usize {
            self.calls.lock().unwrap().push(format!("block {:?} {} {}-{} {}", text, row, min, max, j));
            1
        }
    }

    fn status() -> HostStatus {
        HostStatus {
            now: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(14, 7, 0).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_idle_page_then_only_clock_updates() {
        let lcd = Recorder::default();
        let mut screen = StatusScreen::new();
        let mut s = status();

        let outcome = screen.render(&lcd, &s);
        assert_eq!(outcome, RenderOutcome { wake: true, idle_screen: true });
        assert_eq!(lcd.take(), vec![
            "line \"Idle\" 0 3 CENTER",
            "line \"\" 3 3 LEFT",
            "line \"2:07 PM\" 6 2 CENTER",
        ]);

        let outcome = screen.render(&lcd, &s);
        assert_eq!(outcome, RenderOutcome { wake: false, idle_screen: true });
        assert!(lcd.take().is_empty());

        s.now = s.now + chrono::Duration::minutes(1);
        let outcome = screen.render(&lcd, &s);
        assert!(!outcome.wake);
        assert_eq!(lcd.take(), vec!["line \"2:08 PM\" 6 2 CENTER"]);
    }

    #[test]
    fn test_off_page_written_once() {
        let lcd = Recorder::default();
        let mut screen = StatusScreen::new();
        let s = HostStatus { enabled: false, ..status() };

        assert!(screen.render(&lcd, &s).wake);
        assert_eq!(lcd.take(), vec!["line \"OFF\" 0 3 CENTER", "line \"\" 3 5 LEFT"]);
        assert_eq!(screen.last_write(), "OFF");

        assert!(!screen.render(&lcd, &s).wake);
        assert!(lcd.take().is_empty());
    }

    #[test]
    fn test_running_stations_and_readout() {
        let lcd = Recorder::default();
        let mut screen = StatusScreen::new();
        let mut s = HostStatus {
            program: ProgramState::Program("3".to_string()),
            master_station: Some(1),
            stations: vec![
                StationStatus { program: 3, remaining: 0, active: true },
                StationStatus { program: 3, remaining: 125, active: true },
                StationStatus { program: 3, remaining: 3725, active: true },
            ],
            ..status()
        };

        let outcome = screen.render(&lcd, &s);
        assert_eq!(outcome, RenderOutcome { wake: true, idle_screen: false });
        assert_eq!(lcd.take(), vec![
            "block \"2 3\" 0 1-5 CENTER",
            "line \" \" 5 1 CENTER",
            "line \"01:02:05\" 6 2 CENTER",
        ]);

        s.stations[2].remaining = 3724;
        screen.render(&lcd, &s);
        assert_eq!(lcd.take(), vec!["line \"01:02:04\" 6 2 CENTER"]);
    }

    #[test]
    fn test_open_ended_manual_run_reads_on() {
        let lcd = Recorder::default();
        let mut screen = StatusScreen::new();
        let s = HostStatus {
            program: ProgramState::Manual,
            stations: vec![StationStatus { program: 99, remaining: 0, active: true }],
            ..status()
        };
        screen.render(&lcd, &s);
        assert_eq!(lcd.take().last().unwrap(), "line \"ON\" 6 2 CENTER");
        assert_eq!(screen.last_sub_val(), "ON");
    }

    #[test]
    fn test_run_once_banner() {
        let lcd = Recorder::default();
        let mut screen = StatusScreen::new();
        let s = HostStatus {
            program: ProgramState::RunOnce,
            stations: vec![StationStatus { program: 98, remaining: 60, active: false }],
            ..status()
        };
        let outcome = screen.render(&lcd, &s);
        assert!(outcome.wake);
        assert!(!outcome.idle_screen);
        let calls = lcd.take();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[2], "line \"Run-once\" 3 2 CENTER");
        assert_eq!(screen.last_write(), "RunningRun-onceProgram");
    }

    #[test]
    fn test_program_without_stations_falls_back_to_idle() {
        let lcd = Recorder::default();
        let mut screen = StatusScreen::new();
        let s = HostStatus { program: ProgramState::Program("7".to_string()), ..status() };
        let outcome = screen.render(&lcd, &s);
        assert!(outcome.idle_screen);
        assert_eq!(screen.last_write(), "Idle");
    }

    #[test]
    fn test_rain_delay_hours() {
        let lcd = Recorder::default();
        let mut screen = StatusScreen::new();
        let mut s = HostStatus { rain_delay: true, ..status() };
        let now = s.now.and_utc().timestamp();

        s.rain_delay_end = now + 3 * 3600 + 10;
        screen.render(&lcd, &s);
        let calls = lcd.take();
        assert_eq!(calls[0], "line \"Rain\" 0 2 CENTER");
        assert_eq!(calls.last().unwrap(), "line \"3 hrs\" 6 2 CENTER");

        s.rain_delay_end = now + 3600;
        screen.render(&lcd, &s);
        assert_eq!(lcd.take(), vec!["line \"1 hr\" 6 2 CENTER"]);

        s.rain_delay_end = now + 60;
        screen.render(&lcd, &s);
        assert_eq!(lcd.take(), vec!["line \"<1 hr\" 6 2 CENTER"]);
    }

    #[test]
    fn test_water_level_page() {
        let lcd = Recorder::default();
        let mut screen = StatusScreen::new();
        let s = HostStatus { water_level: 80, time_24h: true, ..status() };
        screen.render(&lcd, &s);
        assert_eq!(lcd.take(), vec![
            "line \"Idle\" 0 3 CENTER",
            "line \"80%\" 3 2 CENTER",
            "line \"\" 5 1 LEFT",
            "line \"14:07\" 6 2 CENTER",
        ]);
    }

    #[test]
    fn test_reset_forces_repaint() {
        let lcd = Recorder::default();
        let mut screen = StatusScreen::new();
        let s = HostStatus { manual_mode: true, ..status() };
        screen.render(&lcd, &s);
        assert_eq!(lcd.take().len(), 4);
        screen.reset();
        screen.render(&lcd, &s);
        assert_eq!(lcd.take().len(), 4);
    }
}

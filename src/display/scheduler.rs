/*
 *  display/scheduler.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  Background loop multiplexing status pages and custom messages
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

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info};
use serde_json::{Map, Value};

use crate::config::{ConfigError, Settings};
use crate::display::custom::CustomDisplayItem;
use crate::display::status_screen::StatusScreen;
use crate::display::traits::DisplayDriver;
use crate::status::StatusSource;

/// Loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Status refresh period, also the unit of a custom item's delay
    pub tick: Duration,
    /// Pause before the first pass
    pub startup_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            startup_delay: Duration::from_secs(5),
        }
    }
}

/// Producer-visible state, only touched under the lock
#[derive(Debug)]
struct SharedState {
    running: bool,
    queue: VecDeque<CustomDisplayItem>,
    /// Something arrived since the current tick started
    pending: bool,
    wake_requested: bool,
    /// Drop render caches, the panel was re-initialised underneath us
    reset_requested: bool,
    settings: Settings,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SharedState>,
    signal: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate under the lock, then wake the loop
    fn post<F: FnOnce(&mut SharedState)>(&self, f: F) {
        {
            let mut state = self.lock();
            f(&mut state);
            state.pending = true;
        }
        self.signal.notify_all();
    }
}

/// What one tick took from the shared state
struct TickInput {
    item: Option<CustomDisplayItem>,
    wake: bool,
    reset: bool,
    idle_timeout: u64,
}

/// Owns the display on its own thread.
///
/// Each tick either shows the oldest queued custom item or re-renders the
/// status page, then applies idle power management.
pub struct Scheduler {
    display: Arc<dyn DisplayDriver>,
    source: Arc<dyn StatusSource>,
    shared: Arc<Shared>,
    config: SchedulerConfig,
    screen: StatusScreen,
    idled: bool,
    idle_entry_time: Option<Instant>,
    displaying_custom: bool,
    custom_display_canceled: bool,
}

impl Scheduler {
    pub fn new(
        display: Arc<dyn DisplayDriver>,
        source: Arc<dyn StatusSource>,
        settings: Settings,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            display,
            source,
            shared: Arc::new(Shared {
                state: Mutex::new(SharedState {
                    running: true,
                    queue: VecDeque::new(),
                    pending: false,
                    wake_requested: false,
                    reset_requested: false,
                    settings,
                }),
                signal: Condvar::new(),
            }),
            config,
            screen: StatusScreen::new(),
            idled: false,
            idle_entry_time: None,
            displaying_custom: false,
            custom_display_canceled: false,
        }
    }

    /// Producer side, cheap to clone
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
            display: Arc::clone(&self.display),
        }
    }

    pub fn is_idled(&self) -> bool {
        self.idled
    }

    pub fn displaying_custom(&self) -> bool {
        self.displaying_custom
    }

    pub fn custom_display_canceled(&self) -> bool {
        self.custom_display_canceled
    }

    pub fn screen(&self) -> &StatusScreen {
        &self.screen
    }

    fn take_input(&self) -> TickInput {
        let mut state = self.shared.lock();
        state.pending = false;
        TickInput {
            item: state.queue.pop_front(),
            wake: std::mem::take(&mut state.wake_requested),
            reset: std::mem::take(&mut state.reset_requested),
            idle_timeout: state.settings.idle_timeout,
        }
    }

    /// Run one pass at `now` and return how long to wait before the next.
    pub fn tick(&mut self, now: Instant) -> Duration {
        let input = self.take_input();

        if input.reset {
            self.reset_state();
        }
        if input.wake {
            self.wake(now);
        }

        match input.item {
            Some(item) => self.show_custom(item, now),
            None => {
                self.show_status(now, input.idle_timeout);
                self.config.tick
            }
        }
    }

    fn reset_state(&mut self) {
        self.screen.reset();
        self.idle_entry_time = None;
        self.idled = false;
    }

    /// Restart the idle clock, powering up if we had idled
    fn wake(&mut self, now: Instant) {
        self.idle_entry_time = Some(now);
        if self.idled {
            debug!("Waking display");
            self.display.set_power(true);
            self.idled = false;
        }
    }

    fn show_custom(&mut self, item: CustomDisplayItem, now: Instant) -> Duration {
        if item.cancel {
            debug!("Custom display canceled");
            self.custom_display_canceled = true;
            return Duration::ZERO;
        }

        let append = item.append && self.displaying_custom && !self.custom_display_canceled;
        if !append {
            self.display.clear();
        }
        self.display.write_block(
            &item.txt,
            item.row_start,
            item.min_text_size,
            item.max_text_size,
            item.justification,
        );
        debug!("Displayed custom item {:?}", item.txt);

        self.displaying_custom = true;
        self.wake(now);
        self.custom_display_canceled = false;

        let ticks = u32::try_from(item.delay).unwrap_or(u32::MAX);
        self.config.tick.saturating_mul(ticks)
    }

    fn show_status(&mut self, now: Instant, idle_timeout: u64) {
        if self.displaying_custom {
            self.reset_state();
            self.displaying_custom = false;
            self.custom_display_canceled = false;
            self.wake(now);
        }

        let status = self.source.snapshot();
        let outcome = self.screen.render(&*self.display, &status);
        if outcome.wake {
            self.wake(now);
        }
        if outcome.idle_screen {
            self.check_idle(now, idle_timeout);
        }
    }

    fn check_idle(&mut self, now: Instant, idle_timeout: u64) {
        if self.idled || idle_timeout == 0 {
            return;
        }
        let Some(entered) = self.idle_entry_time else {
            return;
        };
        if now.saturating_duration_since(entered) > Duration::from_secs(idle_timeout) {
            debug!("Display idle for {}s, powering down", idle_timeout);
            self.idled = true;
            self.display.set_power(false);
        }
    }

    /// Wait up to `timeout`, returning early on new work or stop. A wake
    /// request is applied in place and the wait carries on.
    /// Returns whether we are still running.
    fn wait(&mut self, timeout: Duration) -> bool {
        let started = Instant::now();
        loop {
            let guard = self.shared.lock();
            let remaining = timeout.saturating_sub(started.elapsed());
            let (mut guard, _) = self
                .shared
                .signal
                .wait_timeout_while(guard, remaining, |s| s.running && !s.pending && !s.wake_requested)
                .unwrap_or_else(PoisonError::into_inner);

            if !guard.running {
                return false;
            }
            if guard.pending || !guard.wake_requested {
                return true;
            }
            guard.wake_requested = false;
            drop(guard);
            self.wake(Instant::now());
        }
    }

    /// Startup pause, only cut short by stop
    fn settle(&self) -> bool {
        let guard = self.shared.lock();
        let (guard, _) = self
            .shared
            .signal
            .wait_timeout_while(guard, self.config.startup_delay, |s| s.running)
            .unwrap_or_else(PoisonError::into_inner);
        guard.running
    }

    fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Loop until stopped
    pub fn run(mut self) {
        if self.settle() {
            info!("Display scheduler active");
            while self.is_running() {
                let delay = self.tick(Instant::now());
                if !self.wait(delay) {
                    break;
                }
            }
        }
        info!("Display scheduler stopped");
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> io::Result<SchedulerThread> {
        let handle = self.handle();
        let thread = thread::Builder::new()
            .name("display-scheduler".to_string())
            .spawn(move || self.run())?;
        Ok(SchedulerThread { handle, thread })
    }
}

/// Producer side of the scheduler: queue messages, wake, reload, stop.
///
/// Every call only takes the short shared lock and notifies; none of them
/// wait on the loop.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
    display: Arc<dyn DisplayDriver>,
}

impl SchedulerHandle {
    /// Queue a custom message (FIFO)
    pub fn display(&self, item: CustomDisplayItem) {
        self.shared.post(|s| s.queue.push_back(item));
    }

    /// Restart the idle timer and power up if idled. Whatever is on the
    /// panel stays there.
    pub fn wake(&self) {
        self.shared.lock().wake_requested = true;
        self.shared.signal.notify_all();
    }

    /// Stop the loop and leave the panel powered off
    pub fn stop(&self) {
        self.shared.lock().running = false;
        self.display.disable();
        self.shared.signal.notify_all();
    }

    /// Host is restarting or shutting down
    pub fn shutdown(&self) {
        info!("Shutdown requested, turning display off");
        self.stop();
        info!("Display has been shut off");
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn settings(&self) -> Settings {
        self.shared.lock().settings
    }

    pub fn idle_timeout(&self) -> u64 {
        self.shared.lock().settings.idle_timeout
    }

    /// Apply a partial settings map. A new bus address re-initialises the
    /// panel at that address before returning.
    pub fn reload(&self, map: &Map<String, Value>) -> Result<Settings, ConfigError> {
        let (settings, address_changed) = {
            let mut state = self.shared.lock();
            let changed = state.settings.merge_from_map(map)?;
            (state.settings, changed)
        };

        if address_changed {
            info!("Bus address now 0x{:02X}, re-initialising display", settings.wire_address());
            self.display.set_power(false);
            self.display.set_address(settings.i2c_hw_address);
            self.display.initialize();
            self.shared.post(|s| s.reset_requested = true);
        }
        Ok(settings)
    }
}

/// A scheduler running on its own thread
pub struct SchedulerThread {
    handle: SchedulerHandle,
    thread: JoinHandle<()>,
}

impl SchedulerThread {
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::drivers::mock::MockI2c;
    use crate::display::drivers::ssd1306::{Ssd1306, DEFAULT_HW_ADDRESS};
    use crate::display::window::Geometry;
    use crate::status::{HostStatus, StaticStatus};
    use chrono::NaiveDate;
    use serde_json::json;

    struct Rig {
        bus: MockI2c,
        lcd: Arc<Ssd1306<MockI2c>>,
        status: Arc<StaticStatus>,
        scheduler: Scheduler,
    }

    fn rig(idle_timeout: u64) -> Rig {
        let bus = MockI2c::new(128, 64);
        let lcd = Arc::new(Ssd1306::new(bus.clone(), DEFAULT_HW_ADDRESS, Geometry::new(128, 64).unwrap()));
        lcd.initialize();
        let now = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(9, 30, 0).unwrap();
        let status = Arc::new(StaticStatus::new(HostStatus { now, ..Default::default() }));
        let settings = Settings { idle_timeout, ..Default::default() };
        let scheduler = Scheduler::new(lcd.clone(), status.clone(), settings, SchedulerConfig::default());
        bus.clear_log();
        Rig { bus, lcd, status, scheduler }
    }

    #[test]
    fn test_status_tick_uses_one_tick_delay() {
        let mut r = rig(0);
        assert_eq!(r.scheduler.tick(Instant::now()), Duration::from_secs(1));
        assert_eq!(r.scheduler.screen().last_write(), "Idle");
        assert!(!r.bus.transactions().is_empty());
    }

    #[test]
    fn test_custom_delay_is_in_ticks() {
        let mut r = rig(0);
        let handle = r.scheduler.handle();
        handle.display(CustomDisplayItem { delay: 3, ..CustomDisplayItem::text("hi") });
        assert_eq!(r.scheduler.tick(Instant::now()), Duration::from_secs(3));
        assert!(r.scheduler.displaying_custom());
    }

    #[test]
    fn test_cancel_skips_render() {
        let mut r = rig(0);
        r.scheduler.handle().display(CustomDisplayItem::cancel());
        assert_eq!(r.scheduler.tick(Instant::now()), Duration::ZERO);
        assert!(r.scheduler.custom_display_canceled());
        assert!(r.bus.transactions().is_empty());
    }

    #[test]
    fn test_append_ignored_after_cancel_and_outside_custom() {
        let mut r = rig(0);
        let handle = r.scheduler.handle();
        let now = Instant::now();

        // not yet showing custom content: append is dropped, screen cleared
        handle.display(CustomDisplayItem { append: true, ..CustomDisplayItem::text("a") });
        r.scheduler.tick(now);
        assert_eq!(r.bus.data_transactions().len(), 32 + 4 * 1);

        // showing custom: append honoured, no clear
        r.bus.clear_log();
        handle.display(CustomDisplayItem { append: true, row_start: 2, ..CustomDisplayItem::text("b") });
        r.scheduler.tick(now);
        assert_eq!(r.bus.data_transactions().len(), 4);

        // after a cancel: cleared again
        handle.display(CustomDisplayItem::cancel());
        r.scheduler.tick(now);
        r.bus.clear_log();
        handle.display(CustomDisplayItem { append: true, ..CustomDisplayItem::text("c") });
        r.scheduler.tick(now);
        assert_eq!(r.bus.data_transactions().len(), 32 + 4);
        assert!(!r.scheduler.custom_display_canceled());
    }

    #[test]
    fn test_returning_from_custom_repaints_status() {
        let mut r = rig(0);
        let handle = r.scheduler.handle();
        let now = Instant::now();
        r.scheduler.tick(now);
        handle.display(CustomDisplayItem::text("hello"));
        r.scheduler.tick(now);

        r.bus.clear_log();
        r.scheduler.tick(now);
        assert!(!r.scheduler.displaying_custom());
        assert_eq!(r.scheduler.screen().last_write(), "Idle");
        assert!(!r.bus.transactions().is_empty());
    }

    #[test]
    fn test_idle_timeout_and_wake() {
        let mut r = rig(10);
        let t0 = Instant::now();
        r.scheduler.tick(t0);
        assert!(r.lcd.is_powered());

        r.scheduler.tick(t0 + Duration::from_secs(10));
        assert!(!r.scheduler.is_idled());
        assert!(r.lcd.is_powered());

        r.scheduler.tick(t0 + Duration::from_secs(11));
        assert!(r.scheduler.is_idled());
        assert!(!r.lcd.is_powered());
        assert!(!r.bus.is_powered());

        r.scheduler.handle().wake();
        r.scheduler.tick(t0 + Duration::from_secs(12));
        assert!(!r.scheduler.is_idled());
        assert!(r.lcd.is_powered());
        assert!(r.bus.is_powered());
    }

    #[test]
    fn test_content_change_wakes() {
        let mut r = rig(5);
        let t0 = Instant::now();
        r.scheduler.tick(t0);
        r.scheduler.tick(t0 + Duration::from_secs(6));
        assert!(r.scheduler.is_idled());

        r.status.update(|s| s.enabled = false);
        r.scheduler.tick(t0 + Duration::from_secs(7));
        assert!(!r.scheduler.is_idled());
        assert!(r.lcd.is_powered());
        assert_eq!(r.scheduler.screen().last_write(), "OFF");
    }

    #[test]
    fn test_zero_timeout_never_idles() {
        let mut r = rig(0);
        let t0 = Instant::now();
        r.scheduler.tick(t0);
        r.scheduler.tick(t0 + Duration::from_secs(86_400));
        assert!(!r.scheduler.is_idled());
    }

    #[test]
    fn test_stop_powers_off_and_disables() {
        let r = rig(0);
        let handle = r.scheduler.handle();
        assert!(handle.is_running());
        handle.stop();
        assert!(!handle.is_running());
        assert!(!r.lcd.is_enabled());
        assert!(!r.bus.is_powered());
    }

    #[test]
    fn test_reload_changes_address_and_resets() {
        let mut r = rig(0);
        let handle = r.scheduler.handle();
        let t0 = Instant::now();
        r.scheduler.tick(t0);
        assert_eq!(r.scheduler.screen().last_write(), "Idle");

        let settings = handle.reload(json!({"i2c_hw_address": "7a"}).as_object().unwrap()).unwrap();
        assert_eq!(settings.i2c_hw_address, 0x7A);
        assert_eq!(r.lcd.address(), 0x3D);
        assert!(r.lcd.is_powered());
        assert!(r.bus.transactions().iter().rev().take(3).all(|t| t.address == 0x3D));

        // caches dropped so the status page is painted again
        r.bus.clear_log();
        r.scheduler.tick(t0);
        assert!(!r.bus.data_transactions().is_empty());
    }

    #[test]
    fn test_reload_timeout_only() {
        let r = rig(0);
        let handle = r.scheduler.handle();
        let settings = handle.reload(json!({"idle_timeout": "30"}).as_object().unwrap()).unwrap();
        assert_eq!(settings.idle_timeout, 30);
        assert_eq!(handle.idle_timeout(), 30);
        assert!(r.bus.transactions().is_empty());
        assert!(handle.reload(json!({"idle_timeout": "soon"}).as_object().unwrap()).is_err());
        assert_eq!(handle.idle_timeout(), 30);
    }

    #[test]
    fn test_wake_during_wait_powers_up_without_ending_it() {
        let mut r = rig(1);
        let t0 = Instant::now();
        r.scheduler.tick(t0);
        r.scheduler.tick(t0 + Duration::from_secs(2));
        assert!(r.scheduler.is_idled());
        assert!(!r.bus.is_powered());

        r.scheduler.handle().wake();
        let started = Instant::now();
        assert!(r.scheduler.wait(Duration::from_millis(100)));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(!r.scheduler.is_idled());
        assert!(r.bus.is_powered());
    }

    #[test]
    fn test_new_item_ends_wait_early() {
        let mut r = rig(0);
        r.scheduler.handle().display(CustomDisplayItem::text("next"));
        let started = Instant::now();
        assert!(r.scheduler.wait(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_thread_stops_promptly() {
        let bus = MockI2c::new(128, 64);
        let lcd = Arc::new(Ssd1306::new(bus.clone(), DEFAULT_HW_ADDRESS, Geometry::new(128, 64).unwrap()));
        let status = Arc::new(StaticStatus::default());
        let config = SchedulerConfig {
            tick: Duration::from_millis(20),
            startup_delay: Duration::from_secs(30),
        };
        let running = Scheduler::new(lcd, status, Settings::default(), config).spawn().unwrap();

        let started = Instant::now();
        running.handle().stop();
        running.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!bus.is_powered());
    }
}

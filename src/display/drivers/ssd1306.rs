/*
 *  display/drivers/ssd1306.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  SSD1306 OLED display driver implementation
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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use embedded_hal::i2c::{Error as _, I2c};
use linux_embedded_hal::I2cdev;
use log::{error, info};

use crate::display::error::DisplayError;
use crate::display::font;
use crate::display::layout::{self, BlockPlan, Justification};
use crate::display::traits::DisplayDriver;
use crate::display::window::{Cursor, Geometry, Window, WindowManager};

/// Prefix byte for a command transaction
pub const CONTROL_BYTE: u8 = 0x00;

/// Prefix byte for a GDDRAM data transaction
pub const DATA_BYTE: u8 = 0x40;

pub const CMD_DISPLAY_OFF: u8 = 0xAE;
pub const CMD_DISPLAY_ON: u8 = 0xAF;

/// Largest payload the bus accepts in one transaction
pub const MAX_TRANSFER: usize = 32;

/// Factory default 8-bit write address (0x3C on the wire)
pub const DEFAULT_HW_ADDRESS: u8 = 0x78;

/// Power-up command sequence, leaves the panel off in horizontal addressing mode
pub const INIT_SEQUENCE: [u8; 25] = [
    CMD_DISPLAY_OFF,
    0x00, // column low nibble
    0x10, // column high nibble
    0x40, // start line 0
    0x81, 0xCF, // contrast
    0xA1, // segment remap
    0xA6, // normal, not inverted
    0xA8, 0x3F, // multiplex 1/64
    0xD3, 0x00, // no display offset
    0xD5, 0x80, // clock divide
    0xD9, 0xF1, // pre-charge
    0xDA, 0x12, // COM pins
    0xDB, 0x40, // VCOMH
    0x8D, 0x14, // charge pump on
    0x20, 0x00, // horizontal addressing
    0xC8, // COM scan remapped
];

/// Which prefix a sequence is sent with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Control,
    Data,
}

impl WriteKind {
    fn prefix(self) -> u8 {
        match self {
            WriteKind::Control => CONTROL_BYTE,
            WriteKind::Data => DATA_BYTE,
        }
    }

    fn operation(self) -> &'static str {
        match self {
            WriteKind::Control => "execute control sequence",
            WriteKind::Data => "execute data sequence",
        }
    }
}

/// Everything guarded by the write lock
struct Bus<I> {
    i2c: I,
    /// 7-bit address on the wire
    address: u8,
    windows: WindowManager,
    /// Set after a logged failure, cleared by the next good transaction
    write_failure: bool,
}

impl<I: I2c> Bus<I> {
    fn transfer(&mut self, operation: &'static str, frame: &[u8]) -> Result<(), DisplayError> {
        self.i2c
            .write(self.address, frame)
            .map_err(|e| DisplayError::Transport { operation, kind: e.kind() })
    }

    /// Send one framed transaction, logging only the first failure of a run
    fn send(&mut self, operation: &'static str, prefix: u8, payload: &[u8]) -> bool {
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(prefix);
        frame.extend_from_slice(payload);

        match self.transfer(operation, &frame) {
            Ok(()) => {
                self.write_failure = false;
                true
            }
            Err(e) => {
                if !self.write_failure {
                    error!("{}. Is the hardware connected and the right address selected?", e);
                    self.write_failure = true;
                }
                false
            }
        }
    }

    fn write_control_byte(&mut self, byte: u8) -> bool {
        self.send("write control byte", CONTROL_BYTE, &[byte])
    }

    fn write_data_byte(&mut self, byte: u8) -> bool {
        let ok = self.send("write data byte", DATA_BYTE, &[byte]);
        if ok {
            self.windows.advance(1);
        }
        ok
    }

    /// Chunked write. A data sequence moves the cursor by the whole
    /// sequence length for every chunk that lands.
    fn write_sequence(&mut self, kind: WriteKind, bytes: &[u8]) -> bool {
        let mut ok = true;
        for chunk in bytes.chunks(MAX_TRANSFER) {
            if self.send(kind.operation(), kind.prefix(), chunk) {
                if kind == WriteKind::Data {
                    self.windows.advance(bytes.len());
                }
            } else {
                ok = false;
            }
        }
        ok
    }

    /// `None` when the window is out of bounds and nothing was sent
    fn select_window(&mut self, window: Window) -> Option<bool> {
        if !self.windows.select(window) {
            return None;
        }
        let commands = WindowManager::window_commands(&window);
        Some(self.write_sequence(WriteKind::Control, &commands))
    }
}

/// SSD1306 driven directly over I2C
///
/// All bus traffic, including multi-chunk sequences, goes through a single
/// mutex so the driver can be shared behind an `Arc`.
pub struct Ssd1306<I> {
    bus: Mutex<Bus<I>>,
    geometry: Geometry,
    enabled: AtomicBool,
    powered: AtomicBool,
}

impl Ssd1306<I2cdev> {
    /// Open the Linux I2C character device at `path`
    pub fn open(path: &str, hw_address: u8, geometry: Geometry) -> Result<Self, DisplayError> {
        info!("Opening SSD1306 on {} at address 0x{:02X}", path, hw_address >> 1);
        let i2c = I2cdev::new(path)
            .map_err(|e| DisplayError::I2cError(format!("Failed to open {}: {}", path, e)))?;
        Ok(Self::new(i2c, hw_address, geometry))
    }
}

impl<I: I2c> Ssd1306<I> {
    /// Wrap an I2C bus. `hw_address` is the 8-bit write address
    /// (e.g. 0x78); the driver talks to `hw_address >> 1`.
    pub fn new(i2c: I, hw_address: u8, geometry: Geometry) -> Self {
        Self {
            bus: Mutex::new(Bus {
                i2c,
                address: hw_address >> 1,
                windows: WindowManager::new(geometry),
                write_failure: false,
            }),
            geometry,
            enabled: AtomicBool::new(true),
            powered: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Bus<I>> {
        self.bus.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    /// True while a failure episode is in progress
    pub fn has_write_failure(&self) -> bool {
        self.lock().write_failure
    }

    /// 7-bit address currently targeted
    pub fn address(&self) -> u8 {
        self.lock().address
    }

    pub fn window(&self) -> Window {
        self.lock().windows.window()
    }

    pub fn cursor(&self) -> Cursor {
        self.lock().windows.cursor()
    }

    /// Send one command byte. `force` bypasses the enabled gate.
    pub fn write_control_byte(&self, byte: u8, force: bool) -> bool {
        let mut bus = self.lock();
        (self.is_enabled() || force) && bus.write_control_byte(byte)
    }

    pub fn write_data_byte(&self, byte: u8) -> bool {
        let mut bus = self.lock();
        self.is_enabled() && bus.write_data_byte(byte)
    }

    pub fn write_control_sequence(&self, bytes: &[u8]) -> bool {
        let mut bus = self.lock();
        self.is_enabled() && bus.write_sequence(WriteKind::Control, bytes)
    }

    pub fn write_data_sequence(&self, bytes: &[u8]) -> bool {
        let mut bus = self.lock();
        self.is_enabled() && bus.write_sequence(WriteKind::Data, bytes)
    }

    /// Select the addressing window and home the cursor.
    ///
    /// Out of range or inverted bounds are rejected with no state change.
    pub fn set_window(&self, min_col: usize, max_col: usize, min_row: usize, max_row: usize) -> bool {
        let window = Window { min_col, max_col, min_row, max_row };
        let mut bus = self.lock();
        if !self.is_enabled() || !self.geometry.contains(&window) {
            return false;
        }
        bus.select_window(window).unwrap_or(false)
    }

    /// Zero the whole framebuffer
    pub fn clear(&self) -> bool {
        let mut bus = self.lock();
        if !self.is_enabled() {
            return false;
        }
        let mut ok = bus.select_window(self.geometry.full_window()).unwrap_or(false);

        let zeros = [0u8; MAX_TRANSFER];
        let mut remaining = self.geometry.framebuffer_len();
        while remaining > 0 {
            let len = remaining.min(MAX_TRANSFER);
            ok &= bus.write_sequence(WriteKind::Data, &zeros[..len]);
            remaining -= len;
        }
        ok
    }

    pub fn set_power(&self, on: bool) -> bool {
        let command = if on { CMD_DISPLAY_ON } else { CMD_DISPLAY_OFF };
        let ok = self.write_control_byte(command, false);
        if ok {
            self.powered.store(on, Ordering::SeqCst);
        }
        ok
    }

    /// Power off even when disabled
    fn force_power_off(&self) -> bool {
        let ok = self.write_control_byte(CMD_DISPLAY_OFF, true);
        if ok {
            self.powered.store(false, Ordering::SeqCst);
        }
        ok
    }

    /// One-shot: refuse further traffic and switch the panel off
    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            info!("Disabling SSD1306");
            self.force_power_off();
        }
    }

    /// Change the 8-bit write address for subsequent transactions
    pub fn set_address(&self, hw_address: u8) {
        let mut bus = self.lock();
        if bus.address != hw_address >> 1 {
            info!("SSD1306 address changed 0x{:02X} -> 0x{:02X}", bus.address, hw_address >> 1);
        }
        bus.address = hw_address >> 1;
    }

    /// Send the power-up sequence, clear and switch on
    pub fn initialize(&self) -> bool {
        info!("SSD1306 initialize...");
        let mut ok = self.write_control_sequence(&INIT_SEQUENCE);
        ok &= self.clear();
        ok &= self.set_power(true);
        info!("SSD1306 initialize done{}", if ok { "" } else { " (with errors)" });
        ok
    }

    /// Render one line of text over row-bands
    /// `row_start..=min(row_start + scale - 1, max_row)`, full width.
    ///
    /// Returns 1 once the line has been laid out and sent, 0 when the row
    /// or scale is out of range.
    pub fn write_line(&self, text: &str, row_start: usize, scale: usize, justification: Justification) -> usize {
        if !(1..=font::MAX_SCALE).contains(&scale) || row_start > self.geometry.max_row() {
            return 0;
        }
        let window = Window {
            min_col: 0,
            max_col: self.geometry.max_col(),
            min_row: row_start,
            max_row: (row_start + scale - 1).min(self.geometry.max_row()),
        };

        let mut bands = layout::compose_line(text, scale);
        layout::fit_rows(&mut bands, window.rows());
        layout::fit_columns(&mut bands, window.columns(), justification);

        let mut bus = self.lock();
        if self.is_enabled() && bus.select_window(window).is_some() {
            for band in &bands {
                bus.write_sequence(WriteKind::Data, band);
            }
        }
        1
    }

    /// Auto-fit `text` into `max_scale` row-bands from `row_start`.
    ///
    /// Returns the number of lines printed, 0 for invalid size bounds.
    pub fn write_block(
        &self,
        text: &str,
        row_start: usize,
        min_scale: usize,
        max_scale: usize,
        justification: Justification,
    ) -> usize {
        let plan = match layout::plan_block(text, self.geometry.width(), min_scale, max_scale) {
            Some(plan) => plan,
            None => return 0,
        };

        let (scale, lines) = match plan {
            BlockPlan::SingleLine { scale } => {
                return self.write_line(text, row_start, scale, justification);
            }
            BlockPlan::Wrapped { scale, lines } => (scale, lines),
        };

        let mut row = row_start;
        let mut printed = 0;
        for line in &lines {
            printed += self.write_line(line, row, scale, justification);
            row = row.saturating_add(scale);
        }
        for blank in row..row_start.saturating_add(max_scale) {
            self.write_line("", blank, 1, Justification::Left);
        }
        printed
    }
}

impl<I> DisplayDriver for Ssd1306<I>
where
    I: I2c + Send,
{
    fn geometry(&self) -> Geometry {
        Ssd1306::geometry(self)
    }

    fn initialize(&self) -> bool {
        Ssd1306::initialize(self)
    }

    fn clear(&self) -> bool {
        Ssd1306::clear(self)
    }

    fn set_power(&self, on: bool) -> bool {
        Ssd1306::set_power(self, on)
    }

    fn is_powered(&self) -> bool {
        Ssd1306::is_powered(self)
    }

    fn disable(&self) {
        Ssd1306::disable(self)
    }

    fn set_address(&self, hw_address: u8) {
        Ssd1306::set_address(self, hw_address)
    }

    fn write_line(&self, text: &str, row_start: usize, scale: usize, justification: Justification) -> usize {
        Ssd1306::write_line(self, text, row_start, scale, justification)
    }

    fn write_block(
        &self,
        text: &str,
        row_start: usize,
        min_scale: usize,
        max_scale: usize,
        justification: Justification,
    ) -> usize {
        Ssd1306::write_block(self, text, row_start, min_scale, max_scale, justification)
    }
}

/*
 *  display/drivers/mock.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock I2C bus with SSD1306 GDDRAM emulation for testing
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

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation, SevenBitAddress};

use crate::display::drivers::ssd1306::{CMD_DISPLAY_OFF, CMD_DISPLAY_ON, CONTROL_BYTE, DATA_BYTE};
use crate::display::window::{CMD_COLUMN_ADDRESS, CMD_PAGE_ADDRESS, ROW_BAND_HEIGHT};

/// Mock I2C bus for testing
///
/// This bus simulates an SSD1306 sitting on the wire. It's useful for:
/// - Unit tests
/// - Integration tests
/// - Development without hardware
///
/// Every successful write is recorded and interpreted: control payloads
/// drive a small command parser (windowing, power), data payloads land in
/// an emulated GDDRAM with horizontal-mode auto increment, so tests can
/// look at the resulting pixels.
#[derive(Debug, Clone)]
pub struct MockI2c {
    state: Arc<Mutex<MockBusState>>,
}

/// One recorded write: target address and the full frame including prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub address: u8,
    pub bytes: Vec<u8>,
}

impl Transaction {
    pub fn is_data(&self) -> bool {
        self.bytes.first() == Some(&DATA_BYTE)
    }
}

/// Internal state for the mock bus (shared for inspection in tests)
#[derive(Debug)]
pub struct MockBusState {
    /// Successful writes in order
    pub transactions: Vec<Transaction>,

    /// Fail every transaction while set
    pub simulate_failure: bool,

    /// Number of transactions refused
    pub failure_count: usize,

    /// Panel power as last commanded
    pub powered: bool,

    width: usize,
    ram: Vec<Vec<u8>>,
    col_range: (usize, usize),
    page_range: (usize, usize),
    col: usize,
    page: usize,
    pending: Option<PendingCommand>,
}

/// Command still collecting argument bytes
#[derive(Debug)]
struct PendingCommand {
    command: u8,
    args: Vec<u8>,
    needed: usize,
}

/// Argument bytes taken by each multi-byte command we may see
fn argument_count(command: u8) -> usize {
    match command {
        CMD_COLUMN_ADDRESS | CMD_PAGE_ADDRESS => 2,
        0x20 | 0x81 | 0xA8 | 0xD3 | 0xD5 | 0xD9 | 0xDA | 0xDB | 0x8D => 1,
        _ => 0,
    }
}

impl MockBusState {
    fn new(width: usize, height: usize) -> Self {
        let pages = height.div_ceil(ROW_BAND_HEIGHT as usize);
        Self {
            transactions: Vec::new(),
            simulate_failure: false,
            failure_count: 0,
            powered: false,
            width,
            ram: vec![vec![0u8; width]; pages],
            col_range: (0, width - 1),
            page_range: (0, pages - 1),
            col: 0,
            page: 0,
            pending: None,
        }
    }

    fn apply(&mut self, frame: &[u8]) {
        match frame.split_first() {
            Some((&CONTROL_BYTE, commands)) => {
                for &byte in commands {
                    self.command_byte(byte);
                }
            }
            Some((&DATA_BYTE, data)) => {
                for &byte in data {
                    self.data_byte(byte);
                }
            }
            _ => {}
        }
    }

    fn command_byte(&mut self, byte: u8) {
        if let Some(mut pending) = self.pending.take() {
            pending.args.push(byte);
            if pending.args.len() < pending.needed {
                self.pending = Some(pending);
            } else {
                self.execute(pending.command, &pending.args);
            }
            return;
        }

        match argument_count(byte) {
            0 => self.execute(byte, &[]),
            needed => {
                self.pending = Some(PendingCommand { command: byte, args: Vec::new(), needed });
            }
        }
    }

    fn execute(&mut self, command: u8, args: &[u8]) {
        match command {
            CMD_DISPLAY_OFF => self.powered = false,
            CMD_DISPLAY_ON => self.powered = true,
            CMD_COLUMN_ADDRESS => {
                let last = self.width - 1;
                self.col_range = ((args[0] as usize).min(last), (args[1] as usize).min(last));
                self.col = self.col_range.0;
            }
            CMD_PAGE_ADDRESS => {
                let last = self.ram.len() - 1;
                self.page_range = ((args[0] as usize).min(last), (args[1] as usize).min(last));
                self.page = self.page_range.0;
            }
            _ => {}
        }
    }

    fn data_byte(&mut self, byte: u8) {
        self.ram[self.page][self.col] = byte;
        if self.col >= self.col_range.1 {
            self.col = self.col_range.0;
            self.page = if self.page >= self.page_range.1 { self.page_range.0 } else { self.page + 1 };
        } else {
            self.col += 1;
        }
    }
}

impl MockI2c {
    /// Create a bus with an attached `width` x `height` panel
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockBusState::new(width, height))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockBusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get reference to state for inspection in tests
    pub fn state(&self) -> Arc<Mutex<MockBusState>> {
        Arc::clone(&self.state)
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().transactions.clone()
    }

    pub fn data_transactions(&self) -> Vec<Transaction> {
        self.lock().transactions.iter().filter(|t| t.is_data()).cloned().collect()
    }

    /// Forget recorded transactions, keeping RAM and power state
    pub fn clear_log(&self) {
        self.lock().transactions.clear();
    }

    pub fn set_failure(&self, fail: bool) {
        self.lock().simulate_failure = fail;
    }

    pub fn failure_count(&self) -> usize {
        self.lock().failure_count
    }

    pub fn is_powered(&self) -> bool {
        self.lock().powered
    }

    /// Copy of one row-band of GDDRAM
    pub fn band(&self, page: usize) -> Vec<u8> {
        self.lock().ram[page].clone()
    }

    /// Copy of the whole GDDRAM, one `Vec` per row-band
    pub fn ram(&self) -> Vec<Vec<u8>> {
        self.lock().ram.clone()
    }

    pub fn pixel(&self, x: usize, y: usize) -> BinaryColor {
        let band_height = ROW_BAND_HEIGHT as usize;
        let byte = self.lock().ram[y / band_height][x];
        BinaryColor::from(byte & (1 << (y % band_height)) != 0)
    }

    /// Count pixels that are on
    pub fn lit_pixels(&self) -> usize {
        self.lock()
            .ram
            .iter()
            .flatten()
            .map(|b| b.count_ones() as usize)
            .sum()
    }
}

/// Error returned while failure simulation is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockI2cError;

impl i2c::Error for MockI2cError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }
}

impl ErrorType for MockI2c {
    type Error = MockI2cError;
}

impl I2c<SevenBitAddress> for MockI2c {
    fn transaction(&mut self, address: SevenBitAddress, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if state.simulate_failure {
            state.failure_count += 1;
            return Err(MockI2cError);
        }

        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    state.apply(bytes);
                    state.transactions.push(Transaction { address, bytes: bytes.to_vec() });
                }
                Operation::Read(buffer) => buffer.fill(0),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_bus_creation() {
        let bus = MockI2c::new(128, 64);
        assert_eq!(bus.ram().len(), 8);
        assert_eq!(bus.band(0).len(), 128);
        assert_eq!(bus.lit_pixels(), 0);
        assert!(!bus.is_powered());
    }

    #[test]
    fn test_mock_bus_power_commands() {
        let mut bus = MockI2c::new(128, 64);
        bus.write(0x3C, &[CONTROL_BYTE, CMD_DISPLAY_ON]).unwrap();
        assert!(bus.is_powered());
        bus.write(0x3C, &[CONTROL_BYTE, CMD_DISPLAY_OFF]).unwrap();
        assert!(!bus.is_powered());
        assert_eq!(bus.transactions().len(), 2);
    }

    #[test]
    fn test_mock_bus_arguments_are_not_commands() {
        let mut bus = MockI2c::new(128, 64);
        // contrast 0xAF must not switch the panel on
        bus.write(0x3C, &[CONTROL_BYTE, 0x81, CMD_DISPLAY_ON]).unwrap();
        assert!(!bus.is_powered());
    }

    #[test]
    fn test_mock_bus_window_wraps() {
        let mut bus = MockI2c::new(128, 64);
        bus.write(0x3C, &[CONTROL_BYTE, 0x21, 10, 11, 0x22, 2, 3]).unwrap();
        bus.write(0x3C, &[DATA_BYTE, 1, 2, 3, 4]).unwrap();

        assert_eq!(bus.band(2)[10..12], [1u8, 2]);
        assert_eq!(bus.band(3)[10..12], [3u8, 4]);
        assert_eq!(bus.band(2)[12], 0);

        // wraps back to the top left of the window
        bus.write(0x3C, &[DATA_BYTE, 5, 6]).unwrap();
        assert_eq!(bus.band(2)[10..12], [5u8, 6]);
    }

    #[test]
    fn test_mock_bus_pixels() {
        let mut bus = MockI2c::new(128, 64);
        bus.write(0x3C, &[DATA_BYTE, 0b0000_0101]).unwrap();
        assert_eq!(bus.pixel(0, 0), BinaryColor::On);
        assert_eq!(bus.pixel(0, 1), BinaryColor::Off);
        assert_eq!(bus.pixel(0, 2), BinaryColor::On);
        assert_eq!(bus.lit_pixels(), 2);
    }

    #[test]
    fn test_mock_bus_failure_simulation() {
        let mut bus = MockI2c::new(128, 64);
        bus.set_failure(true);
        let err = bus.write(0x3C, &[DATA_BYTE, 0xFF]).unwrap_err();
        assert_eq!(i2c::Error::kind(&err), ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        assert_eq!(bus.failure_count(), 1);
        assert!(bus.transactions().is_empty());
        assert_eq!(bus.lit_pixels(), 0);
    }
}

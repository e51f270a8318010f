/*
 *  display/error.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error types for the display subsystem
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

use std::fmt;
use std::error::Error;

use embedded_hal::i2c::ErrorKind;

/// Error type for display driver operations
///
/// Transport errors are folded into boolean results by the public driver API;
/// this type surfaces where a caller can act on it (opening the bus, geometry).
#[derive(Debug)]
pub enum DisplayError {
    /// The I2C device could not be opened
    I2cError(String),

    /// A bus transaction failed
    Transport {
        operation: &'static str,
        kind: ErrorKind,
    },

    /// Invalid configuration
    InvalidConfiguration(String),
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::I2cError(msg) =>
                write!(f, "I2C communication error: {}", msg),
            DisplayError::Transport { operation, kind } =>
                write!(f, "Failed to {}: {:?}", operation, kind),
            DisplayError::InvalidConfiguration(msg) =>
                write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl Error for DisplayError {}

/*
 *  display/mod.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display subsystem - SSD1306 over I2C plus the status scheduler
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

// Core trait definitions
pub mod traits;
pub mod error;

// Panel geometry and addressing window
pub mod window;

// 5x8 glyph table and scaling
pub mod glyphs;
pub mod font;

// Line composition and justification
pub mod layout;

// Display drivers
pub mod drivers;

// Custom message and status page rendering
pub mod custom;
pub mod status_screen;

// Background loop
pub mod scheduler;

// Re-exports for convenience
pub use traits::DisplayDriver;
pub use error::DisplayError;
pub use window::{Cursor, Geometry, Window};
pub use layout::Justification;
pub use drivers::ssd1306::Ssd1306;
pub use custom::CustomDisplayItem;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle, SchedulerThread};

/*
 *  display/traits.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  Core trait definitions for display driver abstraction
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

use crate::display::layout::Justification;
use crate::display::window::Geometry;

/// Text-oriented display operations used by the scheduler
///
/// Every method takes `&self`: implementations serialize bus access
/// internally so one driver can be shared between the scheduler thread and
/// the host. Transport failures are reported as `false` (or `0` lines) and
/// logged by the driver, never raised.
pub trait DisplayDriver: Send + Sync {
    /// Fixed panel geometry
    fn geometry(&self) -> Geometry;

    /// Run the power-up command sequence, clear and switch the panel on
    fn initialize(&self) -> bool;

    /// Zero the whole framebuffer
    fn clear(&self) -> bool;

    /// Switch the panel on or off
    fn set_power(&self, on: bool) -> bool;

    fn is_powered(&self) -> bool;

    /// Power off and refuse all further traffic
    fn disable(&self);

    /// Change the 8-bit hardware address used for subsequent transactions
    fn set_address(&self, hw_address: u8);

    /// Render one line of `text` at `scale` starting on row-band `row_start`.
    /// Returns the number of lines printed (0 or 1).
    fn write_line(&self, text: &str, row_start: usize, scale: usize, justification: Justification) -> usize;

    /// Auto-fit `text` into the row-bands `row_start..row_start + max_scale`,
    /// choosing a scale in `min_scale..=max_scale`. Returns the number of
    /// lines printed.
    fn write_block(
        &self,
        text: &str,
        row_start: usize,
        min_scale: usize,
        max_scale: usize,
        justification: Justification,
    ) -> usize;
}

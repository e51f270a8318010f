/*
 *  display/font.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  Blocky integer scaling of 5x8 glyphs into row-band byte sequences
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

use std::iter;

use crate::display::glyphs::{glyph_for, GLYPH_CELL_WIDTH};
use crate::display::window::ROW_BAND_HEIGHT;

/// Render one character at `scale`.
///
/// Largest supported magnification
pub const MAX_SCALE: usize = 8;

/// Returns `scale` row-bands, each `6 * scale` bytes wide: the five glyph
/// columns plus a blank spacer, every source pixel blown up to a
/// `scale` x `scale` block. Band 0 is the top of the character.
pub fn render(ch: char, scale: usize) -> Vec<Vec<u8>> {
    let band_height = ROW_BAND_HEIGHT as usize;
    let mut bands = vec![vec![0u8; GLYPH_CELL_WIDTH * scale]; scale];

    let columns = glyph_for(ch).iter().copied().chain(iter::once(0x00));
    for (col, bits) in columns.enumerate() {
        for src_row in (0..band_height).filter(|r| bits & (1 << r) != 0) {
            for dy in 0..scale {
                let y = src_row * scale + dy;
                let mask = 1u8 << (y % band_height);
                let band = &mut bands[y / band_height];
                for out in &mut band[col * scale..(col + 1) * scale] {
                    *out |= mask;
                }
            }
        }
    }

    bands
}

/*
 *  display/layout.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  Line composition, justification and auto-fitting word wrap
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

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::display::font;
use crate::display::glyphs::GLYPH_CELL_WIDTH;

/// Horizontal placement of a line within its window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Justification {
    #[default]
    Left,
    Right,
    Center,
}

impl Justification {
    /// Case-insensitive lookup; anything unrecognised is `Left`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "RIGHT" => Justification::Right,
            "CENTER" => Justification::Center,
            _ => Justification::Left,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Justification::Left => "LEFT",
            Justification::Right => "RIGHT",
            Justification::Center => "CENTER",
        }
    }

    /// Split an adjustment of `amount` columns into (left, right) shares.
    ///
    /// Padding puts an odd remainder on the left, cropping on the right.
    fn split(&self, amount: usize, padding: bool) -> (usize, usize) {
        match self {
            Justification::Left => (0, amount),
            Justification::Right => (amount, 0),
            Justification::Center => {
                let small = amount / 2;
                let large = amount - small;
                if padding { (large, small) } else { (small, large) }
            }
        }
    }
}

impl fmt::Display for Justification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Justification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Justification {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Justification::from_name(&name))
    }
}

/// Concatenate rendered characters band by band.
///
/// An empty string is laid out as a single space so a blank line of the
/// right height still gets painted.
pub fn compose_line(text: &str, scale: usize) -> Vec<Vec<u8>> {
    let text = if text.is_empty() { " " } else { text };
    let mut bands: Vec<Vec<u8>> = vec![Vec::with_capacity(text.len() * GLYPH_CELL_WIDTH * scale); scale];
    for ch in text.chars() {
        for (band, glyph_band) in bands.iter_mut().zip(font::render(ch, scale)) {
            band.extend(glyph_band);
        }
    }
    bands
}

/// Pad with blank bands or drop trailing bands until there are `rows`.
pub fn fit_rows(bands: &mut Vec<Vec<u8>>, rows: usize) {
    let width = bands.first().map_or(0, Vec::len);
    bands.resize_with(rows, || vec![0u8; width]);
}

/// Pad or crop every band to exactly `columns` bytes.
pub fn fit_columns(bands: &mut [Vec<u8>], columns: usize, justification: Justification) {
    for band in bands.iter_mut() {
        let width = band.len();
        if width < columns {
            let (left, right) = justification.split(columns - width, true);
            let mut padded = Vec::with_capacity(columns);
            padded.resize(left, 0u8);
            padded.extend_from_slice(band);
            padded.resize(left + width + right, 0u8);
            *band = padded;
        } else if width > columns {
            let (left, right) = justification.split(width - columns, false);
            band.truncate(width - right);
            band.drain(..left);
        }
    }
}

/// Fixed-width estimate used for fitting: every character and every space
/// counts as one 6 pixel cell regardless of the glyph.
fn estimated_width(word: &str) -> usize {
    word.chars().count() * GLYPH_CELL_WIDTH
}

/// How `write_block` will lay out a piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockPlan {
    /// Fits on one line at the maximum scale; written as a single line
    SingleLine { scale: usize },
    /// Wrapped (and vertically padded) lines at `scale`
    Wrapped { scale: usize, lines: Vec<String> },
}

/// Greedy word wrap at one scale
#[derive(Debug)]
struct Wrap {
    lines: Vec<String>,
    too_long: bool,
}

fn wrap_words(words: &[&str], scale: usize, max_width: usize) -> Wrap {
    let fits = |units: usize| units * scale <= max_width;
    let mut lines: Vec<String> = Vec::new();
    let mut current = 0usize;
    let mut too_long = false;

    for word in words {
        let size = estimated_width(word);
        match lines.last_mut() {
            Some(line) if fits(current + GLYPH_CELL_WIDTH + size) => {
                line.push(' ');
                line.push_str(word);
                current += GLYPH_CELL_WIDTH + size;
            }
            _ => {
                lines.push((*word).to_string());
                current = size;
                too_long |= !fits(size);
            }
        }
    }

    Wrap { lines, too_long }
}

/// Work out the scale and lines for an auto-fitted block.
///
/// Returns `None` when the size bounds are invalid or leave
/// `1..=font::MAX_SCALE`. Candidate scales run
/// from `max_scale - 1` down to `min_scale`; the first whose wrap fits in
/// `max_scale / scale` lines with no over-wide word wins, otherwise the
/// wrap at `min_scale` is used as is.
pub fn plan_block(text: &str, max_width: usize, min_scale: usize, max_scale: usize) -> Option<BlockPlan> {
    if min_scale == 0 || min_scale > max_scale || max_scale > font::MAX_SCALE {
        return None;
    }

    let words: Vec<&str> = text.split(' ').collect();
    let total = words.iter().map(|w| estimated_width(w)).sum::<usize>()
        + (words.len() - 1) * GLYPH_CELL_WIDTH;

    if total * max_scale <= max_width || min_scale == max_scale || text.is_empty() {
        return Some(BlockPlan::SingleLine { scale: max_scale });
    }

    let mut chosen = None;
    for scale in (min_scale..max_scale).rev() {
        let max_lines = max_scale / scale;
        let wrap = wrap_words(&words, scale, max_width);
        let accepted = wrap.lines.len() <= max_lines && !wrap.too_long;
        chosen = Some((scale, max_lines, wrap.lines));
        if accepted {
            break;
        }
    }
    let (scale, max_lines, mut lines) = chosen?;

    // centre vertically, then drop whatever still does not fit
    while lines.len() + 2 <= max_lines {
        lines.insert(0, String::new());
        lines.push(String::new());
    }
    lines.truncate(max_lines);

    Some(BlockPlan::Wrapped { scale, lines })
}

/*
 *  display/window.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  Device geometry, addressing window and write cursor bookkeeping
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

use crate::display::error::DisplayError;

/// Physical pixel rows per addressable row-band
pub const ROW_BAND_HEIGHT: u32 = 8;

/// Fixed panel geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    width: usize,
    row_bands: usize,
}

impl Geometry {
    /// Build a geometry, rounding the height up to a whole row-band.
    ///
    /// Column and row-band indices are sent to the controller as single
    /// bytes, so neither may exceed 256.
    pub fn new(width: u32, height: u32) -> Result<Self, DisplayError> {
        if width == 0 || height == 0 {
            return Err(DisplayError::InvalidConfiguration(
                format!("Unsupported panel size: {}x{}", width, height)
            ));
        }
        let row_bands = height.div_ceil(ROW_BAND_HEIGHT);
        if width > 256 || row_bands > 256 {
            return Err(DisplayError::InvalidConfiguration(
                format!("Panel too large for single byte addressing: {}x{}", width, height)
            ));
        }
        Ok(Self {
            width: width as usize,
            row_bands: row_bands as usize,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels (a multiple of 8)
    pub fn height(&self) -> usize {
        self.row_bands * ROW_BAND_HEIGHT as usize
    }

    pub fn row_bands(&self) -> usize {
        self.row_bands
    }

    pub fn max_col(&self) -> usize {
        self.width - 1
    }

    pub fn max_row(&self) -> usize {
        self.row_bands - 1
    }

    /// Window spanning the whole panel
    pub fn full_window(&self) -> Window {
        Window {
            min_col: 0,
            max_col: self.max_col(),
            min_row: 0,
            max_row: self.max_row(),
        }
    }

    /// Bytes needed to cover the whole framebuffer
    pub fn framebuffer_len(&self) -> usize {
        self.width * self.row_bands
    }

    /// True if `window` is well-formed and inside the panel
    pub fn contains(&self, window: &Window) -> bool {
        window.min_col <= window.max_col
            && window.max_col <= self.max_col()
            && window.min_row <= window.max_row
            && window.max_row <= self.max_row()
    }
}

/// Rectangle of columns x row-bands, bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub min_col: usize,
    pub max_col: usize,
    pub min_row: usize,
    pub max_row: usize,
}

impl Window {
    pub fn columns(&self) -> usize {
        self.max_col - self.min_col + 1
    }

    pub fn rows(&self) -> usize {
        self.max_row - self.min_row + 1
    }

    pub fn contains(&self, cursor: Cursor) -> bool {
        (self.min_col..=self.max_col).contains(&cursor.col)
            && (self.min_row..=self.max_row).contains(&cursor.row)
    }
}

/// Controller write position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub col: usize,
    pub row: usize,
}

/// Tracks the window selected on the controller and where the next data
/// byte will land.
#[derive(Debug, Clone)]
pub struct WindowManager {
    geometry: Geometry,
    window: Window,
    cursor: Cursor,
}

impl WindowManager {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            window: geometry.full_window(),
            cursor: Cursor::default(),
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Select a new window and home the cursor. Rejected windows leave
    /// everything untouched.
    pub fn select(&mut self, window: Window) -> bool {
        if !self.geometry.contains(&window) {
            return false;
        }
        self.window = window;
        self.cursor = Cursor {
            col: window.min_col,
            row: window.min_row,
        };
        true
    }

    /// Advance by `count` columns, wrapping row-major inside the window
    /// and back to the top row after the last one.
    pub fn advance(&mut self, count: usize) {
        let columns = self.window.columns();
        let rows = self.window.rows();
        let col_offset = self.cursor.col - self.window.min_col + count;
        let row_offset = (self.cursor.row - self.window.min_row + col_offset / columns) % rows;
        self.cursor = Cursor {
            col: self.window.min_col + col_offset % columns,
            row: self.window.min_row + row_offset,
        };
    }

    /// Controller command bytes selecting the current window
    pub fn window_commands(window: &Window) -> [u8; 6] {
        [
            CMD_COLUMN_ADDRESS,
            window.min_col as u8,
            window.max_col as u8,
            CMD_PAGE_ADDRESS,
            window.min_row as u8,
            window.max_row as u8,
        ]
    }
}

/// Set column start/end address
pub const CMD_COLUMN_ADDRESS: u8 = 0x21;

/// Set page (row-band) start/end address
pub const CMD_PAGE_ADDRESS: u8 = 0x22;

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> Geometry {
        Geometry::new(128, 64).unwrap()
    }

    #[test]
    fn test_geometry_rounds_height_up() {
        let g = Geometry::new(128, 60).unwrap();
        assert_eq!(g.row_bands(), 8);
        assert_eq!(g.height(), 64);
        assert_eq!(g.max_col(), 127);
        assert_eq!(g.max_row(), 7);
        assert_eq!(g.framebuffer_len(), 1024);
    }

    #[test]
    fn test_geometry_rejects_bad_sizes() {
        assert!(Geometry::new(0, 64).is_err());
        assert!(Geometry::new(128, 0).is_err());
        assert!(Geometry::new(300, 64).is_err());
    }

    #[test]
    fn test_select_validates_bounds() {
        let mut wm = WindowManager::new(geometry());
        let before = wm.window();

        let bad = [
            Window { min_col: 10, max_col: 5, min_row: 0, max_row: 0 },
            Window { min_col: 0, max_col: 128, min_row: 0, max_row: 0 },
            Window { min_col: 0, max_col: 10, min_row: 3, max_row: 2 },
            Window { min_col: 0, max_col: 10, min_row: 0, max_row: 8 },
        ];
        for w in bad {
            assert!(!wm.select(w), "{:?} should be rejected", w);
            assert_eq!(wm.window(), before);
        }

        let good = Window { min_col: 4, max_col: 9, min_row: 2, max_row: 3 };
        assert!(wm.select(good));
        assert_eq!(wm.window(), good);
        assert_eq!(wm.cursor(), Cursor { col: 4, row: 2 });
    }

    #[test]
    fn test_advance_wraps_row_major() {
        let mut wm = WindowManager::new(geometry());
        wm.select(Window { min_col: 10, max_col: 12, min_row: 5, max_row: 6 });

        let expected = [
            (11, 5), (12, 5),
            (10, 6), (11, 6), (12, 6),
            (10, 5), (11, 5),
        ];
        for (col, row) in expected {
            wm.advance(1);
            assert_eq!(wm.cursor(), Cursor { col, row });
        }
    }

    #[test]
    fn test_advance_never_escapes_window() {
        let g = geometry();
        let windows = [
            g.full_window(),
            Window { min_col: 0, max_col: 0, min_row: 7, max_row: 7 },
            Window { min_col: 100, max_col: 127, min_row: 1, max_row: 4 },
            Window { min_col: 3, max_col: 64, min_row: 6, max_row: 7 },
        ];
        for window in windows {
            let mut wm = WindowManager::new(g);
            assert!(wm.select(window));
            for step in [1, 1, 5, 31, 32, 129, 1024, 7] {
                for _ in 0..50 {
                    wm.advance(step);
                    assert!(
                        window.contains(wm.cursor()),
                        "cursor {:?} escaped {:?}",
                        wm.cursor(),
                        window
                    );
                }
            }
        }
    }

    #[test]
    fn test_window_commands() {
        let w = Window { min_col: 0, max_col: 127, min_row: 2, max_row: 3 };
        assert_eq!(WindowManager::window_commands(&w), [0x21, 0, 127, 0x22, 2, 3]);
    }
}

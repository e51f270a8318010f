/*
 *  display/custom.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  Externally submitted one-shot display requests
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

use serde::{Deserialize, Serialize};

use crate::deutils::{
    default_one_u64, default_one_usize, deserialize_bool_from_anything, deserialize_numeric_u64,
    deserialize_numeric_usize,
};
use crate::display::layout::Justification;

/// A custom message to show in place of the status screen
///
/// Missing fields take their defaults, so `{"txt": "Hi"}` is a complete
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDisplayItem {
    #[serde(default)]
    pub txt: String,

    #[serde(default, deserialize_with = "deserialize_numeric_usize")]
    pub row_start: usize,

    #[serde(default = "default_one_usize", deserialize_with = "deserialize_numeric_usize")]
    pub min_text_size: usize,

    #[serde(default = "default_one_usize", deserialize_with = "deserialize_numeric_usize")]
    pub max_text_size: usize,

    #[serde(default)]
    pub justification: Justification,

    /// Draw over the previous custom message instead of clearing first
    #[serde(default, deserialize_with = "deserialize_bool_from_anything")]
    pub append: bool,

    /// Ticks to wait before the next scheduler pass
    #[serde(default = "default_one_u64", deserialize_with = "deserialize_numeric_u64")]
    pub delay: u64,

    #[serde(default, deserialize_with = "deserialize_bool_from_anything")]
    pub cancel: bool,
}

impl Default for CustomDisplayItem {
    fn default() -> Self {
        Self {
            txt: String::new(),
            row_start: 0,
            min_text_size: 1,
            max_text_size: 1,
            justification: Justification::Left,
            append: false,
            delay: 1,
            cancel: false,
        }
    }
}

impl CustomDisplayItem {
    /// Plain text request with default placement
    pub fn text(txt: impl Into<String>) -> Self {
        Self {
            txt: txt.into(),
            ..Default::default()
        }
    }

    /// Request that cancels whatever custom message is showing
    pub fn cancel() -> Self {
        Self {
            cancel: true,
            ..Default::default()
        }
    }
}

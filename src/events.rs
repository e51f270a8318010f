/*
 *  events.rs
 *
 *  sip-oled - sprinkler status at a glance
 *  (c) 2020-26 Stuart Hunter
 *
 *  Host notifications: custom display, wake, restart, settings reload
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

use log::{info, warn};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::SettingsStore;
use crate::display::custom::CustomDisplayItem;
use crate::display::scheduler::SchedulerHandle;

/// One notification from the host, one JSON object per line:
///
/// ```text
/// {"event":"display","txt":"Hello World","max_text_size":3,"justification":"center"}
/// {"event":"wake"}
/// {"event":"restart"}
/// {"event":"settings","settings":{"idle_timeout":30,"i2c_hw_address":"78"}}
/// ```
///
/// A line that is not a JSON object is shown as a plain custom message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum HostEvent {
    Display(CustomDisplayItem),
    Wake,
    Restart,
    Settings {
        settings: Map<String, Value>,
        #[serde(default)]
        save: bool,
    },
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<HostEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.starts_with('{') {
        return serde_json::from_str(line).map(Some);
    }
    Ok(Some(HostEvent::Display(CustomDisplayItem::text(line))))
}

/// Hand an event to the scheduler. Returns `false` once the host asked us
/// to shut down.
pub fn dispatch(handle: &SchedulerHandle, store: Option<&SettingsStore>, event: HostEvent) -> bool {
    match event {
        HostEvent::Display(item) => handle.display(item),
        HostEvent::Wake => handle.wake(),
        HostEvent::Restart => {
            handle.shutdown();
            return false;
        }
        HostEvent::Settings { settings, save } => match handle.reload(&settings) {
            Ok(applied) => {
                info!("Settings applied: idle_timeout={}s address={:02x}",
                    applied.idle_timeout, applied.i2c_hw_address);
                if let (true, Some(store)) = (save, store) {
                    if let Err(e) = store.save(&applied) {
                        warn!("Could not save settings: {}", e);
                    }
                }
            }
            Err(e) => warn!("Rejected settings {:?}: {}", settings, e),
        },
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::layout::Justification;

    #[test]
    fn test_parse_display_event() {
        let event = parse_line(r#"{"event":"display","txt":"Hi","max_text_size":"2","justification":"RIGHT"}"#)
            .unwrap()
            .unwrap();
        match event {
            HostEvent::Display(item) => {
                assert_eq!(item.txt, "Hi");
                assert_eq!(item.max_text_size, 2);
                assert_eq!(item.min_text_size, 1);
                assert_eq!(item.justification, Justification::Right);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_events() {
        assert_eq!(parse_line(r#"{"event":"wake"}"#).unwrap(), Some(HostEvent::Wake));
        assert_eq!(parse_line(r#" {"event":"restart"} "#).unwrap(), Some(HostEvent::Restart));
        assert_eq!(parse_line("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_settings_event() {
        let event = parse_line(r#"{"event":"settings","settings":{"idle_timeout":30}}"#).unwrap().unwrap();
        match event {
            HostEvent::Settings { settings, save } => {
                assert_eq!(settings.get("idle_timeout"), Some(&Value::from(30)));
                assert!(!save);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_plain_text_is_a_message() {
        assert_eq!(
            parse_line("Watering soon").unwrap(),
            Some(HostEvent::Display(CustomDisplayItem::text("Watering soon")))
        );
    }

    #[test]
    fn test_unknown_event_is_an_error() {
        assert!(parse_line(r#"{"event":"explode"}"#).is_err());
        assert!(parse_line(r#"{"event":"display""#).is_err());
    }
}

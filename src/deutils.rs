// src/deutils.rs
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn default_true() -> bool { true }
pub fn default_one_usize() -> usize { 1 }
pub fn default_one_u64() -> u64 { 1 }
pub fn default_water_level() -> u32 { 100 }

// Host payloads arrive from scripts and web forms, so flags and numbers are
// accepted as JSON values or as their string spellings.

pub fn deserialize_bool_from_anything<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    let s = v.to_string().trim_matches('"').trim().to_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "y" | "t" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "f" | "off" | "null" | "" => Ok(false),
        _ => Err(serde::de::Error::invalid_value(
            serde::de::Unexpected::Str(s.as_str()),
            &"expected boolean representation",
        )),
    }
}

fn numeric_from_value<T, E>(v: &Value) -> Result<T, E>
where
    T: TryFrom<i64>,
    E: serde::de::Error,
{
    v.as_i64()
        .or_else(|| v.as_f64().map(|f| f.trunc() as i64))
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| E::custom("non-integer"))?
        .try_into()
        .map_err(|_| E::custom("overflow"))
}

pub fn deserialize_numeric_usize<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    numeric_from_value(&v)
}

pub fn deserialize_numeric_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    numeric_from_value(&v)
}

pub fn deserialize_numeric_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    numeric_from_value(&v)
}

pub fn deserialize_numeric_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    numeric_from_value(&v)
}

/// Parse a bus address written in hex, with or without a `0x` prefix.
pub fn parse_hex_u8(s: &str) -> Option<u8> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

/// Deserializes a hex string (`"78"`, `"0x78"`) into a byte. A bare JSON
/// number is taken as already decoded.
pub fn deserialize_hex_u8<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let v = Value::deserialize(deserializer)?;
    match &v {
        Value::String(s) => parse_hex_u8(s)
            .ok_or_else(|| D::Error::custom(format!("invalid hex address: {:?}", s))),
        _ => numeric_from_value(&v),
    }
}

/// Converts total seconds into a "HH:MM:SS" or "MM:SS" duration string.
/// If hours is zero, only MM:SS is surfaced. Negative input counts as zero.
pub fn seconds_to_hms(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

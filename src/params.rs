//! Typed parameter values for component descriptors.
//!
//! Hardware options are usually written with units (`"32kB"`, `"1GHz"`,
//! `"512MB"`). This module parses those spellings into typed values so the
//! factory can check constraints on numbers rather than strings.
//!
//! Memory sizes use binary multiples: `kB`, `KB` and `KiB` all mean 1024.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{AddrRange, Tick, TICKS_PER_SECOND};

/// A size in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteSize(pub u64);

impl ByteSize {
    /// Size of `n` KiB.
    pub const fn kib(n: u64) -> Self {
        ByteSize(n * 1024)
    }

    /// Size of `n` MiB.
    pub const fn mib(n: u64) -> Self {
        ByteSize(n * 1024 * 1024)
    }

    /// Size of `n` GiB.
    pub const fn gib(n: u64) -> Self {
        ByteSize(n * 1024 * 1024 * 1024)
    }

    /// Returns the size in bytes.
    pub fn bytes(&self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (number, unit) = split_unit(s);
        let value: u64 = number
            .parse()
            .map_err(|_| format!("`{}` is not a byte size", s))?;
        let multiplier: u64 = match unit {
            "" | "B" => 1,
            "k" | "kB" | "K" | "KB" | "KiB" => 1 << 10,
            "M" | "MB" | "MiB" => 1 << 20,
            "G" | "GB" | "GiB" => 1 << 30,
            "T" | "TB" | "TiB" => 1 << 40,
            other => return Err(format!("unknown size unit `{}`", other)),
        };
        value
            .checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| format!("`{}` overflows a 64-bit size", s))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes != 0 && bytes % (1 << 30) == 0 {
            write!(f, "{}GB", bytes >> 30)
        } else if bytes != 0 && bytes % (1 << 20) == 0 {
            write!(f, "{}MB", bytes >> 20)
        } else if bytes != 0 && bytes % (1 << 10) == 0 {
            write!(f, "{}kB", bytes >> 10)
        } else {
            write!(f, "{}B", bytes)
        }
    }
}

/// A clock frequency in hertz.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Frequency(pub u64);

impl Frequency {
    /// Frequency of `n` MHz.
    pub const fn mhz(n: u64) -> Self {
        Frequency(n * 1_000_000)
    }

    /// Frequency of `n` GHz.
    pub const fn ghz(n: u64) -> Self {
        Frequency(n * 1_000_000_000)
    }

    /// Returns the frequency in hertz.
    pub fn hz(&self) -> u64 {
        self.0
    }

    /// Returns the clock period in ticks, or `None` for a zero frequency.
    pub fn period(&self) -> Option<Tick> {
        if self.0 == 0 {
            None
        } else {
            Some((TICKS_PER_SECOND / self.0).max(1))
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (number, unit) = split_unit(s);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("`{}` is not a frequency", s))?;
        let multiplier = match unit {
            "" | "Hz" => 1.0,
            "kHz" | "KHz" => 1e3,
            "MHz" => 1e6,
            "GHz" => 1e9,
            other => return Err(format!("unknown frequency unit `{}`", other)),
        };
        let hz = value * multiplier;
        if !hz.is_finite() || hz < 0.0 {
            return Err(format!("`{}` is not a valid frequency", s));
        }
        Ok(Frequency(hz.round() as u64))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hz = self.0;
        if hz != 0 && hz % 1_000_000_000 == 0 {
            write!(f, "{}GHz", hz / 1_000_000_000)
        } else if hz != 0 && hz % 1_000_000 == 0 {
            write!(f, "{}MHz", hz / 1_000_000)
        } else {
            write!(f, "{}Hz", hz)
        }
    }
}

/// Parses an address range written as a size (`"512MB"`, meaning
/// `[0, 512MB)`) or as `"start:end"` with sizes or hex on both sides.
pub fn parse_addr_range(s: &str) -> Result<AddrRange, String> {
    match s.split_once(':') {
        Some((start, end)) => {
            let start = parse_address(start.trim())?;
            let end = parse_address(end.trim())?;
            Ok(AddrRange::new(start, end))
        }
        None => Ok(AddrRange::with_size(parse_address(s.trim())?)),
    }
}

fn parse_address(s: &str) -> Result<u64, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(&hex.replace('_', ""), 16)
            .map_err(|_| format!("`{}` is not a hex address", s))
    } else {
        s.parse::<ByteSize>().map(|b| b.0)
    }
}

/// Splits `"32kB"` into `("32", "kB")`.
fn split_unit(s: &str) -> (&str, &str) {
    let s = s.trim();
    let idx = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(s.len());
    (s[..idx].trim(), s[idx..].trim())
}

/// A typed parameter value held by a component descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    /// Plain signed integer (counts such as MSHRs or ways)
    Int(i64),
    /// Latency in clock cycles; signed so that negative input can be rejected
    Cycles(i64),
    /// Size in bytes
    Size(ByteSize),
    /// Clock frequency
    Frequency(Frequency),
    /// Physical address range
    Range(AddrRange),
    /// Boolean switch
    Bool(bool),
    /// Free-form text (model names, presets)
    Text(String),
}

impl ParamValue {
    /// Returns the integer payload of `Int` and `Cycles` values.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) | ParamValue::Cycles(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the size payload.
    pub fn as_size(&self) -> Option<ByteSize> {
        match self {
            ParamValue::Size(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the frequency payload.
    pub fn as_frequency(&self) -> Option<Frequency> {
        match self {
            ParamValue::Frequency(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the range payload.
    pub fn as_range(&self) -> Option<AddrRange> {
        match self {
            ParamValue::Range(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Cycles(v) => write!(f, "{} cycles", v),
            ParamValue::Size(v) => write!(f, "{}", v),
            ParamValue::Frequency(v) => write!(f, "{}", v),
            ParamValue::Range(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_byte_sizes() {
        assert_eq!("32kB".parse::<ByteSize>(), Ok(ByteSize::kib(32)));
        assert_eq!("512MB".parse::<ByteSize>(), Ok(ByteSize::mib(512)));
        assert_eq!("64".parse::<ByteSize>(), Ok(ByteSize(64)));
        assert_eq!("1 GiB".parse::<ByteSize>(), Ok(ByteSize::gib(1)));
        assert!("12parsecs".parse::<ByteSize>().is_err());
        assert!("kB".parse::<ByteSize>().is_err());
    }

    #[test]
    fn test_parse_frequency() {
        assert_eq!("1GHz".parse::<Frequency>(), Ok(Frequency::ghz(1)));
        assert_eq!("2.5GHz".parse::<Frequency>(), Ok(Frequency(2_500_000_000)));
        assert_eq!("800MHz".parse::<Frequency>(), Ok(Frequency::mhz(800)));
        assert!("fast".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_frequency_period() {
        assert_eq!(Frequency::ghz(1).period(), Some(1000));
        assert_eq!(Frequency::mhz(500).period(), Some(2000));
        assert_eq!(Frequency(0).period(), None);
    }

    #[test]
    fn test_parse_addr_range() {
        assert_eq!(
            parse_addr_range("512MB"),
            Ok(AddrRange::new(0, 512 * 1024 * 1024))
        );
        assert_eq!(
            parse_addr_range("256MB:512MB"),
            Ok(AddrRange::new(256 << 20, 512 << 20))
        );
        assert_eq!(
            parse_addr_range("0x0:0x1000"),
            Ok(AddrRange::new(0, 0x1000))
        );
    }

    #[test]
    fn test_display_units() {
        assert_eq!(ByteSize::kib(32).to_string(), "32kB");
        assert_eq!(ByteSize::mib(512).to_string(), "512MB");
        assert_eq!(Frequency::ghz(1).to_string(), "1GHz");
        assert_eq!(ParamValue::Cycles(2).to_string(), "2 cycles");
    }
}

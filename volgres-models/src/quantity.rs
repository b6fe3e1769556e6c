//! Byte-quantity parsing and formatting ("1Gi", "500Gi", "20%")

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;
pub const TIB: u64 = 1024 * GIB;
pub const PIB: u64 = 1024 * TIB;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity string")]
    Empty,
    #[error("invalid quantity '{0}': expected a number with an optional Ki/Mi/Gi/Ti/Pi suffix")]
    Invalid(String),
    #[error("quantity '{0}' overflows 64 bits")]
    Overflow(String),
    #[error("invalid percentage '{0}'")]
    InvalidPercent(String),
}

/// Parse a byte quantity like "10", "512Mi", "2Gi", "10Ti".
///
/// Only binary (power-of-two) suffixes are accepted, matching the
/// Kubernetes quantities we read back from PVC specs.
pub fn parse_bytes(s: &str) -> Result<u64, QuantityError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(QuantityError::Empty);
    }

    let (number, multiplier) = match s.find(|c: char| !c.is_ascii_digit()) {
        None => (s, 1u64),
        Some(idx) => {
            let (num, suffix) = s.split_at(idx);
            let mult = match suffix {
                "Ki" => KIB,
                "Mi" => MIB,
                "Gi" => GIB,
                "Ti" => TIB,
                "Pi" => PIB,
                _ => return Err(QuantityError::Invalid(s.to_string())),
            };
            (num, mult)
        }
    };

    let value: u64 = number
        .parse()
        .map_err(|_| QuantityError::Invalid(s.to_string()))?;

    value
        .checked_mul(multiplier)
        .ok_or_else(|| QuantityError::Overflow(s.to_string()))
}

/// Format a byte count with the largest binary suffix that divides it
/// exactly, falling back to a plain byte count.
pub fn format_bytes(n: u64) -> String {
    for (unit, suffix) in [(PIB, "Pi"), (TIB, "Ti"), (GIB, "Gi"), (MIB, "Mi"), (KIB, "Ki")] {
        if n >= unit && n % unit == 0 {
            return format!("{}{}", n / unit, suffix);
        }
    }
    n.to_string()
}

/// A resize step: either a percentage of the current volume size or an
/// absolute byte quantity. Serialized as the human form ("20%" / "1Gi").
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResizeStep {
    Percent(f64),
    Absolute(u64),
}

impl ResizeStep {
    pub fn parse(s: &str) -> Result<Self, QuantityError> {
        let s = s.trim();
        if let Some(pct) = s.strip_suffix('%') {
            let value: f64 = pct
                .trim()
                .parse()
                .map_err(|_| QuantityError::InvalidPercent(s.to_string()))?;
            if !value.is_finite() || value < 0.0 {
                return Err(QuantityError::InvalidPercent(s.to_string()));
            }
            return Ok(ResizeStep::Percent(value));
        }
        Ok(ResizeStep::Absolute(parse_bytes(s)?))
    }

    /// True for a step that would never grow the volume; rejected at
    /// admission time rather than silently replaced with a default.
    pub fn is_zero(&self) -> bool {
        match self {
            ResizeStep::Percent(p) => *p == 0.0,
            ResizeStep::Absolute(b) => *b == 0,
        }
    }
}

impl std::fmt::Display for ResizeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResizeStep::Percent(p) => write!(f, "{}%", p),
            ResizeStep::Absolute(b) => write!(f, "{}", format_bytes(*b)),
        }
    }
}

impl Serialize for ResizeStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ResizeStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ResizeStep::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Option<u64>` byte fields declared as quantity
/// strings.
pub mod opt_bytes {
    use super::{format_bytes, parse_bytes};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&format_bytes(*v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => parse_bytes(&s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_bytes() {
        assert_eq!(parse_bytes("0"), Ok(0));
        assert_eq!(parse_bytes("1048576"), Ok(MIB));
    }

    #[test]
    fn test_parse_suffixed() {
        assert_eq!(parse_bytes("2Gi"), Ok(2 * GIB));
        assert_eq!(parse_bytes("500Gi"), Ok(500 * GIB));
        assert_eq!(parse_bytes("10Ti"), Ok(10 * TIB));
        assert_eq!(parse_bytes("1Pi"), Ok(PIB));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_bytes("").is_err());
        assert!(parse_bytes("10G").is_err());
        assert!(parse_bytes("Gi").is_err());
        assert!(parse_bytes("-1Gi").is_err());
        assert!(parse_bytes("10MB").is_err());
    }

    #[test]
    fn test_parse_overflow() {
        assert_eq!(
            parse_bytes("99999999Pi"),
            Err(QuantityError::Overflow("99999999Pi".to_string()))
        );
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(3 * GIB), "3Gi");
        assert_eq!(format_bytes(10 * TIB + 500 * GIB), "10740Gi");
        assert_eq!(format_bytes(1500), "1500");
        assert_eq!(format_bytes(0), "0");
    }

    #[test]
    fn test_resize_step_parse() {
        assert_eq!(ResizeStep::parse("20%"), Ok(ResizeStep::Percent(20.0)));
        assert_eq!(ResizeStep::parse("1Gi"), Ok(ResizeStep::Absolute(GIB)));
        assert!(ResizeStep::parse("twenty%").is_err());
        assert!(ResizeStep::parse("-5%").is_err());
    }

    #[test]
    fn test_resize_step_zero() {
        assert!(ResizeStep::Percent(0.0).is_zero());
        assert!(ResizeStep::Absolute(0).is_zero());
        assert!(!ResizeStep::Percent(20.0).is_zero());
    }

    #[test]
    fn test_resize_step_serde_round_trip() {
        let step = ResizeStep::parse("20%").unwrap();
        let json = serde_json::to_string(&step).unwrap();
        assert_eq!(json, "\"20%\"");
        let parsed: ResizeStep = serde_json::from_str(&json).unwrap();
        assert_eq!(step, parsed);

        let step = ResizeStep::parse("500Gi").unwrap();
        let json = serde_json::to_string(&step).unwrap();
        assert_eq!(json, "\"500Gi\"");
        let parsed: ResizeStep = serde_json::from_str(&json).unwrap();
        assert_eq!(step, parsed);
    }
}

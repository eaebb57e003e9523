//! Linear unit conversion.

use std::{convert::Infallible, fmt, str::FromStr};

pub const METERS_PER_FOOT: f64 = 0.3048;

/// Vertical units of a raster surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ZUnits {
    Meters,
    Feet,
    /// An explicit multiplier to meters.
    Factor(f64),
    /// Unknown units, values are kept as-is.
    #[default]
    Other,
}

impl ZUnits {
    /// Returns the multiplier that converts these units to meters, or
    /// `None` when values should be left untouched.
    pub fn to_meters(self) -> Option<f64> {
        match self {
            Self::Meters => Some(1.0),
            Self::Feet => Some(METERS_PER_FOOT),
            Self::Factor(factor) => Some(factor),
            Self::Other => None,
        }
    }
}

impl FromStr for ZUnits {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Infallible> {
        let s = s.trim();
        if let Ok(factor) = s.parse::<f64>() {
            return Ok(Self::Factor(factor));
        }
        Ok(match s.to_ascii_lowercase().as_str() {
            "meters" | "meter" | "m" => Self::Meters,
            "feet" | "foot" | "ft" => Self::Feet,
            _ => Self::Other,
        })
    }
}

impl fmt::Display for ZUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Meters => f.write_str("Meters"),
            Self::Feet => f.write_str("Feet"),
            Self::Factor(factor) => write!(f, "{factor}"),
            Self::Other => f.write_str("Other"),
        }
    }
}

//! Fixed-point monetary amounts scaled by 10^18.
//!
//! All comparisons that affect bucketing happen on the raw integer. Floating
//! point is only used for the display percentage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ViewError;

pub const DECIMALS: usize = 18;
const SCALE: u128 = 1_000_000_000_000_000_000;

/// An amount in the ledger's smallest unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wei(pub u128);

impl Wei {
    pub const ZERO: Wei = Wei(0);

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parse a human-entered ether amount such as `"1.5"` or `"0.001"`.
    pub fn parse_ether(input: &str) -> Result<Wei, ViewError> {
        let input = input.trim();
        let invalid = |why: &str| ViewError::InvalidAmount(format!("{input:?}: {why}"));

        if input.is_empty() {
            return Err(invalid("empty"));
        }
        let (whole, frac) = match input.split_once('.') {
            Some((w, f)) => (w, f),
            None => (input, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("no digits"));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid("not a decimal number"));
        }
        if frac.len() > DECIMALS {
            return Err(invalid("more than 18 fractional digits"));
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("too large"))?
        };
        let frac_scaled: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = DECIMALS);
            padded.parse().map_err(|_| invalid("not a decimal number"))?
        };

        whole
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(frac_scaled))
            .map(Wei)
            .ok_or_else(|| invalid("too large"))
    }

    /// Render as ether: whole amounts keep a single `.0`, fractions drop
    /// trailing zeros.
    pub fn format_ether(&self) -> String {
        let whole = self.0 / SCALE;
        let frac = self.0 % SCALE;
        if frac == 0 {
            return format!("{whole}.0");
        }
        let frac = format!("{frac:0>width$}", width = DECIMALS);
        format!("{whole}.{}", frac.trim_end_matches('0'))
    }

    /// Lossy conversion for display maths.
    pub fn as_ether_f64(&self) -> f64 {
        self.0 as f64 / SCALE as f64
    }
}

/// Share of the goal raised, in percent. A zero goal counts as fully funded.
pub fn progress_percent(raised: Wei, goal: Wei) -> f64 {
    if goal.is_zero() {
        return 100.0;
    }
    raised.as_ether_f64() / goal.as_ether_f64() * 100.0
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Wei {
    type Err = ViewError;

    /// Parse a decimal string of wei (the wire format), not ether.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u128>()
            .map(Wei)
            .map_err(|e| ViewError::InvalidAmount(format!("{s:?}: {e}")))
    }
}

// Wei travels as a decimal string; u128 does not fit a JSON number.
impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(Wei(n as u128)),
        }
    }
}

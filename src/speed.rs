//! Typing speed presets.
//!
//! A speed is either one of four named presets or a raw delay in
//! milliseconds. Both resolve through [`Speed::base_delay`], so a numeric
//! override simply skips the preset table.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::TypeAssistError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Speed {
    /// 300ms, roughly 20 WPM.
    Slow,
    #[default]
    Normal,
    Fast,
    Instant,
    Millis(u64),
}

impl Speed {
    pub fn base_delay_ms(self) -> u64 {
        match self {
            Speed::Slow => 300,
            Speed::Normal => 60,
            Speed::Fast => 25,
            Speed::Instant => 5,
            Speed::Millis(ms) => ms,
        }
    }

    pub fn base_delay(self) -> Duration {
        Duration::from_millis(self.base_delay_ms())
    }
}

impl FromStr for Speed {
    type Err = TypeAssistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        match value.as_str() {
            "slow" => Ok(Speed::Slow),
            "normal" => Ok(Speed::Normal),
            "fast" => Ok(Speed::Fast),
            "instant" => Ok(Speed::Instant),
            "" => Err(TypeAssistError::invalid_speed(s, "empty speed")),
            other => other.parse::<u64>().map(Speed::Millis).map_err(|_| {
                TypeAssistError::invalid_speed(
                    s,
                    "expected slow, normal, fast, instant or a number of milliseconds",
                )
            }),
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speed::Slow => f.write_str("slow"),
            Speed::Normal => f.write_str("normal"),
            Speed::Fast => f.write_str("fast"),
            Speed::Instant => f.write_str("instant"),
            Speed::Millis(ms) => write!(f, "{}", ms),
        }
    }
}

impl Serialize for Speed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Speed::Millis(ms) => serializer.serialize_u64(*ms),
            preset => serializer.collect_str(preset),
        }
    }
}

impl<'de> Deserialize<'de> for Speed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Millis(u64),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Millis(ms) => Ok(Speed::Millis(ms)),
            Repr::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

//! Configuration helpers shared by every ferry binary.

pub mod vars;

use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::session::DEFAULT_REQUEST_TIMEOUT_SECS;

pub use vars::{interpolate, interpolate_with};

/// Per-request timeout.
///
/// Accepts an integer, a float, or a numeric string. Zero, an empty string
/// and a missing value all mean the default of 300 seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestTimeout(Duration);

impl RequestTimeout {
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs > 0.0 && secs.is_finite() {
            Self(Duration::from_secs_f64(secs))
        } else {
            Self::default()
        }
    }

    /// Parse the textual form. Blank and zero map to the default.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        trimmed
            .parse::<f64>()
            .map(Self::from_secs_f64)
            .map_err(|_| format!("invalid request_timeout '{raw}'"))
    }

    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl Default for RequestTimeout {
    fn default() -> Self {
        Self(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }
}

impl Serialize for RequestTimeout {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for RequestTimeout {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimeoutVisitor;

        impl Visitor<'_> for TimeoutVisitor {
            type Value = RequestTimeout;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a number of seconds or a numeric string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(RequestTimeout::from_secs_f64(v as f64))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(RequestTimeout::from_secs_f64(v as f64))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(RequestTimeout::from_secs_f64(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                RequestTimeout::parse(v).map_err(E::custom)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(RequestTimeout::default())
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(RequestTimeout::default())
            }
        }

        deserializer.deserialize_any(TimeoutVisitor)
    }
}

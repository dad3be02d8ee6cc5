use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::PidError;

pub const PID_PREFIX: &str = "uuid:";

/// Identifier of a digital object in a Kramerius repository.
///
/// The external form is `uuid:<UUID>`. Parsing rejects anything else before
/// any network interaction happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(Uuid);

impl Pid {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl FromStr for Pid {
    type Err = PidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .strip_prefix(PID_PREFIX)
            .ok_or_else(|| PidError::MissingPrefix {
                value: s.to_string(),
            })?;

        let uuid = Uuid::parse_str(raw).map_err(|source| PidError::InvalidUuid {
            value: s.to_string(),
            source,
        })?;

        Ok(Self(uuid))
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PID_PREFIX, self.0)
    }
}

impl Serialize for Pid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(de::Error::custom)
    }
}

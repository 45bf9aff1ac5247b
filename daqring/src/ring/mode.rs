use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::RingError;

/// Role a handle plays on a ring. Fixed for the handle's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientMode {
    /// Owns the producer slot and may `put`
    Producer,
    /// Owns one consumer slot and may `get`/`peek`/`skip`
    Consumer,
    /// Owns no slot; may inspect and force-release
    Manager,
}

impl ClientMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
            Self::Manager => "manager",
        }
    }
}

impl fmt::Display for ClientMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u32> for ClientMode {
    type Error = RingError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Producer),
            1 => Ok(Self::Consumer),
            2 => Ok(Self::Manager),
            other => Err(RingError::InvalidMode { value: other.to_string() }),
        }
    }
}

impl FromStr for ClientMode {
    type Err = RingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "producer" => Ok(Self::Producer),
            "consumer" => Ok(Self::Consumer),
            "manager" => Ok(Self::Manager),
            _ => Err(RingError::InvalidMode { value: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!("producer".parse::<ClientMode>().unwrap(), ClientMode::Producer);
        assert_eq!("Consumer".parse::<ClientMode>().unwrap(), ClientMode::Consumer);
        assert_eq!(ClientMode::try_from(2).unwrap(), ClientMode::Manager);
    }

    #[test]
    fn test_invalid_modes() {
        assert!(matches!("reader".parse::<ClientMode>(), Err(RingError::InvalidMode { .. })));
        let err = ClientMode::try_from(7).unwrap_err();
        assert!(err.is_state_error());
    }

    #[test]
    fn test_display_round_trips() {
        for mode in [ClientMode::Producer, ClientMode::Consumer, ClientMode::Manager] {
            assert_eq!(mode.to_string().parse::<ClientMode>().unwrap(), mode);
        }
    }
}

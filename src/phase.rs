use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::Error;

/// A named stage of per-record or per-key processing.
///
/// Phases carry no successor relation; the runner decides what follows what.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Map,
    Combine,
    Reduce,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Map, Phase::Combine, Phase::Reduce];

    pub fn ordinal(self) -> u8 {
        match self {
            Phase::Map => 0,
            Phase::Combine => 1,
            Phase::Reduce => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Map => "map",
            Phase::Combine => "combine",
            Phase::Reduce => "reduce",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Phase {
    type Error = Error;

    fn try_from(ordinal: u8) -> Result<Self, Self::Error> {
        match ordinal {
            0 => Ok(Phase::Map),
            1 => Ok(Phase::Combine),
            2 => Ok(Phase::Reduce),
            other => Err(Error::InvalidPhase(other)),
        }
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "" => Err(Error::MissingPhase),
            "map" => Ok(Phase::Map),
            "combine" => Ok(Phase::Combine),
            "reduce" => Ok(Phase::Reduce),
            other => Err(Error::UnknownPhase(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names() {
        for phase in Phase::ALL {
            assert_eq!(phase.name().parse::<Phase>().unwrap(), phase);
        }
    }

    #[test]
    fn empty_name_is_missing() {
        let err = "".parse::<Phase>().unwrap_err();
        assert!(matches!(err, Error::MissingPhase));
        assert_eq!(err.to_string(), "missing phase");
    }

    #[test]
    fn unknown_name_is_reported() {
        let err = "rock it".parse::<Phase>().unwrap_err();
        assert_eq!(err.to_string(), "unknown phase rock it");
    }

    #[test]
    fn ordinal_past_reduce_is_invalid() {
        assert_eq!(Phase::try_from(1).unwrap(), Phase::Combine);
        let err = Phase::try_from(66).unwrap_err();
        assert_eq!(err.to_string(), "invalid phase 66");
    }
}

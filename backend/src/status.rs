use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const STATUS_PARTICIPANTE: &str = "Participante";
pub const STATUS_NAO_PARTICIPANTE: &str = "Não participante";

pub const POINTS_PER_LEVEL: i32 = 100;

pub fn is_participant(status: &str) -> bool {
    status.trim() == STATUS_PARTICIPANTE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationStatus {
    Valid,
    Pending,
    Started,
}

impl ValidationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid validation status: {0}")]
pub struct InvalidStatus(pub String);

impl FromStr for ValidationStatus {
    type Err = InvalidStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "VALID" => Ok(Self::Valid),
            "PENDING" => Ok(Self::Pending),
            "STARTED" => Ok(Self::Started),
            _ => Err(InvalidStatus(raw.to_string())),
        }
    }
}

impl TryFrom<String> for ValidationStatus {
    type Error = InvalidStatus;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<ValidationStatus> for String {
    fn from(status: ValidationStatus) -> Self {
        status.as_str().to_string()
    }
}

impl Serialize for ValidationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ValidationStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Progress level of a municipality.
///
/// Non-participants are always `NonParticipant`. Participants sit at level 0
/// with no points and at level k for points in `[(k-1)*100+1, k*100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    NonParticipant,
    Rank(u32),
}

impl Level {
    pub fn derive(status: &str, points: i32) -> Self {
        if !is_participant(status) {
            return Self::NonParticipant;
        }
        Self::Rank(rank_for_points(points))
    }

    /// Inclusive point range covered by the level, `None` for non-participants.
    pub fn point_range(self) -> Option<(i32, i32)> {
        match self {
            Self::NonParticipant => None,
            Self::Rank(0) => Some((0, 0)),
            Self::Rank(k) => {
                let k = k as i32;
                Some(((k - 1) * POINTS_PER_LEVEL + 1, k * POINTS_PER_LEVEL))
            }
        }
    }
}

pub fn rank_for_points(points: i32) -> u32 {
    if points <= 0 {
        0
    } else {
        ((points - 1) / POINTS_PER_LEVEL + 1) as u32
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::NonParticipant => serializer.serialize_str("NP"),
            Self::Rank(k) => serializer.serialize_u32(*k),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_case_insensitively() {
        assert_eq!("valid".parse::<ValidationStatus>().unwrap(), ValidationStatus::Valid);
        assert_eq!(" PENDING ".parse::<ValidationStatus>().unwrap(), ValidationStatus::Pending);
        assert!("DONE".parse::<ValidationStatus>().is_err());
    }

    #[test]
    fn non_participant_is_np_regardless_of_points() {
        assert_eq!(Level::derive(STATUS_NAO_PARTICIPANTE, 0), Level::NonParticipant);
        assert_eq!(Level::derive(STATUS_NAO_PARTICIPANTE, 450), Level::NonParticipant);
        assert_eq!(Level::derive("", 10), Level::NonParticipant);
    }

    #[test]
    fn participant_levels_follow_hundreds() {
        assert_eq!(Level::derive(STATUS_PARTICIPANTE, 0), Level::Rank(0));
        assert_eq!(Level::derive(STATUS_PARTICIPANTE, 1), Level::Rank(1));
        assert_eq!(Level::derive(STATUS_PARTICIPANTE, 100), Level::Rank(1));
        assert_eq!(Level::derive(STATUS_PARTICIPANTE, 101), Level::Rank(2));
        assert_eq!(Level::derive(STATUS_PARTICIPANTE, 150), Level::Rank(2));
        assert_eq!(Level::derive(STATUS_PARTICIPANTE, 110), Level::Rank(2));
    }

    #[test]
    fn level_ranges() {
        assert_eq!(Level::Rank(0).point_range(), Some((0, 0)));
        assert_eq!(Level::Rank(2).point_range(), Some((101, 200)));
        assert_eq!(Level::NonParticipant.point_range(), None);
    }

    #[test]
    fn level_serializes_np_as_string() {
        assert_eq!(serde_json::to_string(&Level::NonParticipant).unwrap(), "\"NP\"");
        assert_eq!(serde_json::to_string(&Level::Rank(3)).unwrap(), "3");
    }
}

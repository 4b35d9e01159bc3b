//! Source identity and session classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Simulator titles the capture core can read from.
///
/// The declaration order is the probe priority used when no source is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTitle {
    /// Assetto Corsa, shared memory (`acpmf_physics` / `acpmf_graphics`).
    #[serde(rename = "assetto_corsa")]
    AssettoCorsa,
    /// Assetto Corsa Competizione, UDP broadcasting protocol v4.
    #[serde(rename = "assetto_corsa_competizione")]
    AssettoCorsaCompetizione,
    /// Le Mans Ultimate, rFactor 2 shared memory plugin layout.
    #[serde(rename = "le_mans_ultimate")]
    LeMansUltimate,
}

impl SourceTitle {
    /// All titles in probe priority order.
    pub const PRIORITY: [SourceTitle; 3] = [
        SourceTitle::AssettoCorsa,
        SourceTitle::AssettoCorsaCompetizione,
        SourceTitle::LeMansUltimate,
    ];

    /// Stable identifier used on the wire and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTitle::AssettoCorsa => "assetto_corsa",
            SourceTitle::AssettoCorsaCompetizione => "assetto_corsa_competizione",
            SourceTitle::LeMansUltimate => "le_mans_ultimate",
        }
    }

    /// Short alias accepted on the command line.
    pub fn short_name(&self) -> &'static str {
        match self {
            SourceTitle::AssettoCorsa => "ac",
            SourceTitle::AssettoCorsaCompetizione => "acc",
            SourceTitle::LeMansUltimate => "lmu",
        }
    }

    /// Parse either the stable identifier or the short alias.
    pub fn from_name(name: &str) -> Option<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        Self::PRIORITY
            .into_iter()
            .find(|title| title.as_str() == lowered || title.short_name() == lowered)
    }
}

impl fmt::Display for SourceTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session classification shared by all titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    #[default]
    Unknown,
    TestDay,
    Practice,
    Qualifying,
    Superpole,
    Warmup,
    Race,
    Hotlap,
    Hotstint,
    HotlapSuperpole,
    TimeAttack,
    Drift,
    Drag,
    Replay,
}

impl SessionType {
    /// Assetto Corsa `AC_SESSION_TYPE`.
    pub fn from_ac(raw: i32) -> Self {
        match raw {
            0 => SessionType::Practice,
            1 => SessionType::Qualifying,
            2 => SessionType::Race,
            3 => SessionType::Hotlap,
            4 => SessionType::TimeAttack,
            5 => SessionType::Drift,
            6 => SessionType::Drag,
            _ => SessionType::Unknown,
        }
    }

    /// ACC broadcasting `RaceSessionType`.
    pub fn from_acc(raw: u8) -> Self {
        match raw {
            0 => SessionType::Practice,
            4 => SessionType::Qualifying,
            9 => SessionType::Superpole,
            10 => SessionType::Race,
            11 => SessionType::Hotlap,
            12 => SessionType::Hotstint,
            13 => SessionType::HotlapSuperpole,
            14 => SessionType::Replay,
            _ => SessionType::Unknown,
        }
    }

    /// rFactor 2 `mSession`: 0 test day, 1-4 practice, 5-8 qualifying, 9 warmup, 10-13 race.
    pub fn from_rfactor(raw: i32) -> Self {
        match raw {
            0 => SessionType::TestDay,
            1..=4 => SessionType::Practice,
            5..=8 => SessionType::Qualifying,
            9 => SessionType::Warmup,
            10..=13 => SessionType::Race,
            _ => SessionType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Unknown => "unknown",
            SessionType::TestDay => "test_day",
            SessionType::Practice => "practice",
            SessionType::Qualifying => "qualifying",
            SessionType::Superpole => "superpole",
            SessionType::Warmup => "warmup",
            SessionType::Race => "race",
            SessionType::Hotlap => "hotlap",
            SessionType::Hotstint => "hotstint",
            SessionType::HotlapSuperpole => "hotlap_superpole",
            SessionType::TimeAttack => "time_attack",
            SessionType::Drift => "drift",
            SessionType::Drag => "drag",
            SessionType::Replay => "replay",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_priority_order_is_ac_acc_lmu() -> TestResult {
        assert_eq!(
            SourceTitle::PRIORITY,
            [
                SourceTitle::AssettoCorsa,
                SourceTitle::AssettoCorsaCompetizione,
                SourceTitle::LeMansUltimate
            ]
        );
        Ok(())
    }

    #[test]
    fn test_from_name_accepts_aliases() -> TestResult {
        assert_eq!(SourceTitle::from_name("ac"), Some(SourceTitle::AssettoCorsa));
        assert_eq!(
            SourceTitle::from_name("Le_Mans_Ultimate"),
            Some(SourceTitle::LeMansUltimate)
        );
        assert_eq!(
            SourceTitle::from_name(" acc "),
            Some(SourceTitle::AssettoCorsaCompetizione)
        );
        assert_eq!(SourceTitle::from_name("iracing"), None);
        Ok(())
    }

    #[test]
    fn test_title_serializes_as_game_id() -> TestResult {
        let json = serde_json::to_string(&SourceTitle::LeMansUltimate)?;
        assert_eq!(json, "\"le_mans_ultimate\"");
        Ok(())
    }

    #[test]
    fn test_session_type_mappings() -> TestResult {
        assert_eq!(SessionType::from_ac(2), SessionType::Race);
        assert_eq!(SessionType::from_ac(-1), SessionType::Unknown);
        assert_eq!(SessionType::from_acc(10), SessionType::Race);
        assert_eq!(SessionType::from_acc(4), SessionType::Qualifying);
        assert_eq!(SessionType::from_rfactor(7), SessionType::Qualifying);
        assert_eq!(SessionType::from_rfactor(12), SessionType::Race);
        assert_eq!(SessionType::from_rfactor(99), SessionType::Unknown);
        Ok(())
    }
}

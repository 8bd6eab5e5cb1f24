//! Blind levels and schedules.
//!
//! The ordered level list is owned by the external game store; the core
//! receives it read-only and never persists levels itself.

use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Opaque game identifier handed in by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One tournament stage with fixed blinds/ante/duration.
///
/// A break level carries no blind values and never triggers the
/// new-blind alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindLevel {
    pub level: u32,
    pub small_blind: u64,
    pub big_blind: u64,
    #[serde(default)]
    pub ante: u64,
    /// Duration in minutes.
    pub duration_min: u64,
    #[serde(default)]
    pub is_break: bool,
}

impl BlindLevel {
    /// Level duration in seconds.
    ///
    /// Saturating to keep pathological durations from overflowing.
    pub fn duration_secs(&self) -> u64 {
        self.duration_min.saturating_mul(60)
    }
}

/// Ordered, validated list of blind levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchedule")]
pub struct BlindSchedule {
    levels: Vec<BlindLevel>,
}

/// Serde shim so deserialized schedules go through `new` validation.
#[derive(Deserialize)]
struct RawSchedule {
    levels: Vec<BlindLevel>,
}

impl TryFrom<RawSchedule> for BlindSchedule {
    type Error = ScheduleError;

    fn try_from(raw: RawSchedule) -> Result<Self, Self::Error> {
        Self::new(raw.levels)
    }
}

impl BlindSchedule {
    /// Validate and wrap a level list.
    ///
    /// # Errors
    /// Rejects an empty list and any level with zero duration.
    pub fn new(levels: Vec<BlindLevel>) -> Result<Self, ScheduleError> {
        if levels.is_empty() {
            return Err(ScheduleError::Empty);
        }
        for (index, level) in levels.iter().enumerate() {
            if level.duration_min == 0 {
                return Err(ScheduleError::ZeroDuration { index });
            }
        }
        Ok(Self { levels })
    }

    /// Parse a TOML schedule file (the CLI's stand-in game store).
    ///
    /// # Errors
    /// Returns an error if the TOML is malformed or the level list is
    /// invalid.
    pub fn from_toml_str(s: &str) -> Result<Self, ScheduleError> {
        toml::from_str(s).map_err(|e| ScheduleError::ParseFailed(e.to_string()))
    }

    /// The standard 20-minute structure used for demos.
    pub fn standard() -> Self {
        let blinds: [(u64, u64, u64); 8] = [
            (25, 50, 0),
            (50, 100, 0),
            (75, 150, 0),
            (100, 200, 25),
            (150, 300, 25),
            (200, 400, 50),
            (300, 600, 75),
            (400, 800, 100),
        ];
        let mut levels = Vec::new();
        for (i, (small, big, ante)) in blinds.iter().enumerate() {
            levels.push(BlindLevel {
                level: (i + 1) as u32,
                small_blind: *small,
                big_blind: *big,
                ante: *ante,
                duration_min: 20,
                is_break: false,
            });
            // Break after the fourth level.
            if i == 3 {
                levels.push(BlindLevel {
                    level: (i + 2) as u32,
                    small_blind: 0,
                    big_blind: 0,
                    ante: 0,
                    duration_min: 10,
                    is_break: true,
                });
            }
        }
        // Renumber after the break insert.
        for (i, level) in levels.iter_mut().enumerate() {
            level.level = (i + 1) as u32;
        }
        Self { levels }
    }

    pub fn levels(&self) -> &[BlindLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BlindLevel> {
        self.levels.get(index)
    }

    pub fn last_index(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn total_duration_min(&self) -> u64 {
        self.levels.iter().map(|l| l.duration_min).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(duration_min: u64) -> BlindLevel {
        BlindLevel {
            level: 1,
            small_blind: 25,
            big_blind: 50,
            ante: 0,
            duration_min,
            is_break: false,
        }
    }

    #[test]
    fn rejects_empty_schedule() {
        assert!(matches!(
            BlindSchedule::new(vec![]),
            Err(ScheduleError::Empty)
        ));
    }

    #[test]
    fn rejects_zero_duration_level() {
        let err = BlindSchedule::new(vec![level(20), level(0)]).unwrap_err();
        assert!(matches!(err, ScheduleError::ZeroDuration { index: 1 }));
    }

    #[test]
    fn standard_schedule_has_one_break() {
        let s = BlindSchedule::standard();
        assert_eq!(s.levels().iter().filter(|l| l.is_break).count(), 1);
        assert_eq!(s.len(), 9);
    }

    #[test]
    fn toml_roundtrip_validates() {
        let toml_str = r#"
            [[levels]]
            level = 1
            small_blind = 25
            big_blind = 50
            duration_min = 15
        "#;
        let s = BlindSchedule::from_toml_str(toml_str).unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s.get(0).unwrap().duration_secs(), 900);
    }

    #[test]
    fn toml_with_zero_duration_is_rejected() {
        let toml_str = r#"
            [[levels]]
            level = 1
            small_blind = 25
            big_blind = 50
            duration_min = 0
        "#;
        assert!(BlindSchedule::from_toml_str(toml_str).is_err());
    }
}

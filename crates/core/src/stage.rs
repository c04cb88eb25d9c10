use std::{
    fmt,
    ops::{Index, IndexMut},
    str::FromStr,
};

use thiserror::Error;

/// A level in the ordered realization ladder.
///
/// Stages are totally ordered. A [`State`](crate::State) that is valid
/// through some stage is valid through every stage below it, and realizing a
/// stage requires every lower stage to be realized first.
///
/// [`Stage::Empty`] is a sentinel below all real stages. It means "nothing is
/// valid" and has no realize hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Stage {
    Empty = 0,
    Topology = 1,
    Model = 2,
    Instance = 3,
    Time = 4,
    Position = 5,
    Velocity = 6,
    Dynamics = 7,
    Acceleration = 8,
    Report = 9,
}

/// Error returned when parsing an unknown stage name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stage name: {0:?}")]
pub struct ParseStageError(String);

impl Stage {
    /// Number of stages, including [`Stage::Empty`].
    pub const COUNT: usize = 10;

    /// All stages in ascending order.
    pub const ALL: [Stage; Self::COUNT] = [
        Stage::Empty,
        Stage::Topology,
        Stage::Model,
        Stage::Instance,
        Stage::Time,
        Stage::Position,
        Stage::Velocity,
        Stage::Dynamics,
        Stage::Acceleration,
        Stage::Report,
    ];

    /// The lowest stage that has a realize hook.
    pub const LOWEST: Stage = Stage::Topology;

    /// The highest stage.
    pub const HIGHEST: Stage = Stage::Report;

    /// Returns the position of this stage in [`Stage::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the stage at `index`, if any.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the next higher stage, or `None` for [`Stage::Report`].
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    /// Returns the next lower stage, saturating at [`Stage::Empty`].
    #[must_use]
    pub fn prev(self) -> Self {
        match self.index().checked_sub(1) {
            Some(index) => Self::ALL[index],
            None => Stage::Empty,
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Stage::Empty => "Empty",
            Stage::Topology => "Topology",
            Stage::Model => "Model",
            Stage::Instance => "Instance",
            Stage::Time => "Time",
            Stage::Position => "Position",
            Stage::Velocity => "Velocity",
            Stage::Dynamics => "Dynamics",
            Stage::Acceleration => "Acceleration",
            Stage::Report => "Report",
        }
    }

    /// Iterates over the stages in `from..=to` in ascending order.
    ///
    /// The iterator is empty if `from > to`.
    pub fn range_inclusive(from: Stage, to: Stage) -> impl Iterator<Item = Stage> {
        Self::ALL
            .into_iter()
            .skip(from.index())
            .take_while(move |stage| *stage <= to)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStageError(s.to_string()))
    }
}

/// A fixed-size map with one slot per [`Stage`].
#[derive(Debug, Clone, PartialEq)]
pub struct StageMap<T> {
    slots: [T; Stage::COUNT],
}

impl<T> StageMap<T> {
    /// Creates a map by calling `init` once per stage, in ascending order.
    pub fn from_fn(mut init: impl FnMut(Stage) -> T) -> Self {
        Self {
            slots: std::array::from_fn(|index| init(Stage::ALL[index])),
        }
    }

    /// Iterates over `(stage, value)` pairs in ascending stage order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &T)> {
        Stage::ALL.into_iter().zip(self.slots.iter())
    }

    /// Iterates mutably over the slots for stages at or above `from`.
    pub fn iter_from_mut(&mut self, from: Stage) -> impl Iterator<Item = &mut T> {
        self.slots[from.index()..].iter_mut()
    }
}

impl<T: Default> Default for StageMap<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<Stage> for StageMap<T> {
    type Output = T;

    fn index(&self, stage: Stage) -> &T {
        &self.slots[stage.index()]
    }
}

impl<T> IndexMut<Stage> for StageMap<T> {
    fn index_mut(&mut self, stage: Stage) -> &mut T {
        &mut self.slots[stage.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_totally_ordered() {
        for pair in Stage::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].next(), Some(pair[1]));
            assert_eq!(pair[1].prev(), pair[0]);
        }
    }

    #[test]
    fn next_and_prev_saturate_at_the_ends() {
        assert_eq!(Stage::Report.next(), None);
        assert_eq!(Stage::Empty.prev(), Stage::Empty);
        assert_eq!(Stage::Topology.prev(), Stage::Empty);
    }

    #[test]
    fn index_round_trips() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_index(stage.index()), Some(stage));
        }
        assert_eq!(Stage::from_index(Stage::COUNT), None);
    }

    #[test]
    fn range_inclusive_is_ascending_and_bounded() {
        let stages: Vec<_> = Stage::range_inclusive(Stage::Time, Stage::Dynamics).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Time,
                Stage::Position,
                Stage::Velocity,
                Stage::Dynamics
            ]
        );

        assert_eq!(
            Stage::range_inclusive(Stage::Report, Stage::Report).count(),
            1
        );
        assert_eq!(
            Stage::range_inclusive(Stage::Velocity, Stage::Position).count(),
            0
        );
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("acceleration".parse::<Stage>(), Ok(Stage::Acceleration));
        assert_eq!("Report".parse::<Stage>(), Ok(Stage::Report));
        assert!("Velocityy".parse::<Stage>().is_err());
    }

    #[test]
    fn stage_map_indexes_by_stage() {
        let mut map = StageMap::from_fn(|stage| stage.index() * 10);
        assert_eq!(map[Stage::Model], 20);

        map[Stage::Model] = 7;
        assert_eq!(map[Stage::Model], 7);

        for slot in map.iter_from_mut(Stage::Dynamics) {
            *slot = 0;
        }
        assert_eq!(map[Stage::Velocity], 60);
        assert_eq!(map[Stage::Dynamics], 0);
        assert_eq!(map[Stage::Report], 0);
    }
}

/// A persisted snapshot of a [`State`](crate::State)'s variables.
///
/// Holds time plus every continuous and discrete variable. Cached results are
/// never part of a checkpoint; they are recomputed on the first realization
/// after [`State::restore`](crate::State::restore).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Checkpoint {
    pub time: f64,
    pub q: Vec<f64>,
    pub u: Vec<f64>,
    pub z: Vec<f64>,
    pub discrete: Vec<f64>,
}

use thiserror::Error;

use crate::{LayoutError, Stage, SubsystemError, SubsystemIndex};

/// Errors returned by [`System`](crate::System) operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("stage precondition violated while realizing {requested}: {reason}")]
    StagePrecondition {
        requested: Stage,
        reason: Precondition,
    },

    #[error("subsystem {index} ({name} {version}) failed to realize {stage}")]
    Subsystem {
        index: SubsystemIndex,
        name: String,
        version: String,
        stage: Stage,
        #[source]
        source: SubsystemError,
    },

    #[error("subsystem {index} ({name}) declared an invalid state layout")]
    Layout {
        index: SubsystemIndex,
        name: String,
        #[source]
        source: LayoutError,
    },

    #[error("no subsystem at index {0}")]
    UnknownSubsystem(SubsystemIndex),

    #[error("subsystem {index} is not a {expected}")]
    SubsystemType {
        index: SubsystemIndex,
        expected: &'static str,
    },

    #[error("stage generators cannot be registered for {0}")]
    GeneratorStage(Stage),
}

/// Why a realization request cannot be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("the system topology has never been realized")]
    TopologyNotRealized,

    #[error("the system topology changed since it was last realized")]
    TopologyStale,

    #[error("the state was created for a different topology")]
    StaleState,

    #[error("the state's Topology stage is not valid")]
    StateTopologyInvalid,
}

/// Control actions supported by the Merson integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop at the current step-attempt boundary and return.
    StopEarly,
}

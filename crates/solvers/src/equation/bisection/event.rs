/// Control actions supported by the bisection solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop and return the current bracket.
    StopEarly,
}

/// One midpoint evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Evaluation counter, starting at 1.
    pub iter: usize,
    pub x: f64,
    pub value: f64,
    /// Bracket after narrowing, in ascending order.
    pub bracket: [f64; 2],
}

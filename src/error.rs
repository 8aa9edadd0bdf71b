use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no octilinear path between the candidate sinks")]
    NoPath,

    #[error("router exhausted its backtracking budget")]
    InfeasibleLayout,

    #[error("ILP solver reported the problem infeasible")]
    NoSolution,

    #[error("ILP solver hit the time limit without an incumbent")]
    SolverTimeout,

    #[error("solver '{0}' is not available")]
    SolverUnavailable(String),
}

//! Crate-wide error type for the optimization pipeline.
//!
//! Every fallible public entry point returns a `Result<_, OptimizerError>`.
//! Candidate-tour evaluation never raises: invalid tours are scored with
//! the `f64::INFINITY` fitness sentinel instead (see `fitness.rs`).

use thiserror::Error;

/// Errors surfaced by the optimizer core.
///
/// Variants are grouped by the HTTP-style status class a caller embedding
/// this crate behind a web layer would map them to; the crate itself never
/// constructs an HTTP response.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Malformed request: empty destinations, blank address strings,
    /// negative weights. Rejected before any external call (400 class).
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// Fewer than two addresses resolved, or the batched matrix calls
    /// raised unrecoverable errors (500 class).
    #[error("distance/time matrix unavailable: {0}")]
    MatrixUnavailable(String),

    /// Neither the baseline nor the IAFSA engine produced a usable tour
    /// (500 class).
    #[error("no algorithm produced a usable tour: {0}")]
    AlgorithmFailed(String),

    /// The request's wall-clock deadline elapsed before any usable tour
    /// was produced. If a best-so-far tour existed it is returned instead
    /// of this error; see `orchestrator::optimize`.
    #[error("optimization deadline exceeded before a tour was found")]
    Deadline,

    /// The request was cancelled cooperatively before any usable tour was
    /// produced. If a best-so-far tour existed it is returned instead of
    /// this error.
    #[error("optimization cancelled")]
    Cancelled,

    /// The routing provider rejected or failed the call outright
    /// (credentials missing, network failure after retries, ...).
    #[error("routing provider error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, OptimizerError>;

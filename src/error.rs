use thiserror::Error;

/// Errors raised by construction, decomposition and evaluation APIs.
///
/// Numerical trouble encountered *during* stepping is never reported here:
/// the step functions return an [`Outcome`](crate::Outcome) value instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input: empty systems, size mismatches, bad tolerances,
    /// non-finite initial data, invalid left-hand sides.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An elementary function was applied to the wrong number of arguments.
    #[error("inconsistent number of arguments for {name} ({expected} expected, {found} provided)")]
    ArityMismatch {
        /// Display name of the offending function.
        name: &'static str,
        /// Required argument count.
        expected: usize,
        /// Provided argument count.
        found: usize,
    },

    /// A variable was not found in the evaluation environment.
    #[error("cannot evaluate: variable '{0}' is missing from the environment")]
    MissingVariable(String),

    /// A runtime parameter index exceeds the parameter array.
    #[error("parameter index {index} is out of range (parameter array has length {len})")]
    OutOfRangeParam {
        /// The requested index.
        index: u32,
        /// Length of the parameter array.
        len: usize,
    },

    /// An index or size computation overflowed.
    #[error("overflow: {0}")]
    Overflow(String),

    /// The requested operation is not supported for this expression.
    #[error("unsupported operation: {0}")]
    UnsupportedOp(String),
}

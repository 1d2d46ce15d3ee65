/// Error returned when a byte slice handed to a `from_hash`-style
/// constructor doesn't have the length the hash type requires.
#[derive(Copy, Clone, PartialEq, Eq, Debug, thiserror::Error)]
#[error("expected a hash of length {expected}, got {actual}")]
pub struct LengthError {
    pub expected: usize,
    pub actual: usize,
}

pub type LengthResult<T> = Result<T, LengthError>;

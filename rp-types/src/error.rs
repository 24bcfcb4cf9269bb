use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlaceError>;

/// Errors surfaced at the core's boundary.
///
/// Geometry trouble inside a phase (stripe spill, unplaceable block) is not an
/// error: phases return a success flag and the driver decides what to do.
#[derive(Error, Debug)]
pub enum PlaceError {
    /// Invalid configuration, reported at the boundary and aborting the run.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A data-model invariant does not hold; the input is corrupt.
    #[error("invariant violated in {location}: {message}")]
    Invariant {
        message: String,
        location: &'static str,
    },
}

impl PlaceError {
    pub fn invariant(message: impl Into<String>, location: &'static str) -> Self {
        PlaceError::Invariant {
            message: message.into(),
            location,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        PlaceError::Config(message.into())
    }
}

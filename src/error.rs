//! Error taxonomy shared by calibration and alignment.
//!
//! Configuration errors abort a run. Degenerate-geometry errors are raised to
//! the caller, which may fall back to less refined data (e.g. skip the grid
//! fit). Cancellation is not an error: stages return `Ok(None)`.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LfError {
    /// Unusable parameters, e.g. a patch size the measured pitch cannot carry.
    #[error("configuration error: {0}")]
    Config(String),

    /// Too few points, empty threshold windows, zero pitch and similar.
    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    /// Stored calibration metadata that cannot be interpreted.
    #[error("invalid calibration metadata {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LfError {
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::Degenerate(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Fatal errors abort the whole job; degenerate ones leave the choice to
    /// the caller.
    pub fn is_fatal(&self) -> bool {
        !self.is_degenerate()
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::Degenerate(_))
    }
}

pub type Result<T> = std::result::Result<T, LfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_is_not_fatal() {
        assert!(!LfError::degenerate("few points").is_fatal());
        assert!(LfError::config("patch").is_fatal());
        let io = LfError::from(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert!(io.is_fatal());
    }
}

//! Error Types for the Riegeli Container
//!
//! All operations in the workspace return `Result<T>` aliased to
//! `Result<T, Error>`, so `?` propagates errors across layers.
//!
//! ## Error Categories
//!
//! - `DataLoss`: a format or checksum violation in the file itself.
//!   This is the only recoverable kind: readers can skip past the
//!   damaged region and continue.
//! - `InvalidArgument`: caller misuse (seeking a non-seekable source,
//!   out-of-range positions, reading metadata mid-file).
//! - `Internal`: an invariant violation; always a bug in this library.
//! - `Unavailable`: the underlying byte source or destination failed.
//!   I/O errors convert automatically via `#[from]`.
//!
//! Messages name the offending position and construct, so a failure like
//! `data loss: invalid chunk header hash at 131072` can be mapped back to
//! the file.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Format or checksum violation; recoverable by skipping the damaged
    /// region.
    #[error("data loss: {0}")]
    DataLoss(String),

    /// Caller misuse; the operation was never attempted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Invariant violation inside this library.
    #[error("internal: {0}")]
    Internal(String),

    /// Failure of the underlying byte source or destination.
    #[error("unavailable: {0}")]
    Unavailable(#[from] std::io::Error),
}

impl Error {
    pub fn data_loss(message: impl Into<String>) -> Self {
        Error::DataLoss(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Whether a reader can recover from this error by skipping data.
    ///
    /// Only format-level damage is skippable; argument errors and source
    /// failures require the caller to intervene.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::DataLoss(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_loss_is_recoverable() {
        assert!(Error::data_loss("bad hash").is_recoverable());
    }

    #[test]
    fn test_other_kinds_not_recoverable() {
        assert!(!Error::invalid_argument("bad seek").is_recoverable());
        assert!(!Error::internal("oops").is_recoverable());
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        assert!(!Error::from(io).is_recoverable());
    }

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = Error::data_loss("invalid chunk header hash at 131072");
        let text = err.to_string();
        assert!(text.contains("data loss"));
        assert!(text.contains("131072"));
    }

    #[test]
    fn test_io_error_converts_to_unavailable() {
        fn read() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"))?;
            Ok(())
        }
        assert!(matches!(read(), Err(Error::Unavailable(_))));
    }
}

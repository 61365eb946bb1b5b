use std::io;
use thiserror::Error;

/// Errors returned by [`crate::FileSystem`] operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// The path does not exist, or it was rejected during resolution. The
    /// two cases are deliberately indistinguishable.
    #[error("file does not exist")]
    NotFound,
    /// Attempt to remove or rename the serving root.
    #[error("invalid operation on the serving root")]
    InvalidOperation,
    /// Error from the storage engine, unmodified.
    #[error(transparent)]
    Storage(#[from] io::Error),
}

impl FsError {
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound => true,
            FsError::Storage(err) => err.kind() == io::ErrorKind::NotFound,
            FsError::InvalidOperation => false,
        }
    }
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound => io::Error::new(io::ErrorKind::NotFound, err),
            FsError::InvalidOperation => io::Error::new(io::ErrorKind::InvalidInput, err),
            FsError::Storage(inner) => inner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_kinds() {
        assert_eq!(io::Error::from(FsError::NotFound).kind(), io::ErrorKind::NotFound);
        assert_eq!(
            io::Error::from(FsError::InvalidOperation).kind(),
            io::ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_storage_error_passes_through() {
        let original = io::Error::new(io::ErrorKind::AlreadyExists, "engine says exists");
        let back = io::Error::from(FsError::from(original));
        assert_eq!(back.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(back.to_string(), "engine says exists");
    }

    #[test]
    fn test_is_not_found() {
        assert!(FsError::NotFound.is_not_found());
        assert!(FsError::Storage(io::ErrorKind::NotFound.into()).is_not_found());
        assert!(!FsError::InvalidOperation.is_not_found());
        assert!(!FsError::Storage(io::ErrorKind::PermissionDenied.into()).is_not_found());
    }
}

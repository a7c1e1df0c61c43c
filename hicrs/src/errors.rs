use hicrs_core::CoreError;
use hicrs_io::StoreError;
use hicrs_stats::StatsError;
use thiserror::Error;

use crate::config::ConfigError;

///
/// Broad classification of [`HicError`]s.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller passed something invalid: a malformed query, bad pixels, an unknown name.
    Validation,
    /// The operation is not allowed in the current state of the object.
    State,
    /// The backend failed to read or write data.
    Io,
}

#[derive(Error, Debug)]
pub enum HicError {
    #[error(
        "unrecognized query span \"{0}\". Supported query spans are: upper_triangle, lower_triangle, and full"
    )]
    UnknownQuerySpan(String),

    #[error("invalid query {range1}; {range2}: {reason}")]
    InvalidQuery {
        range1: String,
        range2: String,
        reason: String,
    },

    #[error("diagonal_band_width cannot be negative")]
    NegativeBandWidth,

    #[error("found duplicated value {0} in the provided normalization name list")]
    DuplicateNormalization(String),

    #[error(
        "calculating statistics including zeros on files with bin tables other than \"fixed\" bin size is not supported"
    )]
    ZerosOnVariableBins,

    #[error("{0}")]
    InvalidChunk(String),

    #[error("failed to map {coords} to a valid pixel: {reason}")]
    UnmappablePixel { coords: String, reason: String },

    #[error("failed to process \"{column}\" values: {reason}")]
    InvalidColumn { column: String, reason: String },

    #[error("unable to open \"{path}\": {reason}")]
    UnsupportedFile { path: String, reason: String },

    #[error("unable to create file \"{0}\": file already exists")]
    FileExists(String),

    #[error("caught an attempt to access file \"{0}\", which has already been closed")]
    FileClosed(String),

    #[error("caught an attempt to add pixels to file \"{0}\", which has already been finalized")]
    AlreadyFinalized(String),

    #[error("finalize() was already called on file \"{0}\"")]
    FinalizeCalledTwice(String),

    #[error("file \"{0}\" is no longer usable: a previous call to finalize() failed")]
    Aborted(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HicError::FileClosed(_)
            | HicError::AlreadyFinalized(_)
            | HicError::FinalizeCalledTwice(_)
            | HicError::Aborted(_) => ErrorKind::State,
            HicError::Io(_) => ErrorKind::Io,
            HicError::Store(e) => match e {
                StoreError::Io(_)
                | StoreError::Corrupt { .. }
                | StoreError::UnsupportedVersion { .. }
                | StoreError::Json(_) => ErrorKind::Io,
                _ => ErrorKind::Validation,
            },
            _ => ErrorKind::Validation,
        }
    }
}

pub type Result<T> = std::result::Result<T, HicError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(HicError::FileClosed("test.cool".to_string()), ErrorKind::State)]
    #[case(HicError::FinalizeCalledTwice("test.cool".to_string()), ErrorKind::State)]
    #[case(HicError::NegativeBandWidth, ErrorKind::Validation)]
    #[case(HicError::Core(CoreError::LengthMismatch), ErrorKind::Validation)]
    #[case(HicError::Io(std::io::Error::other("boom")), ErrorKind::Io)]
    #[case(
        HicError::Store(StoreError::CellNotFound { path: "x.scool".to_string(), cell: "a".to_string() }),
        ErrorKind::Validation
    )]
    fn test_error_kinds(#[case] error: HicError, #[case] kind: ErrorKind) {
        assert_eq!(error.kind(), kind);
    }
}

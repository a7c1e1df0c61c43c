use hicrs_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("\"{path}\" is not a valid {format} file: {reason}")]
    Corrupt {
        path: String,
        format: &'static str,
        reason: String,
    },

    #[error("\"{path}\" uses {format} format version {version}, which is not supported")]
    UnsupportedVersion {
        path: String,
        format: &'static str,
        version: u32,
    },

    #[error(
        "unable to find resolution {resolution} in file \"{path}\". Available resolutions: {available}"
    )]
    ResolutionNotFound {
        path: String,
        resolution: u32,
        available: String,
    },

    #[error("unable to find cell \"{cell}\" in file \"{path}\"")]
    CellNotFound { path: String, cell: String },

    #[error("unable to find normalization \"{name}\" in file \"{path}\"")]
    NormalizationNotFound { path: String, name: String },

    #[error(
        "pixels should be unique and sorted by (bin1_id, bin2_id): found ({bin1_id}, {bin2_id}) after ({prev_bin1_id}, {prev_bin2_id})"
    )]
    UnsortedPixels {
        bin1_id: u64,
        bin2_id: u64,
        prev_bin1_id: u64,
        prev_bin2_id: u64,
    },

    #[error("pixel ({bin1_id}, {bin2_id}) does not map to a valid pair of bins: {reason}")]
    InvalidPixel {
        bin1_id: u64,
        bin2_id: u64,
        reason: String,
    },

    #[error("file \"{path}\" already has an entry named \"{name}\"")]
    DuplicateEntry { path: String, name: String },

    #[error("invalid resolutions: {0}")]
    InvalidResolutions(String),

    #[error("normalization vector \"{name}\" has {found} values, expected {expected}")]
    WeightsLength {
        name: String,
        found: usize,
        expected: u64,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

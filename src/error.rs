use zarrs::storage::StorageError;

use crate::data_type::DataTypeError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Any failure while opening or reading an array.
///
/// A missing chunk is never an error; it resolves to the fill value.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("failed to fetch {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("read was cancelled")]
    Cancelled,
    #[error("no array metadata at {0}")]
    MissingMetadata(String),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn storage(key: impl Into<String>, source: StorageError) -> Self {
        Self::Storage {
            key: key.into(),
            source,
        }
    }
}

impl From<DataTypeError> for Error {
    fn from(value: DataTypeError) -> Self {
        Self::Configuration(value.into())
    }
}

/// Bad or unsupported array metadata.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unsupported zarr_format {0}, expected 2")]
    UnsupportedFormatVersion(i64),
    #[error("shape {shape:?} and chunks {chunks:?} have different lengths")]
    RankMismatch { shape: Vec<usize>, chunks: Vec<usize> },
    #[error("chunk shape is zero along axis {axis}")]
    ZeroChunkDimension { axis: usize },
    #[error("chunk shape {chunks:?} is too large to address in memory")]
    ChunkTooLarge { chunks: Vec<usize> },
    #[error(transparent)]
    DataType(#[from] DataTypeError),
    #[error("invalid order {0:?}, expected \"C\" or \"F\"")]
    InvalidOrder(String),
    #[error("invalid dimension_separator {0:?}, expected \".\" or \"/\"")]
    InvalidDimensionSeparator(String),
    #[error("{0} filter(s) declared, filters are not supported")]
    UnsupportedFilters(usize),
    #[error("invalid fill_value {value}: {reason}")]
    InvalidFillValue {
        value: serde_json::Value,
        reason: String,
    },
}

/// A caller-supplied request that does not fit the array.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request has {got} dimension(s), array has {expected}")]
    DimensionalityMismatch { expected: usize, got: usize },
    #[error(
        "region start {start} + shape {shape} exceeds array shape {array_shape} along axis {axis}"
    )]
    OutOfBounds {
        axis: usize,
        start: usize,
        shape: usize,
        array_shape: usize,
    },
    #[error("region is empty along axis {axis}")]
    EmptyRegion { axis: usize },
    #[error("region shape {shape:?} is too large to address in memory")]
    RegionTooLarge { shape: Vec<usize> },
    #[error("chunk coordinate {coord:?} is outside chunk grid {grid:?}")]
    InvalidChunkCoordinate { coord: Vec<usize>, grid: Vec<usize> },
    #[error("a zero-dimensional array cannot be read in batches")]
    NotBatchable,
    #[error("batch size must be positive")]
    ZeroBatchSize,
}

/// An unsupported compressor, or a chunk that failed to decompress.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unsupported compressor {0:?}")]
    UnsupportedCompressor(String),
    #[error("invalid {codec} configuration: {reason}")]
    InvalidConfiguration { codec: &'static str, reason: String },
    #[error("{codec} decompression failed: {cause}")]
    DecompressionFailed { codec: &'static str, cause: String },
    #[error("chunk {key} decoded to {actual} bytes, expected {expected}")]
    UnexpectedSize {
        key: String,
        expected: usize,
        actual: usize,
    },
}

impl CodecError {
    pub(crate) fn failed(codec: &'static str, cause: impl ToString) -> Self {
        Self::DecompressionFailed {
            codec,
            cause: cause.to_string(),
        }
    }
}

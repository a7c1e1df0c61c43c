use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unable to find chromosome named \"{0}\"")]
    UnknownChromosome(String),

    #[error("unable to find chromosome with id {0}")]
    UnknownChromosomeId(u32),

    #[error("bin id {id} is out of range: table has {len} bins")]
    BinIdOutOfRange { id: u64, len: u64 },

    #[error("position {pos} is out of range for chromosome {chrom} of length {length}")]
    PositionOutOfRange { chrom: String, pos: u32, length: u32 },

    #[error("invalid chromosome table: {0}")]
    InvalidReference(String),

    #[error("invalid bin table: {0}")]
    InvalidBinTable(String),

    #[error("unable to parse query \"{query}\": {reason}")]
    InvalidQuery { query: String, reason: String },

    #[error("invalid query type \"{0}\". Supported query types are: UCSC and BED")]
    UnknownQueryType(String),

    #[error("unknown count type \"{0}\"")]
    UnknownCountType(String),

    #[error("chroms and positions should have the same size")]
    LengthMismatch,

    #[error("failed to cast {value} to a {dtype}")]
    Cast { value: String, dtype: &'static str },

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

//! Cooler-style layout: one resolution, compressed row-major pixel chunks
//! and a CSR-like `bin1_offset` index.
//!
//! ```text
//! header   magic "HRSCOOL\x01", u32 version
//! chunks   zlib( bin2_id: [u64; n], count: [i64 | f64; n] ), `chunk_size` pixels each
//! weights  zlib( [f64; nbins] ) per normalization
//! index    zlib( attributes json, chromosomes, bins, count type, chunk size, nnz,
//!                chunk table, bin1_offset: [u64; nbins + 1], weight table )
//! trailer  u64 index offset, magic
//! ```
//! Offsets are relative to the start of the payload so the same bytes can be
//! embedded verbatim in a container.
pub mod reader;
pub mod writer;

pub use reader::CoolStore;
pub use writer::{CoolSink, CoolSinkOptions};

use crate::codec::Magic;

pub const COOL_MAGIC: Magic = *b"HRSCOOL\x01";
pub const COOL_VERSION: u32 = 1;

pub const DEFAULT_CHUNK_SIZE: u32 = 1 << 16;

const INT_COUNTS: u8 = 0;
const FLOAT_COUNTS: u8 = 1;

const MULTIPLICATIVE_WEIGHTS: u8 = 0;
const DIVISIVE_WEIGHTS: u8 = 1;

//! Hic-style layout: several resolutions of the same matrix, each one tiled
//! into square blocks per chromosome pair.
//!
//! ```text
//! header   magic "HRSHIC\0\x01", u32 version
//! blocks   zlib( u32 n, [u32 rel_bin1, u32 rel_bin2, f32 count; n] )
//! norms    zlib( [f64; chromosome bins] ) per (name, resolution, chromosome)
//! index    zlib( attributes json, chromosomes, block bin count, resolutions,
//!                per resolution: nnz, sum, cis and the block table of every
//!                chromosome pair, normalization table )
//! trailer  u64 index offset, magic
//! ```
//! Bin ids inside blocks are relative to the first bin of their chromosome;
//! block `(row, col)` of pair `(chrom1, chrom2)` holds the pixels with
//! `rel_bin1 / block_bin_count == row` and `rel_bin2 / block_bin_count == col`.
//! Normalization vectors are divisive.
pub mod reader;
pub mod writer;

pub use reader::{HicFile, HicStore};
pub use writer::{HicSink, HicSinkOptions};

use crate::codec::Magic;

pub const HIC_MAGIC: Magic = *b"HRSHIC\x00\x01";
pub const HIC_VERSION: u32 = 1;

pub const DEFAULT_BLOCK_BIN_COUNT: u32 = 512;

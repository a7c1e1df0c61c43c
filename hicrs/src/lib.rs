//! # hicrs
//!
//! Query, aggregate and write Hi-C contact matrices.
//!
//! A contact matrix is a sparse, symmetric matrix of interaction counts between
//! genomic bins. Only the upper triangle is stored; queries can still return
//! the lower triangle or the full matrix, optionally normalized with a
//! balancing vector.
//!
//! - [`File`] opens a single-resolution matrix from a cooler-style file, a
//!   hic-style file or a multi-resolution/single-cell container.
//! - [`File::fetch`] returns a lazy [`PixelSelector`] that can be iterated,
//!   materialized (Arrow tables, dense `ndarray`s, `sprs` sparse matrices) or
//!   described with statistics ([`PixelSelector::describe`]).
//! - [`FileWriter`] and [`HicFileWriter`] build new files from unsorted
//!   chunks of pixels; nothing is written until `finalize` succeeds.
//!
//! ## Example
//! ```no_run
//! use hicrs::{File, FetchOptions, QuerySpan};
//!
//! let file = File::open("matrix.mcool::/resolutions/100000").unwrap();
//! let selector = file
//!     .fetch_with("chr2R", "chrX", &FetchOptions::default().normalization("weight"))
//!     .unwrap();
//!
//! let table = selector.to_arrow(QuerySpan::UpperTriangle).unwrap();
//! let dense = selector.to_dense::<f64>(QuerySpan::Full).unwrap();
//! println!("{} pixels, {:?}", table.num_rows(), dense.dim());
//! ```
pub mod config;
pub mod errors;
pub mod file;
pub mod multires;
pub mod selector;
pub mod singlecell;
pub mod writer;

pub use config::{ConfigError, WriterConfig};
pub use errors::{ErrorKind, HicError, Result};
pub use file::{File, NO_NORMALIZATION};
pub use multires::{MultiResAttributes, MultiResFile, is_multires_file};
pub use selector::{FetchOptions, PixelIter, PixelSelector, QuerySpan};
pub use singlecell::{SingleCellAttributes, SingleCellFile};
pub use writer::{
    BG2_COLUMNS, COO_COLUMNS, Column, FileWriter, HicFileWriter, PixelWriter, WriterGuard,
    with_writer,
};

pub use hicrs_io::container::{ContainerAttributes, ContainerKind, ContainerWriter};
pub use hicrs_io::{WeightKind, Weights, looks_like_coolerfile, looks_like_hicfile};
pub use hicrs_stats::{Metric, MetricSet, Stats, StatsOptions, Value};

//! # Core models for hicrs
//!
//! This crate holds the coordinate system every other hicrs crate is built on:
//! the ordered chromosome table ([`models::Reference`]), the bin table that maps
//! genomic positions onto integer bin identifiers ([`models::BinTable`]), parsing
//! of genomic intervals in UCSC and BED syntax, and the pixel/count types that
//! flow out of the storage layer.
//!
//! ## Example
//! ```rust
//! use hicrs_core::models::{BinTable, Reference};
//!
//! let reference = Reference::new([("chr1", 1000), ("chr2", 500)]).unwrap();
//! let bins = BinTable::fixed(reference, 100).unwrap();
//!
//! assert_eq!(bins.len(), 15);
//! assert_eq!(bins.get_id("chr1", 153).unwrap(), 1);
//! ```
pub mod errors;
pub mod models;
pub mod utils;

pub use errors::{CoreError, Result};

//! # Storage backends for hicrs
//!
//! Contact matrices live in one of two on-disk layouts:
//!
//! - **cooler-style** ([`cool`]): a single resolution, pixels stored row-major
//!   in compressed chunks and indexed by a `bin1_offset` table.
//! - **hic-style** ([`hic`]): several resolutions, each one tiled into square
//!   blocks per chromosome pair.
//!
//! Both readers implement [`PixelStore`], the capability the query engine is
//! written against, and both writers implement [`PixelSink`].
//! Multi-resolution and single-cell collections of cooler-style payloads are
//! handled by [`container`]; [`sniff`] tells the formats apart without failing.
pub mod attributes;
pub mod codec;
pub mod container;
pub mod cool;
pub mod error;
pub mod hic;
pub mod sniff;
pub mod store;

pub use attributes::*;
pub use error::*;
pub use sniff::*;
pub use store::*;

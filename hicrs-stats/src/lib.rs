//! # Descriptive statistics over pixel counts
//!
//! Two strategies compute the same set of metrics
//! (`nnz, sum, min, max, mean, variance, skewness, kurtosis`):
//!
//! - [`OnlineAccumulator`]: a single traversal, updating the first four central
//!   moments incrementally (Welford/Terriberry).
//! - [`ExactAccumulator`]: two traversals, the second one computing central
//!   moments around the exact mean obtained by the first.
//!
//! Both implement [`Accumulator`]; [`describe`] drives whichever one the
//! options ask for over a restartable source of counts.
//!
//! ## Example
//! ```rust
//! use hicrs_stats::{describe, MetricSet, StatsOptions};
//!
//! let values = vec![1i64, 2, 3, 4];
//! let stats = describe(
//!     &MetricSet::all(),
//!     &StatsOptions::default(),
//!     None,
//!     || Ok::<_, std::convert::Infallible>(values.iter().map(|&v| Ok(v))),
//! )
//! .unwrap();
//!
//! assert_eq!(stats.nnz, Some(4));
//! assert_eq!(stats.mean, Some(2.5));
//! ```
pub mod accumulator;
pub mod describe;
pub mod errors;
pub mod exact;
pub mod metric;
pub mod online;
pub mod stats;

pub use accumulator::Accumulator;
pub use describe::describe;
pub use errors::{Result, StatsError};
pub use exact::ExactAccumulator;
pub use metric::{Metric, MetricSet};
pub use online::OnlineAccumulator;
pub use stats::{Stats, StatsOptions, Value};

use std::fmt::{self, Display};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use hicrs_core::models::{BinTable, CountValue, ThinPixel};

use crate::attributes::Attributes;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    Cooler,
    Hic,
}

impl Display for StoreFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreFormat::Cooler => write!(f, "cool"),
            StoreFormat::Hic => write!(f, "hic"),
        }
    }
}

///
/// How a normalization vector is meant to be applied to raw counts.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightKind {
    /// `count * w[bin1] * w[bin2]`
    Multiplicative,
    /// `count / (w[bin1] * w[bin2])`
    Divisive,
}

///
/// Per-bin normalization vector.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    values: Vec<f64>,
    kind: WeightKind,
}

impl Weights {
    pub fn new(values: Vec<f64>, kind: WeightKind) -> Self {
        Weights { values, kind }
    }

    ///
    /// Weights leaving counts untouched.
    ///
    pub fn ones(len: usize) -> Self {
        Weights::new(vec![1.0; len], WeightKind::Multiplicative)
    }

    pub fn kind(&self) -> WeightKind {
        self.kind
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    ///
    /// Convert to the requested convention: `w -> 1 / w` when the kinds differ.
    ///
    pub fn to_kind(&self, kind: WeightKind) -> Weights {
        if kind == self.kind {
            return self.clone();
        }
        Weights {
            values: self.values.iter().map(|w| 1.0 / w).collect(),
            kind,
        }
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

///
/// Lazy, ordered stream of raw pixels. The stream owns what it needs from the
/// store, so it can outlive the borrow it was created from.
///
pub type PixelStream = Box<dyn Iterator<Item = Result<ThinPixel<CountValue>>> + Send>;

///
/// Read capability of a contact matrix backend.
///
/// Pixels are stored upper-triangular (`bin1_id <= bin2_id`);
/// [`PixelStore::read_pixel_range`] never synthesizes the lower triangle.
///
pub trait PixelStore: Send + Sync {
    fn format(&self) -> StoreFormat;

    fn path(&self) -> &Path;

    ///
    /// Path plus the location of the matrix inside its file, e.g.
    /// `test.mcool::/resolutions/1000`.
    ///
    fn uri(&self) -> String;

    fn bins(&self) -> &Arc<BinTable>;

    fn attributes(&self) -> &Attributes;

    ///
    /// Whether counts are stored as floating point numbers.
    ///
    fn has_float_counts(&self) -> bool;

    ///
    /// Stored pixels with `bin1_id` in `bin1` and `bin2_id` in `bin2`, sorted
    /// by `(bin1_id, bin2_id)`.
    ///
    fn read_pixel_range(self: Arc<Self>, bin1: Range<u64>, bin2: Range<u64>)
    -> Result<PixelStream>;

    fn list_normalizations(&self) -> Vec<String>;

    ///
    /// Normalization vector `name`, one weight per bin, in the store's native convention.
    ///
    fn read_normalization(&self, name: &str) -> Result<Weights>;
}

///
/// Write capability of a contact matrix backend.
///
pub trait PixelSink {
    ///
    /// Append one pixel. Pixels must be unique and sorted by `(bin1_id, bin2_id)`.
    ///
    fn append(&mut self, pixel: ThinPixel<CountValue>) -> Result<()>;

    ///
    /// Write chromosomes, bins, balancing vectors and the index, then flush.
    /// Called exactly once, after the last pixel.
    ///
    fn write_index(self: Box<Self>, balancing: &[(String, Weights)]) -> Result<Attributes>;
}

///
/// Checks shared by the writers: pixels in upper-triangular, strictly increasing order.
///
#[derive(Debug, Default)]
pub(crate) struct OrderCheck {
    last: Option<(u64, u64)>,
}

impl OrderCheck {
    pub(crate) fn check(&mut self, pixel: &ThinPixel<CountValue>, nbins: u64) -> Result<()> {
        use crate::error::StoreError;

        if pixel.bin1_id > pixel.bin2_id || pixel.bin2_id >= nbins {
            return Err(StoreError::InvalidPixel {
                bin1_id: pixel.bin1_id,
                bin2_id: pixel.bin2_id,
                reason: format!(
                    "expected bin1_id <= bin2_id < {} (number of bins)",
                    nbins
                ),
            });
        }
        let coords = pixel.coords();
        if let Some(last) = self.last {
            if coords <= last {
                return Err(StoreError::UnsortedPixels {
                    bin1_id: coords.0,
                    bin2_id: coords.1,
                    prev_bin1_id: last.0,
                    prev_bin2_id: last.1,
                });
            }
        }
        self.last = Some(coords);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_weight_conversion() {
        let weights = Weights::new(vec![2.0, 0.5], WeightKind::Divisive);
        let converted = weights.to_kind(WeightKind::Multiplicative);
        assert_eq!(converted.values(), &[0.5, 2.0]);
        assert_eq!(converted.kind(), WeightKind::Multiplicative);
        assert_eq!(weights.to_kind(WeightKind::Divisive), weights);
    }

    #[rstest]
    fn test_order_check() {
        let mut check = OrderCheck::default();
        assert!(check.check(&ThinPixel::new(0, 1, CountValue::Int(1)), 10).is_ok());
        assert!(check.check(&ThinPixel::new(0, 2, CountValue::Int(1)), 10).is_ok());
        assert!(check.check(&ThinPixel::new(0, 2, CountValue::Int(1)), 10).is_err());
        assert!(check.check(&ThinPixel::new(3, 1, CountValue::Int(1)), 10).is_err());
        assert!(check.check(&ThinPixel::new(3, 10, CountValue::Int(1)), 10).is_err());
    }
}

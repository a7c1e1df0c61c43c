use std::fmt::{self, Display};

use crate::models::bin_table::Bin;

///
/// Pixel in coordinate (COO) form.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThinPixel<N> {
    pub bin1_id: u64,
    pub bin2_id: u64,
    pub count: N,
}

impl<N> ThinPixel<N> {
    pub fn new(bin1_id: u64, bin2_id: u64, count: N) -> Self {
        ThinPixel {
            bin1_id,
            bin2_id,
            count,
        }
    }

    ///
    /// Whether the pixel lies in the upper triangle (diagonal included).
    ///
    pub fn is_upper_triangular(&self) -> bool {
        self.bin1_id <= self.bin2_id
    }

    ///
    /// The same pixel reflected across the diagonal.
    ///
    pub fn transpose(self) -> Self {
        ThinPixel {
            bin1_id: self.bin2_id,
            bin2_id: self.bin1_id,
            count: self.count,
        }
    }

    pub fn coords(&self) -> (u64, u64) {
        (self.bin1_id, self.bin2_id)
    }
}

///
/// Pixel joined with its genomic coordinates (BG2 form).
///
#[derive(Debug, Clone, PartialEq)]
pub struct Pixel<N> {
    pub bin1: Bin,
    pub bin2: Bin,
    pub count: N,
}

impl<N: Copy> Pixel<N> {
    pub fn to_thin(&self) -> ThinPixel<N> {
        ThinPixel {
            bin1_id: self.bin1.id,
            bin2_id: self.bin2.id,
            count: self.count,
        }
    }
}

impl<N: Display> Display for Pixel<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.bin1.chrom.name(),
            self.bin1.start,
            self.bin1.end,
            self.bin2.chrom.name(),
            self.bin2.start,
            self.bin2.end,
            self.count
        )
    }
}

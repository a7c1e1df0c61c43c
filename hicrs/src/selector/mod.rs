//! Lazy views over a rectangular region of a contact matrix.
//!
//! A [`PixelSelector`] only records what to read; pixels are streamed from the
//! backend when one of its iterators or materializers is called, and every call
//! starts a fresh traversal.
mod iter;
mod materialize;
mod stats;

use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use hicrs_core::models::{
    BinTable, Count, CountType, GenomicInterval, Pixel, QueryType, ThinPixel,
};
use hicrs_core::utils::{count_cells, count_upper_triangular};
use hicrs_io::Weights;

use crate::errors::{HicError, Result};
use crate::file::{File, FileInner, NO_NORMALIZATION};

pub use iter::PixelIter;

///
/// Which part of the (symmetric) matrix a materializer returns.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySpan {
    /// Stored pixels only.
    UpperTriangle,
    /// Stored pixels reflected across the diagonal.
    LowerTriangle,
    /// Both triangles, the diagonal counted once.
    Full,
}

impl FromStr for QuerySpan {
    type Err = HicError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upper_triangle" => Ok(QuerySpan::UpperTriangle),
            "lower_triangle" => Ok(QuerySpan::LowerTriangle),
            "full" => Ok(QuerySpan::Full),
            _ => Err(HicError::UnknownQuerySpan(s.to_string())),
        }
    }
}

impl fmt::Display for QuerySpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuerySpan::UpperTriangle => write!(f, "upper_triangle"),
            QuerySpan::LowerTriangle => write!(f, "lower_triangle"),
            QuerySpan::Full => write!(f, "full"),
        }
    }
}

///
/// Options of [`File::fetch_with`].
///
/// ```
/// use hicrs::FetchOptions;
/// use hicrs_core::models::CountType;
///
/// let options = FetchOptions::default()
///     .normalization("weight")
///     .count_type(CountType::Float32)
///     .diagonal_band_width(10)
///     .unwrap();
/// assert_eq!(options.diagonal_band_width, Some(10));
/// ```
///
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Normalization applied to counts, `"NONE"` for raw counts.
    pub normalization: String,
    /// Element type of the pixels; inferred from the file and normalization when `None`.
    pub count_type: Option<CountType>,
    /// Return pixels joined with their genomic coordinates.
    pub join: bool,
    pub query_type: QueryType,
    /// Keep only pixels with `|bin1_id - bin2_id| < width`.
    pub diagonal_band_width: Option<u64>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            normalization: NO_NORMALIZATION.to_string(),
            count_type: None,
            join: false,
            query_type: QueryType::Ucsc,
            diagonal_band_width: None,
        }
    }
}

impl FetchOptions {
    pub fn normalization(mut self, name: &str) -> Self {
        self.normalization = name.to_string();
        self
    }

    pub fn count_type(mut self, count_type: CountType) -> Self {
        self.count_type = Some(count_type);
        self
    }

    pub fn join(mut self, join: bool) -> Self {
        self.join = join;
        self
    }

    pub fn query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = query_type;
        self
    }

    pub fn diagonal_band_width(mut self, width: i64) -> Result<Self> {
        if width < 0 {
            return Err(HicError::NegativeBandWidth);
        }
        self.diagonal_band_width = Some(width as u64);
        Ok(self)
    }
}

///
/// A query `range1 x range2` against a [`File`].
///
/// The selector holds a weak handle on its file: once the file is closed (or
/// every handle to it is dropped) iteration fails with
/// [`HicError::FileClosed`].
///
#[derive(Clone)]
pub struct PixelSelector {
    file: Weak<FileInner>,
    uri: String,
    bins: Arc<BinTable>,

    coords: Option<(GenomicInterval, GenomicInterval)>,
    range1: Range<u64>,
    range2: Range<u64>,

    normalization: String,
    weights: Option<Arc<Weights>>,
    count_type: CountType,
    join: bool,
    band: Option<u64>,
}

impl PixelSelector {
    pub(crate) fn new(
        file: &File,
        coords: Option<(GenomicInterval, GenomicInterval)>,
        normalization: String,
        weights: Option<Arc<Weights>>,
        count_type: CountType,
        join: bool,
        band: Option<u64>,
    ) -> Result<Self> {
        let bins = file.bins()?.clone();
        let (range1, range2) = match &coords {
            None => (0..bins.len(), 0..bins.len()),
            Some((coord1, coord2)) => {
                let range1 = bins.interval_to_range(coord1)?;
                let range2 = bins.interval_to_range(coord2)?;
                if range1.start > range2.start {
                    return Err(HicError::InvalidQuery {
                        range1: coord1.to_string(),
                        range2: coord2.to_string(),
                        reason: "query overlaps with the lower-triangle of the matrix".to_string(),
                    });
                }
                (range1, range2)
            }
        };

        Ok(PixelSelector {
            file: file.downgrade(),
            uri: file.uri().to_string(),
            bins,
            coords,
            range1,
            range2,
            normalization,
            weights,
            count_type,
            join,
            band,
        })
    }

    pub(crate) fn file(&self) -> Result<Arc<FileInner>> {
        self.file
            .upgrade()
            .filter(|file| !file.is_closed())
            .ok_or_else(|| HicError::FileClosed(self.uri.clone()))
    }

    pub fn coord1(&self) -> Option<&GenomicInterval> {
        self.coords.as_ref().map(|(coord1, _)| coord1)
    }

    pub fn coord2(&self) -> Option<&GenomicInterval> {
        self.coords.as_ref().map(|(_, coord2)| coord2)
    }

    /// Bin ids of the rows.
    pub fn range1(&self) -> Range<u64> {
        self.range1.clone()
    }

    /// Bin ids of the columns.
    pub fn range2(&self) -> Range<u64> {
        self.range2.clone()
    }

    pub fn bins(&self) -> &Arc<BinTable> {
        &self.bins
    }

    pub fn normalization(&self) -> &str {
        &self.normalization
    }

    pub fn dtype(&self) -> CountType {
        self.count_type
    }

    pub fn is_joined(&self) -> bool {
        self.join
    }

    pub fn diagonal_band_width(&self) -> Option<u64> {
        self.band
    }

    ///
    /// Number of cells covered by the query (implicit zeros included).
    ///
    /// # Arguments
    /// - upper_triangular: only count cells with `bin1_id <= bin2_id`
    ///
    pub fn size(&self, upper_triangular: bool) -> u64 {
        if upper_triangular {
            count_upper_triangular(&self.range1, &self.range2, self.band)
        } else {
            count_cells(&self.range1, &self.range2, self.band)
        }
    }

    ///
    /// Shape `(rows, cols)` of the dense matrix covering the query.
    ///
    pub fn shape(&self) -> (usize, usize) {
        (
            (self.range1.end - self.range1.start) as usize,
            (self.range2.end - self.range2.start) as usize,
        )
    }

    ///
    /// Stored pixels of the query, in `(bin1_id, bin2_id)` order.
    ///
    pub fn iter<N: Count>(&self) -> Result<PixelIter<N>> {
        self.part(self.range1.clone(), self.range2.clone(), false, false)
    }

    ///
    /// Pixels of the query restricted to `span`. The lower triangle is
    /// synthesized by transposing stored pixels.
    ///
    pub fn iter_span<N: Count>(
        &self,
        span: QuerySpan,
    ) -> Result<Box<dyn Iterator<Item = Result<ThinPixel<N>>> + Send>> {
        let upper = || self.part::<N>(self.range1.clone(), self.range2.clone(), false, false);
        Ok(match span {
            QuerySpan::UpperTriangle => Box::new(upper()?),
            QuerySpan::LowerTriangle => Box::new(self.part::<N>(
                self.range2.clone(),
                self.range1.clone(),
                true,
                false,
            )?),
            QuerySpan::Full => Box::new(upper()?.chain(self.part::<N>(
                self.range2.clone(),
                self.range1.clone(),
                true,
                true,
            )?)),
        })
    }

    ///
    /// [`PixelSelector::iter`] with pixels joined to their bins.
    ///
    pub fn iter_joined<N: Count>(&self) -> Result<impl Iterator<Item = Result<Pixel<N>>> + use<N>> {
        let bins = self.bins.clone();
        Ok(self.iter::<N>()?.map(move |pixel| {
            let pixel = pixel?;
            Ok(Pixel {
                bin1: bins.get(pixel.bin1_id)?,
                bin2: bins.get(pixel.bin2_id)?,
                count: pixel.count,
            })
        }))
    }

    fn part<N: Count>(
        &self,
        rows: Range<u64>,
        cols: Range<u64>,
        transpose: bool,
        skip_diagonal: bool,
    ) -> Result<PixelIter<N>> {
        let file = self.file()?;
        let stream = file.store()?.read_pixel_range(rows, cols)?;
        Ok(PixelIter::new(
            Arc::downgrade(&file),
            self.uri.clone(),
            stream,
            self.weights.clone(),
            self.band,
            transpose,
            skip_diagonal,
        ))
    }
}

impl fmt::Display for PixelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let format = if self.join { "BG2" } else { "COO" };
        match &self.coords {
            None => write!(f, "PixelSelector(ALL; {}; {})", format, self.count_type),
            Some((coord1, coord2)) => write!(
                f,
                "PixelSelector({}; {}; {}; {})",
                coord1, coord2, format, self.count_type
            ),
        }
    }
}

impl fmt::Debug for PixelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

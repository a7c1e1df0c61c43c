use std::fmt::{self, Display};
use std::ops::Range;
use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};

use crate::errors::{CoreError, Result};
use crate::models::chromosome::{Chromosome, Reference};
use crate::models::count::Count;
use crate::models::interval::{GenomicInterval, QueryType};
use crate::models::pixel::{Pixel, ThinPixel};

///
/// A genomic interval with a globally unique identifier.
///
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bin {
    /// Identifier across the concatenated chromosomes.
    pub id: u64,
    /// Identifier relative to the first bin of the chromosome.
    pub rel_id: u32,
    pub chrom: Chromosome,
    pub start: u32,
    pub end: u32,
}

impl Bin {
    pub fn width(&self) -> u32 {
        self.end - self.start
    }
}

impl Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chrom.name(), self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinTableKind {
    Fixed,
    Variable,
}

impl Display for BinTableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinTableKind::Fixed => write!(f, "fixed"),
            BinTableKind::Variable => write!(f, "variable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Layout {
    Fixed { resolution: u32 },
    // bin boundaries in bin id order; bins of one chromosome are contiguous
    Variable { starts: Vec<u32>, ends: Vec<u32> },
}

///
/// Mapping between genomic coordinates and bin identifiers.
///
/// Bin ids are assigned chromosome by chromosome, in chromosome table order.
/// The table is immutable once built and is meant to be shared behind an [`Arc`].
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinTable {
    reference: Arc<Reference>,
    layout: Layout,
    // first bin id of each chromosome, plus the total number of bins
    offsets: Vec<u64>,
}

impl BinTable {
    ///
    /// Build a table of fixed-width bins.
    ///
    /// The last bin of each chromosome is truncated at the chromosome end.
    ///
    pub fn fixed(reference: Reference, resolution: u32) -> Result<Self> {
        if resolution == 0 {
            return Err(CoreError::InvalidBinTable(
                "resolution should be greater than zero".to_string(),
            ));
        }

        let mut offsets = Vec::with_capacity(reference.len() + 1);
        let mut offset = 0u64;
        offsets.push(offset);
        for chrom in reference.iter() {
            offset += chrom.length().div_ceil(resolution) as u64;
            offsets.push(offset);
        }

        Ok(BinTable {
            reference: Arc::new(reference),
            layout: Layout::Fixed { resolution },
            offsets,
        })
    }

    ///
    /// Build a table from explicit per-bin boundaries.
    ///
    /// Bins must be grouped by chromosome in chromosome table order, sorted,
    /// non-overlapping, contiguous from 0 and must end at the chromosome length.
    ///
    /// # Arguments
    /// - reference: the chromosome table
    /// - chroms: chromosome name of each bin
    /// - starts: start position of each bin
    /// - ends: end position of each bin
    ///
    pub fn variable<S: AsRef<str>>(
        reference: Reference,
        chroms: &[S],
        starts: &[u32],
        ends: &[u32],
    ) -> Result<Self> {
        if chroms.len() != starts.len() || starts.len() != ends.len() {
            return Err(CoreError::InvalidBinTable(format!(
                "chrom, start and end should have the same length, found {}, {} and {}",
                chroms.len(),
                starts.len(),
                ends.len()
            )));
        }

        let mut offsets = Vec::with_capacity(reference.len() + 1);
        offsets.push(0u64);

        let mut i = 0usize;
        for chrom in reference.iter() {
            let mut expected_start = 0u32;
            while i < chroms.len() && chroms[i].as_ref() == chrom.name() {
                let (start, end) = (starts[i], ends[i]);
                if start != expected_start {
                    return Err(CoreError::InvalidBinTable(format!(
                        "bin #{} ({}:{}-{}) should start at {}: bins must be sorted, contiguous and non-overlapping",
                        i,
                        chrom.name(),
                        start,
                        end,
                        expected_start
                    )));
                }
                if end <= start {
                    return Err(CoreError::InvalidBinTable(format!(
                        "bin #{} ({}:{}-{}) has an end position not greater than its start position",
                        i,
                        chrom.name(),
                        start,
                        end
                    )));
                }
                if end > chrom.length() {
                    return Err(CoreError::InvalidBinTable(format!(
                        "bin #{} ({}:{}-{}) extends past the end of the chromosome ({})",
                        i,
                        chrom.name(),
                        start,
                        end,
                        chrom.length()
                    )));
                }
                expected_start = end;
                i += 1;
            }

            if expected_start != chrom.length() {
                return Err(CoreError::InvalidBinTable(format!(
                    "bins for chromosome {} cover {} out of {} bp",
                    chrom.name(),
                    expected_start,
                    chrom.length()
                )));
            }
            offsets.push(i as u64);
        }

        if i != chroms.len() {
            let name = chroms[i].as_ref();
            return Err(if reference.contains(name) {
                CoreError::InvalidBinTable(format!(
                    "bins for chromosome {} are not grouped in chromosome table order",
                    name
                ))
            } else {
                CoreError::UnknownChromosome(name.to_string())
            });
        }

        Ok(BinTable {
            reference: Arc::new(reference),
            layout: Layout::Variable {
                starts: starts.to_vec(),
                ends: ends.to_vec(),
            },
            offsets,
        })
    }

    pub fn kind(&self) -> BinTableKind {
        match self.layout {
            Layout::Fixed { .. } => BinTableKind::Fixed,
            Layout::Variable { .. } => BinTableKind::Variable,
        }
    }

    ///
    /// Bin size of fixed tables, 0 for variable tables.
    ///
    pub fn resolution(&self) -> u32 {
        match self.layout {
            Layout::Fixed { resolution } => resolution,
            Layout::Variable { .. } => 0,
        }
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn shared_reference(&self) -> Arc<Reference> {
        self.reference.clone()
    }

    pub fn chromosomes(&self, include_all: bool) -> Vec<Chromosome> {
        self.reference.chromosomes(include_all)
    }

    pub fn len(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    ///
    /// First bin id of a chromosome.
    ///
    pub fn chrom_offset(&self, chrom_id: u32) -> Result<u64> {
        self.offsets
            .get(chrom_id as usize)
            .filter(|_| (chrom_id as usize) < self.reference.len())
            .copied()
            .ok_or(CoreError::UnknownChromosomeId(chrom_id))
    }

    ///
    /// Range of bin ids belonging to a chromosome.
    ///
    pub fn chrom_bin_range(&self, chrom_id: u32) -> Result<Range<u64>> {
        let start = self.chrom_offset(chrom_id)?;
        Ok(start..self.offsets[chrom_id as usize + 1])
    }

    pub fn bins_of(&self, chrom: &str) -> Result<Range<u64>> {
        let chrom = self.reference.get(chrom)?;
        self.chrom_bin_range(chrom.id())
    }

    pub fn get(&self, id: u64) -> Result<Bin> {
        if id >= self.len() {
            return Err(CoreError::BinIdOutOfRange { id, len: self.len() });
        }

        // index of the last offset <= id
        let chrom_idx = self.offsets.partition_point(|&o| o <= id) - 1;
        let chrom = self.reference.get_by_id(chrom_idx as u32)?;
        let rel_id = (id - self.offsets[chrom_idx]) as u32;

        let (start, end) = match &self.layout {
            Layout::Fixed { resolution } => {
                let start = rel_id * resolution;
                (start, start.saturating_add(*resolution).min(chrom.length()))
            }
            Layout::Variable { starts, ends } => (starts[id as usize], ends[id as usize]),
        };

        Ok(Bin {
            id,
            rel_id,
            chrom: chrom.clone(),
            start,
            end,
        })
    }

    ///
    /// Id of the bin overlapping `pos` on chromosome `chrom`.
    ///
    pub fn get_id(&self, chrom: &str, pos: u32) -> Result<u64> {
        let chrom = self.reference.get(chrom)?;
        self.get_id_by_chrom(chrom, pos)
    }

    pub fn get_id_by_chrom(&self, chrom: &Chromosome, pos: u32) -> Result<u64> {
        if pos >= chrom.length() {
            return Err(CoreError::PositionOutOfRange {
                chrom: chrom.name().to_string(),
                pos,
                length: chrom.length(),
            });
        }

        let offset = self.offsets[chrom.id() as usize];
        match &self.layout {
            Layout::Fixed { resolution } => Ok(offset + (pos / resolution) as u64),
            Layout::Variable { ends, .. } => {
                let end = self.offsets[chrom.id() as usize + 1];
                let chrom_ends = &ends[offset as usize..end as usize];
                Ok(offset + chrom_ends.partition_point(|&e| e <= pos) as u64)
            }
        }
    }

    ///
    /// Vectorized [`BinTable::get`]. Fails as a whole if any id is out of range.
    ///
    pub fn get_many(&self, ids: &[u64]) -> Result<Vec<Bin>> {
        ids.iter().map(|&id| self.get(id)).collect()
    }

    ///
    /// Vectorized [`BinTable::get_id`]. Fails as a whole if any lookup fails.
    ///
    pub fn get_ids<S: AsRef<str>>(&self, chroms: &[S], positions: &[u32]) -> Result<Vec<u64>> {
        if chroms.len() != positions.len() {
            return Err(CoreError::LengthMismatch);
        }
        chroms
            .iter()
            .zip(positions)
            .map(|(chrom, &pos)| self.get_id(chrom.as_ref(), pos))
            .collect()
    }

    ///
    /// Translate a genomic interval into the half-open range of bin ids overlapping it.
    ///
    pub fn interval_to_range(&self, interval: &GenomicInterval) -> Result<Range<u64>> {
        let first = self.get_id_by_chrom(interval.chrom(), interval.start())?;
        let last = self.get_id_by_chrom(interval.chrom(), interval.end() - 1)?;
        Ok(first..last + 1)
    }

    ///
    /// Parse a query (UCSC or BED syntax) and translate it into a range of bin ids.
    ///
    pub fn to_range(&self, query: &str, query_type: QueryType) -> Result<Range<u64>> {
        let interval = GenomicInterval::parse(&self.reference, query, query_type)?;
        self.interval_to_range(&interval)
    }

    pub fn iter(&self) -> impl Iterator<Item = Bin> + '_ {
        (0..self.len()).filter_map(move |id| self.get(id).ok())
    }

    ///
    /// Join COO pixels with their bins.
    ///
    pub fn merge<'a, N, I>(&'a self, pixels: I) -> impl Iterator<Item = Result<Pixel<N>>> + 'a
    where
        N: Count,
        I: IntoIterator<Item = ThinPixel<N>>,
        I::IntoIter: 'a,
    {
        pixels.into_iter().map(move |p| {
            Ok(Pixel {
                bin1: self.get(p.bin1_id)?,
                bin2: self.get(p.bin2_id)?,
                count: p.count,
            })
        })
    }

    ///
    /// Bins as a `chrom, start, end` table, optionally restricted to a query.
    ///
    pub fn to_table(&self, query: Option<&str>, query_type: QueryType) -> Result<RecordBatch> {
        let range = match query.filter(|q| !q.is_empty()) {
            Some(q) => self.to_range(q, query_type)?,
            None => 0..self.len(),
        };

        let bins = range
            .map(|id| self.get(id))
            .collect::<Result<Vec<_>>>()?;

        let schema = Arc::new(Schema::new(vec![
            Field::new("chrom", DataType::Utf8, false),
            Field::new("start", DataType::UInt32, false),
            Field::new("end", DataType::UInt32, false),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(bins.iter().map(|b| b.chrom.name()))),
            Arc::new(UInt32Array::from_iter_values(bins.iter().map(|b| b.start))),
            Arc::new(UInt32Array::from_iter_values(bins.iter().map(|b| b.end))),
        ];

        Ok(RecordBatch::try_new(schema, columns)?)
    }
}

impl Display for BinTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.layout {
            Layout::Fixed { resolution } => write!(
                f,
                "BinTable(num_chroms={}; bin_size={};)",
                self.reference.len(),
                resolution
            ),
            Layout::Variable { .. } => write!(
                f,
                "BinTable(num_chroms={}; bin_size=variable;)",
                self.reference.len()
            ),
        }
    }
}

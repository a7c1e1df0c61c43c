use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Cursor};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use byteorder::{LittleEndian, ReadBytesExt};
use fxhash::FxHashMap;
use log::debug;

use hicrs_core::models::{BinTable, CountValue, Reference, ThinPixel};

use super::{HIC_MAGIC, HIC_VERSION};
use crate::attributes::Attributes;
use crate::codec::{self, Region};
use crate::error::{Result, StoreError};
use crate::store::{PixelStore, PixelStream, StoreFormat, WeightKind, Weights};

type BlockIndex = BTreeMap<(u32, u32), (u64, u64)>;

#[derive(Debug, Clone)]
struct ResolutionIndex {
    nnz: u64,
    sum: f64,
    cis: f64,
    matrices: FxHashMap<(u32, u32), BlockIndex>,
}

#[derive(Debug, Clone)]
struct NormEntry {
    name: String,
    resolution: u32,
    chrom_id: u32,
    offset: u64,
    len: u64,
}

///
/// A hic-style file: the index shared by the per-resolution [`HicStore`]s.
///
#[derive(Debug)]
pub struct HicFile {
    path: PathBuf,
    file: Mutex<File>,
    region: Region,

    attributes: Attributes,
    reference: Reference,
    block_bin_count: u32,
    resolutions: Vec<u32>,
    index: FxHashMap<u32, ResolutionIndex>,
    norms: Vec<NormEntry>,
}

impl HicFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let corrupt = |reason: String| StoreError::Corrupt {
            path: display.clone(),
            format: "hic",
            reason,
        };

        let mut file = File::open(path)?;
        let region = Region::whole(&mut file)?;

        let (magic, version) = codec::read_header(&mut file, region)
            .map_err(|e| corrupt(format!("unable to read header: {}", e)))?;
        if magic != HIC_MAGIC {
            return Err(corrupt("bad magic number".to_string()));
        }
        if version != HIC_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path: display.clone(),
                format: "hic",
                version,
            });
        }

        let (index_offset, magic) = codec::read_trailer(&mut file, region)?;
        if magic != HIC_MAGIC {
            return Err(corrupt("bad trailer, file was not finalized".to_string()));
        }
        let index_len = region
            .len
            .checked_sub(codec::TRAILER_LEN + index_offset)
            .ok_or_else(|| corrupt(format!("invalid index offset {}", index_offset)))?;
        let mut index = Cursor::new(codec::read_blob(&mut file, region, index_offset, index_len)?);

        let attributes = Attributes::from_json(&codec::read_string(&mut index)?)?;
        let reference = codec::read_reference(&mut index)?;
        let block_bin_count = index.read_u32::<LittleEndian>()?;
        if block_bin_count == 0 {
            return Err(corrupt("block bin count is 0".to_string()));
        }

        let nres = index.read_u32::<LittleEndian>()?;
        let mut resolutions = Vec::with_capacity(nres as usize);
        for _ in 0..nres {
            resolutions.push(index.read_u32::<LittleEndian>()?);
        }

        let mut resolution_index = FxHashMap::default();
        for &resolution in &resolutions {
            let nnz = index.read_u64::<LittleEndian>()?;
            let sum = index.read_f64::<LittleEndian>()?;
            let cis = index.read_f64::<LittleEndian>()?;

            let nmatrices = index.read_u32::<LittleEndian>()?;
            let mut matrices = FxHashMap::default();
            for _ in 0..nmatrices {
                let chrom1 = index.read_u32::<LittleEndian>()?;
                let chrom2 = index.read_u32::<LittleEndian>()?;
                let nblocks = index.read_u32::<LittleEndian>()?;
                let mut blocks = BlockIndex::new();
                for _ in 0..nblocks {
                    let row = index.read_u32::<LittleEndian>()?;
                    let col = index.read_u32::<LittleEndian>()?;
                    let offset = index.read_u64::<LittleEndian>()?;
                    let len = index.read_u64::<LittleEndian>()?;
                    blocks.insert((row, col), (offset, len));
                }
                matrices.insert((chrom1, chrom2), blocks);
            }

            resolution_index.insert(
                resolution,
                ResolutionIndex {
                    nnz,
                    sum,
                    cis,
                    matrices,
                },
            );
        }

        let nnorms = index.read_u32::<LittleEndian>()?;
        let mut norms = Vec::with_capacity(nnorms as usize);
        for _ in 0..nnorms {
            norms.push(NormEntry {
                name: codec::read_string(&mut index)?,
                resolution: index.read_u32::<LittleEndian>()?,
                chrom_id: index.read_u32::<LittleEndian>()?,
                offset: index.read_u64::<LittleEndian>()?,
                len: index.read_u64::<LittleEndian>()?,
            });
        }

        debug!(
            "opened {} ({} resolutions, {} normalization vectors)",
            display,
            resolutions.len(),
            norms.len()
        );

        Ok(Arc::new(HicFile {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            region,
            attributes,
            reference,
            block_bin_count,
            resolutions,
            index: resolution_index,
            norms,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    ///
    /// Available resolutions in ascending order.
    ///
    pub fn resolutions(&self) -> Vec<u32> {
        let mut resolutions = self.resolutions.clone();
        resolutions.sort_unstable();
        resolutions
    }

    ///
    /// View of the matrix at one resolution.
    ///
    pub fn store(self: &Arc<Self>, resolution: u32) -> Result<HicStore> {
        let index = self.index.get(&resolution).ok_or_else(|| {
            StoreError::ResolutionNotFound {
                path: self.path.display().to_string(),
                resolution,
                available: self
                    .resolutions()
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            }
        })?;

        let bins = BinTable::fixed(self.reference.clone(), resolution)?;
        let mut attributes = self.attributes.clone();
        attributes.bin_size = resolution;
        attributes.nbins = bins.len();
        attributes.nnz = index.nnz;
        attributes.sum = CountValue::Float(index.sum);
        attributes.cis = CountValue::Float(index.cis);

        Ok(HicStore {
            file: self.clone(),
            resolution,
            bins: Arc::new(bins),
            attributes,
        })
    }

    fn read_blob(&self, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        codec::read_blob(&mut *file, self.region, offset, len)
    }

    fn read_block(&self, offset: u64, len: u64) -> Result<Vec<(u32, u32, f32)>> {
        let mut reader = Cursor::new(self.read_blob(offset, len)?);
        let n = reader.read_u32::<LittleEndian>()?;
        let mut pixels = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let bin1 = reader.read_u32::<LittleEndian>()?;
            let bin2 = reader.read_u32::<LittleEndian>()?;
            let count = reader.read_f32::<LittleEndian>()?;
            pixels.push((bin1, bin2, count));
        }
        Ok(pixels)
    }
}

///
/// One resolution of a [`HicFile`].
///
#[derive(Debug)]
pub struct HicStore {
    file: Arc<HicFile>,
    resolution: u32,
    bins: Arc<BinTable>,
    attributes: Attributes,
}

impl HicStore {
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    ///
    /// Split a range of global bin ids into per-chromosome ranges of relative ids.
    ///
    fn split_by_chrom(&self, range: &Range<u64>) -> Result<Vec<(u32, u64, Range<u32>)>> {
        let mut spans = Vec::new();
        for chrom in self.bins.reference().iter() {
            let chrom_range = self.bins.chrom_bin_range(chrom.id())?;
            let start = range.start.max(chrom_range.start);
            let end = range.end.min(chrom_range.end);
            if start < end {
                let offset = chrom_range.start;
                spans.push((
                    chrom.id(),
                    offset,
                    (start - offset) as u32..(end - offset) as u32,
                ));
            }
        }
        Ok(spans)
    }
}

impl PixelStore for HicStore {
    fn format(&self) -> StoreFormat {
        StoreFormat::Hic
    }

    fn path(&self) -> &Path {
        &self.file.path
    }

    fn uri(&self) -> String {
        format!("{}::/resolutions/{}", self.file.path.display(), self.resolution)
    }

    fn bins(&self) -> &Arc<BinTable> {
        &self.bins
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn has_float_counts(&self) -> bool {
        true
    }

    fn read_pixel_range(
        self: Arc<Self>,
        bin1: Range<u64>,
        bin2: Range<u64>,
    ) -> Result<PixelStream> {
        let spans1 = self.split_by_chrom(&bin1)?;
        let spans2 = self.split_by_chrom(&bin2)?;
        let block_bin_count = self.file.block_bin_count;

        let bands = spans1
            .iter()
            .enumerate()
            .flat_map(|(i, (_, _, rel))| {
                (rel.start / block_bin_count..=(rel.end - 1) / block_bin_count).map(move |r| (i, r))
            })
            .collect::<Vec<_>>();

        Ok(Box::new(HicPixelIter {
            store: self,
            spans1,
            spans2,
            bands: bands.into_iter(),
            buffer: Vec::new().into_iter(),
            done: false,
        }))
    }

    fn list_normalizations(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .file
            .norms
            .iter()
            .filter(|n| n.resolution == self.resolution)
            .map(|n| n.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn read_normalization(&self, name: &str) -> Result<Weights> {
        let entries: Vec<&NormEntry> = self
            .file
            .norms
            .iter()
            .filter(|n| n.name == name && n.resolution == self.resolution)
            .collect();
        if entries.is_empty() {
            return Err(StoreError::NormalizationNotFound {
                path: self.uri(),
                name: name.to_string(),
            });
        }

        // chromosomes without a vector are left as NaN
        let mut values = vec![f64::NAN; self.bins.len() as usize];
        for entry in entries {
            let range = self.bins.chrom_bin_range(entry.chrom_id)?;
            let mut chrom_values = vec![0f64; (range.end - range.start) as usize];
            Cursor::new(self.file.read_blob(entry.offset, entry.len)?)
                .read_f64_into::<LittleEndian>(&mut chrom_values)?;
            values[range.start as usize..range.end as usize].copy_from_slice(&chrom_values);
        }
        Ok(Weights::new(values, WeightKind::Divisive))
    }
}

///
/// Yields pixels band by band: a band holds the rows of one chromosome that
/// fall in the same row of blocks, so only its blocks are decoded and sorted.
///
struct HicPixelIter {
    store: Arc<HicStore>,
    spans1: Vec<(u32, u64, Range<u32>)>,
    spans2: Vec<(u32, u64, Range<u32>)>,
    bands: std::vec::IntoIter<(usize, u32)>,
    buffer: std::vec::IntoIter<ThinPixel<CountValue>>,
    done: bool,
}

impl HicPixelIter {
    fn load_band(&self, span: usize, row: u32) -> Result<Vec<ThinPixel<CountValue>>> {
        let (chrom1, offset1, rel1) = &self.spans1[span];
        let block_bin_count = self.store.file.block_bin_count;
        let Some(index) = self.store.file.index.get(&self.store.resolution) else {
            return Ok(Vec::new());
        };

        let mut pixels = Vec::new();
        for (chrom2, offset2, rel2) in self.spans2.iter().filter(|(c, _, _)| c >= chrom1) {
            let Some(blocks) = index.matrices.get(&(*chrom1, *chrom2)) else {
                continue;
            };
            let first_col = rel2.start / block_bin_count;
            let last_col = (rel2.end - 1) / block_bin_count;

            for &(offset, len) in blocks.range((row, first_col)..=(row, last_col)).map(|(_, v)| v) {
                for (bin1, bin2, count) in self.store.file.read_block(offset, len)? {
                    if rel1.contains(&bin1) && rel2.contains(&bin2) {
                        pixels.push(ThinPixel::new(
                            offset1 + bin1 as u64,
                            offset2 + bin2 as u64,
                            CountValue::Float(count as f64),
                        ));
                    }
                }
            }
        }

        pixels.sort_unstable_by_key(|p| p.coords());
        Ok(pixels)
    }
}

impl Iterator for HicPixelIter {
    type Item = Result<ThinPixel<CountValue>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pixel) = self.buffer.next() {
                return Some(Ok(pixel));
            }
            if self.done {
                return None;
            }

            let Some((span, row)) = self.bands.next() else {
                self.done = true;
                return None;
            };
            match self.load_band(span, row) {
                Ok(pixels) => self.buffer = pixels.into_iter(),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

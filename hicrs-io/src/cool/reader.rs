use std::fs::File;
use std::io::{self, Cursor};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;

use hicrs_core::models::{BinTable, CountValue, ThinPixel};

use super::{COOL_MAGIC, COOL_VERSION, DIVISIVE_WEIGHTS, FLOAT_COUNTS, INT_COUNTS};
use crate::attributes::Attributes;
use crate::codec::{self, Region};
use crate::error::{Result, StoreError};
use crate::store::{PixelStore, PixelStream, StoreFormat, WeightKind, Weights};

#[derive(Debug, Clone)]
struct WeightEntry {
    name: String,
    kind: WeightKind,
    offset: u64,
    len: u64,
}

#[derive(Debug)]
enum ChunkCounts {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

#[derive(Debug)]
struct Chunk {
    bin2_id: Vec<u64>,
    counts: ChunkCounts,
}

impl Chunk {
    fn get(&self, i: usize) -> (u64, CountValue) {
        let count = match &self.counts {
            ChunkCounts::Int(v) => CountValue::Int(v[i]),
            ChunkCounts::Float(v) => CountValue::Float(v[i]),
        };
        (self.bin2_id[i], count)
    }
}

///
/// Reader for the cooler-style layout.
///
#[derive(Debug)]
pub struct CoolStore {
    path: PathBuf,
    uri: String,
    file: Mutex<File>,
    region: Region,

    attributes: Attributes,
    bins: Arc<BinTable>,
    float_counts: bool,
    chunk_size: u64,
    nnz: u64,
    chunks: Vec<(u64, u64)>,
    bin1_offset: Vec<u64>,
    weights: Vec<WeightEntry>,
}

impl CoolStore {
    ///
    /// Open a standalone file.
    ///
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let region = Region::whole(&mut file)?;
        Self::from_file(file, path, region, path.display().to_string())
    }

    ///
    /// Open a payload embedded in a larger file.
    ///
    /// # Arguments
    /// - path: the file holding the payload
    /// - region: location of the payload within the file
    /// - uri: name used to refer to the payload
    ///
    pub fn open_region<P: AsRef<Path>>(path: P, region: Region, uri: String) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_file(file, path, region, uri)
    }

    fn from_file(mut file: File, path: &Path, region: Region, uri: String) -> Result<Self> {
        let corrupt = |reason: String| StoreError::Corrupt {
            path: uri.clone(),
            format: "cool",
            reason,
        };

        let (magic, version) = codec::read_header(&mut file, region)
            .map_err(|e| corrupt(format!("unable to read header: {}", e)))?;
        if magic != COOL_MAGIC {
            return Err(corrupt("bad magic number".to_string()));
        }
        if version != COOL_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path: uri.clone(),
                format: "cool",
                version,
            });
        }

        let (index_offset, magic) = codec::read_trailer(&mut file, region)?;
        if magic != COOL_MAGIC {
            return Err(corrupt("bad trailer, file was not finalized".to_string()));
        }
        let index_len = region
            .len
            .checked_sub(codec::TRAILER_LEN + index_offset)
            .ok_or_else(|| corrupt(format!("invalid index offset {}", index_offset)))?;
        let index = codec::read_blob(&mut file, region, index_offset, index_len)?;
        let mut index = Cursor::new(index);

        let attributes = Attributes::from_json(&codec::read_string(&mut index)?)?;
        let reference = codec::read_reference(&mut index)?;
        let bins = codec::read_bin_table(&mut index, reference)?;

        let float_counts = match index.read_u8()? {
            INT_COUNTS => false,
            FLOAT_COUNTS => true,
            other => return Err(corrupt(format!("unknown count type {}", other))),
        };
        let chunk_size = index.read_u32::<LittleEndian>()? as u64;
        let nnz = index.read_u64::<LittleEndian>()?;

        let nchunks = index.read_u32::<LittleEndian>()?;
        let mut chunks = Vec::with_capacity(nchunks as usize);
        for _ in 0..nchunks {
            let offset = index.read_u64::<LittleEndian>()?;
            let len = index.read_u64::<LittleEndian>()?;
            chunks.push((offset, len));
        }

        let noffsets = index.read_u64::<LittleEndian>()?;
        if noffsets != bins.len() + 1 {
            return Err(corrupt(format!(
                "bin1_offset has {} entries, expected {}",
                noffsets,
                bins.len() + 1
            )));
        }
        let mut bin1_offset = vec![0u64; noffsets as usize];
        index.read_u64_into::<LittleEndian>(&mut bin1_offset)?;
        if bin1_offset.first() != Some(&0)
            || bin1_offset.last() != Some(&nnz)
            || bin1_offset.windows(2).any(|w| w[0] > w[1])
        {
            return Err(corrupt(
                "bin1_offset is not an increasing index over the pixels".to_string(),
            ));
        }
        let expected_chunks = if chunk_size == 0 {
            0
        } else {
            nnz.div_ceil(chunk_size)
        };
        if (chunk_size == 0 && nnz != 0) || chunks.len() as u64 != expected_chunks {
            return Err(corrupt(format!(
                "found {} pixel chunks, expected {}",
                chunks.len(),
                expected_chunks
            )));
        }

        let nweights = index.read_u32::<LittleEndian>()?;
        let mut weights = Vec::with_capacity(nweights as usize);
        for _ in 0..nweights {
            let name = codec::read_string(&mut index)?;
            let kind = if index.read_u8()? == DIVISIVE_WEIGHTS {
                WeightKind::Divisive
            } else {
                WeightKind::Multiplicative
            };
            let offset = index.read_u64::<LittleEndian>()?;
            let len = index.read_u64::<LittleEndian>()?;
            weights.push(WeightEntry {
                name,
                kind,
                offset,
                len,
            });
        }

        debug!(
            "opened {} ({} bins, {} pixels, {} chunks)",
            uri,
            bins.len(),
            nnz,
            chunks.len()
        );

        Ok(CoolStore {
            path: path.to_path_buf(),
            uri,
            file: Mutex::new(file),
            region,
            attributes,
            bins: Arc::new(bins),
            float_counts,
            chunk_size,
            nnz,
            chunks,
            bin1_offset,
            weights,
        })
    }

    pub fn nnz(&self) -> u64 {
        self.nnz
    }

    fn read_blob(&self, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        codec::read_blob(&mut *file, self.region, offset, len)
    }

    fn read_chunk(&self, idx: usize) -> Result<Chunk> {
        let (offset, len) = self.chunks.get(idx).copied().ok_or_else(|| StoreError::Corrupt {
            path: self.uri.clone(),
            format: "cool",
            reason: format!("missing pixel chunk #{}", idx),
        })?;

        let first = idx as u64 * self.chunk_size;
        let n = self.chunk_size.min(self.nnz.saturating_sub(first)) as usize;

        let data = self.read_blob(offset, len)?;
        let mut reader = Cursor::new(data);

        let mut bin2_id = vec![0u64; n];
        reader.read_u64_into::<LittleEndian>(&mut bin2_id)?;
        let counts = if self.float_counts {
            let mut counts = vec![0f64; n];
            reader.read_f64_into::<LittleEndian>(&mut counts)?;
            ChunkCounts::Float(counts)
        } else {
            let mut counts = vec![0i64; n];
            reader.read_i64_into::<LittleEndian>(&mut counts)?;
            ChunkCounts::Int(counts)
        };

        Ok(Chunk { bin2_id, counts })
    }
}

impl PixelStore for CoolStore {
    fn format(&self) -> StoreFormat {
        StoreFormat::Cooler
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn uri(&self) -> String {
        self.uri.clone()
    }

    fn bins(&self) -> &Arc<BinTable> {
        &self.bins
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn has_float_counts(&self) -> bool {
        self.float_counts
    }

    fn read_pixel_range(
        self: Arc<Self>,
        bin1: Range<u64>,
        bin2: Range<u64>,
    ) -> Result<PixelStream> {
        let nbins = self.bins.len();
        let rows = bin1.start.min(nbins)..bin1.end.min(nbins);
        let cols = bin2.start.min(nbins)..bin2.end.min(nbins);

        Ok(Box::new(CoolPixelIter {
            store: self,
            next_row: rows.start,
            rows_end: rows.end,
            cols,
            row: 0,
            pos: 0,
            pos_end: 0,
            chunk: None,
            done: false,
        }))
    }

    fn list_normalizations(&self) -> Vec<String> {
        self.weights.iter().map(|w| w.name.clone()).collect()
    }

    fn read_normalization(&self, name: &str) -> Result<Weights> {
        let entry = self
            .weights
            .iter()
            .find(|w| w.name == name)
            .ok_or_else(|| StoreError::NormalizationNotFound {
                path: self.uri.clone(),
                name: name.to_string(),
            })?;

        let data = self.read_blob(entry.offset, entry.len)?;
        let mut values = vec![0f64; self.bins.len() as usize];
        Cursor::new(data).read_f64_into::<LittleEndian>(&mut values)?;
        Ok(Weights::new(values, entry.kind))
    }
}

///
/// Walks the CSR index row by row, decoding one chunk at a time.
///
struct CoolPixelIter {
    store: Arc<CoolStore>,
    next_row: u64,
    rows_end: u64,
    cols: Range<u64>,

    row: u64,
    pos: u64,
    pos_end: u64,
    chunk: Option<(usize, Chunk)>,
    done: bool,
}

impl CoolPixelIter {
    fn pixel_at(&mut self, pos: u64) -> Result<(u64, CountValue)> {
        let idx = (pos / self.store.chunk_size) as usize;
        let offset = (pos % self.store.chunk_size) as usize;

        match &self.chunk {
            Some((loaded, chunk)) if *loaded == idx => Ok(chunk.get(offset)),
            _ => {
                let chunk = self.store.read_chunk(idx)?;
                let pixel = chunk.get(offset);
                self.chunk = Some((idx, chunk));
                Ok(pixel)
            }
        }
    }
}

impl Iterator for CoolPixelIter {
    type Item = Result<ThinPixel<CountValue>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cols.is_empty() {
            return None;
        }

        loop {
            if self.pos >= self.pos_end {
                if self.next_row >= self.rows_end {
                    self.done = true;
                    return None;
                }
                self.row = self.next_row;
                self.pos = self.store.bin1_offset[self.row as usize];
                self.pos_end = self.store.bin1_offset[self.row as usize + 1];
                self.next_row += 1;
                continue;
            }

            let (bin2_id, count) = match self.pixel_at(self.pos) {
                Ok(pixel) => pixel,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            self.pos += 1;

            if bin2_id < self.cols.start {
                continue;
            }
            if bin2_id >= self.cols.end {
                // bin2 ids are sorted within a row
                self.pos = self.pos_end;
                continue;
            }

            return Some(Ok(ThinPixel::new(self.row, bin2_id, count)));
        }
    }
}

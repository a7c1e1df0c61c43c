use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use log::debug;

use hicrs_core::models::{BinTable, CountValue, ThinPixel};

use super::{
    COOL_MAGIC, COOL_VERSION, DEFAULT_CHUNK_SIZE, DIVISIVE_WEIGHTS, FLOAT_COUNTS, INT_COUNTS,
    MULTIPLICATIVE_WEIGHTS,
};
use crate::attributes::Attributes;
use crate::codec;
use crate::error::{Result, StoreError};
use crate::store::{OrderCheck, PixelSink, WeightKind, Weights};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoolSinkOptions {
    /// Pixels per compressed chunk.
    pub chunk_size: u32,
    /// zlib compression level, 0-9.
    pub compression_level: u32,
}

impl Default for CoolSinkOptions {
    fn default() -> Self {
        CoolSinkOptions {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression_level: 6,
        }
    }
}

///
/// Streaming writer for the cooler-style layout.
///
pub struct CoolSink {
    writer: BufWriter<File>,
    path: PathBuf,
    position: u64,

    bins: Arc<BinTable>,
    float_counts: bool,
    options: CoolSinkOptions,
    attributes: Attributes,

    order: OrderCheck,
    row_counts: Vec<u64>,
    bin2_id: Vec<u64>,
    counts: Vec<CountValue>,
    chunks: Vec<(u64, u64)>,
    nnz: u64,
    sum: CountValue,
    cis: CountValue,
}

impl CoolSink {
    pub fn create<P: AsRef<Path>>(
        path: P,
        bins: Arc<BinTable>,
        float_counts: bool,
        attributes: Attributes,
        options: CoolSinkOptions,
    ) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::from_file(file, path.as_ref(), bins, float_counts, attributes, options)
    }

    ///
    /// Write to an already opened (empty) file.
    ///
    pub fn from_file(
        file: File,
        path: &Path,
        bins: Arc<BinTable>,
        float_counts: bool,
        attributes: Attributes,
        options: CoolSinkOptions,
    ) -> Result<Self> {
        let mut writer = BufWriter::new(file);
        codec::write_header(&mut writer, &COOL_MAGIC, COOL_VERSION)?;

        let zero = if float_counts {
            CountValue::Float(0.0)
        } else {
            CountValue::Int(0)
        };
        let nbins = bins.len() as usize;
        let options = CoolSinkOptions {
            chunk_size: options.chunk_size.max(1),
            ..options
        };

        Ok(CoolSink {
            writer,
            path: path.to_path_buf(),
            position: codec::HEADER_LEN,
            bins,
            float_counts,
            options,
            attributes,
            order: OrderCheck::default(),
            row_counts: vec![0; nbins],
            bin2_id: Vec::with_capacity(options.chunk_size as usize),
            counts: Vec::with_capacity(options.chunk_size as usize),
            chunks: Vec::new(),
            nnz: 0,
            sum: zero,
            cis: zero,
        })
    }

    fn write_block(&mut self, data: &[u8]) -> Result<(u64, u64)> {
        let compressed = codec::compress(data, self.options.compression_level)?;
        let offset = self.position;
        self.writer.write_all(&compressed)?;
        self.position += compressed.len() as u64;
        Ok((offset, compressed.len() as u64))
    }

    fn flush_chunk(&mut self) -> Result<()> {
        if self.bin2_id.is_empty() {
            return Ok(());
        }

        let mut data = Vec::with_capacity(self.bin2_id.len() * 16);
        for &id in &self.bin2_id {
            data.write_u64::<LittleEndian>(id)?;
        }
        for count in &self.counts {
            match *count {
                CountValue::Float(n) => data.write_f64::<LittleEndian>(n)?,
                CountValue::Int(n) => data.write_i64::<LittleEndian>(n)?,
            }
        }

        let entry = self.write_block(&data)?;
        self.chunks.push(entry);
        self.bin2_id.clear();
        self.counts.clear();
        Ok(())
    }

    fn coerce(&self, pixel: &ThinPixel<CountValue>) -> Result<CountValue> {
        match (self.float_counts, pixel.count) {
            (true, count) => Ok(CountValue::Float(count.as_f64())),
            (false, CountValue::Int(n)) => Ok(CountValue::Int(n)),
            (false, CountValue::Float(n)) if n.is_finite() && n.fract() == 0.0 => {
                Ok(CountValue::Int(n as i64))
            }
            (false, CountValue::Float(n)) => Err(StoreError::InvalidPixel {
                bin1_id: pixel.bin1_id,
                bin2_id: pixel.bin2_id,
                reason: format!("count {} cannot be stored in a file with integer counts", n),
            }),
        }
    }
}

impl PixelSink for CoolSink {
    fn append(&mut self, pixel: ThinPixel<CountValue>) -> Result<()> {
        self.order.check(&pixel, self.bins.len())?;
        let count = self.coerce(&pixel)?;

        if self.bins.get(pixel.bin1_id)?.chrom == self.bins.get(pixel.bin2_id)?.chrom {
            self.cis = self.cis + count;
        }
        self.sum = self.sum + count;
        self.nnz += 1;
        self.row_counts[pixel.bin1_id as usize] += 1;

        self.bin2_id.push(pixel.bin2_id);
        self.counts.push(count);
        if self.bin2_id.len() >= self.options.chunk_size as usize {
            self.flush_chunk()?;
        }
        Ok(())
    }

    fn write_index(mut self: Box<Self>, balancing: &[(String, Weights)]) -> Result<Attributes> {
        self.flush_chunk()?;

        let nbins = self.bins.len();
        let mut weight_entries = Vec::with_capacity(balancing.len());
        for (name, weights) in balancing {
            if weights.len() as u64 != nbins {
                return Err(StoreError::WeightsLength {
                    name: name.clone(),
                    found: weights.len(),
                    expected: nbins,
                });
            }
            let mut data = Vec::with_capacity(weights.len() * 8);
            for &w in weights.values() {
                data.write_f64::<LittleEndian>(w)?;
            }
            let (offset, len) = self.write_block(&data)?;
            weight_entries.push((name.clone(), weights.kind(), offset, len));
        }

        let mut attributes = self.attributes.clone();
        attributes.nbins = nbins;
        attributes.nchroms = self.bins.reference().len() as u32;
        attributes.nnz = self.nnz;
        attributes.sum = self.sum;
        attributes.cis = self.cis;

        let mut index = Vec::new();
        codec::write_string(&mut index, &attributes.to_json()?)?;
        codec::write_reference(&mut index, self.bins.reference())?;
        codec::write_bin_table(&mut index, &self.bins)?;
        index.write_u8(if self.float_counts {
            FLOAT_COUNTS
        } else {
            INT_COUNTS
        })?;
        index.write_u32::<LittleEndian>(self.options.chunk_size)?;
        index.write_u64::<LittleEndian>(self.nnz)?;

        index.write_u32::<LittleEndian>(self.chunks.len() as u32)?;
        for &(offset, len) in &self.chunks {
            index.write_u64::<LittleEndian>(offset)?;
            index.write_u64::<LittleEndian>(len)?;
        }

        index.write_u64::<LittleEndian>(nbins + 1)?;
        let mut offset = 0u64;
        index.write_u64::<LittleEndian>(offset)?;
        for &n in &self.row_counts {
            offset += n;
            index.write_u64::<LittleEndian>(offset)?;
        }

        index.write_u32::<LittleEndian>(weight_entries.len() as u32)?;
        for (name, kind, offset, len) in &weight_entries {
            codec::write_string(&mut index, name)?;
            index.write_u8(match kind {
                WeightKind::Multiplicative => MULTIPLICATIVE_WEIGHTS,
                WeightKind::Divisive => DIVISIVE_WEIGHTS,
            })?;
            index.write_u64::<LittleEndian>(*offset)?;
            index.write_u64::<LittleEndian>(*len)?;
        }

        let (index_offset, _) = self.write_block(&index)?;
        codec::write_trailer(&mut self.writer, index_offset, &COOL_MAGIC)?;

        debug!(
            "wrote {} pixels in {} chunks to {}",
            attributes.nnz,
            self.chunks.len(),
            self.path.display()
        );

        let CoolSink { writer, .. } = *self;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        file.sync_all()?;

        Ok(attributes)
    }
}

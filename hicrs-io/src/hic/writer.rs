use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use fxhash::FxHashMap;
use log::debug;
use rayon::prelude::*;

use hicrs_core::models::{BinTable, CountValue, Reference, ThinPixel};

use super::{DEFAULT_BLOCK_BIN_COUNT, HIC_MAGIC, HIC_VERSION};
use crate::attributes::Attributes;
use crate::codec;
use crate::error::{Result, StoreError};
use crate::store::{OrderCheck, PixelSink, WeightKind, Weights};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HicSinkOptions {
    /// Width of the square blocks, in bins.
    pub block_bin_count: u32,
    /// zlib compression level, 0-9.
    pub compression_level: u32,
}

impl Default for HicSinkOptions {
    fn default() -> Self {
        HicSinkOptions {
            block_bin_count: DEFAULT_BLOCK_BIN_COUNT,
            compression_level: 6,
        }
    }
}

// (chrom1, chrom2) -> (rel_bin1, rel_bin2) -> count
type Matrices = FxHashMap<(u32, u32), FxHashMap<(u32, u32), f64>>;

struct EncodedResolution {
    nnz: u64,
    sum: f64,
    cis: f64,
    // ((chrom1, chrom2), [((row, col), compressed block)])
    matrices: Vec<((u32, u32), Vec<((u32, u32), Vec<u8>)>)>,
}

///
/// Writer for the hic-style layout.
///
/// Pixels are appended at the base (smallest) resolution; coarser resolutions
/// are accumulated on the fly and every resolution is tiled and written by
/// [`PixelSink::write_index`].
///
pub struct HicSink {
    writer: BufWriter<File>,
    path: PathBuf,
    position: u64,

    bins: Arc<BinTable>,
    resolutions: Vec<u32>,
    attributes: Attributes,
    options: HicSinkOptions,

    order: OrderCheck,
    matrices: Vec<Matrices>,
}

impl HicSink {
    ///
    /// Check a list of resolutions and return it sorted: it must not be empty
    /// and every resolution must be a multiple of the smallest one.
    ///
    pub fn validate_resolutions(resolutions: &[u32]) -> Result<Vec<u32>> {
        let mut resolutions = resolutions.to_vec();
        resolutions.sort_unstable();
        resolutions.dedup();

        let Some(&base) = resolutions.first() else {
            return Err(StoreError::InvalidResolutions(
                "please provide one or more resolutions".to_string(),
            ));
        };
        if base == 0 {
            return Err(StoreError::InvalidResolutions(
                "resolutions should be greater than zero".to_string(),
            ));
        }
        if let Some(r) = resolutions.iter().find(|&&r| r % base != 0) {
            return Err(StoreError::InvalidResolutions(format!(
                "resolution {} is not a multiple of the base resolution {}",
                r, base
            )));
        }
        Ok(resolutions)
    }

    pub fn create<P: AsRef<Path>>(
        path: P,
        reference: Reference,
        resolutions: &[u32],
        attributes: Attributes,
        options: HicSinkOptions,
    ) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::from_file(file, path.as_ref(), reference, resolutions, attributes, options)
    }

    pub fn from_file(
        file: File,
        path: &Path,
        reference: Reference,
        resolutions: &[u32],
        attributes: Attributes,
        options: HicSinkOptions,
    ) -> Result<Self> {
        let resolutions = Self::validate_resolutions(resolutions)?;
        let bins = BinTable::fixed(reference, resolutions[0])?;

        let mut writer = BufWriter::new(file);
        codec::write_header(&mut writer, &HIC_MAGIC, HIC_VERSION)?;

        Ok(HicSink {
            writer,
            path: path.to_path_buf(),
            position: codec::HEADER_LEN,
            bins: Arc::new(bins),
            matrices: vec![Matrices::default(); resolutions.len()],
            resolutions,
            attributes,
            options: HicSinkOptions {
                block_bin_count: options.block_bin_count.max(1),
                ..options
            },
            order: OrderCheck::default(),
        })
    }

    ///
    /// Bin table of the base resolution, the one pixels are appended at.
    ///
    pub fn bins(&self) -> &Arc<BinTable> {
        &self.bins
    }

    fn write_block(&mut self, data: &[u8]) -> Result<(u64, u64)> {
        let offset = self.position;
        self.writer.write_all(data)?;
        self.position += data.len() as u64;
        Ok((offset, data.len() as u64))
    }
}

fn encode_resolution(
    matrices: &Matrices,
    block_bin_count: u32,
    compression_level: u32,
) -> Result<EncodedResolution> {
    let mut encoded = EncodedResolution {
        nnz: 0,
        sum: 0.0,
        cis: 0.0,
        matrices: Vec::with_capacity(matrices.len()),
    };

    let mut keys: Vec<&(u32, u32)> = matrices.keys().collect();
    keys.sort_unstable();

    for key in keys {
        let mut blocks: FxHashMap<(u32, u32), Vec<(u32, u32, f32)>> = FxHashMap::default();
        for (&(bin1, bin2), &count) in &matrices[key] {
            blocks
                .entry((bin1 / block_bin_count, bin2 / block_bin_count))
                .or_default()
                .push((bin1, bin2, count as f32));

            encoded.nnz += 1;
            encoded.sum += count;
            if key.0 == key.1 {
                encoded.cis += count;
            }
        }

        let mut block_ids: Vec<(u32, u32)> = blocks.keys().copied().collect();
        block_ids.sort_unstable();

        let mut encoded_blocks = Vec::with_capacity(block_ids.len());
        for block_id in block_ids {
            let mut pixels = blocks.remove(&block_id).unwrap_or_default();
            pixels.sort_unstable_by_key(|&(bin1, bin2, _)| (bin1, bin2));

            let mut data = Vec::with_capacity(4 + pixels.len() * 12);
            data.write_u32::<LittleEndian>(pixels.len() as u32)?;
            for (bin1, bin2, count) in pixels {
                data.write_u32::<LittleEndian>(bin1)?;
                data.write_u32::<LittleEndian>(bin2)?;
                data.write_f32::<LittleEndian>(count)?;
            }
            encoded_blocks.push((block_id, codec::compress(&data, compression_level)?));
        }
        encoded.matrices.push((*key, encoded_blocks));
    }

    Ok(encoded)
}

impl PixelSink for HicSink {
    fn append(&mut self, pixel: ThinPixel<CountValue>) -> Result<()> {
        self.order.check(&pixel, self.bins.len())?;

        let bin1 = self.bins.get(pixel.bin1_id)?;
        let bin2 = self.bins.get(pixel.bin2_id)?;
        let count = pixel.count.as_f64();
        let key = (bin1.chrom.id(), bin2.chrom.id());

        for (matrices, &resolution) in self.matrices.iter_mut().zip(&self.resolutions) {
            *matrices
                .entry(key)
                .or_default()
                .entry((bin1.start / resolution, bin2.start / resolution))
                .or_insert(0.0) += count;
        }
        Ok(())
    }

    fn write_index(mut self: Box<Self>, balancing: &[(String, Weights)]) -> Result<Attributes> {
        let block_bin_count = self.options.block_bin_count;
        let level = self.options.compression_level;

        let encoded = self
            .matrices
            .par_iter()
            .map(|matrices| encode_resolution(matrices, block_bin_count, level))
            .collect::<Result<Vec<_>>>()?;
        self.matrices.clear();

        let mut block_tables = Vec::with_capacity(encoded.len());
        for resolution in &encoded {
            let mut tables = Vec::with_capacity(resolution.matrices.len());
            for (key, blocks) in &resolution.matrices {
                let mut table = Vec::with_capacity(blocks.len());
                for (block_id, data) in blocks {
                    let (offset, len) = self.write_block(data)?;
                    table.push((*block_id, offset, len));
                }
                tables.push((*key, table));
            }
            block_tables.push(tables);
        }

        // balancing vectors refer to the base resolution
        let bins = self.bins.clone();
        let nbins = bins.len();
        let mut norm_entries = Vec::new();
        for (name, weights) in balancing {
            if weights.len() as u64 != nbins {
                return Err(StoreError::WeightsLength {
                    name: name.clone(),
                    found: weights.len(),
                    expected: nbins,
                });
            }
            let weights = weights.to_kind(WeightKind::Divisive);
            for chrom in bins.reference().iter() {
                let range = bins.chrom_bin_range(chrom.id())?;
                let mut data = Vec::with_capacity((range.end - range.start) as usize * 8);
                for &w in &weights.values()[range.start as usize..range.end as usize] {
                    data.write_f64::<LittleEndian>(w)?;
                }
                let compressed = codec::compress(&data, level)?;
                let (offset, len) = self.write_block(&compressed)?;
                norm_entries.push((name.clone(), chrom.id(), offset, len));
            }
        }

        let base = &encoded[0];
        let mut attributes = self.attributes.clone();
        attributes.bin_size = self.resolutions[0];
        attributes.nbins = nbins;
        attributes.nchroms = self.bins.reference().len() as u32;
        attributes.nnz = base.nnz;
        attributes.sum = CountValue::Float(base.sum);
        attributes.cis = CountValue::Float(base.cis);

        let mut index = Vec::new();
        codec::write_string(&mut index, &attributes.to_json()?)?;
        codec::write_reference(&mut index, self.bins.reference())?;
        index.write_u32::<LittleEndian>(block_bin_count)?;
        index.write_u32::<LittleEndian>(self.resolutions.len() as u32)?;
        for &resolution in &self.resolutions {
            index.write_u32::<LittleEndian>(resolution)?;
        }
        for (resolution, tables) in encoded.iter().zip(&block_tables) {
            index.write_u64::<LittleEndian>(resolution.nnz)?;
            index.write_f64::<LittleEndian>(resolution.sum)?;
            index.write_f64::<LittleEndian>(resolution.cis)?;
            index.write_u32::<LittleEndian>(tables.len() as u32)?;
            for ((chrom1, chrom2), blocks) in tables {
                index.write_u32::<LittleEndian>(*chrom1)?;
                index.write_u32::<LittleEndian>(*chrom2)?;
                index.write_u32::<LittleEndian>(blocks.len() as u32)?;
                for ((row, col), offset, len) in blocks {
                    index.write_u32::<LittleEndian>(*row)?;
                    index.write_u32::<LittleEndian>(*col)?;
                    index.write_u64::<LittleEndian>(*offset)?;
                    index.write_u64::<LittleEndian>(*len)?;
                }
            }
        }
        index.write_u32::<LittleEndian>(norm_entries.len() as u32)?;
        for (name, chrom_id, offset, len) in &norm_entries {
            codec::write_string(&mut index, name)?;
            index.write_u32::<LittleEndian>(self.resolutions[0])?;
            index.write_u32::<LittleEndian>(*chrom_id)?;
            index.write_u64::<LittleEndian>(*offset)?;
            index.write_u64::<LittleEndian>(*len)?;
        }

        let compressed = codec::compress(&index, level)?;
        let (index_offset, _) = self.write_block(&compressed)?;
        codec::write_trailer(&mut self.writer, index_offset, &HIC_MAGIC)?;

        debug!(
            "wrote {} resolutions ({} pixels at {} bp) to {}",
            self.resolutions.len(),
            attributes.nnz,
            self.resolutions[0],
            self.path.display()
        );

        let HicSink { writer, .. } = *self;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        file.sync_all()?;

        Ok(attributes)
    }
}

//! Transactional writers for single-resolution (cooler-style) and
//! multi-resolution (hic-style) files.
//!
//! Writers accept pixels in any order and in any number of chunks. Nothing is
//! visible at the destination until [`PixelWriter::finalize`] succeeds: the
//! output is assembled in a temporary file next to the destination and moved
//! into place as the last step.
mod chunk;
mod staging;

use std::fs::File as FsFile;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use log::{debug, info, warn};
use tempfile::NamedTempFile;

use hicrs_core::models::{BinTable, Chromosome, Reference};
use hicrs_io::cool::{COOL_VERSION, CoolSink, CoolSinkOptions};
use hicrs_io::hic::{HIC_VERSION, HicSink, HicSinkOptions};
use hicrs_io::{Attributes, COOL_FORMAT, HIC_FORMAT, PixelSink, StoreError, Weights};

use crate::config::WriterConfig;
use crate::errors::{HicError, Result};
use crate::file::File;

pub use chunk::{BG2_COLUMNS, COO_COLUMNS, Column};
use staging::Staging;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Ingesting,
    Finalized,
    Aborted,
}

///
/// State machine shared by both writers: ingestion, staging and the atomic
/// finalize step.
///
struct WriterCore {
    path: PathBuf,
    bins: Arc<BinTable>,
    config: WriterConfig,
    float_counts: bool,
    staging: Option<Staging>,
    balancing: Vec<(String, Weights)>,
    state: WriterState,
}

impl WriterCore {
    fn new(path: &Path, bins: BinTable, config: WriterConfig, float_counts: bool) -> Result<Self> {
        config.validate()?;
        if path.exists() {
            return Err(HicError::FileExists(path.display().to_string()));
        }
        let staging = Staging::new(config.tmpdir.as_deref(), config.buffer_size)?;
        info!(
            "creating file \"{}\" ({} bins, {} chromosomes)",
            path.display(),
            bins.len(),
            bins.reference().len()
        );

        Ok(WriterCore {
            path: path.to_path_buf(),
            bins: Arc::new(bins),
            config,
            float_counts,
            staging: Some(staging),
            balancing: Vec::new(),
            state: WriterState::Ingesting,
        })
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    fn staging(&mut self) -> Result<&mut Staging> {
        let path = self.display_path();
        match (self.state, self.staging.as_mut()) {
            (WriterState::Ingesting, Some(staging)) => Ok(staging),
            (WriterState::Finalized, _) => Err(HicError::AlreadyFinalized(path)),
            _ => Err(HicError::Aborted(path)),
        }
    }

    fn add_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.staging()?;
        let pixels = chunk::pixels_from_batch(batch, &self.bins, self.float_counts)?;
        debug!("adding {} pixels to \"{}\"", pixels.len(), self.path.display());
        self.staging()?.extend(pixels)
    }

    fn add_columns<'a>(
        &mut self,
        columns: impl IntoIterator<Item = (&'a str, &'a Column)>,
    ) -> Result<()> {
        self.staging()?;
        let pixels = chunk::pixels_from_columns(columns, &self.bins, self.float_counts)?;
        debug!("adding {} pixels to \"{}\"", pixels.len(), self.path.display());
        self.staging()?.extend(pixels)
    }

    fn add_normalization(&mut self, name: &str, weights: Weights) -> Result<()> {
        self.staging()?;
        if weights.len() as u64 != self.bins.len() {
            return Err(StoreError::WeightsLength {
                name: name.to_string(),
                found: weights.len(),
                expected: self.bins.len(),
            }
            .into());
        }
        self.balancing.retain(|(n, _)| n != name);
        self.balancing.push((name.to_string(), weights));
        Ok(())
    }

    fn attributes(&self, format: &str, version: u32) -> Attributes {
        let mut attributes = Attributes::new(
            format,
            version,
            &self.bins.kind().to_string(),
            self.bins.resolution(),
        );
        attributes.creation_date = chrono::Local::now()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        attributes.assembly = self.config.assembly.clone();
        attributes
    }

    ///
    /// Merge the staged pixels into a sink created by `make_sink` and move the
    /// result to the destination.
    ///
    fn finalize<F>(&mut self, make_sink: F) -> Result<Attributes>
    where
        F: FnOnce(FsFile, &Path) -> Result<Box<dyn PixelSink>>,
    {
        match self.state {
            WriterState::Finalized => {
                return Err(HicError::FinalizeCalledTwice(self.display_path()));
            }
            WriterState::Aborted => return Err(HicError::Aborted(self.display_path())),
            WriterState::Ingesting => {}
        }
        let Some(staging) = self.staging.take() else {
            return Err(HicError::Aborted(self.display_path()));
        };

        info!(
            "finalizing file \"{}\" ({} pixels received)...",
            self.path.display(),
            staging.staged()
        );
        match self.write(staging, make_sink) {
            Ok(attributes) => {
                self.state = WriterState::Finalized;
                info!(
                    "successfully finalized \"{}\" ({} pixels)",
                    self.path.display(),
                    attributes.nnz
                );
                Ok(attributes)
            }
            Err(e) => {
                self.state = WriterState::Aborted;
                warn!("failed to finalize \"{}\": {}", self.path.display(), e);
                Err(e)
            }
        }
    }

    fn write<F>(&self, staging: Staging, make_sink: F) -> Result<Attributes>
    where
        F: FnOnce(FsFile, &Path) -> Result<Box<dyn PixelSink>>,
    {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir)?;
        let mut sink = make_sink(tmp.as_file().try_clone()?, &self.path)?;

        for pixel in staging.merge()? {
            sink.append(pixel?)?;
        }
        let attributes = sink.write_index(&self.balancing)?;

        tmp.persist_noclobber(&self.path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                HicError::FileExists(self.display_path())
            } else {
                HicError::Io(e.error)
            }
        })?;
        Ok(attributes)
    }

    fn abort(&mut self) {
        if self.state == WriterState::Ingesting {
            warn!("discarding pixels staged for \"{}\"", self.path.display());
        }
        self.staging = None;
        if self.state != WriterState::Finalized {
            self.state = WriterState::Aborted;
        }
    }
}

///
/// Operations shared by [`FileWriter`] and [`HicFileWriter`].
///
pub trait PixelWriter {
    fn path(&self) -> &Path;

    ///
    /// Add a chunk of pixels in COO or BG2 layout. Pixels may come in any
    /// order; duplicates are summed. The chunk is validated as a whole before
    /// any of its pixels is staged.
    ///
    fn add_pixels(&mut self, batch: &RecordBatch) -> Result<()>;

    ///
    /// [`PixelWriter::add_pixels`] with columns given by name.
    ///
    fn add_pixels_from_columns<'a, I>(&mut self, columns: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a Column)>;

    ///
    /// Write the file and open it for reading. Can only succeed once.
    ///
    fn finalize(&mut self) -> Result<File>;

    ///
    /// Drop staged pixels without writing anything.
    ///
    fn abort(&mut self);

    fn is_finalized(&self) -> bool;
}

///
/// Writer of single-resolution, cooler-style files.
///
/// ```no_run
/// use hicrs::{Column, FileWriter, PixelWriter, WriterConfig};
/// use hicrs_core::models::Reference;
///
/// let reference = Reference::new([("chr1", 1000), ("chr2", 500)]).unwrap();
/// let mut writer =
///     FileWriter::create("out.cool", reference, 100, WriterConfig::default()).unwrap();
/// let (bin1, bin2, count) = (
///     Column::from(vec![0i64, 1]),
///     Column::from(vec![3i64, 1]),
///     Column::from(vec![10i64, 2]),
/// );
/// writer
///     .add_pixels_from_columns([("bin1_id", &bin1), ("bin2_id", &bin2), ("count", &count)])
///     .unwrap();
/// let file = writer.finalize().unwrap();
/// assert_eq!(file.nnz().unwrap(), 2);
/// ```
///
pub struct FileWriter {
    core: WriterCore,
}

impl FileWriter {
    pub fn create<P: AsRef<Path>>(
        path: P,
        reference: Reference,
        resolution: u32,
        config: WriterConfig,
    ) -> Result<Self> {
        Self::with_bins(path, BinTable::fixed(reference, resolution)?, config)
    }

    ///
    /// Writer over an arbitrary (possibly variable-width) bin table.
    ///
    pub fn with_bins<P: AsRef<Path>>(path: P, bins: BinTable, config: WriterConfig) -> Result<Self> {
        let float_counts = config.float_counts;
        Ok(FileWriter {
            core: WriterCore::new(path.as_ref(), bins, config, float_counts)?,
        })
    }

    pub fn bins(&self) -> &Arc<BinTable> {
        &self.core.bins
    }

    pub fn chromosomes(&self, include_all: bool) -> Vec<Chromosome> {
        self.core.bins.chromosomes(include_all)
    }

    pub fn resolution(&self) -> u32 {
        self.core.bins.resolution()
    }

    ///
    /// Store a balancing vector with the matrix. Weights are one per bin.
    ///
    pub fn add_normalization(&mut self, name: &str, weights: Weights) -> Result<()> {
        self.core.add_normalization(name, weights)
    }
}

impl PixelWriter for FileWriter {
    fn path(&self) -> &Path {
        &self.core.path
    }

    fn add_pixels(&mut self, batch: &RecordBatch) -> Result<()> {
        self.core.add_batch(batch)
    }

    fn add_pixels_from_columns<'a, I>(&mut self, columns: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a Column)>,
    {
        self.core.add_columns(columns)
    }

    fn finalize(&mut self) -> Result<File> {
        let attributes = self.core.attributes(COOL_FORMAT, COOL_VERSION);
        let bins = self.core.bins.clone();
        let float_counts = self.core.float_counts;
        let options = CoolSinkOptions {
            chunk_size: self.core.config.chunk_size,
            compression_level: self.core.config.compression_level,
        };
        self.core.finalize(|file, path| {
            let sink = CoolSink::from_file(file, path, bins, float_counts, attributes, options)?;
            Ok(Box::new(sink) as Box<dyn PixelSink>)
        })?;
        File::open(&self.core.path)
    }

    fn abort(&mut self) {
        self.core.abort()
    }

    fn is_finalized(&self) -> bool {
        self.core.state == WriterState::Finalized
    }
}

///
/// Writer of multi-resolution, hic-style files. Pixels are given at the base
/// (finest) resolution; coarser resolutions are derived when finalizing.
///
pub struct HicFileWriter {
    core: WriterCore,
    resolutions: Vec<u32>,
}

impl HicFileWriter {
    pub fn create<P: AsRef<Path>>(
        path: P,
        reference: Reference,
        resolutions: &[u32],
        config: WriterConfig,
    ) -> Result<Self> {
        let resolutions = HicSink::validate_resolutions(resolutions)?;
        let bins = BinTable::fixed(reference, resolutions[0])?;
        Ok(HicFileWriter {
            core: WriterCore::new(path.as_ref(), bins, config, true)?,
            resolutions,
        })
    }

    /// Sorted resolutions, the base one first.
    pub fn resolutions(&self) -> &[u32] {
        &self.resolutions
    }

    /// Bins of the base resolution.
    pub fn bins(&self) -> &Arc<BinTable> {
        &self.core.bins
    }

    pub fn chromosomes(&self, include_all: bool) -> Vec<Chromosome> {
        self.core.bins.chromosomes(include_all)
    }

    ///
    /// Store a balancing vector for the base resolution.
    ///
    pub fn add_normalization(&mut self, name: &str, weights: Weights) -> Result<()> {
        self.core.add_normalization(name, weights)
    }
}

impl PixelWriter for HicFileWriter {
    fn path(&self) -> &Path {
        &self.core.path
    }

    fn add_pixels(&mut self, batch: &RecordBatch) -> Result<()> {
        self.core.add_batch(batch)
    }

    fn add_pixels_from_columns<'a, I>(&mut self, columns: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a Column)>,
    {
        self.core.add_columns(columns)
    }

    fn finalize(&mut self) -> Result<File> {
        let attributes = self.core.attributes(HIC_FORMAT, HIC_VERSION);
        let reference = self.core.bins.reference().clone();
        let resolutions = self.resolutions.clone();
        let options = HicSinkOptions {
            block_bin_count: self.core.config.block_bin_count,
            compression_level: self.core.config.compression_level,
        };
        self.core.finalize(|file, path| {
            let sink = HicSink::from_file(file, path, reference, &resolutions, attributes, options)?;
            Ok(Box::new(sink) as Box<dyn PixelSink>)
        })?;
        File::open_resolution(&self.core.path, self.resolutions[0])
    }

    fn abort(&mut self) {
        self.core.abort()
    }

    fn is_finalized(&self) -> bool {
        self.core.state == WriterState::Finalized
    }
}

///
/// Scope guard around a writer: dropping the guard finalizes the writer, unless
/// the thread is unwinding from a panic, in which case staged pixels are
/// discarded.
///
pub struct WriterGuard<W: PixelWriter> {
    writer: W,
    done: bool,
}

impl<W: PixelWriter> WriterGuard<W> {
    pub fn new(writer: W) -> Self {
        WriterGuard {
            writer,
            done: false,
        }
    }

    ///
    /// Finalize now and report the outcome, instead of on drop.
    ///
    pub fn finish(mut self) -> Result<File> {
        self.done = true;
        self.writer.finalize()
    }

    pub fn abort(mut self) {
        self.done = true;
        self.writer.abort();
    }
}

impl<W: PixelWriter> Deref for WriterGuard<W> {
    type Target = W;

    fn deref(&self) -> &W {
        &self.writer
    }
}

impl<W: PixelWriter> DerefMut for WriterGuard<W> {
    fn deref_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

impl<W: PixelWriter> Drop for WriterGuard<W> {
    fn drop(&mut self) {
        if self.done || self.writer.is_finalized() {
            return;
        }
        if std::thread::panicking() {
            self.writer.abort();
            return;
        }
        if let Err(e) = self.writer.finalize() {
            warn!(
                "failed to finalize \"{}\" on drop: {}",
                self.writer.path().display(),
                e
            );
        }
    }
}

///
/// Run `body` against a writer, finalizing it when `body` succeeds and
/// discarding staged pixels when it fails.
///
pub fn with_writer<W, T, F>(writer: W, body: F) -> Result<(T, File)>
where
    W: PixelWriter,
    F: FnOnce(&mut W) -> Result<T>,
{
    let mut guard = WriterGuard::new(writer);
    match body(&mut guard.writer) {
        Ok(value) => Ok((value, guard.finish()?)),
        Err(e) => {
            guard.abort();
            Err(e)
        }
    }
}

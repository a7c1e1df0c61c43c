use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use fxhash::{FxHashMap, FxHashSet};
use log::{debug, info};

use hicrs_core::models::{BinTable, Chromosome, CountType, CountValue, GenomicInterval, Reference};
use hicrs_io::container::Container;
use hicrs_io::cool::CoolStore;
use hicrs_io::hic::HicFile;
use hicrs_io::{
    Attributes, PixelStore, StoreError, StoreFormat, WeightKind, Weights, looks_like_coolerfile,
    looks_like_hicfile, looks_like_multires, looks_like_singlecell,
};

use crate::errors::{HicError, Result};
use crate::selector::{FetchOptions, PixelSelector};

/// Name of the identity normalization.
pub const NO_NORMALIZATION: &str = "NONE";

///
/// State shared between a [`File`] and the selectors derived from it.
///
pub(crate) struct FileInner {
    path: PathBuf,
    uri: String,
    format: StoreFormat,
    bins: Arc<BinTable>,
    attributes: Attributes,
    float_counts: bool,

    closed: AtomicBool,
    store: RwLock<Option<Arc<dyn PixelStore>>>,
    // multiplicative weights, built once per name
    normalizations: RwLock<FxHashMap<String, Arc<Weights>>>,
}

impl FileInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(HicError::FileClosed(self.uri.clone()));
        }
        Ok(())
    }

    pub(crate) fn store(&self) -> Result<Arc<dyn PixelStore>> {
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        match store.as_ref() {
            Some(store) if !self.is_closed() => Ok(store.clone()),
            _ => Err(HicError::FileClosed(self.uri.clone())),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.store.write().unwrap_or_else(|e| e.into_inner()).take();
        self.normalizations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    ///
    /// Multiplicative weights of a normalization, or `None` for [`NO_NORMALIZATION`].
    ///
    pub(crate) fn normalization(&self, name: &str) -> Result<Option<Arc<Weights>>> {
        if name == NO_NORMALIZATION {
            return Ok(None);
        }
        let store = self.store()?;

        if let Some(weights) = self
            .normalizations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Ok(Some(weights.clone()));
        }

        let mut cache = self.normalizations.write().unwrap_or_else(|e| e.into_inner());
        if let Some(weights) = cache.get(name) {
            return Ok(Some(weights.clone()));
        }
        let weights = Arc::new(
            store
                .read_normalization(name)?
                .to_kind(WeightKind::Multiplicative),
        );
        debug!("loaded normalization {} of {}", name, self.uri);
        cache.insert(name.to_string(), weights.clone());
        Ok(Some(weights))
    }
}

///
/// A single-resolution contact matrix, backed by either storage format.
///
/// Cloning a `File` yields another handle to the same backend; closing any of
/// the handles closes all of them and invalidates every selector derived from
/// them.
///
/// ```no_run
/// use hicrs::File;
///
/// let file = File::open("matrix.mcool::/resolutions/100000").unwrap();
/// let selector = file.fetch("chr2L", "chrX").unwrap();
/// println!("{}", selector.sum().unwrap());
/// ```
///
#[derive(Clone)]
pub struct File {
    inner: Arc<FileInner>,
}

impl File {
    ///
    /// Open a matrix from a path or URI.
    ///
    /// Accepted forms: a cooler-style file, a hic-style or multi-resolution file
    /// holding a single resolution, `path::/resolutions/R` and `path::/cells/NAME`.
    ///
    pub fn open<P: AsRef<Path>>(uri: P) -> Result<Self> {
        let uri = uri.as_ref().to_string_lossy().to_string();
        let Some((path, group)) = uri.split_once("::") else {
            return Self::open_path(&uri);
        };

        let group = group.trim_start_matches('/');
        if let Some(resolution) = group.strip_prefix("resolutions/") {
            let resolution = resolution
                .parse::<u32>()
                .map_err(|_| HicError::UnsupportedFile {
                    path: uri.clone(),
                    reason: format!("\"{}\" is not a valid resolution", resolution),
                })?;
            return Self::open_resolution(path, resolution);
        }
        if let Some(cell) = group.strip_prefix("cells/") {
            if !looks_like_singlecell(path) {
                return Err(HicError::UnsupportedFile {
                    path: path.to_string(),
                    reason: "not a single-cell file".to_string(),
                });
            }
            let store = Container::open(path)?.open_cell(cell)?;
            return Ok(Self::from_store(Arc::new(store)));
        }

        Err(HicError::UnsupportedFile {
            path: uri.clone(),
            reason: format!("unknown group \"{}\"", group),
        })
    }

    ///
    /// Open one resolution of a multi-resolution or hic-style file. Cooler-style
    /// files are accepted when their resolution matches.
    ///
    pub fn open_resolution<P: AsRef<Path>>(path: P, resolution: u32) -> Result<Self> {
        let path = path.as_ref();
        if looks_like_hicfile(path) {
            let store = HicFile::open(path)?.store(resolution)?;
            return Ok(Self::from_store(Arc::new(store)));
        }
        if looks_like_multires(path) {
            let store = Container::open(path)?.open_resolution(resolution)?;
            return Ok(Self::from_store(Arc::new(store)));
        }
        if looks_like_coolerfile(path) {
            let store = CoolStore::open(path)?;
            let found = store.bins().resolution();
            if found != resolution {
                return Err(StoreError::ResolutionNotFound {
                    path: path.display().to_string(),
                    resolution,
                    available: found.to_string(),
                }
                .into());
            }
            return Ok(Self::from_store(Arc::new(store)));
        }
        Err(Self::unknown_format(path))
    }

    fn open_path(path: &str) -> Result<Self> {
        if looks_like_coolerfile(path) {
            return Ok(Self::from_store(Arc::new(CoolStore::open(path)?)));
        }

        let resolutions = if looks_like_hicfile(path) {
            HicFile::open(path)?.resolutions()
        } else if looks_like_multires(path) {
            Container::open(path)?.resolutions()
        } else if looks_like_singlecell(path) {
            return Err(HicError::UnsupportedFile {
                path: path.to_string(),
                reason: format!(
                    "single-cell files should be opened with SingleCellFile or through \"{}::/cells/NAME\"",
                    path
                ),
            });
        } else {
            return Err(Self::unknown_format(Path::new(path)));
        };

        match resolutions.as_slice() {
            [resolution] => Self::open_resolution(path, *resolution),
            _ => Err(HicError::UnsupportedFile {
                path: path.to_string(),
                reason: format!(
                    "file has {} resolutions ({}), use \"{}::/resolutions/R\" to pick one",
                    resolutions.len(),
                    resolutions
                        .iter()
                        .map(|r| r.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                    path
                ),
            }),
        }
    }

    fn unknown_format(path: &Path) -> HicError {
        if !path.exists() {
            return HicError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: \"{}\"", path.display()),
            ));
        }
        HicError::UnsupportedFile {
            path: path.display().to_string(),
            reason: "not a cooler-style, hic-style, multi-resolution or single-cell file"
                .to_string(),
        }
    }

    pub(crate) fn from_store(store: Arc<dyn PixelStore>) -> Self {
        info!("opened {}", store.uri());
        File {
            inner: Arc::new(FileInner {
                path: store.path().to_path_buf(),
                uri: store.uri(),
                format: store.format(),
                bins: store.bins().clone(),
                attributes: store.attributes().clone(),
                float_counts: store.has_float_counts(),
                closed: AtomicBool::new(false),
                store: RwLock::new(Some(store)),
                normalizations: RwLock::new(FxHashMap::default()),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<FileInner> {
        Arc::downgrade(&self.inner)
    }

    fn live(&self) -> Result<&FileInner> {
        self.inner.ensure_open()?;
        Ok(&self.inner)
    }

    pub fn path(&self) -> Result<&Path> {
        Ok(&self.live()?.path)
    }

    /// Identifier of the file; still available after [`File::close`].
    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    pub fn is_cooler(&self) -> Result<bool> {
        Ok(self.live()?.format == StoreFormat::Cooler)
    }

    pub fn is_hic(&self) -> Result<bool> {
        Ok(self.live()?.format == StoreFormat::Hic)
    }

    pub fn chromosomes(&self, include_all: bool) -> Result<Vec<Chromosome>> {
        Ok(self.live()?.bins.chromosomes(include_all))
    }

    pub fn reference(&self) -> Result<&Reference> {
        Ok(self.live()?.bins.reference())
    }

    pub fn bins(&self) -> Result<&Arc<BinTable>> {
        Ok(&self.live()?.bins)
    }

    ///
    /// Bin size, or 0 for files with variable bins.
    ///
    pub fn resolution(&self) -> Result<u32> {
        Ok(self.live()?.bins.resolution())
    }

    pub fn nbins(&self) -> Result<u64> {
        Ok(self.live()?.bins.len())
    }

    pub fn nchroms(&self) -> Result<usize> {
        Ok(self.live()?.bins.reference().len())
    }

    pub fn attributes(&self) -> Result<&Attributes> {
        Ok(&self.live()?.attributes)
    }

    ///
    /// Number of stored pixels.
    ///
    pub fn nnz(&self) -> Result<u64> {
        Ok(self.live()?.attributes.nnz)
    }

    ///
    /// Sum of the raw counts of all stored pixels.
    ///
    pub fn sum(&self) -> Result<CountValue> {
        Ok(self.live()?.attributes.sum)
    }

    pub fn avail_normalizations(&self) -> Result<Vec<String>> {
        Ok(self.inner.store()?.list_normalizations())
    }

    pub fn has_normalization(&self, name: &str) -> Result<bool> {
        Ok(name == NO_NORMALIZATION || self.avail_normalizations()?.iter().any(|n| n == name))
    }

    ///
    /// Weights of a normalization, one per bin.
    ///
    /// # Arguments
    /// - name: normalization name; [`NO_NORMALIZATION`] yields all ones
    /// - divisive: return weights meant to divide counts (`1 / w` of the multiplicative ones)
    ///
    pub fn weights(&self, name: &str, divisive: bool) -> Result<Vec<f64>> {
        let Some(weights) = self.inner.normalization(name)? else {
            return Ok(vec![1.0; self.nbins()? as usize]);
        };
        if divisive {
            Ok(weights.to_kind(WeightKind::Divisive).into_values())
        } else {
            Ok(weights.values().to_vec())
        }
    }

    ///
    /// [`File::weights`] for several normalizations at once, in the order given.
    ///
    pub fn weights_many<S: AsRef<str>>(
        &self,
        names: &[S],
        divisive: bool,
    ) -> Result<Vec<(String, Vec<f64>)>> {
        let mut seen = FxHashSet::default();
        for name in names {
            if !seen.insert(name.as_ref()) {
                return Err(HicError::DuplicateNormalization(name.as_ref().to_string()));
            }
        }
        names
            .iter()
            .map(|name| Ok((name.as_ref().to_string(), self.weights(name.as_ref(), divisive)?)))
            .collect()
    }

    ///
    /// Select the pixels overlapping `range1 x range2`, with default options.
    ///
    pub fn fetch(&self, range1: &str, range2: &str) -> Result<PixelSelector> {
        self.fetch_with(range1, range2, &FetchOptions::default())
    }

    ///
    /// Select all pixels of the matrix.
    ///
    pub fn fetch_all(&self) -> Result<PixelSelector> {
        self.fetch_with("", "", &FetchOptions::default())
    }

    ///
    /// Select the pixels overlapping `range1 x range2`.
    ///
    /// An empty `range2` defaults to `range1`; both empty selects the whole
    /// matrix. `range1` may not start after `range2`, which would only cover the
    /// (unstored) lower triangle.
    ///
    pub fn fetch_with(
        &self,
        range1: &str,
        range2: &str,
        options: &FetchOptions,
    ) -> Result<PixelSelector> {
        self.inner.store()?;
        let weights = self.inner.normalization(&options.normalization)?;
        let count_type = options.count_type.unwrap_or(
            if weights.is_some() || self.inner.float_counts {
                CountType::Float64
            } else {
                CountType::Int32
            },
        );

        let reference = self.inner.bins.reference();
        let coords = match (range1.is_empty(), range2.is_empty()) {
            (true, true) => None,
            (true, false) => {
                return Err(HicError::InvalidQuery {
                    range1: range1.to_string(),
                    range2: range2.to_string(),
                    reason: "range1 cannot be empty when range2 is given".to_string(),
                });
            }
            (false, true) => {
                let coord = GenomicInterval::parse(reference, range1, options.query_type)?;
                Some((coord.clone(), coord))
            }
            (false, false) => Some((
                GenomicInterval::parse(reference, range1, options.query_type)?,
                GenomicInterval::parse(reference, range2, options.query_type)?,
            )),
        };

        debug!(
            "fetching {}; {} from {} (normalization={}, count_type={})",
            range1, range2, self.inner.uri, options.normalization, count_type
        );

        PixelSelector::new(
            self,
            coords,
            options.normalization.clone(),
            weights,
            count_type,
            options.join,
            options.diagonal_band_width,
        )
    }

    ///
    /// Release the backend. Selectors and iterators derived from this file fail
    /// from now on.
    ///
    pub fn close(&self) {
        if !self.inner.is_closed() {
            info!("closing {}", self.inner.uri);
        }
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("uri", &self.inner.uri)
            .field("format", &self.inner.format)
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File({})", self.inner.uri)
    }
}

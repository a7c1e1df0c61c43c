use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use fxhash::FxHashMap;
use log::{debug, info};
use serde::Serialize;

use hicrs_core::models::{BinTableKind, Chromosome, Reference};
use hicrs_io::container::Container;
use hicrs_io::hic::HicFile;
use hicrs_io::{HIC_FORMAT, PixelStore, StoreError, looks_like_hicfile, looks_like_multires};

use crate::errors::{HicError, Result};
use crate::file::File;

enum Backend {
    Container(Container),
    Hic(Arc<HicFile>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultiResAttributes {
    pub format: String,
    pub format_version: u32,
    pub bin_type: String,
    pub resolutions: Vec<u32>,
}

///
/// A file holding the same matrix at several resolutions: either a
/// multi-resolution container of cooler-style matrices or a hic-style file.
///
/// Single-resolution handles are opened on first use and cached.
///
pub struct MultiResFile {
    path: PathBuf,
    backend: Backend,
    resolutions: Vec<u32>,
    reference: Reference,
    attributes: MultiResAttributes,
    closed: AtomicBool,
    files: RwLock<FxHashMap<u32, File>>,
}

impl MultiResFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let (backend, resolutions, reference, attributes) = if looks_like_multires(path) {
            let container = Container::open(path)?;
            let resolutions = container.resolutions();
            let Some(base) = resolutions.first() else {
                return Err(HicError::UnsupportedFile {
                    path: path.display().to_string(),
                    reason: "file does not contain any resolution".to_string(),
                });
            };
            let store = container.open_resolution(*base)?;
            let reference = store.bins().reference().clone();
            let attributes = MultiResAttributes {
                format: container.attributes().format.clone(),
                format_version: container.attributes().format_version,
                bin_type: BinTableKind::Fixed.to_string(),
                resolutions: resolutions.clone(),
            };
            (Backend::Container(container), resolutions, reference, attributes)
        } else if looks_like_hicfile(path) {
            let hic = HicFile::open(path)?;
            let resolutions = hic.resolutions();
            let reference = hic.reference().clone();
            let attributes = MultiResAttributes {
                format: HIC_FORMAT.to_string(),
                format_version: hic.attributes().format_version,
                bin_type: BinTableKind::Fixed.to_string(),
                resolutions: resolutions.clone(),
            };
            (Backend::Hic(hic), resolutions, reference, attributes)
        } else {
            return Err(HicError::UnsupportedFile {
                path: path.display().to_string(),
                reason: "not a multi-resolution or hic-style file".to_string(),
            });
        };

        info!(
            "opened {} with {} resolutions",
            path.display(),
            resolutions.len()
        );
        Ok(MultiResFile {
            path: path.to_path_buf(),
            backend,
            resolutions,
            reference,
            attributes,
            closed: AtomicBool::new(false),
            files: RwLock::new(FxHashMap::default()),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(HicError::FileClosed(self.path.display().to_string()));
        }
        Ok(())
    }

    pub fn path(&self) -> Result<&Path> {
        self.ensure_open()?;
        Ok(&self.path)
    }

    pub fn is_hic(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(matches!(self.backend, Backend::Hic(_)))
    }

    pub fn is_multires(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(matches!(self.backend, Backend::Container(_)))
    }

    /// Available resolutions, in increasing order.
    pub fn resolutions(&self) -> Result<&[u32]> {
        self.ensure_open()?;
        Ok(&self.resolutions)
    }

    pub fn chromosomes(&self, include_all: bool) -> Result<Vec<Chromosome>> {
        self.ensure_open()?;
        Ok(self.reference.chromosomes(include_all))
    }

    pub fn attributes(&self) -> Result<&MultiResAttributes> {
        self.ensure_open()?;
        Ok(&self.attributes)
    }

    ///
    /// The matrix at `resolution`. Repeated calls return handles to the same
    /// backend.
    ///
    pub fn get(&self, resolution: u32) -> Result<File> {
        self.ensure_open()?;
        if let Some(file) = self
            .files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&resolution)
        {
            return Ok(file.clone());
        }

        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        if let Some(file) = files.get(&resolution) {
            return Ok(file.clone());
        }
        if !self.resolutions.contains(&resolution) {
            return Err(StoreError::ResolutionNotFound {
                path: self.path.display().to_string(),
                resolution,
                available: self
                    .resolutions
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            }
            .into());
        }

        let store: Arc<dyn PixelStore> = match &self.backend {
            Backend::Container(container) => Arc::new(container.open_resolution(resolution)?),
            Backend::Hic(hic) => Arc::new(hic.store(resolution)?),
        };
        debug!("opened resolution {} of {}", resolution, self.path.display());
        let file = File::from_store(store);
        files.insert(resolution, file.clone());
        Ok(file)
    }

    ///
    /// Close every handle opened through [`MultiResFile::get`].
    ///
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        for file in files.values() {
            file.close();
        }
        files.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Display for MultiResFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MultiResFile({})", self.path.display())
    }
}

///
/// Whether `path` can be opened by [`MultiResFile::open`].
///
pub fn is_multires_file<P: AsRef<Path>>(path: P) -> bool {
    looks_like_multires(path.as_ref()) || looks_like_hicfile(path.as_ref())
}

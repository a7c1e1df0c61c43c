use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use fxhash::FxHashMap;
use log::{debug, info};
use serde::Serialize;

use hicrs_core::models::{BinTable, Chromosome};
use hicrs_io::container::Container;
use hicrs_io::{PixelStore, looks_like_singlecell};

use crate::errors::{HicError, Result};
use crate::file::File;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SingleCellAttributes {
    pub format: String,
    pub format_version: u32,
    pub bin_type: String,
    pub bin_size: u32,
    pub ncells: usize,
}

///
/// A collection of per-cell matrices sharing one bin table.
///
pub struct SingleCellFile {
    path: PathBuf,
    container: Container,
    cells: Vec<String>,
    bins: Arc<BinTable>,
    attributes: SingleCellAttributes,
    closed: AtomicBool,
    files: RwLock<FxHashMap<String, File>>,
}

impl SingleCellFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !looks_like_singlecell(path) {
            return Err(HicError::UnsupportedFile {
                path: path.display().to_string(),
                reason: "not a single-cell file".to_string(),
            });
        }

        let container = Container::open(path)?;
        let cells: Vec<String> = container.names().into_iter().map(str::to_string).collect();
        let Some(first) = container.entries().first() else {
            return Err(HicError::UnsupportedFile {
                path: path.display().to_string(),
                reason: "file does not contain any cell".to_string(),
            });
        };
        let bins = container.open_entry(first)?.bins().clone();
        let attributes = SingleCellAttributes {
            format: container.attributes().format.clone(),
            format_version: container.attributes().format_version,
            bin_type: bins.kind().to_string(),
            bin_size: bins.resolution(),
            ncells: cells.len(),
        };

        info!("opened {} with {} cells", path.display(), cells.len());
        Ok(SingleCellFile {
            path: path.to_path_buf(),
            container,
            cells,
            bins,
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

    /// Cell names, in storage order.
    pub fn cells(&self) -> Result<&[String]> {
        self.ensure_open()?;
        Ok(&self.cells)
    }

    pub fn bins(&self) -> Result<&Arc<BinTable>> {
        self.ensure_open()?;
        Ok(&self.bins)
    }

    pub fn resolution(&self) -> Result<u32> {
        self.ensure_open()?;
        Ok(self.bins.resolution())
    }

    pub fn chromosomes(&self, include_all: bool) -> Result<Vec<Chromosome>> {
        self.ensure_open()?;
        Ok(self.bins.chromosomes(include_all))
    }

    pub fn attributes(&self) -> Result<&SingleCellAttributes> {
        self.ensure_open()?;
        Ok(&self.attributes)
    }

    ///
    /// The matrix of `cell`. Repeated calls return handles to the same backend.
    ///
    pub fn get(&self, cell: &str) -> Result<File> {
        self.ensure_open()?;
        if let Some(file) = self
            .files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(cell)
        {
            return Ok(file.clone());
        }

        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        if let Some(file) = files.get(cell) {
            return Ok(file.clone());
        }
        let store: Arc<dyn PixelStore> = Arc::new(self.container.open_cell(cell)?);
        debug!("opened cell {} of {}", cell, self.path.display());
        let file = File::from_store(store);
        files.insert(cell.to_string(), file.clone());
        Ok(file)
    }

    ///
    /// Close every handle opened through [`SingleCellFile::get`].
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

impl fmt::Display for SingleCellFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SingleCellFile({})", self.path.display())
    }
}

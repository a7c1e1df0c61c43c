//! Collections of cooler-style payloads stored in a single file.
//!
//! ```text
//! header   magic "HRSMCOOL" (resolutions) or "HRSSCOOL" (cells), u32 version
//! entries  complete cooler-style payloads, back to back
//! index    zlib( attributes json, u32 n, [name, u64 offset, u64 len; n] )
//! trailer  u64 index offset, magic
//! ```
//! Entries of a multi-resolution container are named after their resolution
//! and addressed as `path::/resolutions/R`; entries of a single-cell container
//! are addressed as `path::/cells/NAME`.
use std::fmt::{self, Display};
use std::fs::File;
use std::io::{self, BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::attributes::{MCOOL_FORMAT, SCOOL_FORMAT};
use crate::codec::{self, Magic, Region};
use crate::cool::CoolStore;
use crate::error::{Result, StoreError};

pub const MCOOL_MAGIC: Magic = *b"HRSMCOOL";
pub const SCOOL_MAGIC: Magic = *b"HRSSCOOL";
pub const CONTAINER_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    MultiRes,
    SingleCell,
}

impl ContainerKind {
    pub fn magic(&self) -> Magic {
        match self {
            ContainerKind::MultiRes => MCOOL_MAGIC,
            ContainerKind::SingleCell => SCOOL_MAGIC,
        }
    }

    pub fn format(&self) -> &'static str {
        match self {
            ContainerKind::MultiRes => MCOOL_FORMAT,
            ContainerKind::SingleCell => SCOOL_FORMAT,
        }
    }

    ///
    /// Group under which entries are addressed in URIs.
    ///
    pub fn group(&self) -> &'static str {
        match self {
            ContainerKind::MultiRes => "resolutions",
            ContainerKind::SingleCell => "cells",
        }
    }

    pub fn from_magic(magic: &Magic) -> Option<Self> {
        match *magic {
            MCOOL_MAGIC => Some(ContainerKind::MultiRes),
            SCOOL_MAGIC => Some(ContainerKind::SingleCell),
            _ => None,
        }
    }
}

impl Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::MultiRes => write!(f, "mcool"),
            ContainerKind::SingleCell => write!(f, "scool"),
        }
    }
}

///
/// Container-level metadata.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContainerAttributes {
    pub format: String,
    pub format_version: u32,
    pub creation_date: String,
    pub generated_by: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl ContainerAttributes {
    pub fn new(kind: ContainerKind) -> Self {
        ContainerAttributes {
            format: kind.format().to_string(),
            format_version: CONTAINER_VERSION,
            creation_date: String::new(),
            generated_by: format!("hicrs-v{}", env!("CARGO_PKG_VERSION")),
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    pub name: String,
    pub region: Region,
}

///
/// Table of contents of a container file.
///
#[derive(Debug, Clone)]
pub struct Container {
    path: PathBuf,
    kind: ContainerKind,
    attributes: ContainerAttributes,
    entries: Vec<ContainerEntry>,
}

impl Container {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let corrupt = |reason: String| StoreError::Corrupt {
            path: display.clone(),
            format: "container",
            reason,
        };

        let mut file = File::open(path)?;
        let region = Region::whole(&mut file)?;

        let (magic, version) = codec::read_header(&mut file, region)
            .map_err(|e| corrupt(format!("unable to read header: {}", e)))?;
        let kind = ContainerKind::from_magic(&magic)
            .ok_or_else(|| corrupt("bad magic number".to_string()))?;
        if version != CONTAINER_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path: display.clone(),
                format: "container",
                version,
            });
        }

        let (index_offset, trailer_magic) = codec::read_trailer(&mut file, region)?;
        if trailer_magic != magic {
            return Err(corrupt("bad trailer, file was not finalized".to_string()));
        }
        let index_len = region
            .len
            .checked_sub(codec::TRAILER_LEN + index_offset)
            .ok_or_else(|| corrupt(format!("invalid index offset {}", index_offset)))?;
        let mut index = Cursor::new(codec::read_blob(&mut file, region, index_offset, index_len)?);

        let attributes: ContainerAttributes = serde_json::from_str(&codec::read_string(&mut index)?)?;
        let n = index.read_u32::<LittleEndian>()?;
        let mut entries = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let name = codec::read_string(&mut index)?;
            let offset = index.read_u64::<LittleEndian>()?;
            let len = index.read_u64::<LittleEndian>()?;
            if offset.saturating_add(len) > index_offset {
                return Err(corrupt(format!("entry \"{}\" overlaps the index", name)));
            }
            entries.push(ContainerEntry {
                name,
                region: Region { offset, len },
            });
        }

        debug!("opened {} ({} {} entries)", display, entries.len(), kind);

        Ok(Container {
            path: path.to_path_buf(),
            kind,
            attributes,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn attributes(&self) -> &ContainerAttributes {
        &self.attributes
    }

    pub fn entries(&self) -> &[ContainerEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ContainerEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn uri(&self, name: &str) -> String {
        format!("{}::/{}/{}", self.path.display(), self.kind.group(), name)
    }

    ///
    /// Resolutions of a multi-resolution container, in ascending order.
    /// Entries whose name is not a resolution are skipped.
    ///
    pub fn resolutions(&self) -> Vec<u32> {
        let mut resolutions: Vec<u32> = self
            .entries
            .iter()
            .filter_map(|e| e.name.parse().ok())
            .collect();
        resolutions.sort_unstable();
        resolutions
    }

    pub fn open_entry(&self, entry: &ContainerEntry) -> Result<CoolStore> {
        CoolStore::open_region(&self.path, entry.region, self.uri(&entry.name))
    }

    pub fn open_resolution(&self, resolution: u32) -> Result<CoolStore> {
        let entry = self.get(&resolution.to_string()).ok_or_else(|| {
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
        self.open_entry(entry)
    }

    pub fn open_cell(&self, cell: &str) -> Result<CoolStore> {
        let entry = self.get(cell).ok_or_else(|| StoreError::CellNotFound {
            path: self.path.display().to_string(),
            cell: cell.to_string(),
        })?;
        self.open_entry(entry)
    }
}

///
/// Assembles finished cooler-style files into a container.
///
pub struct ContainerWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    kind: ContainerKind,
    attributes: ContainerAttributes,
    position: u64,
    entries: Vec<ContainerEntry>,
}

impl ContainerWriter {
    pub fn create<P: AsRef<Path>>(
        path: P,
        kind: ContainerKind,
        attributes: ContainerAttributes,
    ) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::from_file(file, path.as_ref(), kind, attributes)
    }

    pub fn from_file(
        file: File,
        path: &Path,
        kind: ContainerKind,
        attributes: ContainerAttributes,
    ) -> Result<Self> {
        let mut writer = BufWriter::new(file);
        codec::write_header(&mut writer, &kind.magic(), CONTAINER_VERSION)?;
        Ok(ContainerWriter {
            writer,
            path: path.to_path_buf(),
            kind,
            attributes,
            position: codec::HEADER_LEN,
            entries: Vec::new(),
        })
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    ///
    /// Copy a finished cooler-style file into the container under `name`.
    ///
    pub fn add_entry<P: AsRef<Path>>(&mut self, name: &str, source: P) -> Result<()> {
        let source = source.as_ref();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(StoreError::DuplicateEntry {
                path: self.path.display().to_string(),
                name: name.to_string(),
            });
        }

        // make sure the payload is complete before embedding it
        CoolStore::open(source)?;

        let mut reader = File::open(source)?;
        let len = io::copy(&mut reader, &mut self.writer)?;

        debug!(
            "added {} ({} bytes) to {} as \"{}\"",
            source.display(),
            len,
            self.path.display(),
            name
        );
        self.entries.push(ContainerEntry {
            name: name.to_string(),
            region: Region {
                offset: self.position,
                len,
            },
        });
        self.position += len;
        Ok(())
    }

    ///
    /// Write the table of contents and flush.
    ///
    pub fn finish(mut self) -> Result<()> {
        let mut index = Vec::new();
        codec::write_string(&mut index, &serde_json::to_string(&self.attributes)?)?;
        index.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        for entry in &self.entries {
            codec::write_string(&mut index, &entry.name)?;
            index.write_u64::<LittleEndian>(entry.region.offset)?;
            index.write_u64::<LittleEndian>(entry.region.len)?;
        }

        let index = codec::compress(&index, 6)?;
        self.writer.write_all(&index)?;
        codec::write_trailer(&mut self.writer, self.position, &self.kind.magic())?;

        let file = self
            .writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        file.sync_all()?;

        info!(
            "wrote {} with {} entries",
            self.path.display(),
            self.entries.len()
        );
        Ok(())
    }
}

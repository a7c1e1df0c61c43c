//! Building blocks shared by the binary layouts.
//!
//! Every payload starts with an 8-byte magic followed by a `u32` format
//! version, and ends with a 16-byte trailer holding the offset of the
//! (compressed) index and the magic again. All integers are little endian.
use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use hicrs_core::models::{BinTable, BinTableKind, Reference};

use crate::error::Result;

pub type Magic = [u8; 8];

pub const HEADER_LEN: u64 = 12;
pub const TRAILER_LEN: u64 = 16;

///
/// Byte range of a file holding one payload: either the whole file or one
/// entry of a container.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: u64,
    pub len: u64,
}

impl Region {
    pub fn whole<R: Seek>(reader: &mut R) -> io::Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        Ok(Region { offset: 0, len })
    }
}

pub fn write_header<W: Write>(writer: &mut W, magic: &Magic, version: u32) -> io::Result<()> {
    writer.write_all(magic)?;
    writer.write_u32::<LittleEndian>(version)
}

pub fn write_trailer<W: Write>(writer: &mut W, index_offset: u64, magic: &Magic) -> io::Result<()> {
    writer.write_u64::<LittleEndian>(index_offset)?;
    writer.write_all(magic)
}

///
/// Read the magic and format version at the start of a payload.
///
pub fn read_header<R: Read + Seek>(reader: &mut R, region: Region) -> io::Result<(Magic, u32)> {
    if region.len < HEADER_LEN + TRAILER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "payload is too small",
        ));
    }
    reader.seek(SeekFrom::Start(region.offset))?;
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    let version = reader.read_u32::<LittleEndian>()?;
    Ok((magic, version))
}

///
/// Read the trailer of a payload: the offset of its index relative to the
/// start of the payload, and the closing magic.
///
pub fn read_trailer<R: Read + Seek>(reader: &mut R, region: Region) -> io::Result<(u64, Magic)> {
    reader.seek(SeekFrom::Start(region.offset + region.len - TRAILER_LEN))?;
    let index_offset = reader.read_u64::<LittleEndian>()?;
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    Ok((index_offset, magic))
}

pub fn compress(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut buffer = Vec::new();
    decoder.read_to_end(&mut buffer)?;
    Ok(buffer)
}

///
/// Read and decompress `len` bytes stored at `offset` within a payload.
///
pub fn read_blob<R: Read + Seek>(
    reader: &mut R,
    region: Region,
    offset: u64,
    len: u64,
) -> io::Result<Vec<u8>> {
    if offset.saturating_add(len) > region.len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "block at offset {} with length {} extends past the end of the payload",
                offset, len
            ),
        ));
    }
    reader.seek(SeekFrom::Start(region.offset + offset))?;
    let mut buffer = vec![0u8; len as usize];
    reader.read_exact(&mut buffer)?;
    decompress(&buffer)
}

pub fn write_string<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(value.len() as u32)?;
    writer.write_all(value.as_bytes())
}

pub fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;
    String::from_utf8(buffer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn write_reference<W: Write>(writer: &mut W, reference: &Reference) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(reference.len() as u32)?;
    for chrom in reference.iter() {
        write_string(writer, chrom.name())?;
        writer.write_u32::<LittleEndian>(chrom.length())?;
    }
    Ok(())
}

pub fn read_reference<R: Read>(reader: &mut R) -> Result<Reference> {
    let n = reader.read_u32::<LittleEndian>()?;
    let mut chroms = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let name = read_string(reader)?;
        let length = reader.read_u32::<LittleEndian>()?;
        chroms.push((name, length));
    }
    Ok(Reference::new(chroms)?)
}

const FIXED_BINS: u8 = 0;
const VARIABLE_BINS: u8 = 1;

pub fn write_bin_table<W: Write>(writer: &mut W, bins: &BinTable) -> io::Result<()> {
    match bins.kind() {
        BinTableKind::Fixed => {
            writer.write_u8(FIXED_BINS)?;
            writer.write_u32::<LittleEndian>(bins.resolution())
        }
        BinTableKind::Variable => {
            writer.write_u8(VARIABLE_BINS)?;
            writer.write_u64::<LittleEndian>(bins.len())?;
            for bin in bins.iter() {
                writer.write_u32::<LittleEndian>(bin.chrom.id())?;
                writer.write_u32::<LittleEndian>(bin.start)?;
                writer.write_u32::<LittleEndian>(bin.end)?;
            }
            Ok(())
        }
    }
}

pub fn read_bin_table<R: Read>(reader: &mut R, reference: Reference) -> Result<BinTable> {
    match reader.read_u8()? {
        FIXED_BINS => {
            let resolution = reader.read_u32::<LittleEndian>()?;
            Ok(BinTable::fixed(reference, resolution)?)
        }
        VARIABLE_BINS => {
            let n = reader.read_u64::<LittleEndian>()? as usize;
            let mut chroms = Vec::with_capacity(n);
            let mut starts = Vec::with_capacity(n);
            let mut ends = Vec::with_capacity(n);
            for _ in 0..n {
                let chrom_id = reader.read_u32::<LittleEndian>()?;
                chroms.push(reference.get_by_id(chrom_id)?.name().to_string());
                starts.push(reader.read_u32::<LittleEndian>()?);
                ends.push(reader.read_u32::<LittleEndian>()?);
            }
            Ok(BinTable::variable(reference, &chroms, &starts, &ends)?)
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown bin table type {}", other),
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::io::Cursor;

    #[rstest]
    fn test_variable_bin_table_encoding() {
        let reference = Reference::new([("chr1", 100), ("chr2", 50)]).unwrap();
        let bins = BinTable::variable(
            reference.clone(),
            &["chr1", "chr1", "chr2"],
            &[0, 30, 0],
            &[30, 100, 50],
        )
        .unwrap();

        let mut buffer = Vec::new();
        write_reference(&mut buffer, &reference).unwrap();
        write_bin_table(&mut buffer, &bins).unwrap();

        let mut cursor = Cursor::new(buffer);
        let decoded_reference = read_reference(&mut cursor).unwrap();
        let decoded = read_bin_table(&mut cursor, decoded_reference).unwrap();
        assert_eq!(decoded, bins);
    }

    #[rstest]
    fn test_blob_bounds_are_checked() {
        let data = compress(b"hello", 6).unwrap();
        let len = data.len() as u64;
        let region = Region { offset: 0, len };

        let mut cursor = Cursor::new(data);
        assert_eq!(read_blob(&mut cursor, region, 0, len).unwrap(), b"hello");
        assert!(read_blob(&mut cursor, region, 1, len).is_err());
    }
}

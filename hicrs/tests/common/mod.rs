#![allow(dead_code)]

use std::path::Path;

use hicrs::{Column, File, FileWriter, PixelWriter, WriterConfig};
use hicrs_core::models::Reference;

pub const NBINS: u64 = 15;

/// `chr1` spans bins 0..10 and `chr2` bins 10..15 at 100 bp.
pub fn reference() -> Reference {
    Reference::new([("chr1", 1000), ("chr2", 500)]).unwrap()
}

/// Small buffers so that ingestion spills several runs.
pub fn config() -> WriterConfig {
    WriterConfig {
        buffer_size: 5,
        chunk_size: 4,
        ..Default::default()
    }
}

/// Upper-triangular pixels `(bin1_id, bin2_id, count)` over [`NBINS`] bins.
pub fn pixels() -> Vec<(u64, u64, i64)> {
    let mut pixels = Vec::new();
    for i in 0..NBINS {
        for j in i..NBINS {
            if (i + j) % 3 == 0 || j == i + 1 {
                pixels.push((i, j, (i * 7 + j * 3) as i64 % 11 + 1));
            }
        }
    }
    pixels
}

pub fn coo_columns(pixels: &[(u64, u64, i64)]) -> [(&'static str, Column); 3] {
    [
        (
            "bin1_id",
            Column::from(pixels.iter().map(|p| p.0 as i64).collect::<Vec<_>>()),
        ),
        (
            "bin2_id",
            Column::from(pixels.iter().map(|p| p.1 as i64).collect::<Vec<_>>()),
        ),
        (
            "count",
            Column::from(pixels.iter().map(|p| p.2).collect::<Vec<_>>()),
        ),
    ]
}

pub fn add_coo<W: PixelWriter>(writer: &mut W, pixels: &[(u64, u64, i64)]) -> hicrs::Result<()> {
    let columns = coo_columns(pixels);
    writer.add_pixels_from_columns(columns.iter().map(|(name, column)| (*name, column)))
}

///
/// Cooler-style file with [`pixels`], added in reverse order over three chunks.
///
pub fn write_cool(path: &Path, float_counts: bool) -> File {
    let config = WriterConfig {
        float_counts,
        ..config()
    };
    let mut writer = FileWriter::create(path, reference(), 100, config).unwrap();

    let mut pixels = pixels();
    pixels.reverse();
    for chunk in pixels.chunks(pixels.len() / 3 + 1) {
        add_coo(&mut writer, chunk).unwrap();
    }
    writer.finalize().unwrap()
}

/// Full symmetric matrix of [`pixels`].
pub fn dense() -> Vec<Vec<i64>> {
    let n = NBINS as usize;
    let mut matrix = vec![vec![0i64; n]; n];
    for (i, j, count) in pixels() {
        matrix[i as usize][j as usize] = count;
        matrix[j as usize][i as usize] = count;
    }
    matrix
}

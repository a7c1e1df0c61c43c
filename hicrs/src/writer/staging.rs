//! On-disk staging of pixels between `add_pixels` and `finalize`.
//!
//! Pixels are buffered in memory; full buffers are sorted, reduced (duplicate
//! coordinates summed) and spilled as runs into a private temporary directory.
//! Finalizing merges the runs back into one sorted, duplicate-free stream.
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use tempfile::TempDir;

use hicrs_core::models::{CountValue, ThinPixel};

use crate::errors::Result;

const INT_TAG: u8 = 0;
const FLOAT_TAG: u8 = 1;

///
/// A sorted run on disk.
///
struct Run {
    path: PathBuf,
    len: u64,
}

pub(crate) struct Staging {
    dir: TempDir,
    buffer: Vec<ThinPixel<CountValue>>,
    buffer_size: usize,
    runs: Vec<Run>,
    staged: u64,
}

impl Staging {
    pub(crate) fn new(tmpdir: Option<&Path>, buffer_size: usize) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("hicrs-staging-");
        let dir = match tmpdir {
            Some(tmpdir) => builder.tempdir_in(tmpdir)?,
            None => builder.tempdir()?,
        };
        debug!("staging pixels in {}", dir.path().display());

        Ok(Staging {
            dir,
            buffer: Vec::new(),
            buffer_size: buffer_size.max(1),
            runs: Vec::new(),
            staged: 0,
        })
    }

    #[cfg(test)]
    pub(crate) fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Number of pixels received so far (duplicates included).
    pub(crate) fn staged(&self) -> u64 {
        self.staged
    }

    pub(crate) fn extend(&mut self, pixels: Vec<ThinPixel<CountValue>>) -> Result<()> {
        self.staged += pixels.len() as u64;
        self.buffer.extend(pixels);
        if self.buffer.len() >= self.buffer_size {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let pixels = reduce(std::mem::take(&mut self.buffer));

        let path = self.dir.path().join(format!("run-{:05}.bin", self.runs.len()));
        let mut writer = BufWriter::new(File::create(&path)?);
        for pixel in &pixels {
            write_pixel(&mut writer, pixel)?;
        }
        writer.flush()?;

        debug!("spilled {} pixels to {}", pixels.len(), path.display());
        self.runs.push(Run {
            path,
            len: pixels.len() as u64,
        });
        Ok(())
    }

    ///
    /// Sorted, duplicate-free stream over everything staged so far. The
    /// temporary directory lives as long as the returned iterator.
    ///
    pub(crate) fn merge(mut self) -> Result<RunMerger> {
        self.spill()?;

        let mut readers = Vec::with_capacity(self.runs.len());
        let mut heap = BinaryHeap::with_capacity(self.runs.len());
        for (i, run) in self.runs.iter().enumerate() {
            let mut reader = RunReader {
                reader: BufReader::new(File::open(&run.path)?),
                remaining: run.len,
            };
            if let Some(pixel) = reader.next_pixel()? {
                heap.push(Reverse(Head { pixel, run: i }));
            }
            readers.push(reader);
        }

        Ok(RunMerger {
            _dir: self.dir,
            readers,
            heap,
            failed: false,
        })
    }
}

///
/// Sort by coordinates and sum counts sharing the same coordinates.
///
fn reduce(mut pixels: Vec<ThinPixel<CountValue>>) -> Vec<ThinPixel<CountValue>> {
    pixels.sort_by_key(|pixel| pixel.coords());
    let mut reduced: Vec<ThinPixel<CountValue>> = Vec::with_capacity(pixels.len());
    for pixel in pixels {
        match reduced.last_mut() {
            Some(last) if last.coords() == pixel.coords() => last.count = last.count + pixel.count,
            _ => reduced.push(pixel),
        }
    }
    reduced
}

fn write_pixel<W: Write>(writer: &mut W, pixel: &ThinPixel<CountValue>) -> Result<()> {
    writer.write_u64::<LittleEndian>(pixel.bin1_id)?;
    writer.write_u64::<LittleEndian>(pixel.bin2_id)?;
    match pixel.count {
        CountValue::Int(n) => {
            writer.write_u8(INT_TAG)?;
            writer.write_i64::<LittleEndian>(n)?;
        }
        CountValue::Float(n) => {
            writer.write_u8(FLOAT_TAG)?;
            writer.write_f64::<LittleEndian>(n)?;
        }
    }
    Ok(())
}

struct RunReader {
    reader: BufReader<File>,
    remaining: u64,
}

impl RunReader {
    fn next_pixel(&mut self) -> Result<Option<ThinPixel<CountValue>>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;

        let bin1_id = self.reader.read_u64::<LittleEndian>()?;
        let bin2_id = self.reader.read_u64::<LittleEndian>()?;
        let count = match self.reader.read_u8()? {
            FLOAT_TAG => CountValue::Float(self.reader.read_f64::<LittleEndian>()?),
            _ => CountValue::Int(self.reader.read_i64::<LittleEndian>()?),
        };
        Ok(Some(ThinPixel::new(bin1_id, bin2_id, count)))
    }
}

struct Head {
    pixel: ThinPixel<CountValue>,
    run: usize,
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.pixel.coords(), self.run).cmp(&(other.pixel.coords(), other.run))
    }
}

///
/// K-way merge of the staged runs.
///
pub(crate) struct RunMerger {
    _dir: TempDir,
    readers: Vec<RunReader>,
    heap: BinaryHeap<Reverse<Head>>,
    failed: bool,
}

impl RunMerger {
    fn pop(&mut self) -> Result<Option<ThinPixel<CountValue>>> {
        let Some(Reverse(head)) = self.heap.pop() else {
            return Ok(None);
        };
        if let Some(pixel) = self.readers[head.run].next_pixel()? {
            self.heap.push(Reverse(Head {
                pixel,
                run: head.run,
            }));
        }
        Ok(Some(head.pixel))
    }

    fn next_reduced(&mut self) -> Result<Option<ThinPixel<CountValue>>> {
        let Some(mut pixel) = self.pop()? else {
            return Ok(None);
        };
        while self
            .heap
            .peek()
            .is_some_and(|Reverse(head)| head.pixel.coords() == pixel.coords())
        {
            if let Some(other) = self.pop()? {
                pixel.count = pixel.count + other.count;
            }
        }
        Ok(Some(pixel))
    }
}

impl Iterator for RunMerger {
    type Item = Result<ThinPixel<CountValue>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_reduced() {
            Ok(pixel) => pixel.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn px(bin1_id: u64, bin2_id: u64, count: i64) -> ThinPixel<CountValue> {
        ThinPixel::new(bin1_id, bin2_id, CountValue::Int(count))
    }

    #[rstest]
    fn test_reduce() {
        let pixels = reduce(vec![px(1, 2, 1), px(0, 5, 2), px(1, 2, 3)]);
        assert_eq!(pixels, vec![px(0, 5, 2), px(1, 2, 4)]);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(100)]
    fn test_merge_sums_duplicates_across_runs(#[case] buffer_size: usize) {
        let mut staging = Staging::new(None, buffer_size).unwrap();
        staging.extend(vec![px(3, 4, 1), px(0, 0, 1)]).unwrap();
        staging.extend(vec![px(0, 0, 2)]).unwrap();
        staging.extend(vec![px(1, 9, 5), px(3, 4, 10)]).unwrap();
        assert_eq!(staging.staged(), 5);

        let pixels = staging
            .merge()
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(pixels, vec![px(0, 0, 3), px(1, 9, 5), px(3, 4, 11)]);
    }

    #[rstest]
    fn test_staging_dir_is_removed() {
        let parent = TempDir::new().unwrap();
        let mut staging = Staging::new(Some(parent.path()), 1).unwrap();
        staging.extend(vec![px(0, 1, 1)]).unwrap();
        let dir = staging.dir().to_path_buf();
        assert!(dir.exists());

        let merger = staging.merge().unwrap();
        assert!(dir.exists());
        drop(merger);
        assert!(!dir.exists());
    }

    #[rstest]
    fn test_float_counts() {
        let mut staging = Staging::new(None, 10).unwrap();
        staging
            .extend(vec![
                ThinPixel::new(0, 1, CountValue::Float(0.5)),
                ThinPixel::new(0, 1, CountValue::Float(0.25)),
            ])
            .unwrap();
        let pixels = staging
            .merge()
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(pixels, vec![ThinPixel::new(0, 1, CountValue::Float(0.75))]);
    }
}

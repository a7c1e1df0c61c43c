//! Validation of the pixel chunks handed to the writers.
//!
//! A chunk is a set of named, equally long columns in one of two layouts:
//! COO (`bin1_id, bin2_id, count`) or BG2
//! (`chrom1, start1, end1, chrom2, start2, end2, count`). A chunk is either
//! accepted as a whole or rejected with the first problem found.
use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use arrow::record_batch::RecordBatch;
use fxhash::{FxHashMap, FxHashSet};

use hicrs_core::models::{BinTable, Count, CountValue, ThinPixel};
use hicrs_io::StoreError;

use crate::errors::{HicError, Result};

pub const COO_COLUMNS: [&str; 3] = ["bin1_id", "bin2_id", "count"];
pub const BG2_COLUMNS: [&str; 7] = [
    "chrom1", "start1", "end1", "chrom2", "start2", "end2", "count",
];

const INVALID_DICT_FORMAT: &str = "dictionary does not contain columns in COO or BG2 format.\n\
Please make sure that the dictionary has the following keys:\n\
- COO: [bin1_id, bin2_id, count]\n\
- BG2: [chrom1, start1, end1, chrom2, start2, end2, count]\n\
And that values have appropriate types:\n\
[chrom1, chrom2] -> string\n\
[bin1_id, bin2_id, start1, end1, start2, end2] -> int\n\
[count] -> int or float";

const INVALID_TABLE_FORMAT: &str = "table is not in COO or BG2 format.\n\
Please make sure that the table contains the following columns:\n\
- COO: [bin1_id, bin2_id, count]\n\
- BG2: [chrom1, start1, end1, chrom2, start2, end2, count]\n\
And that columns have appropriate types:\n\
[chrom1, chrom2] -> string/dictionary[string]\n\
[bin1_id, bin2_id, start1, end1, start2, end2] -> integral\n\
[count] -> numeric";

///
/// A column of pixel data.
///
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn type_name(&self) -> &'static str {
        match self {
            Column::Int(_) => "integers",
            Column::Float(_) => "floating point numbers",
            Column::Str(_) => "strings",
        }
    }

    fn from_arrow(name: &str, array: &dyn Array) -> Result<Self> {
        let invalid = |reason: String| HicError::InvalidColumn {
            column: name.to_string(),
            reason,
        };
        let data_type = array.data_type();
        let target = if data_type.is_integer() {
            DataType::Int64
        } else if data_type.is_floating() {
            DataType::Float64
        } else if matches!(
            data_type,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Dictionary(_, _)
        ) {
            DataType::Utf8
        } else {
            return Err(invalid(format!("unsupported column type {}", data_type)));
        };

        let values = cast(array, &target)?;
        if values.null_count() != 0 {
            return Err(invalid(format!(
                "found {} null values or values that cannot be represented as {}",
                values.null_count(),
                target
            )));
        }

        Ok(match target {
            DataType::Int64 => Column::Int(values.as_primitive::<Int64Type>().values().to_vec()),
            DataType::Float64 => {
                Column::Float(values.as_primitive::<Float64Type>().values().to_vec())
            }
            _ => Column::Str(
                values
                    .as_string::<i32>()
                    .iter()
                    .map(|v| v.unwrap_or_default().to_string())
                    .collect(),
            ),
        })
    }
}

impl From<Vec<i64>> for Column {
    fn from(values: Vec<i64>) -> Self {
        Column::Int(values)
    }
}

impl From<Vec<i32>> for Column {
    fn from(values: Vec<i32>) -> Self {
        Column::Int(values.into_iter().map(i64::from).collect())
    }
}

impl From<Vec<u32>> for Column {
    fn from(values: Vec<u32>) -> Self {
        Column::Int(values.into_iter().map(i64::from).collect())
    }
}

impl From<Vec<f64>> for Column {
    fn from(values: Vec<f64>) -> Self {
        Column::Float(values)
    }
}

impl From<Vec<f32>> for Column {
    fn from(values: Vec<f32>) -> Self {
        Column::Float(values.into_iter().map(f64::from).collect())
    }
}

impl From<Vec<String>> for Column {
    fn from(values: Vec<String>) -> Self {
        Column::Str(values)
    }
}

impl From<Vec<&str>> for Column {
    fn from(values: Vec<&str>) -> Self {
        Column::Str(values.into_iter().map(str::to_string).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkFormat {
    Coo,
    Bg2,
}

///
/// Named columns of a chunk, borrowed or owned.
///
struct Columns<'a> {
    columns: FxHashMap<String, std::borrow::Cow<'a, Column>>,
}

impl Columns<'_> {
    fn detect(&self) -> Option<ChunkFormat> {
        let has_all = |names: &[&str]| names.iter().all(|n| self.columns.contains_key(*n));
        if has_all(&BG2_COLUMNS) {
            Some(ChunkFormat::Bg2)
        } else if has_all(&COO_COLUMNS) {
            Some(ChunkFormat::Coo)
        } else {
            None
        }
    }

    fn get(&self, name: &str) -> &Column {
        // only called with names of the detected layout
        &self.columns[name]
    }

    fn check_lengths(&self, names: &[&str]) -> Result<usize> {
        let lengths: Vec<usize> = names.iter().map(|n| self.get(n).len()).collect();
        if lengths.iter().all(|&len| len == lengths[0]) {
            return Ok(lengths[0]);
        }
        let sizes = names
            .iter()
            .zip(&lengths)
            .map(|(name, len)| format!("{}={}", name, len))
            .collect::<Vec<_>>()
            .join(", ");
        Err(HicError::InvalidChunk(format!(
            "columns don't have the same lengths: [{}]",
            sizes
        )))
    }

    fn ints(&self, name: &str) -> Result<&[i64]> {
        match self.get(name) {
            Column::Int(values) => {
                if let Some(v) = values.iter().find(|&&v| v < 0) {
                    return Err(HicError::InvalidColumn {
                        column: name.to_string(),
                        reason: format!("found negative value {}", v),
                    });
                }
                Ok(values)
            }
            other => Err(HicError::InvalidColumn {
                column: name.to_string(),
                reason: format!("expected integers, found {}", other.type_name()),
            }),
        }
    }

    fn strings(&self, name: &str) -> Result<&[String]> {
        match self.get(name) {
            Column::Str(values) => Ok(values),
            other => Err(HicError::InvalidColumn {
                column: name.to_string(),
                reason: format!("expected strings, found {}", other.type_name()),
            }),
        }
    }

    fn counts(&self, float_counts: bool) -> Result<Vec<CountValue>> {
        let invalid = |e: hicrs_core::CoreError| HicError::InvalidColumn {
            column: "count".to_string(),
            reason: e.to_string(),
        };
        let coerce = |value: CountValue| -> Result<CountValue> {
            if float_counts {
                Ok(CountValue::Float(f64::from_count(value).map_err(invalid)?))
            } else {
                Ok(CountValue::Int(
                    i32::from_count(value).map_err(invalid)? as i64,
                ))
            }
        };
        match self.get("count") {
            Column::Int(values) => values.iter().map(|&v| coerce(CountValue::Int(v))).collect(),
            Column::Float(values) => values
                .iter()
                .map(|&v| coerce(CountValue::Float(v)))
                .collect(),
            other => Err(HicError::InvalidColumn {
                column: "count".to_string(),
                reason: format!("expected numbers, found {}", other.type_name()),
            }),
        }
    }

    fn to_pixels(
        &self,
        bins: &BinTable,
        float_counts: bool,
        invalid_format: &str,
    ) -> Result<Vec<ThinPixel<CountValue>>> {
        match self.detect() {
            Some(ChunkFormat::Coo) => self.coo_pixels(bins, float_counts),
            Some(ChunkFormat::Bg2) => self.bg2_pixels(bins, float_counts),
            None => Err(HicError::InvalidChunk(invalid_format.to_string())),
        }
    }

    fn coo_pixels(&self, bins: &BinTable, float_counts: bool) -> Result<Vec<ThinPixel<CountValue>>> {
        self.check_lengths(&COO_COLUMNS)?;
        let bin1_ids = self.ints("bin1_id")?;
        let bin2_ids = self.ints("bin2_id")?;
        let counts = self.counts(float_counts)?;

        bin1_ids
            .iter()
            .zip(bin2_ids)
            .zip(counts)
            .map(|((&bin1_id, &bin2_id), count)| {
                let pixel = ThinPixel::new(bin1_id as u64, bin2_id as u64, count);
                check_pixel(&pixel, bins)?;
                Ok(pixel)
            })
            .collect()
    }

    fn bg2_pixels(&self, bins: &BinTable, float_counts: bool) -> Result<Vec<ThinPixel<CountValue>>> {
        let len = self.check_lengths(&BG2_COLUMNS)?;
        let chrom1 = self.strings("chrom1")?;
        let start1 = self.ints("start1")?;
        let end1 = self.ints("end1")?;
        let chrom2 = self.strings("chrom2")?;
        let start2 = self.ints("start2")?;
        let end2 = self.ints("end2")?;
        let counts = self.counts(float_counts)?;

        let mut pixels = Vec::with_capacity(len);
        for (i, count) in counts.into_iter().enumerate() {
            let unmappable = |reason: String| HicError::UnmappablePixel {
                coords: format!(
                    "{}:{}-{}; {}:{}-{}",
                    chrom1[i], start1[i], end1[i], chrom2[i], start2[i], end2[i]
                ),
                reason,
            };
            let bin1_id = map_bin(bins, &chrom1[i], start1[i], end1[i]).map_err(unmappable)?;
            let bin2_id = map_bin(bins, &chrom2[i], start2[i], end2[i]).map_err(unmappable)?;
            if bin1_id > bin2_id {
                return Err(unmappable(
                    "pixel lies in the lower triangle: bin1 should come before bin2".to_string(),
                ));
            }
            pixels.push(ThinPixel::new(bin1_id, bin2_id, count));
        }
        Ok(pixels)
    }
}

fn map_bin(bins: &BinTable, chrom: &str, start: i64, end: i64) -> std::result::Result<u64, String> {
    if end < start {
        return Err(format!("end position {} is smaller than start position {}", end, start));
    }
    let start = u32::try_from(start).map_err(|_| format!("position {} is out of range", start))?;
    let end = u32::try_from(end).map_err(|_| format!("position {} is out of range", end))?;

    let id = bins.get_id(chrom, start).map_err(|e| e.to_string())?;
    let bin = bins.get(id).map_err(|e| e.to_string())?;
    if bin.start != start || bin.end != end {
        return Err(format!(
            "{}:{}-{} does not match bin {}",
            chrom, start, end, bin
        ));
    }
    Ok(id)
}

fn check_pixel(pixel: &ThinPixel<CountValue>, bins: &BinTable) -> Result<()> {
    if pixel.bin1_id > pixel.bin2_id || pixel.bin2_id >= bins.len() {
        return Err(StoreError::InvalidPixel {
            bin1_id: pixel.bin1_id,
            bin2_id: pixel.bin2_id,
            reason: format!(
                "expected bin1_id <= bin2_id < {} (number of bins)",
                bins.len()
            ),
        }
        .into());
    }
    Ok(())
}

///
/// Validate an Arrow table of pixels and map it onto `bins`.
///
pub(crate) fn pixels_from_batch(
    batch: &RecordBatch,
    bins: &BinTable,
    float_counts: bool,
) -> Result<Vec<ThinPixel<CountValue>>> {
    let schema = batch.schema();
    let mut seen = FxHashSet::default();
    let mut columns = FxHashMap::default();
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        let name = field.name().as_str();
        if !seen.insert(name) {
            return Err(duplicate_column(name));
        }
        if COO_COLUMNS.contains(&name) || BG2_COLUMNS.contains(&name) {
            columns.insert(
                name.to_string(),
                std::borrow::Cow::Owned(Column::from_arrow(name, array.as_ref())?),
            );
        }
    }
    Columns { columns }.to_pixels(bins, float_counts, INVALID_TABLE_FORMAT)
}

///
/// Validate named columns of pixels and map them onto `bins`.
///
pub(crate) fn pixels_from_columns<'a>(
    columns: impl IntoIterator<Item = (&'a str, &'a Column)>,
    bins: &BinTable,
    float_counts: bool,
) -> Result<Vec<ThinPixel<CountValue>>> {
    let mut by_name = FxHashMap::default();
    for (name, column) in columns {
        if by_name
            .insert(name.to_string(), std::borrow::Cow::Borrowed(column))
            .is_some()
        {
            return Err(duplicate_column(name));
        }
    }
    Columns { columns: by_name }.to_pixels(bins, float_counts, INVALID_DICT_FORMAT)
}

fn duplicate_column(name: &str) -> HicError {
    HicError::InvalidChunk(format!("column \"{}\" appears more than once", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hicrs_core::models::Reference;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int32Array, StringArray, UInt64Array};
    use arrow::datatypes::{Field, Schema};

    #[fixture]
    fn bins() -> BinTable {
        let reference = Reference::new([("chr1", 1000), ("chr2", 450)]).unwrap();
        BinTable::fixed(reference, 100).unwrap()
    }

    #[rstest]
    fn test_coo_columns(bins: BinTable) {
        let bin1 = Column::from(vec![0i64, 1, 12]);
        let bin2 = Column::from(vec![0i64, 10, 14]);
        let count = Column::from(vec![1i64, 2, 3]);
        let pixels = pixels_from_columns(
            [("bin1_id", &bin1), ("bin2_id", &bin2), ("count", &count)],
            &bins,
            false,
        )
        .unwrap();

        assert_eq!(
            pixels,
            vec![
                ThinPixel::new(0, 0, CountValue::Int(1)),
                ThinPixel::new(1, 10, CountValue::Int(2)),
                ThinPixel::new(12, 14, CountValue::Int(3)),
            ]
        );
    }

    #[rstest]
    fn test_bg2_columns(bins: BinTable) {
        let chrom1 = Column::from(vec!["chr1", "chr1"]);
        let start1 = Column::from(vec![0i64, 100]);
        let end1 = Column::from(vec![100i64, 200]);
        let chrom2 = Column::from(vec!["chr1", "chr2"]);
        let start2 = Column::from(vec![900i64, 400]);
        let end2 = Column::from(vec![1000i64, 450]);
        let count = Column::from(vec![1.5f64, 2.0]);
        let pixels = pixels_from_columns(
            [
                ("chrom1", &chrom1),
                ("start1", &start1),
                ("end1", &end1),
                ("chrom2", &chrom2),
                ("start2", &start2),
                ("end2", &end2),
                ("count", &count),
            ],
            &bins,
            true,
        )
        .unwrap();

        assert_eq!(
            pixels,
            vec![
                ThinPixel::new(0, 9, CountValue::Float(1.5)),
                ThinPixel::new(1, 14, CountValue::Float(2.0)),
            ]
        );
    }

    #[rstest]
    fn test_length_mismatch(bins: BinTable) {
        let bin1 = Column::from(vec![0i64, 1]);
        let bin2 = Column::from(vec![0i64]);
        let count = Column::from(vec![1i64, 2]);
        let err = pixels_from_columns(
            [("bin1_id", &bin1), ("bin2_id", &bin2), ("count", &count)],
            &bins,
            false,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "columns don't have the same lengths: [bin1_id=2, bin2_id=1, count=2]"
        );
    }

    #[rstest]
    fn test_duplicate_columns(bins: BinTable) {
        let bin1 = Column::from(vec![0i64, 2]);
        let bin2 = Column::from(vec![1i64, 3]);
        let first = Column::from(vec![5i64, 5]);
        let second = Column::from(vec![7i64, 7]);
        let err = pixels_from_columns(
            [
                ("bin1_id", &bin1),
                ("bin2_id", &bin2),
                ("count", &first),
                ("count", &second),
            ],
            &bins,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, HicError::InvalidChunk(_)));
        assert!(err.to_string().contains("column \"count\" appears more than once"));
    }

    #[rstest]
    fn test_unknown_layout(bins: BinTable) {
        let bin1 = Column::from(vec![0i64]);
        let count = Column::from(vec![1i64]);
        let err = pixels_from_columns([("bin1_id", &bin1), ("count", &count)], &bins, false)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("- COO: [bin1_id, bin2_id, count]"));
        assert!(message.contains("- BG2: [chrom1, start1, end1, chrom2, start2, end2, count]"));
    }

    #[rstest]
    #[case(vec![-1i64], vec![0i64], vec![1i64], "failed to process \"bin1_id\" values: found negative value -1")]
    #[case(vec![0i64], vec![0i64], vec![3_000_000_000i64], "failed to process \"count\" values: failed to cast 3000000000 to a int32")]
    #[case(vec![2i64], vec![1i64], vec![1i64], "pixel (2, 1) does not map to a valid pair of bins: expected bin1_id <= bin2_id < 15 (number of bins)")]
    #[case(vec![0i64], vec![15i64], vec![1i64], "pixel (0, 15) does not map to a valid pair of bins: expected bin1_id <= bin2_id < 15 (number of bins)")]
    fn test_invalid_coo(
        bins: BinTable,
        #[case] bin1: Vec<i64>,
        #[case] bin2: Vec<i64>,
        #[case] count: Vec<i64>,
        #[case] expected: &str,
    ) {
        let (bin1, bin2, count) = (Column::from(bin1), Column::from(bin2), Column::from(count));
        let err = pixels_from_columns(
            [("bin1_id", &bin1), ("bin2_id", &bin2), ("count", &count)],
            &bins,
            false,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), expected);
    }

    #[rstest]
    fn test_fractional_counts_in_integer_file(bins: BinTable) {
        let bin1 = Column::from(vec![0i64]);
        let bin2 = Column::from(vec![1i64]);
        let count = Column::from(vec![0.5f64]);
        let err = pixels_from_columns(
            [("bin1_id", &bin1), ("bin2_id", &bin2), ("count", &count)],
            &bins,
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("failed to cast 0.5 to a int32"));
    }

    #[rstest]
    #[case("chr1", 50, 150, "chr1:50-150 does not match bin chr1:0-100")]
    #[case("chr3", 0, 100, "unable to find chromosome named \"chr3\"")]
    #[case("chr1", 200, 100, "end position 100 is smaller than start position 200")]
    fn test_unmappable_bg2(
        bins: BinTable,
        #[case] chrom: &str,
        #[case] start: i64,
        #[case] end: i64,
        #[case] reason: &str,
    ) {
        let chrom1 = Column::from(vec![chrom]);
        let start1 = Column::from(vec![start]);
        let end1 = Column::from(vec![end]);
        let chrom2 = Column::from(vec!["chr2"]);
        let start2 = Column::from(vec![0i64]);
        let end2 = Column::from(vec![100i64]);
        let count = Column::from(vec![1i64]);
        let err = pixels_from_columns(
            [
                ("chrom1", &chrom1),
                ("start1", &start1),
                ("end1", &end1),
                ("chrom2", &chrom2),
                ("start2", &start2),
                ("end2", &end2),
                ("count", &count),
            ],
            &bins,
            false,
        )
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            format!(
                "failed to map {}:{}-{}; chr2:0-100 to a valid pixel: {}",
                chrom, start, end, reason
            )
        );
    }

    #[rstest]
    fn test_record_batch(bins: BinTable) {
        let schema = Schema::new(vec![
            Field::new("bin1_id", DataType::UInt64, false),
            Field::new("bin2_id", DataType::UInt64, false),
            Field::new("count", DataType::Int32, false),
            Field::new("note", DataType::Utf8, false),
        ]);
        let columns: Vec<ArrayRef> = vec![
            Arc::new(UInt64Array::from(vec![0, 3])),
            Arc::new(UInt64Array::from(vec![5, 3])),
            Arc::new(Int32Array::from(vec![7, 8])),
            Arc::new(StringArray::from(vec!["a", "b"])),
        ];
        let batch = RecordBatch::try_new(Arc::new(schema), columns).unwrap();

        let pixels = pixels_from_batch(&batch, &bins, false).unwrap();
        assert_eq!(
            pixels,
            vec![
                ThinPixel::new(0, 5, CountValue::Int(7)),
                ThinPixel::new(3, 3, CountValue::Int(8)),
            ]
        );
    }

    #[rstest]
    fn test_record_batch_with_duplicate_columns(bins: BinTable) {
        let schema = Schema::new(vec![
            Field::new("bin1_id", DataType::UInt64, false),
            Field::new("bin2_id", DataType::UInt64, false),
            Field::new("count", DataType::Int32, false),
            Field::new("count", DataType::Int32, false),
        ]);
        let columns: Vec<ArrayRef> = vec![
            Arc::new(UInt64Array::from(vec![0, 2])),
            Arc::new(UInt64Array::from(vec![1, 3])),
            Arc::new(Int32Array::from(vec![5, 5])),
            Arc::new(Int32Array::from(vec![7, 7])),
        ];
        let batch = RecordBatch::try_new(Arc::new(schema), columns).unwrap();

        let err = pixels_from_batch(&batch, &bins, false).unwrap_err();
        assert!(matches!(err, HicError::InvalidChunk(_)));
        assert!(err.to_string().contains("column \"count\" appears more than once"));
    }
}

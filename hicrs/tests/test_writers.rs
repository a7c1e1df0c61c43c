//! Writer state machine, chunk ingestion and the hic-style writer.
mod common;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use arrow::array::{ArrayRef, DictionaryArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Int32Type, Schema};
use arrow::record_batch::RecordBatch;
use hicrs::{
    Column, ErrorKind, File, FileWriter, HicError, HicFileWriter, PixelWriter, QuerySpan,
    WriterConfig, WriterGuard, with_writer,
};
use hicrs_core::models::{BinTable, CountValue, Reference};
use pretty_assertions::assert_eq;
use rstest::*;
use tempfile::TempDir;

use common::{add_coo, config, pixels, reference, write_cool};

#[fixture]
fn dir() -> TempDir {
    TempDir::new().unwrap()
}

fn all_pixels(file: &File) -> Vec<(u64, u64, f64)> {
    file.fetch_all()
        .unwrap()
        .iter::<f64>()
        .unwrap()
        .map(|p| {
            let p = p.unwrap();
            (p.bin1_id, p.bin2_id, p.count)
        })
        .collect()
}

#[rstest]
fn test_refuses_existing_file(dir: TempDir) {
    let path = dir.path().join("test.cool");
    std::fs::write(&path, b"").unwrap();

    let err = FileWriter::create(&path, reference(), 100, config())
        .err()
        .unwrap();
    assert_eq!(
        err.to_string(),
        format!(
            "unable to create file \"{}\": file already exists",
            path.display()
        )
    );
}

#[rstest]
fn test_duplicates_are_summed(dir: TempDir) {
    let path = dir.path().join("test.cool");
    let mut writer = FileWriter::create(&path, reference(), 100, config()).unwrap();
    add_coo(&mut writer, &[(0, 1, 2), (3, 4, 1), (0, 1, 3)]).unwrap();
    add_coo(&mut writer, &[(3, 4, 10), (0, 0, 1)]).unwrap();
    let file = writer.finalize().unwrap();

    assert_eq!(
        all_pixels(&file),
        vec![(0, 0, 1.0), (0, 1, 5.0), (3, 4, 11.0)]
    );
    assert_eq!(file.sum().unwrap(), CountValue::Int(17));
}

#[rstest]
fn test_state_machine(dir: TempDir) {
    let path = dir.path().join("test.cool");
    let mut writer = FileWriter::create(&path, reference(), 100, config()).unwrap();
    add_coo(&mut writer, &pixels()).unwrap();
    assert!(!path.exists());

    writer.finalize().unwrap();
    assert!(writer.is_finalized());
    assert!(path.exists());

    let err = add_coo(&mut writer, &[(0, 0, 1)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert!(matches!(err, HicError::AlreadyFinalized(_)));

    let err = writer.finalize().unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "finalize() was already called on file \"{}\"",
            path.display()
        )
    );

    // the file written by the first finalize is intact
    assert_eq!(
        File::open(&path).unwrap().nnz().unwrap(),
        pixels().len() as u64
    );
}

#[rstest]
fn test_abort(dir: TempDir) {
    let path = dir.path().join("test.cool");
    let mut writer = FileWriter::create(&path, reference(), 100, config()).unwrap();
    add_coo(&mut writer, &pixels()).unwrap();
    writer.abort();

    assert!(matches!(writer.finalize(), Err(HicError::Aborted(_))));
    assert!(matches!(
        add_coo(&mut writer, &[(0, 0, 1)]),
        Err(HicError::Aborted(_))
    ));
    assert!(!path.exists());
}

#[rstest]
fn test_invalid_chunk_is_rejected_as_a_whole(dir: TempDir) {
    let path = dir.path().join("test.cool");
    let mut writer = FileWriter::create(&path, reference(), 100, config()).unwrap();
    add_coo(&mut writer, &[(0, 1, 1), (2, 2, 1)]).unwrap();

    let err = add_coo(&mut writer, &[(0, 3, 1), (5, 4, 1)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let file = writer.finalize().unwrap();
    assert_eq!(all_pixels(&file), vec![(0, 1, 1.0), (2, 2, 1.0)]);
}

#[rstest]
fn test_duplicate_columns_are_rejected(dir: TempDir) {
    let path = dir.path().join("test.cool");
    let mut writer = FileWriter::create(&path, reference(), 100, config()).unwrap();

    let bin1 = Column::from(vec![0i64, 2]);
    let bin2 = Column::from(vec![1i64, 3]);
    let first = Column::from(vec![5i64, 5]);
    let second = Column::from(vec![7i64, 7]);
    let err = writer
        .add_pixels_from_columns([
            ("bin1_id", &bin1),
            ("bin2_id", &bin2),
            ("count", &first),
            ("count", &second),
        ])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(matches!(err, HicError::InvalidChunk(_)));

    let file = writer.finalize().unwrap();
    assert_eq!(file.nnz().unwrap(), 0);
}

#[rstest]
fn test_empty_file(dir: TempDir) {
    let path = dir.path().join("empty.cool");
    let mut writer = FileWriter::create(&path, reference(), 100, config()).unwrap();
    let file = writer.finalize().unwrap();

    assert_eq!(file.nnz().unwrap(), 0);
    assert_eq!(file.nbins().unwrap(), 15);
    assert_eq!(all_pixels(&file), vec![]);
}

#[rstest]
fn test_bg2_record_batch(dir: TempDir) {
    let path = dir.path().join("test.cool");
    let config = WriterConfig {
        float_counts: true,
        ..config()
    };
    let mut writer = FileWriter::create(&path, reference(), 100, config).unwrap();

    let chrom1: DictionaryArray<Int32Type> = vec!["chr1", "chr1", "chr2"].into_iter().collect();
    let schema = Schema::new(vec![
        Field::new(
            "chrom1",
            DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
            false,
        ),
        Field::new("start1", DataType::Int64, false),
        Field::new("end1", DataType::Int64, false),
        Field::new("chrom2", DataType::Utf8, false),
        Field::new("start2", DataType::Int64, false),
        Field::new("end2", DataType::Int64, false),
        Field::new("count", DataType::Float64, false),
    ]);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(chrom1),
        Arc::new(Int64Array::from(vec![0, 900, 400])),
        Arc::new(Int64Array::from(vec![100, 1000, 500])),
        Arc::new(StringArray::from(vec!["chr1", "chr2", "chr2"])),
        Arc::new(Int64Array::from(vec![100, 0, 400])),
        Arc::new(Int64Array::from(vec![200, 100, 500])),
        Arc::new(Float64Array::from(vec![0.5, 1.25, 2.0])),
    ];
    let batch = RecordBatch::try_new(Arc::new(schema), columns).unwrap();
    writer.add_pixels(&batch).unwrap();
    let file = writer.finalize().unwrap();

    assert_eq!(
        all_pixels(&file),
        vec![(0, 1, 0.5), (9, 10, 1.25), (14, 14, 2.0)]
    );
    assert_eq!(file.sum().unwrap(), CountValue::Float(3.75));
}

#[rstest]
fn test_variable_bins(dir: TempDir) {
    let path = dir.path().join("variable.cool");
    let reference = Reference::new([("chr1", 100), ("chr2", 50)]).unwrap();
    let bins = BinTable::variable(
        reference,
        &["chr1", "chr1", "chr2"],
        &[0, 30, 0],
        &[30, 100, 50],
    )
    .unwrap();

    let mut writer = FileWriter::with_bins(&path, bins, config()).unwrap();
    let columns = [
        ("chrom1", Column::from(vec!["chr1", "chr1"])),
        ("start1", Column::from(vec![0i64, 30])),
        ("end1", Column::from(vec![30i64, 100])),
        ("chrom2", Column::from(vec!["chr1", "chr2"])),
        ("start2", Column::from(vec![30i64, 0])),
        ("end2", Column::from(vec![100i64, 50])),
        ("count", Column::from(vec![4i64, 6])),
    ];
    writer
        .add_pixels_from_columns(columns.iter().map(|(n, c)| (*n, c)))
        .unwrap();
    let file = writer.finalize().unwrap();

    assert_eq!(file.resolution().unwrap(), 0);
    assert_eq!(all_pixels(&file), vec![(0, 1, 4.0), (1, 2, 6.0)]);

    let options = hicrs::StatsOptions {
        keep_zeros: true,
        ..Default::default()
    };
    let err = file
        .fetch_all()
        .unwrap()
        .describe(&hicrs::MetricSet::all(), &options)
        .unwrap_err();
    assert!(matches!(err, HicError::ZerosOnVariableBins));
}

#[rstest]
fn test_with_writer(dir: TempDir) {
    let path = dir.path().join("ok.cool");
    let writer = FileWriter::create(&path, reference(), 100, config()).unwrap();
    let (n, file) = with_writer(writer, |w| {
        add_coo(w, &pixels())?;
        Ok(pixels().len())
    })
    .unwrap();
    assert_eq!(file.nnz().unwrap(), n as u64);

    let path = dir.path().join("failed.cool");
    let writer = FileWriter::create(&path, reference(), 100, config()).unwrap();
    let result = with_writer(writer, |w| {
        add_coo(w, &pixels())?;
        add_coo(w, &[(3, 1, 1)])
    });
    assert!(result.is_err());
    assert!(!path.exists());
}

#[rstest]
fn test_guard_finalizes_on_drop(dir: TempDir) {
    let path = dir.path().join("test.cool");
    {
        let mut guard =
            WriterGuard::new(FileWriter::create(&path, reference(), 100, config()).unwrap());
        add_coo(&mut *guard, &pixels()).unwrap();
    }
    assert_eq!(
        File::open(&path).unwrap().nnz().unwrap(),
        pixels().len() as u64
    );
}

#[rstest]
fn test_guard_aborts_on_panic(dir: TempDir) {
    let path = dir.path().join("test.cool");
    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut guard =
            WriterGuard::new(FileWriter::create(&path, reference(), 100, config()).unwrap());
        add_coo(&mut *guard, &pixels()).unwrap();
        panic!("interrupted");
    }));

    assert!(result.is_err());
    assert!(!path.exists());
}

#[rstest]
fn test_staging_in_custom_tmpdir(dir: TempDir) {
    let tmpdir = dir.path().join("scratch");
    std::fs::create_dir(&tmpdir).unwrap();
    let config = WriterConfig {
        tmpdir: Some(tmpdir.clone()),
        ..config()
    };

    let path = dir.path().join("test.cool");
    let mut writer = FileWriter::create(&path, reference(), 100, config).unwrap();
    add_coo(&mut writer, &pixels()).unwrap();
    assert_eq!(std::fs::read_dir(&tmpdir).unwrap().count(), 1);

    writer.finalize().unwrap();
    assert_eq!(std::fs::read_dir(&tmpdir).unwrap().count(), 0);
}

#[rstest]
fn test_hic_writer(dir: TempDir) {
    let path = dir.path().join("test.hic");
    let config = WriterConfig {
        block_bin_count: 4,
        ..config()
    };
    let mut writer = HicFileWriter::create(&path, reference(), &[200, 100, 500], config).unwrap();
    assert_eq!(writer.resolutions(), &[100, 200, 500]);

    let mut reversed = pixels();
    reversed.reverse();
    add_coo(&mut writer, &reversed).unwrap();
    let base = writer.finalize().unwrap();

    assert!(base.is_hic().unwrap());
    assert_eq!(base.resolution().unwrap(), 100);
    let expected: Vec<_> = pixels()
        .into_iter()
        .map(|(i, j, c)| (i, j, c as f64))
        .collect();
    assert_eq!(all_pixels(&base), expected);

    let err = File::open(&path).unwrap_err();
    assert!(err.to_string().contains("100, 200, 500"));

    let total: i64 = pixels().iter().map(|p| p.2).sum();
    for resolution in [200, 500] {
        let uri = format!("{}::/resolutions/{}", path.display(), resolution);
        let file = File::open(&uri).unwrap();
        assert_eq!(file.resolution().unwrap(), resolution);
        let sum: f64 = all_pixels(&file).iter().map(|p| p.2).sum();
        assert_eq!(sum, total as f64);
    }

    let coarse = File::open_resolution(&path, 500).unwrap();
    let dense = coarse
        .fetch_all()
        .unwrap()
        .to_dense::<f64>(QuerySpan::Full)
        .unwrap();
    assert_eq!(dense.dim(), (3, 3));
}

#[rstest]
#[case(&[], "please provide one or more resolutions")]
#[case(&[0, 100], "resolutions should be greater than zero")]
#[case(&[100, 250], "resolution 250 is not a multiple of the base resolution 100")]
fn test_hic_writer_invalid_resolutions(
    dir: TempDir,
    #[case] resolutions: &[u32],
    #[case] reason: &str,
) {
    let path = dir.path().join("test.hic");
    let err = HicFileWriter::create(&path, reference(), resolutions, config())
        .err()
        .unwrap();
    assert!(err.to_string().contains(reason));
    assert!(!path.exists());
}

#[rstest]
fn test_writer_config_from_toml(dir: TempDir) {
    let config_path = dir.path().join("writer.toml");
    std::fs::write(&config_path, "assembly = \"test\"\nbuffer_size = 3\n").unwrap();
    let config = WriterConfig::try_from(config_path.as_path()).unwrap();

    let path = dir.path().join("test.cool");
    let mut writer = FileWriter::create(&path, reference(), 100, config).unwrap();
    add_coo(&mut writer, &pixels()).unwrap();
    let file = writer.finalize().unwrap();
    assert_eq!(file.attributes().unwrap().assembly.as_deref(), Some("test"));
    assert!(!file.attributes().unwrap().creation_date.is_empty());

    let invalid = WriterConfig {
        compression_level: 12,
        ..Default::default()
    };
    let err = FileWriter::create(dir.path().join("other.cool"), reference(), 100, invalid)
        .err()
        .unwrap();
    assert!(matches!(err, HicError::Config(_)));
}

#[rstest]
fn test_round_trip_through_writer(dir: TempDir) {
    let first = write_cool(&dir.path().join("first.cool"), false);
    let table = first
        .fetch_all()
        .unwrap()
        .to_arrow(QuerySpan::UpperTriangle)
        .unwrap();

    let path = dir.path().join("second.cool");
    let mut writer = FileWriter::create(&path, reference(), 100, config()).unwrap();
    writer.add_pixels(&table).unwrap();
    let second = writer.finalize().unwrap();

    assert_eq!(all_pixels(&first), all_pixels(&second));
    assert_eq!(first.sum().unwrap(), second.sum().unwrap());
}

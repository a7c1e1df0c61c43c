//! Write/read tests of the cooler-style and hic-style layouts through the
//! public `PixelSink` / `PixelStore` API.

use std::collections::BTreeMap;
use std::sync::Arc;

use hicrs_core::models::{BinTable, CountValue, Reference, ThinPixel};
use hicrs_io::cool::{CoolSink, CoolSinkOptions, CoolStore};
use hicrs_io::hic::{HicFile, HicSink, HicSinkOptions};
use hicrs_io::{
    Attributes, COOL_FORMAT, HIC_FORMAT, PixelSink, PixelStore, StoreError, WeightKind, Weights,
    codec, looks_like_coolerfile, looks_like_hicfile,
};
use pretty_assertions::assert_eq;
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn reference() -> Reference {
    Reference::new([("chr1", 1000), ("chr2", 500)]).unwrap()
}

/// Upper-triangular pixels over 15 bins (100 bp on `reference()`).
fn sparse_pixels() -> Vec<(u64, u64, i64)> {
    let mut pixels = Vec::new();
    for i in 0..15u64 {
        for j in i..15u64 {
            if (i + j) % 3 == 0 {
                pixels.push((i, j, (i + j + 1) as i64));
            }
        }
    }
    pixels
}

fn read_all<S: PixelStore + 'static>(store: &Arc<S>) -> Vec<ThinPixel<CountValue>> {
    let nbins = store.bins().len();
    store
        .clone()
        .read_pixel_range(0..nbins, 0..nbins)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[rstest]
#[case::int_counts(false)]
#[case::float_counts(true)]
fn test_cool_round_trip(reference: Reference, #[case] float_counts: bool) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.cool");
    let bins = Arc::new(BinTable::fixed(reference, 100).unwrap());

    let options = CoolSinkOptions {
        chunk_size: 7,
        ..Default::default()
    };
    let mut sink = Box::new(
        CoolSink::create(
            &path,
            bins.clone(),
            float_counts,
            Attributes::new(COOL_FORMAT, 3, "fixed", 100),
            options,
        )
        .unwrap(),
    );
    for (i, j, count) in sparse_pixels() {
        sink.append(ThinPixel::new(i, j, CountValue::Int(count))).unwrap();
    }
    let weights = Weights::new(
        (0..15).map(|i| i as f64 + 1.0).collect(),
        WeightKind::Multiplicative,
    );
    let attributes = sink.write_index(&[("weight".to_string(), weights.clone())]).unwrap();

    let expected_sum: i64 = sparse_pixels().iter().map(|p| p.2).sum();
    assert_eq!(attributes.nnz, sparse_pixels().len() as u64);
    assert_eq!(attributes.sum.as_f64(), expected_sum as f64);
    assert_eq!(attributes.nbins, 15);

    assert!(looks_like_coolerfile(&path));
    let store = Arc::new(CoolStore::open(&path).unwrap());
    assert_eq!(store.has_float_counts(), float_counts);
    assert_eq!(store.bins().as_ref(), bins.as_ref());
    assert_eq!(store.attributes().nnz, attributes.nnz);

    let pixels = read_all(&store);
    let expected: Vec<_> = sparse_pixels()
        .into_iter()
        .map(|(i, j, c)| {
            let count = if float_counts {
                CountValue::Float(c as f64)
            } else {
                CountValue::Int(c)
            };
            ThinPixel::new(i, j, count)
        })
        .collect();
    assert_eq!(pixels, expected);

    assert_eq!(store.list_normalizations(), vec!["weight".to_string()]);
    assert_eq!(store.read_normalization("weight").unwrap(), weights);
    assert!(matches!(
        store.read_normalization("VC"),
        Err(StoreError::NormalizationNotFound { .. })
    ));
}

#[rstest]
#[case(2..5, 4..9)]
#[case(0..1, 0..15)]
#[case(10..15, 10..15)]
#[case(7..8, 0..7)]
#[case(3..3, 0..15)]
fn test_cool_range_queries(
    reference: Reference,
    #[case] rows: std::ops::Range<u64>,
    #[case] cols: std::ops::Range<u64>,
) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.cool");
    let bins = Arc::new(BinTable::fixed(reference, 100).unwrap());

    let options = CoolSinkOptions {
        chunk_size: 4,
        ..Default::default()
    };
    let mut sink = Box::new(
        CoolSink::create(&path, bins, false, Attributes::new(COOL_FORMAT, 3, "fixed", 100), options)
            .unwrap(),
    );
    for (i, j, count) in sparse_pixels() {
        sink.append(ThinPixel::new(i, j, CountValue::Int(count))).unwrap();
    }
    sink.write_index(&[]).unwrap();

    let store = Arc::new(CoolStore::open(&path).unwrap());
    let pixels = store
        .clone()
        .read_pixel_range(rows.clone(), cols.clone())
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    let expected: Vec<_> = sparse_pixels()
        .into_iter()
        .filter(|(i, j, _)| rows.contains(i) && cols.contains(j))
        .map(|(i, j, c)| ThinPixel::new(i, j, CountValue::Int(c)))
        .collect();
    assert_eq!(pixels, expected);
}

#[rstest]
fn test_cool_variable_bins(reference: Reference) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("variable.cool");
    let bins = Arc::new(
        BinTable::variable(
            reference,
            &["chr1", "chr1", "chr2"],
            &[0, 300, 0],
            &[300, 1000, 500],
        )
        .unwrap(),
    );

    let mut sink = Box::new(
        CoolSink::create(
            &path,
            bins.clone(),
            false,
            Attributes::new(COOL_FORMAT, 3, "variable", 0),
            CoolSinkOptions::default(),
        )
        .unwrap(),
    );
    sink.append(ThinPixel::new(0, 1, CountValue::Int(3))).unwrap();
    sink.append(ThinPixel::new(1, 2, CountValue::Int(4))).unwrap();
    let attributes = sink.write_index(&[]).unwrap();
    assert_eq!(attributes.cis, CountValue::Int(3));
    assert_eq!(attributes.sum, CountValue::Int(7));

    let store = Arc::new(CoolStore::open(&path).unwrap());
    assert_eq!(store.bins().as_ref(), bins.as_ref());
    assert_eq!(read_all(&store).len(), 2);
}

#[rstest]
fn test_cool_sink_rejects_invalid_pixels(reference: Reference) {
    let dir = TempDir::new().unwrap();
    let bins = Arc::new(BinTable::fixed(reference, 100).unwrap());
    let mut sink = CoolSink::create(
        dir.path().join("test.cool"),
        bins,
        false,
        Attributes::new(COOL_FORMAT, 3, "fixed", 100),
        CoolSinkOptions::default(),
    )
    .unwrap();

    assert!(matches!(
        sink.append(ThinPixel::new(2, 1, CountValue::Int(1))),
        Err(StoreError::InvalidPixel { .. })
    ));
    assert!(matches!(
        sink.append(ThinPixel::new(1, 1, CountValue::Float(0.5))),
        Err(StoreError::InvalidPixel { .. })
    ));
    sink.append(ThinPixel::new(1, 2, CountValue::Float(2.0))).unwrap();
    assert!(matches!(
        sink.append(ThinPixel::new(1, 1, CountValue::Int(1))),
        Err(StoreError::UnsortedPixels { .. })
    ));
}

#[rstest]
fn test_truncated_cool_file_is_rejected(reference: Reference) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.cool");
    let bins = Arc::new(BinTable::fixed(reference, 100).unwrap());
    let mut sink = Box::new(
        CoolSink::create(
            &path,
            bins,
            false,
            Attributes::new(COOL_FORMAT, 3, "fixed", 100),
            CoolSinkOptions::default(),
        )
        .unwrap(),
    );
    sink.append(ThinPixel::new(0, 0, CountValue::Int(1))).unwrap();
    sink.write_index(&[]).unwrap();

    let data = std::fs::read(&path).unwrap();
    std::fs::write(&path, &data[..data.len() - 4]).unwrap();
    assert!(CoolStore::open(&path).is_err());
}

#[rstest]
#[case::out_of_range(1, 100)]
#[case::decreasing(1, sparse_pixels().len() as u64)]
#[case::not_starting_at_zero(0, 1)]
fn test_corrupt_bin1_offset_is_rejected(
    reference: Reference,
    #[case] entry: usize,
    #[case] value: u64,
) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.cool");
    let bins = Arc::new(BinTable::fixed(reference, 100).unwrap());
    let nbins = bins.len() as usize;
    let options = CoolSinkOptions {
        chunk_size: 4,
        ..Default::default()
    };
    let mut sink = Box::new(
        CoolSink::create(
            &path,
            bins,
            false,
            Attributes::new(COOL_FORMAT, 3, "fixed", 100),
            options,
        )
        .unwrap(),
    );
    for (i, j, count) in sparse_pixels() {
        sink.append(ThinPixel::new(i, j, CountValue::Int(count))).unwrap();
    }
    sink.write_index(&[]).unwrap();
    assert!(CoolStore::open(&path).is_ok());

    // the index block sits right before the trailer and ends with bin1_offset
    // followed by a zero weight count
    let data = std::fs::read(&path).unwrap();
    let trailer = data.len() - codec::TRAILER_LEN as usize;
    let index_offset =
        u64::from_le_bytes(data[trailer..trailer + 8].try_into().unwrap()) as usize;
    let mut index = codec::decompress(&data[index_offset..trailer]).unwrap();
    let at = index.len() - 4 - 8 * (nbins + 1) + 8 * entry;
    index[at..at + 8].copy_from_slice(&value.to_le_bytes());

    let mut patched = data[..index_offset].to_vec();
    patched.extend(codec::compress(&index, 6).unwrap());
    patched.extend_from_slice(&data[trailer..]);
    std::fs::write(&path, &patched).unwrap();

    let err = CoolStore::open(&path).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }), "{}", err);
}

fn write_hic(dir: &TempDir, reference: Reference, resolutions: &[u32]) -> std::path::PathBuf {
    let path = dir.path().join("test.hic");
    let options = HicSinkOptions {
        block_bin_count: 3,
        ..Default::default()
    };
    let mut sink = Box::new(
        HicSink::create(
            &path,
            reference,
            resolutions,
            Attributes::new(HIC_FORMAT, 1, "fixed", 0),
            options,
        )
        .unwrap(),
    );
    for (i, j, count) in sparse_pixels() {
        sink.append(ThinPixel::new(i, j, CountValue::Int(count))).unwrap();
    }

    let weights = Weights::new(vec![2.0; 15], WeightKind::Multiplicative);
    sink.write_index(&[("KR".to_string(), weights)]).unwrap();
    path
}

#[rstest]
fn test_hic_round_trip(reference: Reference) {
    let dir = TempDir::new().unwrap();
    let path = write_hic(&dir, reference, &[200, 100]);
    assert!(looks_like_hicfile(&path));

    let file = HicFile::open(&path).unwrap();
    assert_eq!(file.resolutions(), vec![100, 200]);

    let store = Arc::new(file.store(100).unwrap());
    assert_eq!(store.uri(), format!("{}::/resolutions/100", path.display()));
    let expected: Vec<_> = sparse_pixels()
        .into_iter()
        .map(|(i, j, c)| ThinPixel::new(i, j, CountValue::Float(c as f64)))
        .collect();
    assert_eq!(read_all(&store), expected);

    // KR is stored divisive: 1 / 2.0
    assert_eq!(store.list_normalizations(), vec!["KR".to_string()]);
    let weights = store.read_normalization("KR").unwrap();
    assert_eq!(weights.kind(), WeightKind::Divisive);
    assert_eq!(weights.values(), &[0.5; 15]);
}

#[rstest]
fn test_hic_coarsening(reference: Reference) {
    let dir = TempDir::new().unwrap();
    let path = write_hic(&dir, reference.clone(), &[100, 200]);

    let base = BinTable::fixed(reference.clone(), 100).unwrap();
    let coarse = BinTable::fixed(reference, 200).unwrap();
    let mut expected: BTreeMap<(u64, u64), f64> = BTreeMap::new();
    for (i, j, count) in sparse_pixels() {
        let bin1 = base.get(i).unwrap();
        let bin2 = base.get(j).unwrap();
        let key = (
            coarse.get_id(bin1.chrom.name(), bin1.start).unwrap(),
            coarse.get_id(bin2.chrom.name(), bin2.start).unwrap(),
        );
        *expected.entry(key).or_default() += count as f64;
    }

    let file = HicFile::open(&path).unwrap();
    let store = Arc::new(file.store(200).unwrap());
    assert_eq!(store.bins().len(), 8);

    let pixels: Vec<_> = read_all(&store)
        .into_iter()
        .map(|p| ((p.bin1_id, p.bin2_id), p.count.as_f64()))
        .collect();
    assert_eq!(pixels, expected.into_iter().collect::<Vec<_>>());

    let total: i64 = sparse_pixels().iter().map(|p| p.2).sum();
    assert_eq!(store.attributes().sum, CountValue::Float(total as f64));
    assert!(store.read_normalization("KR").is_err());
}

#[rstest]
#[case(2..5, 4..9)]
#[case(9..12, 0..15)]
#[case(10..15, 10..15)]
fn test_hic_range_queries(
    reference: Reference,
    #[case] rows: std::ops::Range<u64>,
    #[case] cols: std::ops::Range<u64>,
) {
    let dir = TempDir::new().unwrap();
    let path = write_hic(&dir, reference, &[100]);
    let store = Arc::new(HicFile::open(&path).unwrap().store(100).unwrap());

    let pixels = store
        .clone()
        .read_pixel_range(rows.clone(), cols.clone())
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let expected: Vec<_> = sparse_pixels()
        .into_iter()
        .filter(|(i, j, _)| rows.contains(i) && cols.contains(j))
        .map(|(i, j, c)| ThinPixel::new(i, j, CountValue::Float(c as f64)))
        .collect();
    assert_eq!(pixels, expected);
}

#[rstest]
#[case(&[], "please provide one or more resolutions")]
#[case(&[100, 150], "resolution 150 is not a multiple of the base resolution 100")]
fn test_hic_invalid_resolutions(#[case] resolutions: &[u32], #[case] message: &str) {
    let err = HicSink::validate_resolutions(resolutions).unwrap_err();
    assert_eq!(err.to_string(), format!("invalid resolutions: {}", message));
}

#[rstest]
fn test_missing_hic_resolution(reference: Reference) {
    let dir = TempDir::new().unwrap();
    let path = write_hic(&dir, reference, &[100, 200]);
    let err = HicFile::open(&path).unwrap().store(500).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "unable to find resolution 500 in file \"{}\". Available resolutions: 100, 200",
            path.display()
        )
    );
}

use std::sync::Arc;

use arrow::array::{ArrayRef, PrimitiveArray, StringArray, UInt32Array, UInt64Array};
use arrow::datatypes::{ArrowPrimitiveType, DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use ndarray::Array2;
use sprs::{CsMat, TriMat};

use hicrs_core::models::{Count, CountType, ThinPixel};

use super::{PixelSelector, QuerySpan};
use crate::errors::Result;

impl PixelSelector {
    fn collect_span<N: Count>(&self, span: QuerySpan) -> Result<Vec<ThinPixel<N>>> {
        let mut pixels = self.iter_span::<N>(span)?.collect::<Result<Vec<_>>>()?;
        if span != QuerySpan::UpperTriangle {
            pixels.sort_unstable_by_key(|pixel| pixel.coords());
        }
        Ok(pixels)
    }

    fn offsets(&self, pixel: &ThinPixel<impl Copy>) -> (usize, usize) {
        (
            (pixel.bin1_id - self.range1.start) as usize,
            (pixel.bin2_id - self.range2.start) as usize,
        )
    }

    ///
    /// Pixels as an Arrow table, sorted by `(bin1_id, bin2_id)`.
    ///
    /// COO tables have the columns `bin1_id, bin2_id, count`; joined (BG2)
    /// tables `chrom1, start1, end1, chrom2, start2, end2, count`.
    ///
    pub fn to_table<N: Count>(&self, span: QuerySpan) -> Result<RecordBatch> {
        let pixels = self.collect_span::<N>(span)?;
        let counts: ArrayRef = Arc::new(PrimitiveArray::<N::ArrowType>::from_iter_values(
            pixels.iter().map(|pixel| pixel.count),
        ));
        let count_field = Field::new(
            "count",
            <N::ArrowType as ArrowPrimitiveType>::DATA_TYPE,
            false,
        );

        if !self.join {
            let schema = Schema::new(vec![
                Field::new("bin1_id", DataType::UInt64, false),
                Field::new("bin2_id", DataType::UInt64, false),
                count_field,
            ]);
            let columns: Vec<ArrayRef> = vec![
                Arc::new(UInt64Array::from_iter_values(
                    pixels.iter().map(|pixel| pixel.bin1_id),
                )),
                Arc::new(UInt64Array::from_iter_values(
                    pixels.iter().map(|pixel| pixel.bin2_id),
                )),
                counts,
            ];
            return Ok(RecordBatch::try_new(Arc::new(schema), columns)?);
        }

        let mut chrom1 = Vec::with_capacity(pixels.len());
        let mut start1 = Vec::with_capacity(pixels.len());
        let mut end1 = Vec::with_capacity(pixels.len());
        let mut chrom2 = Vec::with_capacity(pixels.len());
        let mut start2 = Vec::with_capacity(pixels.len());
        let mut end2 = Vec::with_capacity(pixels.len());
        for pixel in &pixels {
            let bin1 = self.bins.get(pixel.bin1_id)?;
            let bin2 = self.bins.get(pixel.bin2_id)?;
            chrom1.push(bin1.chrom.name().to_string());
            start1.push(bin1.start);
            end1.push(bin1.end);
            chrom2.push(bin2.chrom.name().to_string());
            start2.push(bin2.start);
            end2.push(bin2.end);
        }

        let schema = Schema::new(vec![
            Field::new("chrom1", DataType::Utf8, false),
            Field::new("start1", DataType::UInt32, false),
            Field::new("end1", DataType::UInt32, false),
            Field::new("chrom2", DataType::Utf8, false),
            Field::new("start2", DataType::UInt32, false),
            Field::new("end2", DataType::UInt32, false),
            count_field,
        ]);
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(chrom1)),
            Arc::new(UInt32Array::from(start1)),
            Arc::new(UInt32Array::from(end1)),
            Arc::new(StringArray::from(chrom2)),
            Arc::new(UInt32Array::from(start2)),
            Arc::new(UInt32Array::from(end2)),
            counts,
        ];
        Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
    }

    ///
    /// [`PixelSelector::to_table`] with the count column typed after [`PixelSelector::dtype`].
    ///
    pub fn to_arrow(&self, span: QuerySpan) -> Result<RecordBatch> {
        match self.count_type {
            CountType::Int8 => self.to_table::<i8>(span),
            CountType::Int16 => self.to_table::<i16>(span),
            CountType::Int32 => self.to_table::<i32>(span),
            CountType::Int64 => self.to_table::<i64>(span),
            CountType::UInt8 => self.to_table::<u8>(span),
            CountType::UInt16 => self.to_table::<u16>(span),
            CountType::UInt32 => self.to_table::<u32>(span),
            CountType::UInt64 => self.to_table::<u64>(span),
            CountType::Float32 => self.to_table::<f32>(span),
            CountType::Float64 => self.to_table::<f64>(span),
        }
    }

    ///
    /// Dense `rows x cols` matrix of the query; cells without a pixel are zero.
    ///
    pub fn to_dense<N: Count>(&self, span: QuerySpan) -> Result<Array2<N>> {
        let mut matrix = Array2::<N>::zeros(self.shape());
        for pixel in self.iter_span::<N>(span)? {
            let pixel = pixel?;
            let (i, j) = self.offsets(&pixel);
            matrix[[i, j]] = pixel.count;
        }
        Ok(matrix)
    }

    ///
    /// Sparse matrix of the query in triplet form.
    ///
    pub fn to_coo<N: Count>(&self, span: QuerySpan) -> Result<TriMat<N>> {
        let pixels = self.collect_span::<N>(span)?;
        let mut matrix = TriMat::with_capacity(self.shape(), pixels.len());
        for pixel in &pixels {
            let (i, j) = self.offsets(pixel);
            matrix.add_triplet(i, j, pixel.count);
        }
        Ok(matrix)
    }

    pub fn to_csr<N: Count>(&self, span: QuerySpan) -> Result<CsMat<N>> {
        Ok(self.to_coo::<N>(span)?.to_csr())
    }
}

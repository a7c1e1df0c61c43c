use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use hicrs_core::models::{Count, CountValue, ThinPixel};
use hicrs_io::{PixelStream, Weights};

use crate::errors::{HicError, Result};
use crate::file::FileInner;

///
/// Stream of pixels of a [`super::PixelSelector`], converted to `N`.
///
/// The iterator checks that its file is still open before every step; after a
/// [`crate::File::close`] it yields a single [`HicError::FileClosed`] and then
/// stops. Any other error also ends the stream.
///
pub struct PixelIter<N> {
    file: Weak<FileInner>,
    uri: String,
    stream: PixelStream,
    weights: Option<Arc<Weights>>,
    band: Option<u64>,
    transpose: bool,
    skip_diagonal: bool,
    done: bool,
    _count: PhantomData<N>,
}

impl<N: Count> PixelIter<N> {
    pub(crate) fn new(
        file: Weak<FileInner>,
        uri: String,
        stream: PixelStream,
        weights: Option<Arc<Weights>>,
        band: Option<u64>,
        transpose: bool,
        skip_diagonal: bool,
    ) -> Self {
        PixelIter {
            file,
            uri,
            stream,
            weights,
            band,
            transpose,
            skip_diagonal,
            done: false,
            _count: PhantomData,
        }
    }

    fn is_alive(&self) -> bool {
        self.file.upgrade().is_some_and(|file| !file.is_closed())
    }

    fn convert(&self, pixel: &ThinPixel<CountValue>) -> Result<N> {
        let Some(weights) = &self.weights else {
            return Ok(N::from_count(pixel.count)?);
        };
        let weight = |id: u64| weights.values().get(id as usize).copied().unwrap_or(f64::NAN);
        let factor = weight(pixel.bin1_id) * weight(pixel.bin2_id);
        Ok(N::from_f64(pixel.count.as_f64() * factor)?)
    }

    fn fail(&mut self, error: HicError) -> Option<Result<ThinPixel<N>>> {
        self.done = true;
        Some(Err(error))
    }
}

impl<N: Count> Iterator for PixelIter<N> {
    type Item = Result<ThinPixel<N>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.is_alive() {
            return self.fail(HicError::FileClosed(self.uri.clone()));
        }

        loop {
            let pixel = match self.stream.next()? {
                Ok(pixel) => pixel,
                Err(e) => return self.fail(e.into()),
            };
            if self
                .band
                .is_some_and(|width| pixel.bin1_id.abs_diff(pixel.bin2_id) >= width)
            {
                continue;
            }
            if self.skip_diagonal && pixel.bin1_id == pixel.bin2_id {
                continue;
            }

            let count = match self.convert(&pixel) {
                Ok(count) => count,
                Err(e) => return self.fail(e),
            };
            let pixel = ThinPixel::new(pixel.bin1_id, pixel.bin2_id, count);
            return Some(Ok(if self.transpose {
                pixel.transpose()
            } else {
                pixel
            }));
        }
    }
}

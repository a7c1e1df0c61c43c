use log::debug;

use hicrs_core::models::{BinTableKind, Count};
use hicrs_stats::{Metric, MetricSet, Stats, StatsOptions, Value, describe};

use super::PixelSelector;
use crate::errors::{HicError, Result};

impl PixelSelector {
    ///
    /// Descriptive statistics of the counts of the query.
    ///
    /// Statistics are computed over the stored (upper-triangular) pixels. With
    /// `keep_zeros`, every cell of the upper triangle covered by the query and
    /// lacking a pixel contributes a zero.
    ///
    /// # Arguments
    /// - metrics: metrics to compute; the others are left as `None`
    /// - options: NaN/Inf/zero handling and the single- or two-pass strategy
    ///
    pub fn describe(&self, metrics: &MetricSet, options: &StatsOptions) -> Result<Stats> {
        if options.keep_zeros && self.bins.kind() != BinTableKind::Fixed {
            return Err(HicError::ZerosOnVariableBins);
        }
        let population = Some(self.size(true));
        debug!(
            "computing {:?} over {} (population: {:?})",
            metrics.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
            self,
            population
        );

        if self.count_type.is_float() {
            describe(metrics, options, population, || self.counts::<f64>())
        } else {
            describe(metrics, options, population, || self.counts::<i64>())
        }
    }

    ///
    /// [`PixelSelector::describe`] with metrics given by name.
    ///
    pub fn describe_named<S: AsRef<str>>(
        &self,
        metrics: &[S],
        options: &StatsOptions,
    ) -> Result<Stats> {
        self.describe(&MetricSet::parse(metrics)?, options)
    }

    ///
    /// Number of stored pixels with finite, non-zero counts.
    ///
    pub fn nnz(&self) -> Result<u64> {
        let stats = self.single(Metric::Nnz)?;
        Ok(stats.nnz.unwrap_or(0))
    }

    ///
    /// Sum of the finite counts.
    ///
    pub fn sum(&self) -> Result<Value> {
        let stats = self.single(Metric::Sum)?;
        Ok(stats.sum.unwrap_or(if self.count_type.is_float() {
            Value::Float(0.0)
        } else {
            Value::Int(0)
        }))
    }

    fn single(&self, metric: Metric) -> Result<Stats> {
        let mut metrics = MetricSet::empty();
        metrics.insert(metric);
        self.describe(&metrics, &StatsOptions::default())
    }

    fn counts<N: Count>(&self) -> Result<impl Iterator<Item = Result<N>> + use<N>> {
        Ok(self.iter::<N>()?.map(|pixel| pixel.map(|pixel| pixel.count)))
    }
}

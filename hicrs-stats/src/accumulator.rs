use std::cmp::Ordering;

use hicrs_core::models::Count;

use crate::metric::{Metric, MetricSet};
use crate::stats::{Stats, StatsOptions, Value};

///
/// Strategy computing [`Stats`] from one or more traversals of a population.
///
/// The driver calls [`Accumulator::update`] for every stored value of each
/// traversal, then [`Accumulator::end_pass`], and finally [`Accumulator::finish`].
///
pub trait Accumulator<N: Count> {
    ///
    /// Number of traversals of the population the strategy needs.
    ///
    fn passes(&self) -> usize;

    ///
    /// Feed one stored value during traversal `pass`. Filtering happens here.
    ///
    fn update(&mut self, pass: usize, value: N);

    fn end_pass(&mut self, _pass: usize) {}

    ///
    /// Whether further values can no longer change the requested metrics.
    ///
    fn is_saturated(&self) -> bool {
        false
    }

    fn finish(self) -> Stats;
}

///
/// First-order state shared by both strategies: counts, sum, extremes and
/// the non-finite values seen so far.
///
#[derive(Debug, Clone)]
pub(crate) struct Summary<N> {
    pub(crate) metrics: MetricSet,
    options: StatsOptions,
    population: Option<u64>,

    // stored values observed, retained or not
    visited: u64,
    // stored values retained by the filters
    count: u64,
    nnz: u64,
    // None once the integer sum no longer fits an i64
    int_sum: Option<i64>,
    float_sum: f64,
    min: Option<N>,
    max: Option<N>,

    nan: bool,
    pos_inf: bool,
    neg_inf: bool,
}

impl<N: Count> Summary<N> {
    pub(crate) fn new(metrics: MetricSet, options: StatsOptions, population: Option<u64>) -> Self {
        Summary {
            metrics,
            options,
            population,
            visited: 0,
            count: 0,
            nnz: 0,
            int_sum: Some(0),
            float_sum: 0.0,
            min: None,
            max: None,
            nan: false,
            pos_inf: false,
            neg_inf: false,
        }
    }

    ///
    /// Whether a value survives the NaN/Inf filters. Integers always do.
    ///
    pub(crate) fn retains(&self, value: N) -> bool {
        if value.is_nan() {
            return self.options.keep_nans;
        }
        if value.is_infinite() {
            return self.options.keep_infs;
        }
        true
    }

    ///
    /// Record a stored value; returns whether it was retained.
    ///
    pub(crate) fn observe(&mut self, value: N) -> bool {
        self.visited += 1;
        if !self.retains(value) {
            return false;
        }

        self.count += 1;
        if value != N::zero() {
            self.nnz += 1;
        }

        if value.is_nan() {
            self.nan = true;
            return true;
        }
        if value.is_infinite() {
            if value > N::zero() {
                self.pos_inf = true;
            } else {
                self.neg_inf = true;
            }
        }

        self.float_sum += value.to_f64();
        if !N::is_float() {
            self.int_sum = self
                .int_sum
                .zip(value.to_i64())
                .and_then(|(sum, value)| sum.checked_add(value));
        }

        if self.min.is_none_or(|m| value.partial_cmp(&m) == Some(Ordering::Less)) {
            self.min = Some(value);
        }
        if self.max.is_none_or(|m| value.partial_cmp(&m) == Some(Ordering::Greater)) {
            self.max = Some(value);
        }
        true
    }

    pub(crate) fn has_nan(&self) -> bool {
        self.nan
    }

    pub(crate) fn has_non_finite(&self) -> bool {
        self.nan || self.pos_inf || self.neg_inf
    }

    ///
    /// Cells of the population that hold no stored pixel.
    ///
    pub(crate) fn implicit_zeros(&self) -> u64 {
        if !self.options.keep_zeros {
            return 0;
        }
        self.population
            .map(|p| p.saturating_sub(self.visited))
            .unwrap_or(0)
    }

    ///
    /// Size of the population, implicit zeros included.
    ///
    pub(crate) fn size(&self) -> u64 {
        self.count + self.implicit_zeros()
    }

    fn sum_f64(&self) -> f64 {
        if self.nan {
            f64::NAN
        } else {
            match self.int_sum {
                Some(sum) if !N::is_float() => sum as f64,
                _ => self.float_sum,
            }
        }
    }

    pub(crate) fn mean(&self) -> Option<f64> {
        match self.size() {
            0 => None,
            n => Some(self.sum_f64() / n as f64),
        }
    }

    fn to_value(&self, value: N) -> Value {
        if N::is_float() {
            Value::Float(value.to_f64())
        } else {
            value
                .to_i64()
                .map_or(Value::Float(value.to_f64()), Value::Int)
        }
    }

    fn zero_value() -> Value {
        if N::is_float() {
            Value::Float(0.0)
        } else {
            Value::Int(0)
        }
    }

    fn extreme(&self, value: Option<N>, ordering: Ordering) -> Option<Value> {
        if self.size() == 0 {
            return None;
        }
        if self.nan {
            return Some(Value::Float(f64::NAN));
        }

        let stored = value.map(|v| self.to_value(v));
        if self.implicit_zeros() == 0 {
            return stored;
        }

        let zero = Self::zero_value();
        Some(match stored {
            Some(v) if v.as_f64().partial_cmp(&0.0) == Some(ordering) => v,
            _ => zero,
        })
    }

    ///
    /// Fill the first-order metrics that were requested.
    ///
    pub(crate) fn fill(&self, stats: &mut Stats) {
        if self.metrics.contains(Metric::Nnz) {
            stats.nnz = Some(self.nnz);
        }
        if self.metrics.contains(Metric::Sum) {
            stats.sum = Some(match self.int_sum {
                Some(sum) if !N::is_float() => Value::Int(sum),
                _ => Value::Float(self.sum_f64()),
            });
        }
        if self.metrics.contains(Metric::Min) {
            stats.min = self.extreme(self.min, Ordering::Less);
        }
        if self.metrics.contains(Metric::Max) {
            stats.max = self.extreme(self.max, Ordering::Greater);
        }
        if self.metrics.contains(Metric::Mean) {
            stats.mean = self.mean();
        }
    }

    ///
    /// Fill variance, skewness and kurtosis from the sums of the 2nd, 3rd and
    /// 4th powers of the deviations from the mean.
    ///
    pub(crate) fn fill_moments(&self, stats: &mut Stats, m2: f64, m3: f64, m4: f64) {
        let n = self.size();
        if n < 2 {
            return;
        }

        let (variance, skewness, kurtosis) = if self.has_non_finite() {
            (f64::NAN, f64::NAN, f64::NAN)
        } else {
            let n = n as f64;
            (
                m2 / (n - 1.0),
                (m3 / n) / (m2 / n).powf(1.5),
                (m4 / n) / ((m2 / n) * (m2 / n)) - 3.0,
            )
        };

        if self.metrics.contains(Metric::Variance) {
            stats.variance = Some(variance);
        }
        if self.metrics.contains(Metric::Skewness) {
            stats.skewness = Some(skewness);
        }
        if self.metrics.contains(Metric::Kurtosis) {
            stats.kurtosis = Some(kurtosis);
        }
    }
}

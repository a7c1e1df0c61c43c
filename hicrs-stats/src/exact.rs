use hicrs_core::models::Count;

use crate::accumulator::{Accumulator, Summary};
use crate::metric::{Metric, MetricSet};
use crate::stats::{Stats, StatsOptions};

///
/// Two-pass accumulator: the first traversal yields count, sum and extremes,
/// the second accumulates powers of the deviations from the exact mean.
///
#[derive(Debug, Clone)]
pub struct ExactAccumulator<N> {
    summary: Summary<N>,
    pass: usize,
    mean: f64,
    m2: f64,
    m3: f64,
    m4: f64,
}

impl<N: Count> ExactAccumulator<N> {
    ///
    /// # Arguments
    /// - metrics: metrics to compute
    /// - options: filtering policy
    /// - population: number of cells in the query, used when `keep_zeros` is set
    ///
    pub fn new(metrics: MetricSet, options: StatsOptions, population: Option<u64>) -> Self {
        ExactAccumulator {
            summary: Summary::new(metrics, options, population),
            pass: 0,
            mean: 0.0,
            m2: 0.0,
            m3: 0.0,
            m4: 0.0,
        }
    }
}

impl<N: Count> Accumulator<N> for ExactAccumulator<N> {
    fn passes(&self) -> usize {
        if self.summary.metrics.needs_moments() {
            2
        } else {
            1
        }
    }

    fn update(&mut self, pass: usize, value: N) {
        if pass == 0 {
            self.summary.observe(value);
            return;
        }

        if self.summary.retains(value) {
            let delta = value.to_f64() - self.mean;
            let delta2 = delta * delta;
            self.m2 += delta2;
            self.m3 += delta2 * delta;
            self.m4 += delta2 * delta2;
        }
    }

    fn end_pass(&mut self, pass: usize) {
        if pass == 0 {
            self.mean = self.summary.mean().unwrap_or(0.0);
        }
        self.pass = pass + 1;
    }

    fn is_saturated(&self) -> bool {
        match self.pass {
            0 => self.summary.has_nan() && !self.summary.metrics.contains(Metric::Nnz),
            // moments of a non-finite population are NaN regardless of the deviations
            _ => self.summary.has_non_finite(),
        }
    }

    fn finish(mut self) -> Stats {
        let mut stats = Stats::default();
        self.summary.fill(&mut stats);

        if self.summary.metrics.needs_moments() {
            let zeros = self.summary.implicit_zeros() as f64;
            let deviation = -self.mean;
            let deviation2 = deviation * deviation;
            self.m2 += zeros * deviation2;
            self.m3 += zeros * deviation2 * deviation;
            self.m4 += zeros * deviation2 * deviation2;

            self.summary
                .fill_moments(&mut stats, self.m2, self.m3, self.m4);
        }
        stats
    }
}

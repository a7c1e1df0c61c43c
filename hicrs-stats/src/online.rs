use hicrs_core::models::Count;

use crate::accumulator::{Accumulator, Summary};
use crate::metric::{Metric, MetricSet};
use crate::stats::{Stats, StatsOptions};

///
/// Single-pass accumulator.
///
/// Central moments are updated per value with the Welford/Terriberry
/// recurrences; implicit zeros are merged in one step at the end using the
/// pairwise combination formulas, so their number does not affect run time.
///
#[derive(Debug, Clone)]
pub struct OnlineAccumulator<N> {
    summary: Summary<N>,
    n: f64,
    mean: f64,
    m2: f64,
    m3: f64,
    m4: f64,
}

impl<N: Count> OnlineAccumulator<N> {
    ///
    /// # Arguments
    /// - metrics: metrics to compute
    /// - options: filtering policy
    /// - population: number of cells in the query, used when `keep_zeros` is set
    ///
    pub fn new(metrics: MetricSet, options: StatsOptions, population: Option<u64>) -> Self {
        OnlineAccumulator {
            summary: Summary::new(metrics, options, population),
            n: 0.0,
            mean: 0.0,
            m2: 0.0,
            m3: 0.0,
            m4: 0.0,
        }
    }

    fn push(&mut self, x: f64) {
        self.n += 1.0;
        let n = self.n;

        let delta = x - self.mean;
        let delta_n = delta / n;
        let delta_n2 = delta_n * delta_n;
        let term1 = delta * delta_n * (n - 1.0);

        self.mean += delta_n;
        self.m4 += term1 * delta_n2 * (n * n - 3.0 * n + 3.0) + 6.0 * delta_n2 * self.m2
            - 4.0 * delta_n * self.m3;
        self.m3 += term1 * delta_n * (n - 2.0) - 3.0 * delta_n * self.m2;
        self.m2 += term1;
    }

    fn merge_zeros(&mut self, zeros: u64) {
        if zeros == 0 {
            return;
        }

        let (na, nb) = (self.n, zeros as f64);
        let n = na + nb;
        let delta = -self.mean;
        let delta2 = delta * delta;

        let m2 = self.m2 + delta2 * na * nb / n;
        let m3 = self.m3 + delta2 * delta * na * nb * (na - nb) / (n * n)
            - 3.0 * delta * nb * self.m2 / n;
        let m4 = self.m4
            + delta2 * delta2 * na * nb * (na * na - na * nb + nb * nb) / (n * n * n)
            + 6.0 * delta2 * nb * nb * self.m2 / (n * n)
            - 4.0 * delta * nb * self.m3 / n;

        self.mean += delta * nb / n;
        self.m2 = m2;
        self.m3 = m3;
        self.m4 = m4;
        self.n = n;
    }
}

impl<N: Count> Accumulator<N> for OnlineAccumulator<N> {
    fn passes(&self) -> usize {
        1
    }

    fn update(&mut self, _pass: usize, value: N) {
        if self.summary.observe(value)
            && self.summary.metrics.needs_moments()
            && !self.summary.has_non_finite()
        {
            self.push(value.to_f64());
        }
    }

    fn is_saturated(&self) -> bool {
        self.summary.has_nan() && !self.summary.metrics.contains(Metric::Nnz)
    }

    fn finish(mut self) -> Stats {
        let mut stats = Stats::default();
        self.summary.fill(&mut stats);

        if self.summary.metrics.needs_moments() {
            self.merge_zeros(self.summary.implicit_zeros());
            self.summary
                .fill_moments(&mut stats, self.m2, self.m3, self.m4);
        }
        stats
    }
}

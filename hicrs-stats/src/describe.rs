use hicrs_core::models::Count;

use crate::accumulator::Accumulator;
use crate::exact::ExactAccumulator;
use crate::metric::MetricSet;
use crate::online::OnlineAccumulator;
use crate::stats::{Stats, StatsOptions};

///
/// Compute the requested metrics over a population of counts.
///
/// `source` is called once per traversal and must yield the same values in the
/// same order every time. Only the metrics in `metrics` are filled in, and the
/// two-pass strategy is only used when `options.exact` is set and a central
/// moment was requested.
///
/// # Arguments
/// - metrics: metrics to compute
/// - options: filtering policy and strategy selection
/// - population: number of cells the values are drawn from; required for `keep_zeros`
/// - source: factory of fresh iterators over the stored values
///
pub fn describe<N, I, E, F>(
    metrics: &MetricSet,
    options: &StatsOptions,
    population: Option<u64>,
    mut source: F,
) -> Result<Stats, E>
where
    N: Count,
    I: Iterator<Item = Result<N, E>>,
    F: FnMut() -> Result<I, E>,
{
    if options.exact && metrics.needs_moments() {
        run(
            ExactAccumulator::new(*metrics, *options, population),
            &mut source,
        )
    } else {
        run(
            OnlineAccumulator::new(*metrics, *options, population),
            &mut source,
        )
    }
}

fn run<N, A, I, E, F>(mut accumulator: A, source: &mut F) -> Result<Stats, E>
where
    N: Count,
    A: Accumulator<N>,
    I: Iterator<Item = Result<N, E>>,
    F: FnMut() -> Result<I, E>,
{
    for pass in 0..accumulator.passes() {
        if accumulator.is_saturated() {
            break;
        }
        for value in source()? {
            accumulator.update(pass, value?);
            if accumulator.is_saturated() {
                break;
            }
        }
        accumulator.end_pass(pass);
    }
    Ok(accumulator.finish())
}

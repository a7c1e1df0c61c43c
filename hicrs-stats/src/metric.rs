use std::fmt::{self, Display};
use std::str::FromStr;

use crate::errors::{Result, StatsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Nnz,
    Sum,
    Min,
    Max,
    Mean,
    Variance,
    Skewness,
    Kurtosis,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::Nnz,
        Metric::Sum,
        Metric::Min,
        Metric::Max,
        Metric::Mean,
        Metric::Variance,
        Metric::Skewness,
        Metric::Kurtosis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Nnz => "nnz",
            Metric::Sum => "sum",
            Metric::Min => "min",
            Metric::Max => "max",
            Metric::Mean => "mean",
            Metric::Variance => "variance",
            Metric::Skewness => "skewness",
            Metric::Kurtosis => "kurtosis",
        }
    }

    ///
    /// Whether computing the metric requires central moments.
    ///
    pub fn is_moment(&self) -> bool {
        matches!(self, Metric::Variance | Metric::Skewness | Metric::Kurtosis)
    }

    fn bit(&self) -> u8 {
        1 << (*self as u8)
    }
}

impl FromStr for Metric {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        Metric::ALL
            .iter()
            .find(|m| m.as_str() == s)
            .copied()
            .ok_or_else(|| StatsError::UnknownMetric(s.to_string()))
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

///
/// Set of metrics to compute.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricSet(u8);

impl MetricSet {
    pub fn all() -> Self {
        Metric::ALL.iter().copied().collect()
    }

    pub fn empty() -> Self {
        MetricSet(0)
    }

    ///
    /// Parse a list of metric names. An empty list selects every metric.
    ///
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        if names.is_empty() {
            return Ok(Self::all());
        }
        names
            .iter()
            .map(|name| name.as_ref().parse::<Metric>())
            .collect()
    }

    pub fn insert(&mut self, metric: Metric) {
        self.0 |= metric.bit();
    }

    pub fn contains(&self, metric: Metric) -> bool {
        self.0 & metric.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn needs_moments(&self) -> bool {
        Metric::ALL
            .iter()
            .any(|m| m.is_moment() && self.contains(*m))
    }

    pub fn iter(&self) -> impl Iterator<Item = Metric> + '_ {
        Metric::ALL.iter().copied().filter(|m| self.contains(*m))
    }
}

impl From<Metric> for MetricSet {
    fn from(metric: Metric) -> Self {
        let mut set = MetricSet::empty();
        set.insert(metric);
        set
    }
}

impl FromIterator<Metric> for MetricSet {
    fn from_iter<I: IntoIterator<Item = Metric>>(iter: I) -> Self {
        let mut set = MetricSet::empty();
        for metric in iter {
            set.insert(metric);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_parse_metrics() {
        let set = MetricSet::parse(&["mean", "nnz"]).unwrap();
        assert!(set.contains(Metric::Mean));
        assert!(set.contains(Metric::Nnz));
        assert!(!set.contains(Metric::Sum));
        assert!(!set.needs_moments());
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Metric::Nnz, Metric::Mean]);

        let empty: [&str; 0] = [];
        assert_eq!(MetricSet::parse(&empty).unwrap(), MetricSet::all());
    }

    #[rstest]
    fn test_unknown_metric() {
        let err = MetricSet::parse(&["median"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown metric \"median\". Valid metrics are: nnz, sum, min, max, mean, variance, skewness, kurtosis"
        );
    }
}

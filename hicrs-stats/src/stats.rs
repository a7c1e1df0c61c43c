use std::fmt::{self, Display};

use crate::metric::Metric;

///
/// A statistic that keeps the kind of the population it was computed from:
/// integer populations report integer sums and extremes.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Int(n) => n as f64,
            Value::Float(n) => n,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Float(n) if n.is_nan())
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
        }
    }
}

///
/// Filtering policy applied before values enter the population.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsOptions {
    /// Keep NaN counts.
    pub keep_nans: bool,
    /// Keep +/-Inf counts.
    pub keep_infs: bool,
    /// Add the implicit zeros (cells with no stored pixel) to the population.
    pub keep_zeros: bool,
    /// Two-pass computation of central moments.
    pub exact: bool,
}

///
/// Descriptive statistics.
///
/// `None` marks metrics that were not requested or that are undefined for the
/// population (e.g. the variance of a single observation).
///
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stats {
    pub nnz: Option<u64>,
    pub sum: Option<Value>,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
}

impl Stats {
    pub fn get(&self, metric: Metric) -> Option<Value> {
        match metric {
            Metric::Nnz => self.nnz.map(|n| Value::Int(n as i64)),
            Metric::Sum => self.sum,
            Metric::Min => self.min,
            Metric::Max => self.max,
            Metric::Mean => self.mean.map(Value::Float),
            Metric::Variance => self.variance.map(Value::Float),
            Metric::Skewness => self.skewness.map(Value::Float),
            Metric::Kurtosis => self.kurtosis.map(Value::Float),
        }
    }
}

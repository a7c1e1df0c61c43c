use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error(
        "unknown metric \"{0}\". Valid metrics are: nnz, sum, min, max, mean, variance, skewness, kurtosis"
    )]
    UnknownMetric(String),
}

pub type Result<T> = std::result::Result<T, StatsError>;

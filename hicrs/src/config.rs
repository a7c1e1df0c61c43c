use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid writer configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

///
/// Tunables shared by the file writers. Every field has a default, so a TOML
/// file only needs to list what it overrides:
///
/// ```toml
/// assembly = "dm6"
/// compression_level = 9
/// tmpdir = "/scratch"
/// ```
///
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WriterConfig {
    /// Genome assembly recorded in the file attributes. Default: `None`.
    pub assembly: Option<String>,
    /// Number of pixels stored per compressed chunk (cooler-style). Default: 65536.
    pub chunk_size: u32,
    /// Number of pixels buffered in memory before they are staged to disk. Default: 500000.
    pub buffer_size: usize,
    /// zlib compression level, 0 (fastest) to 9 (smallest). Default: 6.
    pub compression_level: u32,
    /// Where staged pixels are kept until finalize. Default: the system temporary directory.
    pub tmpdir: Option<PathBuf>,
    /// Width of the square blocks, in bins (hic-style). Default: 512.
    pub block_bin_count: u32,
    /// Store counts as floating point numbers (cooler-style). Default: `false`.
    pub float_counts: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            assembly: None,
            chunk_size: 65_536,
            buffer_size: 500_000,
            compression_level: 6,
            tmpdir: None,
            block_bin_count: 512,
            float_counts: false,
        }
    }
}

impl WriterConfig {
    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        let config: WriterConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.compression_level > 9 {
            return Err(ConfigError::Invalid(format!(
                "compression_level should be between 0 and 9, found {}",
                self.compression_level
            )));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size cannot be 0".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size cannot be 0".to_string()));
        }
        if self.block_bin_count == 0 {
            return Err(ConfigError::Invalid("block_bin_count cannot be 0".to_string()));
        }
        Ok(())
    }
}

impl TryFrom<&Path> for WriterConfig {
    type Error = ConfigError;

    fn try_from(path: &Path) -> ConfigResult<Self> {
        let toml_str = read_to_string(path)?;
        WriterConfig::from_toml(&toml_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::io::Write;

    #[rstest]
    fn test_empty_config_uses_defaults() {
        assert_eq!(WriterConfig::from_toml("").unwrap(), WriterConfig::default());
    }

    #[rstest]
    fn test_partial_config() {
        let config = WriterConfig::from_toml(
            r#"
            assembly = "dm6"
            compression_level = 9
            tmpdir = "/scratch"
            "#,
        )
        .unwrap();

        assert_eq!(config.assembly.as_deref(), Some("dm6"));
        assert_eq!(config.compression_level, 9);
        assert_eq!(config.tmpdir, Some(PathBuf::from("/scratch")));
        assert_eq!(config.chunk_size, 65_536);
    }

    #[rstest]
    #[case("compression_level = 10")]
    #[case("chunk_size = 0")]
    #[case("block_bin_count = 0")]
    fn test_invalid_values(#[case] toml_str: &str) {
        assert!(matches!(
            WriterConfig::from_toml(toml_str),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[rstest]
    fn test_malformed_toml() {
        assert!(matches!(
            WriterConfig::from_toml("chunk_size = \"large\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[rstest]
    fn test_try_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "float_counts = true").unwrap();

        let config = WriterConfig::try_from(file.path()).unwrap();
        assert!(config.float_counts);
    }
}

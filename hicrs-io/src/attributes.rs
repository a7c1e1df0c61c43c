use hicrs_core::models::CountValue;
use serde::{Deserialize, Serialize};

pub const COOL_FORMAT: &str = "HICRS::COOL";
pub const MCOOL_FORMAT: &str = "HICRS::MCOOL";
pub const SCOOL_FORMAT: &str = "HICRS::SCOOL";
pub const HIC_FORMAT: &str = "HICRS::HIC";

pub const STORAGE_MODE: &str = "symmetric-upper";

///
/// File-level metadata, stored as JSON next to the index.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Attributes {
    pub format: String,
    pub format_version: u32,
    pub bin_type: String,
    pub bin_size: u32,
    pub storage_mode: String,
    pub creation_date: String,
    pub generated_by: String,
    #[serde(default)]
    pub assembly: Option<String>,
    #[serde(default)]
    pub format_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub nbins: u64,
    pub nchroms: u32,
    pub nnz: u64,
    pub sum: CountValue,
    pub cis: CountValue,
}

impl Attributes {
    ///
    /// Attributes of an empty matrix; the writers fill in the bin and chromosome
    /// counts, `nnz`, `sum` and `cis` when the index is written.
    ///
    pub fn new(format: &str, format_version: u32, bin_type: &str, bin_size: u32) -> Self {
        Attributes {
            format: format.to_string(),
            format_version,
            bin_type: bin_type.to_string(),
            bin_size,
            storage_mode: STORAGE_MODE.to_string(),
            creation_date: String::new(),
            generated_by: format!("hicrs-v{}", env!("CARGO_PKG_VERSION")),
            assembly: None,
            format_url: None,
            metadata: None,
            nbins: 0,
            nchroms: 0,
            nnz: 0,
            sum: CountValue::Int(0),
            cis: CountValue::Int(0),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_json_keys_are_kebab_case() {
        let mut attrs = Attributes::new(COOL_FORMAT, 3, "fixed", 100);
        attrs.sum = CountValue::Float(1.5);
        attrs.assembly = Some("dm6".to_string());

        let json = attrs.to_json().unwrap();
        assert!(json.contains("\"bin-size\":100"));
        assert!(json.contains("\"format-version\":3"));
        assert!(json.contains("\"sum\":1.5"));

        let parsed = Attributes::from_json(&json).unwrap();
        assert_eq!(parsed, attrs);
        assert_eq!(parsed.cis, CountValue::Int(0));
    }
}

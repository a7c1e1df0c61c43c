use std::fmt::{self, Display};
use std::str::FromStr;

use crate::errors::{CoreError, Result};
use crate::models::chromosome::{Chromosome, Reference};

///
/// Syntax used to spell a genomic query.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QueryType {
    /// `chr1`, `chr1:1,000-2,000`
    #[default]
    Ucsc,
    /// `chr1\t1000\t2000`
    Bed,
}

impl FromStr for QueryType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UCSC" | "ucsc" => Ok(QueryType::Ucsc),
            "BED" | "bed" => Ok(QueryType::Bed),
            _ => Err(CoreError::UnknownQueryType(s.to_string())),
        }
    }
}

impl Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryType::Ucsc => write!(f, "UCSC"),
            QueryType::Bed => write!(f, "BED"),
        }
    }
}

///
/// Half-open genomic interval `[start, end)` on a chromosome of a [`Reference`].
///
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenomicInterval {
    chrom: Chromosome,
    start: u32,
    end: u32,
}

impl GenomicInterval {
    pub fn new(chrom: Chromosome, start: u32, end: u32) -> Result<Self> {
        let query = format!("{}:{}-{}", chrom.name(), start, end);
        if start >= end {
            return Err(CoreError::InvalidQuery {
                query,
                reason: "start position should be smaller than the end position".to_string(),
            });
        }
        if end > chrom.length() {
            return Err(CoreError::InvalidQuery {
                query,
                reason: format!(
                    "end position is greater than the chromosome size ({})",
                    chrom.length()
                ),
            });
        }
        Ok(GenomicInterval { chrom, start, end })
    }

    ///
    /// Interval covering an entire chromosome.
    ///
    pub fn whole(chrom: Chromosome) -> Self {
        let end = chrom.length();
        GenomicInterval {
            chrom,
            start: 0,
            end,
        }
    }

    ///
    /// Parse a query against a chromosome table.
    ///
    /// # Arguments
    /// - reference: chromosome table the query refers to
    /// - query: the query string
    /// - query_type: UCSC or BED syntax
    ///
    pub fn parse(reference: &Reference, query: &str, query_type: QueryType) -> Result<Self> {
        match query_type {
            QueryType::Ucsc => Self::parse_ucsc(reference, query),
            QueryType::Bed => Self::parse_bed(reference, query),
        }
    }

    pub fn parse_ucsc(reference: &Reference, query: &str) -> Result<Self> {
        let query = query.trim();
        let invalid = |reason: &str| CoreError::InvalidQuery {
            query: query.to_string(),
            reason: reason.to_string(),
        };

        if query.is_empty() {
            return Err(invalid("query is empty"));
        }

        // chromosome names are allowed to contain ':' and '-'
        if let Ok(chrom) = reference.get(query) {
            return Ok(Self::whole(chrom.clone()));
        }

        let (chrom_name, coords) = query
            .rsplit_once(':')
            .ok_or_else(|| invalid("unknown chromosome or malformed query"))?;
        let chrom = reference.get(chrom_name)?;

        let coords = coords.replace(',', "");
        let (start, end) = coords
            .split_once('-')
            .ok_or_else(|| invalid("missing '-' between start and end positions"))?;

        let start = parse_position(query, start, "start")?;
        let end = parse_position(query, end, "end")?;

        Self::new(chrom.clone(), start, end)
    }

    pub fn parse_bed(reference: &Reference, query: &str) -> Result<Self> {
        let query = query.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = query.split('\t').collect();
        if fields.len() < 3 {
            return Err(CoreError::InvalidQuery {
                query: query.to_string(),
                reason: "BED queries should have at least three tab-separated fields".to_string(),
            });
        }

        let chrom = reference.get(fields[0])?;
        let start = parse_position(query, fields[1], "start")?;
        let end = parse_position(query, fields[2], "end")?;

        Self::new(chrom.clone(), start, end)
    }

    pub fn chrom(&self) -> &Chromosome {
        &self.chrom
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn width(&self) -> u32 {
        self.end - self.start
    }
}

fn parse_position(query: &str, value: &str, field: &str) -> Result<u32> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| CoreError::InvalidQuery {
            query: query.to_string(),
            reason: format!("invalid {} position \"{}\"", field, value),
        })
}

impl Display for GenomicInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chrom.name(), self.start, self.end)
    }
}

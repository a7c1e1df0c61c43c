use std::fmt::{self, Display};
use std::sync::Arc;

use fxhash::FxHashMap;

use crate::errors::{CoreError, Result};

/// Name of the synthetic pseudo-chromosome spanning the whole genome.
pub const ALL_CHROM_NAME: &str = "ALL";

///
/// A named sequence with a length, identified by its position in the chromosome table.
///
#[derive(Eq, PartialEq, Hash, Debug, Clone)]
pub struct Chromosome {
    id: u32,
    name: Arc<str>,
    length: u32,
}

impl Chromosome {
    pub fn new(id: u32, name: &str, length: u32) -> Self {
        Chromosome {
            id,
            name: Arc::from(name),
            length,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    ///
    /// Whether this is the synthetic `ALL` pseudo-chromosome.
    ///
    pub fn is_all(&self) -> bool {
        &*self.name == ALL_CHROM_NAME
    }
}

impl Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

///
/// Ordered chromosome table. Insertion order is significant: it defines
/// chromosome ids and the order bins are laid out in.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    chroms: Vec<Chromosome>,
    index: FxHashMap<Arc<str>, u32>,
}

impl Reference {
    ///
    /// Build a chromosome table from (name, length) pairs.
    ///
    /// Names must be unique and non-empty, lengths must be positive, and
    /// `ALL` is reserved for the synthetic whole-genome chromosome.
    ///
    pub fn new<I, S>(chroms: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        let mut reference = Reference {
            chroms: Vec::new(),
            index: FxHashMap::default(),
        };

        for (name, length) in chroms {
            let name = name.as_ref();
            if name.is_empty() {
                return Err(CoreError::InvalidReference(
                    "chromosome names cannot be empty".to_string(),
                ));
            }
            if name == ALL_CHROM_NAME {
                return Err(CoreError::InvalidReference(format!(
                    "\"{}\" is a reserved chromosome name",
                    ALL_CHROM_NAME
                )));
            }
            if length == 0 {
                return Err(CoreError::InvalidReference(format!(
                    "chromosome \"{}\" has a length of 0",
                    name
                )));
            }
            if reference.index.contains_key(name) {
                return Err(CoreError::InvalidReference(format!(
                    "found duplicate chromosome \"{}\"",
                    name
                )));
            }

            let id = reference.chroms.len() as u32;
            let chrom = Chromosome::new(id, name, length);
            reference.index.insert(chrom.name.clone(), id);
            reference.chroms.push(chrom);
        }

        if reference.chroms.is_empty() {
            return Err(CoreError::InvalidReference(
                "chromosome table is empty".to_string(),
            ));
        }

        Ok(reference)
    }

    pub fn get(&self, name: &str) -> Result<&Chromosome> {
        self.index
            .get(name)
            .map(|&id| &self.chroms[id as usize])
            .ok_or_else(|| CoreError::UnknownChromosome(name.to_string()))
    }

    pub fn get_by_id(&self, id: u32) -> Result<&Chromosome> {
        self.chroms
            .get(id as usize)
            .ok_or(CoreError::UnknownChromosomeId(id))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.chroms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chroms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chromosome> {
        self.chroms.iter()
    }

    ///
    /// Sum of all chromosome lengths.
    ///
    pub fn genome_size(&self) -> u64 {
        self.chroms.iter().map(|c| c.length as u64).sum()
    }

    ///
    /// The synthetic `ALL` chromosome. Its length is the genome size, saturated to `u32::MAX`.
    ///
    pub fn all_chromosome(&self) -> Chromosome {
        let length = self.genome_size().min(u32::MAX as u64) as u32;
        Chromosome::new(u32::MAX, ALL_CHROM_NAME, length)
    }

    ///
    /// Chromosomes in table order, optionally preceded by the `ALL` pseudo-chromosome.
    ///
    pub fn chromosomes(&self, include_all: bool) -> Vec<Chromosome> {
        let mut chroms = Vec::with_capacity(self.chroms.len() + 1);
        if include_all {
            chroms.push(self.all_chromosome());
        }
        chroms.extend(self.chroms.iter().cloned());
        chroms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn reference() -> Reference {
        Reference::new([("chr1", 1000), ("chr2", 500)]).unwrap()
    }

    #[rstest]
    fn test_lookup_preserves_order(reference: Reference) {
        assert_eq!(reference.len(), 2);
        assert_eq!(reference.get("chr2").unwrap().id(), 1);
        assert_eq!(reference.get_by_id(0).unwrap().name(), "chr1");
        assert_eq!(reference.genome_size(), 1500);
    }

    #[rstest]
    fn test_unknown_chromosome(reference: Reference) {
        let err = reference.get("chrX").unwrap_err();
        assert!(matches!(err, CoreError::UnknownChromosome(name) if name == "chrX"));
    }

    #[rstest]
    fn test_include_all(reference: Reference) {
        let names: Vec<String> = reference
            .chromosomes(true)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["ALL", "chr1", "chr2"]);
        assert!(reference.chromosomes(true)[0].is_all());
        assert_eq!(reference.chromosomes(false).len(), 2);
    }

    #[rstest]
    #[case(vec![("chr1", 10), ("chr1", 20)])]
    #[case(vec![("chr1", 0)])]
    #[case(vec![("ALL", 10)])]
    #[case(vec![("", 10)])]
    #[case(vec![])]
    fn test_invalid_reference(#[case] chroms: Vec<(&str, u32)>) {
        assert!(Reference::new(chroms).is_err());
    }
}
